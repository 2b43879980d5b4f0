//! Kinds for tests.

use crate::definition::{DefineContext, ParsedNode, SlotType};
use crate::error::{InterpretationError, ModelInstantiationError, ValidationError};
use crate::expr::{CompiledExpression, InterpretedExpression};
use crate::interpret::InterpretContext;
use crate::kind::{ElementContext, Kind, KindRegistry};
use crate::model::{ModelSet, ModelType, ModelValue, Shape};
use crate::reactive::HotCell;
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Create(Arc<str>),
    Update(Arc<str>),
    Instantiate(Arc<str>),
    Instantiated(Arc<str>),
    Context(Arc<str>),
    Destroy(Arc<str>),
}

/// Records what the test kinds were asked to do.
#[derive(Default)]
pub(crate) struct Probe {
    events: Mutex<Vec<Event>>,
}

impl Probe {
    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub(crate) fn count(&self, event: &Event) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    pub(crate) fn clear(&self) {
        self.events.lock().clear();
    }
}

/// "menu-bar", "menu", "panel"
pub(crate) struct Container(Arc<Probe>);

impl Kind for Container {
    type Definition = Arc<str>;
    type Interpreted = Arc<str>;
    type State = Arc<str>;

    fn define(&self, cx: &mut DefineContext) -> Result<Arc<str>, ValidationError> {
        Ok(cx
            .text("name")?
            .unwrap_or_else(|| cx.element_type().as_str().into()))
    }

    fn interpret(&self, def: &Arc<str>, _: &mut InterpretContext) -> Result<Arc<str>, InterpretationError> {
        Ok(Arc::clone(def))
    }

    fn create(&self, interp: &Arc<str>, _: &ElementContext) -> Arc<str> {
        self.0.record(Event::Create(Arc::clone(interp)));
        Arc::clone(interp)
    }

    fn update(&self, state: &mut Arc<str>, _: &Arc<str>, _: &ElementContext) -> Result<(), ModelInstantiationError> {
        self.0.record(Event::Update(Arc::clone(state)));
        Ok(())
    }

    fn instantiate(&self, state: &mut Arc<str>, _: &Arc<str>, _: &ElementContext) -> Result<(), ModelInstantiationError> {
        self.0.record(Event::Instantiate(Arc::clone(state)));
        Ok(())
    }

    fn instantiated(&self, state: &mut Arc<str>, _: &ElementContext) {
        self.0.record(Event::Instantiated(Arc::clone(state)));
    }

    fn destroy(&self, state: &mut Arc<str>) {
        self.0.record(Event::Destroy(Arc::clone(state)));
    }
}

/// "item", with a required `value`.
pub(crate) struct Item(Arc<Probe>);

pub(crate) struct ItemDef {
    label: Arc<str>,
    value: Arc<dyn CompiledExpression>,
}

pub(crate) struct ItemInterp {
    label: Arc<str>,
    pub(crate) value: Arc<dyn InterpretedExpression>,
}

pub(crate) struct ItemState {
    pub(crate) label: Arc<str>,
    pub(crate) value: HotCell<Value>,
    value_type: ModelType,
}

impl Item {
    fn bind(&self, state: &ItemState, interp: &ItemInterp, models: &ModelSet) -> Result<(), ModelInstantiationError> {
        match interp.value.instantiate().get(models)? {
            ModelValue::Value(value) => {
                state.value.swap(value, None);
                Ok(())
            }
            ModelValue::List(_) => Err(ModelInstantiationError::ShapeMismatch(Arc::clone(&state.label))),
        }
    }
}

impl Kind for Item {
    type Definition = ItemDef;
    type Interpreted = ItemInterp;
    type State = ItemState;

    fn define(&self, cx: &mut DefineContext) -> Result<ItemDef, ValidationError> {
        let value = cx.require_expression("value")?;
        let label = match cx.text("value") {
            Ok(Some(text)) => text,
            _ => value.source().into(),
        };
        Ok(ItemDef { label, value })
    }

    fn interpret(&self, def: &ItemDef, cx: &mut InterpretContext) -> Result<ItemInterp, InterpretationError> {
        Ok(ItemInterp {
            label: Arc::clone(&def.label),
            value: cx.interpret(&def.value, &ModelType::any(Shape::Value))?,
        })
    }

    fn create(&self, interp: &ItemInterp, _: &ElementContext) -> ItemState {
        self.0.record(Event::Create(Arc::clone(&interp.label)));
        ItemState {
            label: Arc::clone(&interp.label),
            value: HotCell::constant(Value::Unit),
            value_type: interp.value.model_type().clone(),
        }
    }

    fn update(&self, state: &mut ItemState, interp: &ItemInterp, cx: &ElementContext) -> Result<(), ModelInstantiationError> {
        self.0.record(Event::Update(Arc::clone(&state.label)));
        if &state.value_type != interp.value.model_type() {
            state.value.release();
            state.value = HotCell::constant(Value::Unit);
            state.value_type = interp.value.model_type().clone();
        }
        match cx.models() {
            Some(models) => self.bind(state, interp, models),
            None => Ok(()),
        }
    }

    fn instantiate(&self, state: &mut ItemState, interp: &ItemInterp, cx: &ElementContext) -> Result<(), ModelInstantiationError> {
        self.0.record(Event::Instantiate(Arc::clone(&state.label)));
        self.bind(state, interp, cx.require_models()?)
    }

    fn instantiated(&self, state: &mut ItemState, _: &ElementContext) {
        self.0.record(Event::Instantiated(Arc::clone(&state.label)));
    }

    fn destroy(&self, state: &mut ItemState) {
        self.0.record(Event::Destroy(Arc::clone(&state.label)));
        state.value.release();
    }
}

/// "repeat", declaring a slot named by its `slot` attribute.
pub(crate) struct Repeat(Arc<Probe>);

impl Kind for Repeat {
    type Definition = Arc<str>;
    type Interpreted = Arc<str>;
    type State = Arc<str>;

    fn define(&self, cx: &mut DefineContext) -> Result<Arc<str>, ValidationError> {
        let slot = match cx.text("slot")? {
            Some(slot) => slot,
            None => return Err(cx.error("needs a slot name")),
        };
        cx.declare_slot(&slot, SlotType::Fixed(ModelType::any(Shape::Value)));
        Ok(format!("repeat:{}", slot).into())
    }

    fn interpret(&self, def: &Arc<str>, _: &mut InterpretContext) -> Result<Arc<str>, InterpretationError> {
        Ok(Arc::clone(def))
    }

    fn create(&self, interp: &Arc<str>, _: &ElementContext) -> Arc<str> {
        self.0.record(Event::Create(Arc::clone(interp)));
        Arc::clone(interp)
    }

    fn instantiated(&self, state: &mut Arc<str>, _: &ElementContext) {
        self.0.record(Event::Instantiated(Arc::clone(state)));
    }

    fn context_changed(&self, state: &mut Arc<str>, _: &Arc<str>, _: &ElementContext) -> Result<(), ModelInstantiationError> {
        self.0.record(Event::Context(Arc::clone(state)));
        Ok(())
    }

    fn destroy(&self, state: &mut Arc<str>) {
        self.0.record(Event::Destroy(Arc::clone(state)));
    }
}

pub(crate) fn probed() -> (KindRegistry, Arc<Probe>) {
    let probe = Arc::new(Probe::default());
    let mut registry = KindRegistry::new();
    registry
        .register(&["menu-bar", "menu", "panel"], Container(Arc::clone(&probe)))
        .register(&["item"], Item(Arc::clone(&probe)))
        .register(&["repeat"], Repeat(Arc::clone(&probe)));
    (registry, probe)
}

pub(crate) fn registry() -> KindRegistry {
    probed().0
}

/// `menu-bar > menu > item*`
pub(crate) fn menu_bar(items: &[&str]) -> ParsedNode {
    ParsedNode::new("menu-bar").child(
        ParsedNode::new("menu").children(
            items
                .iter()
                .map(|item| ParsedNode::new("item").attr("value", *item)),
        ),
    )
}
