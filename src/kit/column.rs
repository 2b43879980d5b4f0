use std::sync::Arc;
use tern_core::expr::{CompiledExpression, InterpretedExpression, Instantiator};
use tern_core::model::Invocation;
use tern_core::reactive::{Constant, DynObservable, FlatCell, HotCell};
use tern_core::{
    DefineContext, ElementContext, ElementError, ElementId, InterpretContext, InterpretationError,
    Kind, ModelComponentId, ModelInstantiationError, ModelSet, ModelType, ModelValue, Shape,
    SlotType, ValidationError, Value, ValueType,
};

/// A table column: `<column title=… render=…>`.
///
/// `render` is a template evaluated against the `row` slot. Binding `row` with
/// `ElementTree::set_context` moves the column’s cell to that row; `render_row` evaluates a row on
/// the side without touching the cell.
pub struct Column;

pub struct ColumnDef {
    title: Option<Arc<dyn CompiledExpression>>,
    render: Arc<dyn CompiledExpression>,
    row: ModelComponentId,
}

pub struct ColumnInterp {
    title: Option<Arc<dyn InterpretedExpression>>,
    render: Arc<dyn InterpretedExpression>,
    row: ModelComponentId,
}

pub struct ColumnState {
    id: ElementId,
    row: ModelComponentId,
    title: HotCell<Value>,
    cell: HotCell<Value>,
    render: Box<dyn Instantiator>,
    models: Option<ModelSet>,
    bound: bool,
}

impl ColumnState {
    pub fn title(&self) -> FlatCell<Value> {
        self.title.view()
    }

    /// The rendered value for the currently bound row.
    pub fn cell(&self) -> FlatCell<Value> {
        self.cell.view()
    }

    /// The slot rows are bound to.
    pub fn row_slot(&self) -> &ModelComponentId {
        &self.row
    }

    /// Renders a single row in its own invocation.
    pub fn render_row(&self, row: &Value) -> Result<Value, ElementError> {
        let models = self
            .models
            .as_ref()
            .ok_or(ElementError::NotInstantiated(self.id))?;
        let invocation = Invocation::new(models)?;
        invocation.bind(&self.row, ModelValue::Value(Constant::shared(row.clone())))?;
        Ok(invocation.evaluate(&*self.render)?.snapshot())
    }

    fn bind_title(&self, interp: &ColumnInterp, models: &ModelSet) -> Result<(), ModelInstantiationError> {
        if let Some(title) = &interp.title {
            self.title.swap(value_of(title.instantiate().get(models)?, "title")?, None);
        }
        Ok(())
    }

    fn bind_cell(&mut self, models: &ModelSet) -> Result<(), ModelInstantiationError> {
        self.cell.swap(value_of(self.render.get(models)?, "render")?, None);
        self.bound = true;
        Ok(())
    }
}

fn value_of(value: ModelValue, what: &str) -> Result<DynObservable<Value>, ModelInstantiationError> {
    match value {
        ModelValue::Value(value) => Ok(value),
        ModelValue::List(_) => Err(ModelInstantiationError::ShapeMismatch(what.into())),
    }
}

impl Kind for Column {
    type Definition = ColumnDef;
    type Interpreted = ColumnInterp;
    type State = ColumnState;

    fn define(&self, cx: &mut DefineContext) -> Result<ColumnDef, ValidationError> {
        let title = cx.expression("title")?;
        let render = cx.require_expression("render")?;
        let row = cx.declare_slot("row", SlotType::Fixed(ModelType::any(Shape::Value)));
        Ok(ColumnDef { title, render, row })
    }

    fn interpret(
        &self,
        def: &ColumnDef,
        cx: &mut InterpretContext,
    ) -> Result<ColumnInterp, InterpretationError> {
        let title = match &def.title {
            Some(title) => Some(cx.interpret(title, &ModelType::Value(ValueType::Str))?),
            None => None,
        };
        Ok(ColumnInterp {
            title,
            render: cx.interpret(&def.render, &ModelType::any(Shape::Value))?,
            row: def.row.clone(),
        })
    }

    fn create(&self, interp: &ColumnInterp, cx: &ElementContext) -> ColumnState {
        ColumnState {
            id: cx.id(),
            row: interp.row.clone(),
            title: HotCell::constant(Value::Unit),
            cell: HotCell::constant(Value::Unit),
            render: interp.render.instantiate(),
            models: None,
            bound: false,
        }
    }

    fn update(
        &self,
        state: &mut ColumnState,
        interp: &ColumnInterp,
        cx: &ElementContext,
    ) -> Result<(), ModelInstantiationError> {
        state.render = interp.render.instantiate();
        let models = match cx.models() {
            Some(models) => models,
            None => return Ok(()),
        };
        state.bind_title(interp, models)?;
        if state.bound {
            state.bind_cell(models)?;
        }
        Ok(())
    }

    fn instantiate(
        &self,
        state: &mut ColumnState,
        interp: &ColumnInterp,
        cx: &ElementContext,
    ) -> Result<(), ModelInstantiationError> {
        // the cell waits for a row
        let models = cx.require_models()?;
        state.bind_title(interp, models)?;
        state.models = Some(models.clone());
        Ok(())
    }

    fn context_changed(
        &self,
        state: &mut ColumnState,
        _: &ColumnInterp,
        cx: &ElementContext,
    ) -> Result<(), ModelInstantiationError> {
        // once bound, the cell follows the row slot by itself
        if !state.bound {
            state.bind_cell(cx.require_models()?)?;
        }
        Ok(())
    }

    fn destroy(&self, state: &mut ColumnState) {
        state.title.release();
        state.cell.release();
        state.models = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit;
    use crate::{Host, Request};
    use parking_lot::Mutex;
    use tern_core::expr::Expression;
    use tern_core::reactive::{Cell, ChangeEvent, Observable};
    use tern_core::{ContextBinding, Env, Patch, ParsedNode};

    fn table() -> ParsedNode {
        ParsedNode::new("table").child(
            ParsedNode::new("column").attr("title", "Name").attr(
                "render",
                Expression::map("upper(row)", "row", ValueType::Str, |row| {
                    Value::from(row.as_str().unwrap_or_default().to_uppercase())
                }),
            ),
        )
    }

    fn host() -> (Host<Vec<Patch>>, ElementId) {
        let mut host = Host::new(kit::registry(), Env::root(), ModelSet::root(), Vec::new());
        let root = host.load(&table()).unwrap();
        let column = host.tree().children(root).unwrap()[0];
        (host, column)
    }

    fn bind(row: &Cell<Value>, slot: &ModelComponentId) -> ContextBinding {
        ContextBinding::new().with(slot.clone(), ModelValue::Value(row.shared()))
    }

    #[test]
    fn cells_follow_rebinding() {
        let (mut host, column) = host();
        let state = host.tree().state::<Column>(column).unwrap();
        let slot = state.row_slot().clone();
        let cell = state.cell();
        assert_eq!(state.title().get(), Value::from("Name"));
        assert_eq!(cell.get(), Value::Unit);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let _sub = cell.subscribe(Arc::new(move |event: &ChangeEvent<Value>| {
            seen2.lock().push(event.new.clone());
        }));

        let first = Cell::new(Value::from("ada"));
        host.tree_mut().set_context(column, &bind(&first, &slot)).unwrap();
        assert_eq!(cell.get(), Value::from("ADA"));

        let rows: Vec<_> = ["grace", "alan", "edsger"]
            .iter()
            .map(|name| Cell::new(Value::from(*name)))
            .collect();
        for row in &rows {
            host.tree_mut().set_context(column, &bind(row, &slot)).unwrap();
        }
        assert_eq!(cell.get(), Value::from("EDSGER"));
        assert_eq!(seen.lock().len(), 4);
        // rows that were bound before don't hold on to anything
        assert_eq!(first.listener_count(), 0);
        assert_eq!(rows[0].listener_count(), 0);

        rows[2].set(Value::from("dijkstra"), None);
        assert_eq!(cell.get(), Value::from("DIJKSTRA"));
    }

    #[test]
    fn rendering_on_the_side() {
        let (mut host, column) = host();
        let slot = host.tree().state::<Column>(column).unwrap().row_slot().clone();
        let row = Cell::new(Value::from("bound"));
        host.tree_mut().set_context(column, &bind(&row, &slot)).unwrap();

        let state = host.tree().state::<Column>(column).unwrap();
        assert_eq!(state.render_row(&Value::from("a")).unwrap(), Value::from("A"));
        assert_eq!(state.render_row(&Value::from("b")).unwrap(), Value::from("B"));
        assert_eq!(state.cell().get(), Value::from("BOUND"));
    }

    #[test]
    fn bind_requests() {
        let (mut host, column) = host();
        let slot = host.tree().state::<Column>(column).unwrap().row_slot().clone();
        let row = Cell::new(Value::from("queued"));
        host.mailbox().post(Request::Bind(column, bind(&row, &slot)));
        host.poll();
        let state = host.tree().state::<Column>(column).unwrap();
        assert_eq!(state.cell().get(), Value::from("QUEUED"));
    }
}
