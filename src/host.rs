use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use tern_core::backend::{self, Backend};
use tern_core::{
    ContextBinding, DefinitionLoader, ElementError, ElementId, ElementTree, Env, Interpreter,
    KindRegistry, ModelSet, ParsedNode,
};
use tracing::{debug, warn};

/// Something to do on the model thread.
#[derive(Debug, Clone)]
pub enum Request {
    /// Load a new version of the description.
    Reload(ParsedNode),
    /// Rebind an element’s dynamic slots.
    Bind(ElementId, ContextBinding),
    /// Destroy an element.
    Destroy(ElementId),
    /// Interpret the current description again.
    Refresh,
}

/// Posts requests to a host from any thread.
#[derive(Debug, Clone)]
pub struct Mailbox(Sender<Request>);

impl Mailbox {
    /// Queues a request; it will be handled on the next `poll`.
    ///
    /// Returns false if the host is gone.
    pub fn post(&self, request: Request) -> bool {
        self.0.send(request).is_ok()
    }
}

/// Drives the element pipeline and connects the element tree to a backend.
pub struct Host<B: Backend> {
    loader: DefinitionLoader,
    interpreter: Interpreter,
    tree: ElementTree,
    env: Env,
    models: ModelSet,
    backend: B,
    request_send: Sender<Request>,
    request_recv: Receiver<Request>,
}

impl<B: Backend> Host<B> {
    /// Creates a new Host.
    ///
    /// Nothing is loaded until you call `load`. Root elements are interpreted in `env` and
    /// instantiated in `models`.
    pub fn new(registry: KindRegistry, env: Env, models: ModelSet, backend: B) -> Host<B> {
        let (request_send, request_recv) = channel::unbounded();

        Host {
            loader: DefinitionLoader::new(registry),
            interpreter: Interpreter::new(),
            tree: ElementTree::new(),
            env,
            models,
            backend,
            request_send,
            request_recv,
        }
    }

    pub fn tree(&self) -> &ElementTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut ElementTree {
        &mut self.tree
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn models(&self) -> &ModelSet {
        &self.models
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn mailbox(&self) -> Mailbox {
        Mailbox(self.request_send.clone())
    }

    /// Loads a description and brings the element tree in line with it.
    ///
    /// If the description can’t be used at all (its root is invalid), the error is returned and
    /// the previous tree stays as it is.
    pub fn load(&mut self, node: &ParsedNode) -> Result<ElementId, ElementError> {
        let result = self.loader.load(node).map_err(ElementError::from).and_then(|def| {
            let interpreted = self.interpreter.interpret(&def, &self.env)?;
            let root = self.tree.set_root(&interpreted)?;
            self.activate(root)?;
            Ok(root)
        });
        self.flush();
        result
    }

    /// Replaces the root environment and interprets the current description again.
    pub fn set_env(&mut self, env: Env) -> Result<(), ElementError> {
        self.env = env;
        self.refresh()
    }

    /// Interprets the current description again.
    pub fn refresh(&mut self) -> Result<(), ElementError> {
        let def = match self.loader.current() {
            Some(def) => def.clone(),
            None => return Ok(()),
        };
        let result = self
            .interpreter
            .interpret(&def, &self.env)
            .map_err(ElementError::from)
            .and_then(|interpreted| {
                let root = self.tree.set_root(&interpreted)?;
                self.activate(root)
            });
        self.flush();
        result
    }

    fn activate(&mut self, root: ElementId) -> Result<(), ElementError> {
        match self.tree.phase(root) {
            Some(phase) if phase.is_instantiated() => Ok(()),
            _ => {
                debug!(%root, "instantiating root element");
                self.tree.instantiate(root, &self.models)
            }
        }
    }

    fn flush(&mut self) {
        if let Err(err) = backend::flush(&mut self.tree, &mut self.backend) {
            warn!(%err, "backend failed to apply patch");
        }
    }

    /// Handles all queued requests.
    pub fn poll(&mut self) {
        loop {
            match self.request_recv.try_recv() {
                Ok(request) => self.handle(request),
                // the host holds a sender itself, so it never disconnects
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn handle(&mut self, request: Request) {
        let result = match request {
            Request::Reload(node) => self.load(&node).map(drop),
            Request::Bind(id, binding) => self.tree.set_context(id, &binding),
            Request::Destroy(id) => {
                self.tree.destroy(id);
                Ok(())
            }
            Request::Refresh => self.refresh(),
        };
        if let Err(err) = result {
            warn!(%err, "request failed");
        }
        self.flush();
    }
}
