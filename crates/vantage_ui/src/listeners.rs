//! # Event Listeners
//!
//! Listeners come from two places:
//! - `on<type>` attributes on scene nodes, written as `"handlerName(evt)"`
//! - callbacks registered through [`EventAdapter::add_listener`]
//!
//! Attribute listeners name a handler; the name is resolved against a shared
//! [`HandlerTable`] at invocation time, so handlers may be registered after
//! the scene is built.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use thiserror::Error;
use vantage_core::{AdapterBehavior, AdapterCx, AdapterFactory, AdapterSite, Capabilities, Concern, VisualNode};
use vantage_shared::{EventKind, ListenerId, UiEvent};

/// A listener callback.
pub type Callback = Rc<dyn Fn(&UiEvent)>;

/// Errors raised when a listener is invoked.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    /// The listener string was not of the form `name(args)`.
    #[error("could not parse listener string {0:?}, only listeners of the form 'handler(evt)' are supported")]
    Unparseable(String),

    /// No handler is registered under the name.
    #[error("no handler registered for {0:?}")]
    UnknownHandler(String),
}

/// One registered listener.
#[derive(Clone)]
pub enum Listener {
    /// A callback.
    Callback(Callback),
    /// A handler name, resolved when invoked.
    Named(String),
    /// An unparseable listener string. Fails when invoked.
    Malformed(String),
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Callback(_) => f.write_str("Callback(..)"),
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Malformed(text) => f.debug_tuple("Malformed").field(text).finish(),
        }
    }
}

impl Listener {
    /// Wraps a closure.
    pub fn callback(f: impl Fn(&UiEvent) + 'static) -> Self {
        Self::Callback(Rc::new(f))
    }

    /// Runs the listener.
    ///
    /// # Errors
    ///
    /// Fails for malformed strings and unknown handler names. Both are also
    /// logged.
    pub fn invoke(&self, event: &UiEvent, handlers: &HandlerTable) -> Result<(), ListenerError> {
        match self {
            Self::Callback(f) => {
                f(event);
                Ok(())
            }
            Self::Named(name) => {
                let Some(handler) = handlers.get(name) else {
                    tracing::error!(handler = %name, kind = event.kind.as_str(), "unknown event handler");
                    return Err(ListenerError::UnknownHandler(name.clone()));
                };
                handler(event);
                Ok(())
            }
            Self::Malformed(text) => {
                let err = ListenerError::Unparseable(text.clone());
                tracing::error!(error = %err, "listener not run");
                Err(err)
            }
        }
    }
}

/// Parses `"name(args)"` into [`Listener::Named`]. Anything else becomes
/// [`Listener::Malformed`].
#[must_use]
pub fn parse_listener_string(text: &str) -> Listener {
    let trimmed = text.trim();
    let Some(open) = trimmed.find('(') else {
        return Listener::Malformed(text.to_owned());
    };
    if !trimmed[open..].contains(')') {
        return Listener::Malformed(text.to_owned());
    }
    let name = trimmed[..open].trim();
    if name.is_empty() {
        return Listener::Malformed(text.to_owned());
    }
    Listener::Named(name.to_owned())
}

/// Named handlers shared by every event adapter of a context.
#[derive(Default)]
pub struct HandlerTable {
    handlers: RefCell<HashMap<String, Callback>>,
}

impl HandlerTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any previous one.
    pub fn register(&self, name: impl Into<String>, f: impl Fn(&UiEvent) + 'static) {
        self.handlers.borrow_mut().insert(name.into(), Rc::new(f));
    }

    /// Removes a handler.
    pub fn unregister(&self, name: &str) -> bool {
        self.handlers.borrow_mut().remove(name).is_some()
    }

    /// Looks up a handler.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Callback> {
        self.handlers.borrow().get(name).cloned()
    }
}

fn attribute_kind(name: &str) -> Option<EventKind> {
    let lower = name.to_ascii_lowercase();
    EventKind::from_name(lower.strip_prefix("on")?)
}

/// Events adapter of a scene node.
pub struct EventAdapter {
    handlers: Rc<HandlerTable>,
    attribute_listeners: HashMap<EventKind, Listener>,
    listeners: BTreeMap<ListenerId, (EventKind, Listener)>,
    next_listener: u64,
}

impl EventAdapter {
    /// Creates an adapter with no listeners.
    #[must_use]
    pub fn new(handlers: Rc<HandlerTable>) -> Self {
        Self {
            handlers,
            attribute_listeners: HashMap::new(),
            listeners: BTreeMap::new(),
            next_listener: 1,
        }
    }

    /// Adds a listener for `kind`.
    pub fn add_listener(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.insert(id, (kind, listener));
        id
    }

    /// Removes a listener added with [`EventAdapter::add_listener`].
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Number of listeners for `kind`, attribute listener included.
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        usize::from(self.attribute_listeners.contains_key(&kind))
            + self.listeners.values().filter(|(k, _)| *k == kind).count()
    }

    fn set_attribute_listener(&mut self, name: &str, value: Option<&str>) {
        let Some(kind) = attribute_kind(name) else {
            return;
        };
        match value {
            Some(text) => {
                self.attribute_listeners.insert(kind, parse_listener_string(text));
            }
            None => {
                self.attribute_listeners.remove(&kind);
            }
        }
    }
}

impl AdapterBehavior for EventAdapter {
    fn capabilities(&self) -> Capabilities {
        Capabilities::EVENTS
    }

    fn on_configured(&mut self, cx: &mut AdapterCx<'_>) {
        let Some(node) = cx.scene().node(cx.node()) else {
            return;
        };
        let attributes: Vec<(String, String)> = node
            .attributes()
            .filter(|(name, _)| attribute_kind(name).is_some())
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect();
        for (name, value) in attributes {
            self.set_attribute_listener(&name, Some(&value));
        }
    }

    fn on_attribute_changed(&mut self, name: &str, _old: Option<&str>, new: Option<&str>, _cx: &mut AdapterCx<'_>) {
        self.set_attribute_listener(name, new);
    }

    fn on_dispose(&mut self) {
        self.attribute_listeners.clear();
        self.listeners.clear();
    }

    // Counts listeners that ran; failures were logged by `invoke`.
    fn deliver(&mut self, event: &UiEvent) -> usize {
        let callbacks = self
            .listeners
            .values()
            .filter(|(kind, _)| *kind == event.kind)
            .map(|(_, listener)| listener);
        self.attribute_listeners
            .get(&event.kind)
            .into_iter()
            .chain(callbacks)
            .filter(|listener| listener.invoke(event, &self.handlers).is_ok())
            .count()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Creates an [`EventAdapter`] for every node.
pub struct EventAdapterFactory {
    handlers: Rc<HandlerTable>,
}

impl EventAdapterFactory {
    /// Creates the factory.
    #[must_use]
    pub fn new(handlers: Rc<HandlerTable>) -> Self {
        Self { handlers }
    }
}

impl AdapterFactory for EventAdapterFactory {
    fn concern(&self) -> Concern {
        Concern::Events
    }

    fn create(&self, _node: &VisualNode, _site: AdapterSite) -> Option<Box<dyn AdapterBehavior>> {
        Some(Box::new(EventAdapter::new(Rc::clone(&self.handlers))))
    }
}
