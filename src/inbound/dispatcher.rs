use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::task::{self, JoinSet};
use tracing::{debug, error};

use crate::domain::ports::{HandlerError, InboundEvent, SharedHandler};

/// How the handlers matched by one dispatch are executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// One after another in registration order
    #[default]
    Sequential,
    /// All at once; dispatch returns after the last one finishes
    Parallel,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Sequential => f.write_str("sequential"),
            DispatchMode::Parallel => f.write_str("parallel"),
        }
    }
}

/// One handler's failure during a dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerFailure {
    pub event: String,
    pub message_id: String,
    pub handler: String,
    pub error: HandlerError,
}

/// Receives every handler failure; must not block
pub type ErrorCallback = Arc<dyn Fn(&HandlerFailure) + Send + Sync>;

/// Counts for one dispatch call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn succeeded(&self) -> usize {
        self.invoked - self.failed
    }
}

#[derive(Default)]
struct Registry {
    by_event: HashMap<String, Vec<SharedHandler>>,
    wildcard: Vec<SharedHandler>,
}

impl Registry {
    /// Event-specific handlers first, then wildcards, each in registration order
    fn resolve(&self, event: &str) -> Vec<SharedHandler> {
        self.by_event
            .get(event)
            .into_iter()
            .flatten()
            .chain(self.wildcard.iter())
            .cloned()
            .collect()
    }
}

/// Routes verified webhooks to registered handlers.
///
/// A handler that fails or panics is reported to the error callback and does not
/// stop the others.
pub struct EventDispatcher {
    registry: Arc<RwLock<Registry>>,
    mode: DispatchMode,
    on_error: ErrorCallback,
}

impl EventDispatcher {
    pub fn new(mode: DispatchMode) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
            mode,
            on_error: Arc::new(log_failure),
        }
    }

    /// Replace the default logging callback
    pub fn with_error_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&HandlerFailure) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(callback);
        self
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Register a handler for one event name
    pub async fn register(&self, event: impl Into<String>, handler: SharedHandler) {
        let event = event.into();
        debug!(event = %event, handler = %handler.name(), "Registering webhook handler");

        let mut registry = self.registry.write().await;
        registry.by_event.entry(event).or_default().push(handler);
    }

    /// Remove every registration of `handler` under `event`; unknown handlers are ignored
    pub async fn unregister(&self, event: &str, handler: &SharedHandler) {
        let mut registry = self.registry.write().await;
        if let Some(handlers) = registry.by_event.get_mut(event) {
            handlers.retain(|h| !Arc::ptr_eq(h, handler));
            if handlers.is_empty() {
                registry.by_event.remove(event);
            }
        }
    }

    /// Register a handler that receives every event
    pub async fn register_wildcard(&self, handler: SharedHandler) {
        debug!(handler = %handler.name(), "Registering wildcard webhook handler");

        let mut registry = self.registry.write().await;
        registry.wildcard.push(handler);
    }

    pub async fn unregister_wildcard(&self, handler: &SharedHandler) {
        let mut registry = self.registry.write().await;
        registry.wildcard.retain(|h| !Arc::ptr_eq(h, handler));
    }

    /// Number of handlers a dispatch of `event` would invoke
    pub async fn handler_count(&self, event: &str) -> usize {
        self.registry.read().await.resolve(event).len()
    }

    /// Run every handler matching the event. Never fails; failures go to the error callback.
    pub async fn dispatch(&self, event: &InboundEvent) -> DispatchReport {
        // Snapshot so handlers may (un)register without deadlocking
        let handlers = self.registry.read().await.resolve(event.event());

        if handlers.is_empty() {
            debug!(event = %event.event(), message_id = %event.message_id, "No handlers registered");
            return DispatchReport::default();
        }

        let invoked = handlers.len();
        let failures = match self.mode {
            DispatchMode::Sequential => Self::run_sequential(handlers, event).await,
            DispatchMode::Parallel => Self::run_parallel(handlers, event).await,
        };

        for (handler, err) in &failures {
            let failure = HandlerFailure {
                event: event.event().to_string(),
                message_id: event.message_id.clone(),
                handler: handler.clone(),
                error: err.clone(),
            };
            (self.on_error)(&failure);
        }

        DispatchReport {
            invoked,
            failed: failures.len(),
        }
    }

    async fn run_sequential(
        handlers: Vec<SharedHandler>,
        event: &InboundEvent,
    ) -> Vec<(String, HandlerError)> {
        let mut failures = Vec::new();
        for handler in handlers {
            if let Err(e) = run_guarded(&handler, event).await {
                failures.push((handler.name().to_string(), e));
            }
        }
        failures
    }

    async fn run_parallel(
        handlers: Vec<SharedHandler>,
        event: &InboundEvent,
    ) -> Vec<(String, HandlerError)> {
        let event = Arc::new(event.clone());
        let mut tasks = JoinSet::new();
        let mut names = HashMap::new();

        for handler in handlers {
            let event = Arc::clone(&event);
            let name = handler.name().to_string();
            let task = tasks.spawn(async move { run_guarded(&handler, &event).await });
            names.insert(task.id(), name);
        }

        drain(tasks, names).await
    }
}

/// Wait for every task, attributing each failure to its handler by task ID
async fn drain(
    mut tasks: JoinSet<Result<(), HandlerError>>,
    mut names: HashMap<task::Id, String>,
) -> Vec<(String, HandlerError)> {
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((id, Err(e))) => failures.push((handler_name(&mut names, id), e)),
            // Panics are caught inside the task, so this is cancellation
            Err(e) => failures.push((
                handler_name(&mut names, e.id()),
                HandlerError::Aborted(e.to_string()),
            )),
        }
    }
    failures
}

fn handler_name(names: &mut HashMap<task::Id, String>, id: task::Id) -> String {
    names
        .remove(&id)
        .unwrap_or_else(|| "UnnamedHandler".to_string())
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(DispatchMode::default())
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

async fn run_guarded(handler: &SharedHandler, event: &InboundEvent) -> Result<(), HandlerError> {
    match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn log_failure(failure: &HandlerFailure) {
    error!(
        event = %failure.event,
        message_id = %failure.message_id,
        handler = %failure.handler,
        error = %failure.error,
        "Webhook handler failed"
    );
}
