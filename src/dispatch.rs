//! Dispatch: route a named request to its action.
//!
//! Synchronous actions run inline. Asynchronous ones run on their own
//! thread and hand back a [`Task`] the caller can wait on.

use std::{
    collections::BTreeMap,
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};

use serde_json::Value;

use crate::action::{Action, ActionError};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("failed to start action {name}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("action {0} panicked")]
    Panicked(String),

    #[error(transparent)]
    Action(#[from] ActionError),
}

/// Registered actions, by name.
#[derive(Default)]
pub struct Dispatcher {
    actions: BTreeMap<&'static str, Arc<dyn Action>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `action` under `name`, replacing any previous registration.
    pub fn register(&mut self, name: &'static str, action: impl Action + 'static) {
        self.actions.insert(name, Arc::new(action));
    }

    /// Start the action registered as `name`.
    pub fn dispatch(&self, name: &str, args: Vec<Value>) -> Result<Dispatched, DispatchError> {
        let action = self
            .actions
            .get(name)
            .ok_or_else(|| DispatchError::UnknownAction(name.to_string()))?;

        if !action.is_asynchronous() {
            tracing::debug!(action = name, "running synchronously");
            return Ok(Dispatched::Completed(action.run(&args)));
        }

        let action = Arc::clone(action);
        let handle = thread::Builder::new()
            .name(format!("action-{name}"))
            .spawn(move || action.run(&args))
            .map_err(|source| DispatchError::Spawn {
                name: name.to_string(),
                source,
            })?;

        tracing::debug!(action = name, "started asynchronous task");
        Ok(Dispatched::Running(Task {
            name: name.to_string(),
            handle,
        }))
    }
}

/// Outcome of starting an action.
pub enum Dispatched {
    Completed(Result<Value, ActionError>),
    Running(Task),
}

impl Dispatched {
    /// Block until the action's result is available.
    pub fn wait(self) -> Result<Value, DispatchError> {
        match self {
            Self::Completed(result) => Ok(result?),
            Self::Running(task) => task.wait(),
        }
    }
}

/// An asynchronous action in flight.
pub struct Task {
    name: String,
    handle: JoinHandle<Result<Value, ActionError>>,
}

impl Task {
    pub fn wait(self) -> Result<Value, DispatchError> {
        let result = self
            .handle
            .join()
            .map_err(|_| DispatchError::Panicked(self.name))?;
        Ok(result?)
    }
}
