//! Callable Registry
//!
//! Tasks name their callable by a stable string identity. A worker resolves
//! that identity here, decodes the arguments into the callable's input type,
//! runs it and encodes the output. Errors and panics are captured into a
//! `TaskFailure` so the worker process survives them.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use fanout_protocol::{codec, FailureKind, Task, TaskFailure, TaskResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

type Handler = dyn Fn(&[u8]) -> Result<Vec<u8>, (FailureKind, String)> + Send + Sync;

#[derive(Clone, Default)]
pub struct Registry {
    callables: HashMap<String, Arc<Handler>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under `name`, replacing any previous entry.
    pub fn register<A, R, F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        A: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: Fn(A) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let handler = move |payload: &[u8]| -> Result<Vec<u8>, (FailureKind, String)> {
            let args: A = codec::decode(payload)
                .map_err(|e| (FailureKind::InvalidArguments, e.to_string()))?;
            let output = f(args).map_err(|e| (FailureKind::Raised, format!("{:#}", e)))?;
            codec::encode(&output)
                .map_err(|e| (FailureKind::Raised, format!("failed to encode result: {}", e)))
        };
        self.callables.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.callables.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.callables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run the task's callable, capturing every failure.
    pub fn call(&self, task: &Task) -> Result<Vec<u8>, TaskFailure> {
        let handler = self.callables.get(&task.callable).ok_or_else(|| {
            TaskFailure::new(
                FailureKind::UnknownCallable,
                format!("no callable registered as '{}'", task.callable),
                task,
            )
        })?;

        match panic::catch_unwind(AssertUnwindSafe(|| handler(&task.args))) {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err((kind, message))) => Err(TaskFailure::new(kind, message, task)),
            Err(panic) => Err(TaskFailure::new(
                FailureKind::Panicked,
                panic_message(panic.as_ref()),
                task,
            )),
        }
    }

    /// Run the task and package the outcome for the submitter.
    pub fn execute(&self, task: &Task) -> TaskResult {
        let started = Instant::now();
        let outcome = self.call(task);
        TaskResult {
            callable: task.callable.clone(),
            task_no: task.monitor.task_no,
            worker_pid: std::process::id(),
            elapsed: started.elapsed(),
            outcome,
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("callables", &self.names())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "callable panicked".to_string()
    }
}
