//! Built-in callables shipped with the `fanout-worker` binary.
//!
//! Embedders with their own workloads build a worker binary around their own
//! `Registry` and hand it to the pool with `--worker-program`.

use std::time::Duration;

use crate::registry::Registry;

pub fn builtin_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register("add", |(a, b): (i64, i64)| Ok(a + b))
        .register("echo", |value: String| Ok(value))
        // (delay in ms, token) -> (token, worker pid)
        .register("sleep_echo", |(delay_ms, token): (u64, u64)| {
            std::thread::sleep(Duration::from_millis(delay_ms));
            Ok((token, std::process::id()))
        })
        .register("fail", |message: String| -> anyhow::Result<()> {
            Err(anyhow::anyhow!(message))
        })
        .register("panic", |message: String| -> anyhow::Result<()> {
            panic!("{}", message)
        });
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_protocol::{FailureKind, Monitor, Task};

    #[test]
    fn test_builtins_registered() {
        assert_eq!(
            builtin_registry().names(),
            vec!["add", "echo", "fail", "panic", "sleep_echo"]
        );
    }

    #[test]
    fn test_sleep_echo_reports_pid() {
        let task = Task::new("sleep_echo", &(1u64, 9u64), Monitor::new("sleep")).unwrap();
        let result = builtin_registry().execute(&task);
        let (token, pid): (u64, u32) = result.decode().unwrap();
        assert_eq!(token, 9);
        assert_eq!(pid, std::process::id());
    }

    #[test]
    fn test_fail_is_a_raised_failure() {
        let task = Task::new("fail", &"bad input".to_string(), Monitor::new("fail")).unwrap();
        let result = builtin_registry().execute(&task);
        assert_eq!(result.failure().map(|f| f.kind), Some(FailureKind::Raised));
    }
}
