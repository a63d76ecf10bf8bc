//! Process Manager Module
//!
//! Lifecycle of one worker process: spawn, forward its output into the pool
//! log, signal, reap.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// A worker process owned by the pool for its whole lifetime.
pub struct WorkerHandle {
    worker_id: String,
    pid: u32,
    /// `None` once reaped
    child: Option<Child>,
    output: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawn `program` with `args`, forwarding its stdout/stderr lines to the log.
    pub fn spawn(worker_id: &str, program: &Path, args: &[String]) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            program: program.display().to_string(),
            source,
        })?;
        let pid = child.id();

        let mut output = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            output.push(forward_lines(worker_id.to_string(), stdout, false));
        }
        if let Some(stderr) = child.stderr.take() {
            output.push(forward_lines(worker_id.to_string(), stderr, true));
        }

        info!("Spawned {} (pid {})", worker_id, pid);
        Ok(Self {
            worker_id: worker_id.to_string(),
            pid,
            child: Some(child),
            output,
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Deliver `sig` to the worker. A worker that already exited is not an error.
    pub fn signal(&self, sig: Signal) -> Result<()> {
        if self.child.is_none() {
            return Ok(());
        }
        match signal::kill(Pid::from_raw(self.pid as i32), sig) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(source) => Err(Error::Signal {
                pid: self.pid,
                source,
            }),
        }
    }

    /// Block until the worker exits and its output has been drained.
    pub fn wait(&mut self) -> Result<Option<ExitStatus>> {
        let status = match self.child.take() {
            Some(mut child) => Some(child.wait()?),
            None => None,
        };
        for handle in self.output.drain(..) {
            let _ = handle.join();
        }
        Ok(status)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // Never leave an unreaped worker behind.
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn forward_lines<R: Read + Send + 'static>(worker_id: String, stream: R, stderr: bool) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for line in BufReader::new(stream).lines().map_while(|line| line.ok()) {
            if stderr {
                warn!("[{}] {}", worker_id, line);
            } else {
                info!("[{}] {}", worker_id, line);
            }
        }
    })
}

/// Locate `name` next to the running executable.
///
/// Test harnesses run binaries from `target/<profile>/deps`, so the parent
/// directory is tried as well.
pub fn sibling_executable(name: &str) -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let mut dir = exe.parent();

    while let Some(candidate_dir) = dir {
        let candidate = candidate_dir.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if candidate_dir.file_name().map_or(true, |n| n != "deps") {
            break;
        }
        dir = candidate_dir.parent();
    }

    Err(Error::Config(format!(
        "cannot find {} next to {}",
        name,
        exe.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_wait_and_signal_after_exit() {
        let mut handle = WorkerHandle::spawn(
            "worker-0",
            Path::new("sh"),
            &["-c".to_string(), "echo ready; exit 3".to_string()],
        )
        .unwrap();
        assert_eq!(handle.worker_id(), "worker-0");
        assert!(handle.pid() > 0);

        let status = handle.wait().unwrap().unwrap();
        assert_eq!(status.code(), Some(3));

        // reaped workers are not signalled again
        assert!(handle.signal(Signal::SIGINT).is_ok());
        assert!(handle.wait().unwrap().is_none());
    }

    #[test]
    fn test_sigterm_terminates() {
        let mut handle =
            WorkerHandle::spawn("worker-1", Path::new("sleep"), &["30".to_string()]).unwrap();
        handle.signal(Signal::SIGTERM).unwrap();

        let status = handle.wait().unwrap().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_spawn_missing_program() {
        let err = WorkerHandle::spawn("worker-2", Path::new("/nonexistent/fanout-worker"), &[])
            .err()
            .unwrap();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[test]
    fn test_missing_sibling() {
        assert!(sibling_executable("no-such-fanout-binary").is_err());
    }
}
