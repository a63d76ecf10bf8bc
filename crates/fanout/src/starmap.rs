//! Task Submission
//!
//! `Starmap::submit` binds a private reply endpoint, stamps every task's
//! Monitor with it, pushes the tasks into the streamer and hands back a
//! `Submission` that yields exactly as many results as tasks were sent.
//!
//! Results carry no correlation id. A reply endpoint belongs to one
//! submission, so counting is enough. If a worker dies with a task in hand,
//! collection waits forever.

use fanout_protocol::{Endpoint, Monitor, Task, TaskResult};
use futures::stream::{self, Stream};
use serde::Serialize;
use tracing::{debug, info};
use zeromq::{PullSocket, PushSocket, Socket, ZmqMessage};

use crate::config::NetworkConfig;
use crate::error::Result;
use crate::transport;

/// Submits batches of tasks for one callable.
#[derive(Debug, Clone)]
pub struct Starmap {
    task_in_url: String,
    receiver: Endpoint,
}

impl Starmap {
    /// `receiver_url` is a hint for the reply endpoint: a fixed port, `0`, or
    /// a range `lo-hi`. Each submission binds its own.
    pub fn new(task_in_url: &str, receiver_url: &str) -> Result<Self> {
        Ok(Self {
            task_in_url: task_in_url.to_string(),
            receiver: receiver_url.parse()?,
        })
    }

    pub fn from_config(network: &NetworkConfig) -> Result<Self> {
        Self::new(&network.task_in_url, &network.receiver_url)
    }

    /// Send one task per `(args, monitor)` pair.
    ///
    /// Sending is complete when this returns; `Submission::expected` is final.
    pub async fn submit<A, I>(&self, callable: &str, tasks: I) -> Result<Submission>
    where
        A: Serialize,
        I: IntoIterator<Item = (A, Monitor)>,
    {
        let mut receiver = PullSocket::new();
        let backurl = transport::bind(&mut receiver, &self.receiver).await?;

        let mut sender = PushSocket::new();
        transport::connect(&mut sender, &self.task_in_url).await?;

        let mut expected = 0;
        for (args, mut monitor) in tasks {
            monitor.set_backurl(backurl.as_str())?;
            let task = Task::new(callable, &args, monitor)?;
            transport::send_queued(&mut sender, ZmqMessage::from(task.to_bytes()?)).await?;
            expected += 1;
        }
        let _ = sender.close().await;

        info!("Sent {} {} tasks, replies to {}", expected, callable, backurl);
        Ok(Submission {
            backurl,
            receiver,
            expected,
            received: 0,
        })
    }

    /// Like `submit`, with a fresh Monitor per task numbered from 0.
    pub async fn apply<A, I>(&self, callable: &str, operation: &str, args: I) -> Result<Submission>
    where
        A: Serialize,
        I: IntoIterator<Item = A>,
    {
        let tasks = args
            .into_iter()
            .enumerate()
            .map(|(task_no, args)| (args, Monitor::new(operation).with_task_no(task_no)));
        self.submit(callable, tasks).await
    }
}

/// Results of one `submit`, in arrival order.
pub struct Submission {
    backurl: String,
    receiver: PullSocket,
    expected: usize,
    received: usize,
}

impl Submission {
    /// Number of tasks sent, hence of results to wait for.
    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn received(&self) -> usize {
        self.received
    }

    /// Reply endpoint the workers push results to.
    pub fn backurl(&self) -> &str {
        &self.backurl
    }

    /// Next result, or `None` once all expected results arrived.
    pub async fn next(&mut self) -> Option<Result<TaskResult>> {
        if self.received >= self.expected {
            return None;
        }

        let result = match transport::recv_frame(&mut self.receiver, &self.backurl).await {
            Ok(frame) => TaskResult::from_bytes(&frame).map_err(Into::into),
            Err(e) => Err(e),
        };
        self.received += 1;
        debug!("Result {}/{} on {}", self.received, self.expected, self.backurl);
        Some(result)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<TaskResult>> {
        stream::unfold(self, |mut submission| async move {
            submission.next().await.map(|result| (result, submission))
        })
    }

    /// Wait for every expected result.
    pub async fn collect(mut self) -> Result<Vec<TaskResult>> {
        let mut results = Vec::with_capacity(self.expected);
        while let Some(result) = self.next().await {
            results.push(result?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::builtin_registry;
    use crate::error::Error;
    use crate::streamer::Streamer;
    use crate::worker::Worker;
    use fanout_protocol::ProtocolError;
    use futures::StreamExt;
    use tokio::sync::oneshot;

    struct Cluster {
        task_in_url: String,
        stops: Vec<oneshot::Sender<()>>,
    }

    async fn local_cluster(workers: usize) -> Cluster {
        let streamer = Streamer::bind("tcp://127.0.0.1:0", "tcp://127.0.0.1:0")
            .await
            .unwrap();
        let task_in_url = streamer.task_in_url().to_string();
        let task_out_url = streamer.task_out_url().to_string();

        let mut stops = Vec::new();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(streamer.run_until(async move {
            let _ = rx.await;
        }));
        stops.push(tx);

        for _ in 0..workers {
            let worker = Worker::connect(&task_out_url, builtin_registry()).await.unwrap();
            let (tx, rx) = oneshot::channel::<()>();
            tokio::spawn(worker.run_until(async move {
                let _ = rx.await;
            }));
            stops.push(tx);
        }

        Cluster { task_in_url, stops }
    }

    #[tokio::test]
    async fn test_apply_collects_every_result() {
        let cluster = local_cluster(2).await;
        let starmap = Starmap::new(&cluster.task_in_url, "tcp://127.0.0.1:0").unwrap();

        let pairs: Vec<(i64, i64)> = (0..5).map(|i| (i, 10 * i)).collect();
        let submission = starmap.apply("add", "sums", pairs).await.unwrap();
        assert_eq!(submission.expected(), 5);
        assert!(!submission.backurl().ends_with(":0"));

        let mut sums: Vec<i64> = submission
            .collect()
            .await
            .unwrap()
            .iter()
            .map(|r| r.decode().unwrap())
            .collect();
        sums.sort_unstable();
        assert_eq!(sums, vec![0, 11, 22, 33, 44]);

        for stop in cluster.stops {
            let _ = stop.send(());
        }
    }

    #[tokio::test]
    async fn test_two_batches_before_collecting() {
        let cluster = local_cluster(1).await;
        let starmap = Starmap::new(&cluster.task_in_url, "tcp://127.0.0.1:0").unwrap();

        let echoes = starmap
            .apply("echo", "echo", vec!["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        let failures = starmap
            .apply("fail", "fail", vec!["boom".to_string()])
            .await
            .unwrap();
        assert_ne!(echoes.backurl(), failures.backurl());

        let failed: Vec<TaskResult> = failures.into_stream().map(|r| r.unwrap()).collect().await;
        assert_eq!(failed.len(), 1);
        assert!(failed[0].is_failure());

        let mut words: Vec<String> = echoes
            .collect()
            .await
            .unwrap()
            .iter()
            .map(|r| r.decode().unwrap())
            .collect();
        words.sort();
        assert_eq!(words, vec!["a", "b"]);

        for stop in cluster.stops {
            let _ = stop.send(());
        }
    }

    #[tokio::test]
    async fn test_empty_submission_yields_nothing() {
        let cluster = local_cluster(0).await;
        let starmap = Starmap::new(&cluster.task_in_url, "tcp://127.0.0.1:0").unwrap();

        let mut submission = starmap.apply("add", "none", Vec::<(i64, i64)>::new()).await.unwrap();
        assert_eq!(submission.expected(), 0);
        assert!(submission.next().await.is_none());
    }

    #[tokio::test]
    async fn test_prebound_monitor_is_rejected() {
        let cluster = local_cluster(0).await;
        let starmap = Starmap::new(&cluster.task_in_url, "tcp://127.0.0.1:0").unwrap();

        let mut monitor = Monitor::new("add");
        monitor.set_backurl("tcp://127.0.0.1:1").unwrap();
        let err = starmap
            .submit("add", vec![((1i64, 2i64), monitor)])
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Protocol(ProtocolError::BackurlAlreadySet(_))));
    }
}
