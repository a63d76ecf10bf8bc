//! End-to-end tests against real `fanout-pool` / `fanout-worker` processes.

use std::collections::HashSet;
use std::time::Duration;

use fanout::{Error, HostState, Starmap, Streamer, WorkerMaster};
use fanout_protocol::{FailureKind, HostSpec};
use tokio::sync::oneshot;

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// In-process streamer plus a master for one local host.
struct Cluster {
    master: WorkerMaster,
    starmap: Starmap,
    stop_streamer: Option<oneshot::Sender<()>>,
}

impl Cluster {
    async fn new(cores: i64) -> Self {
        let streamer = Streamer::bind("tcp://127.0.0.1:0", "tcp://127.0.0.1:0")
            .await
            .unwrap();
        let starmap = Starmap::new(streamer.task_in_url(), "tcp://127.0.0.1:0").unwrap();
        let master = WorkerMaster::new(
            streamer.task_out_url(),
            free_port(),
            vec![HostSpec::new("127.0.0.1", cores)],
        )
        .with_pool_program(env!("CARGO_BIN_EXE_fanout-pool"));

        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(streamer.run_until(async move {
            let _ = rx.await;
        }));

        Self {
            master,
            starmap,
            stop_streamer: Some(tx),
        }
    }

    async fn state(&self) -> HostState {
        self.master.status(None).await.unwrap()[0].1
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_streamer.take() {
            let _ = tx.send(());
        }
        // a failed assertion must not leave a pool behind
        if std::thread::panicking() {
            let master = self.master.clone();
            let _ = std::thread::spawn(move || {
                if let Ok(runtime) = tokio::runtime::Runtime::new() {
                    let _ = runtime.block_on(master.kill());
                }
            })
            .join();
        }
    }
}

#[tokio::test]
async fn test_start_submit_stop() {
    let cluster = Cluster::new(2).await;
    assert_eq!(cluster.state().await, HostState::NotRunning);

    let started = cluster.master.start().await.unwrap();
    assert_eq!(started.len(), 1);
    assert_eq!(cluster.state().await, HostState::Running);

    let pairs: Vec<(i64, i64)> = vec![(1, 2), (3, 4), (5, 6), (7, 8), (9, 10)];
    let submission = cluster.starmap.apply("add", "sums", pairs).await.unwrap();
    assert_eq!(submission.expected(), 5);

    let results = submission.collect().await.unwrap();
    assert_eq!(results.len(), 5);
    let mut sums: Vec<i64> = results.iter().map(|r| r.decode().unwrap()).collect();
    sums.sort_unstable();
    assert_eq!(sums, vec![3, 7, 11, 15, 19]);

    let ctrl_url = cluster.master.ctrl_url("127.0.0.1");
    assert_eq!(
        cluster.master.stop().await.unwrap(),
        vec![format!("WorkerPool {} stopped", ctrl_url)]
    );
    assert_eq!(cluster.state().await, HostState::NotRunning);
    assert!(matches!(
        cluster.master.getpid("127.0.0.1").await,
        Err(Error::NotRunning(_))
    ));

    assert_eq!(cluster.master.stop().await.unwrap(), vec!["127.0.0.1 not running"]);
}

#[tokio::test]
async fn test_stop_lets_running_task_finish() {
    let cluster = Cluster::new(1).await;
    cluster.master.start().await.unwrap();

    // the worker is connected and serving once this comes back
    let warmup = cluster
        .starmap
        .apply("add", "warmup", vec![(1i64, 1i64)])
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(warmup[0].decode::<i64>().unwrap(), 2);

    let submission = cluster
        .starmap
        .apply("sleep_echo", "slow", vec![(800u64, 7u64)])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(
        cluster.master.stop().await.unwrap(),
        vec![format!("WorkerPool {} stopped", cluster.master.ctrl_url("127.0.0.1"))]
    );

    let results = tokio::time::timeout(Duration::from_secs(10), submission.collect())
        .await
        .expect("in-flight result was not delivered")
        .unwrap();
    let (token, _pid): (u64, u32) = results[0].decode().unwrap();
    assert_eq!(token, 7);
    assert_eq!(cluster.state().await, HostState::NotRunning);
}

#[tokio::test]
async fn test_start_twice_launches_once() {
    let cluster = Cluster::new(1).await;

    cluster.master.start().await.unwrap();
    let pid = cluster.master.getpid("127.0.0.1").await.unwrap();

    assert_eq!(
        cluster.master.start().await.unwrap(),
        vec!["127.0.0.1 already running"]
    );
    assert_eq!(cluster.master.getpid("127.0.0.1").await.unwrap(), pid);
    assert_ne!(pid, std::process::id());

    cluster.master.kill().await.unwrap();
    assert_eq!(cluster.state().await, HostState::NotRunning);
}

#[tokio::test]
async fn test_worker_recovers_from_failed_task() {
    let cluster = Cluster::new(1).await;
    cluster.master.start().await.unwrap();

    let failed = cluster
        .starmap
        .apply("fail", "fail", vec!["corrupt input".to_string()])
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    let failure = failed[0].failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Raised);
    assert_eq!(failure.message, "corrupt input");

    let ok = cluster
        .starmap
        .apply("add", "add", vec![(20i64, 22i64)])
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(ok[0].decode::<i64>().unwrap(), 42);
    assert_eq!(ok[0].worker_pid, failed[0].worker_pid);

    cluster.master.stop().await.unwrap();
}

#[tokio::test]
async fn test_more_tasks_than_workers() {
    let cluster = Cluster::new(2).await;
    cluster.master.start().await.unwrap();

    let tasks: Vec<(u64, u64)> = (0..8).map(|token| (50, token)).collect();
    let results = cluster
        .starmap
        .apply("sleep_echo", "sleep", tasks)
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    let mut tokens = Vec::new();
    let mut pids = HashSet::new();
    for result in &results {
        let (token, pid): (u64, u32) = result.decode().unwrap();
        tokens.push(token);
        pids.insert(pid);
    }
    tokens.sort_unstable();
    assert_eq!(tokens, (0..8).collect::<Vec<u64>>());
    assert!(pids.len() <= 2);
    assert!(!pids.contains(&std::process::id()));

    cluster.master.stop().await.unwrap();
    assert_eq!(cluster.state().await, HostState::NotRunning);
}
