use common::domain::{DomainError, DomainResult};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, warn};

type LaneJob = BoxFuture<'static, ()>;
type LaneTable = Arc<Mutex<HashMap<String, Lane>>>;

struct Lane {
    id: u64,
    sender: mpsc::UnboundedSender<LaneJob>,
}

/// Serializes work per site while letting different sites run in parallel.
///
/// Each site gets a lane: a FIFO queue drained by a single worker task.
/// Lanes are created on first use and retire themselves once they have
/// been idle for `idle_timeout`.
///
/// Every queued task is spawned as its own tokio task and awaited by the
/// lane worker. A task therefore runs to completion even if its caller
/// stops waiting, and a panicking task does not take the lane down with it.
pub struct SiteSequencer {
    lanes: LaneTable,
    idle_timeout: Duration,
    next_lane_id: AtomicU64,
}

impl SiteSequencer {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            lanes: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout,
            next_lane_id: AtomicU64::new(0),
        }
    }

    /// Build a task with `make_task` at the moment of admission and run it
    /// on the lane of `site_code` after every task admitted before it.
    ///
    /// `make_task` is called while the lane table is locked, so anything it
    /// captures (such as a receipt timestamp) is ordered consistently with
    /// the lane. Dropping the returned future after admission only discards
    /// the result; the task still runs.
    pub async fn enqueue<F, Fut, T>(&self, site_code: &str, make_task: F) -> DomainResult<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = DomainResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();

        {
            let mut lanes = self.lanes.lock().await;
            let task = make_task();
            let job: LaneJob = Box::pin(async move {
                let result = task.await;
                // Receiver is gone when the caller timed out
                let _ = result_tx.send(result);
            });
            self.admit(&mut lanes, site_code, job);
        }

        match result_rx.await {
            Ok(result) => result,
            Err(_) => Err(DomainError::LaneTaskAborted(site_code.to_string())),
        }
    }

    /// Number of lanes currently alive
    pub async fn active_lanes(&self) -> usize {
        self.lanes.lock().await.len()
    }

    fn admit(&self, lanes: &mut HashMap<String, Lane>, site_code: &str, job: LaneJob) {
        let job = match lanes.get(site_code) {
            Some(lane) => match lane.sender.send(job) {
                Ok(()) => return,
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let lane = self.spawn_lane(site_code);
        if lane.sender.send(job).is_err() {
            error!(site_code = %site_code, "new lane closed before accepting its first task");
        }
        lanes.insert(site_code.to_string(), lane);
    }

    fn spawn_lane(&self, site_code: &str) -> Lane {
        let id = self.next_lane_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();

        debug!(site_code = %site_code, lane_id = id, "opening lane");
        tokio::spawn(run_lane(
            site_code.to_string(),
            id,
            receiver,
            self.lanes.clone(),
            self.idle_timeout,
        ));

        Lane { id, sender }
    }
}

async fn run_lane(
    site_code: String,
    lane_id: u64,
    mut receiver: mpsc::UnboundedReceiver<LaneJob>,
    lanes: LaneTable,
    idle_timeout: Duration,
) {
    loop {
        let job = match tokio::time::timeout(idle_timeout, receiver.recv()).await {
            Ok(Some(job)) => job,
            Ok(None) => break,
            Err(_) => {
                // Holding the table lock means nothing can be admitted while
                // the lane decides whether to retire.
                let mut table = lanes.lock().await;
                match receiver.try_recv() {
                    Ok(job) => job,
                    Err(_) => {
                        if table.get(&site_code).is_some_and(|lane| lane.id == lane_id) {
                            table.remove(&site_code);
                        }
                        debug!(site_code = %site_code, lane_id, "retiring idle lane");
                        break;
                    }
                }
            }
        };

        if let Err(join_err) = tokio::spawn(job).await {
            warn!(
                site_code = %site_code,
                lane_id,
                error = %join_err,
                "lane task aborted"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn explode() -> DomainResult<()> {
        panic!("decoder exploded")
    }

    #[tokio::test]
    async fn test_enqueue_returns_task_result() {
        let sequencer = SiteSequencer::new(Duration::from_secs(60));

        let value = sequencer.enqueue("S01", || async { Ok(42) }).await.unwrap();

        assert_eq!(value, 42);
        assert_eq!(sequencer.active_lanes().await, 1);
    }

    #[tokio::test]
    async fn test_task_error_is_returned_to_caller() {
        let sequencer = SiteSequencer::new(Duration::from_secs(60));

        let result: DomainResult<()> = sequencer
            .enqueue("S01", || async {
                Err(DomainError::StorageConstraintViolation("23503".to_string()))
            })
            .await;

        assert!(matches!(
            result,
            Err(DomainError::StorageConstraintViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_same_site_tasks_run_in_admission_order() {
        let sequencer = Arc::new(SiteSequencer::new(Duration::from_secs(60)));
        let order = Arc::new(StdMutex::new(Vec::new()));

        // First task sleeps so a parallel run would finish out of order
        let mut handles = Vec::new();
        for i in 0..5u64 {
            let order = order.clone();
            let delay = Duration::from_millis(50 - i * 10);
            handles.push(sequencer.enqueue("S01", move || async move {
                tokio::time::sleep(delay).await;
                order.lock().unwrap().push(i);
                Ok(i)
            }));
        }
        let results = futures::future::join_all(handles).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_sites_do_not_block_each_other() {
        let sequencer = Arc::new(SiteSequencer::new(Duration::from_secs(60)));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let blocked = {
            let sequencer = sequencer.clone();
            tokio::spawn(async move {
                sequencer
                    .enqueue("S01", move || async move {
                        let _ = release_rx.await;
                        Ok("S01")
                    })
                    .await
            })
        };

        let other = tokio::time::timeout(
            Duration::from_secs(1),
            sequencer.enqueue("S02", || async { Ok("S02") }),
        )
        .await;

        assert_eq!(other.unwrap().unwrap(), "S02");

        release_tx.send(()).unwrap();
        assert_eq!(blocked.await.unwrap().unwrap(), "S01");
    }

    #[tokio::test]
    async fn test_task_survives_caller_timeout() {
        let sequencer = SiteSequencer::new(Duration::from_secs(60));
        let (done_tx, done_rx) = oneshot::channel();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            sequencer.enqueue("S01", move || async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                let _ = done_tx.send(());
                Ok(())
            }),
        )
        .await;

        assert!(timed_out.is_err());
        tokio::time::timeout(Duration::from_secs(1), done_rx)
            .await
            .expect("task should keep running after the caller gave up")
            .unwrap();
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_kill_lane() {
        let sequencer = SiteSequencer::new(Duration::from_secs(60));

        let result: DomainResult<()> = sequencer
            .enqueue("S01", || async { explode() })
            .await;
        assert!(matches!(result, Err(DomainError::LaneTaskAborted(code)) if code == "S01"));

        let after = sequencer.enqueue("S01", || async { Ok(7) }).await;
        assert_eq!(after.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_idle_lane_retires_and_reopens() {
        let sequencer = SiteSequencer::new(Duration::from_millis(20));

        sequencer.enqueue("S01", || async { Ok(()) }).await.unwrap();
        assert_eq!(sequencer.active_lanes().await, 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(sequencer.active_lanes().await, 0);

        let value = sequencer.enqueue("S01", || async { Ok(1) }).await.unwrap();
        assert_eq!(value, 1);
        assert_eq!(sequencer.active_lanes().await, 1);
    }
}
