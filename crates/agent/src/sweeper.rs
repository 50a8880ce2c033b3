//! Periodic maintenance tasks for a running runtime.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use agroquote_core::config::SweepConfig;

use crate::runtime::ConversationRuntime;

/// Handles to the background sweeps. Dropping this does not stop them;
/// call [`Sweepers::shutdown`].
pub struct Sweepers {
    handles: Vec<JoinHandle<()>>,
}

impl Sweepers {
    pub fn spawn(runtime: Arc<ConversationRuntime>, config: &SweepConfig) -> Self {
        let mut handles = Vec::new();

        handles.push(every(secs(config.memory_interval_secs), {
            let runtime = Arc::clone(&runtime);
            move || {
                let runtime = Arc::clone(&runtime);
                async move {
                    runtime.sweep_memory(Utc::now()).await;
                }
            }
        }));
        handles.push(every(secs(config.disk_interval_secs), {
            let runtime = Arc::clone(&runtime);
            move || {
                let runtime = Arc::clone(&runtime);
                async move {
                    runtime.sweep_disk(SystemTime::now()).await;
                }
            }
        }));
        handles.push(every(secs(config.dedup_prune_secs), {
            let runtime = Arc::clone(&runtime);
            move || {
                let runtime = Arc::clone(&runtime);
                async move {
                    runtime.prune_seen(Utc::now());
                }
            }
        }));
        handles.push(every(secs(config.history_purge_interval_secs), {
            let runtime = Arc::clone(&runtime);
            move || {
                let runtime = Arc::clone(&runtime);
                async move {
                    runtime.purge_history(Utc::now()).await;
                }
            }
        }));
        handles.push(every(secs(config.heartbeat_secs), move || {
            let runtime = Arc::clone(&runtime);
            async move {
                runtime.heartbeat(Utc::now());
            }
        }));

        debug!(event_name = "sweep.started", tasks = handles.len(), "background sweeps running");
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
        debug!(event_name = "sweep.stopped", "background sweeps stopped");
    }
}

fn secs(value: u64) -> Duration {
    Duration::from_secs(value.max(1))
}

/// Runs `task` every `period`, first after one full period.
fn every<F, Fut>(period: Duration, mut task: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            task().await;
        }
    })
}
