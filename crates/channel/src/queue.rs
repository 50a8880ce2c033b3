//! Per-recipient serialized dispatch.
//!
//! Each recipient gets its own lane: a worker task draining an unbounded
//! channel in order, pausing after every send. Lanes run independently, so a
//! slow or failing recipient never holds up another. A lane that stays idle
//! retires itself and is recreated on the next enqueue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use agroquote_core::dialogue::outbound::OutboundMessage;

use crate::adapter::{ChannelAdapter, ChannelError};

const LANE_IDLE: Duration = Duration::from_secs(60);

struct Job {
    message: OutboundMessage,
    settled: oneshot::Sender<Result<(), ChannelError>>,
}

type Lanes = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Job>>>>;

/// Outcome of one queued message.
pub struct Delivery {
    settled: oneshot::Receiver<Result<(), ChannelError>>,
}

impl Delivery {
    /// Waits until the message was handed to the channel or failed.
    pub async fn settled(self) -> Result<(), ChannelError> {
        self.settled.await.unwrap_or(Err(ChannelError::QueueClosed))
    }
}

#[derive(Clone)]
pub struct SendQueue {
    channel: Arc<dyn ChannelAdapter>,
    pause: Duration,
    lanes: Lanes,
}

impl SendQueue {
    pub fn new(channel: Arc<dyn ChannelAdapter>, pause: Duration) -> Self {
        Self { channel, pause, lanes: Arc::default() }
    }

    pub fn channel(&self) -> &Arc<dyn ChannelAdapter> {
        &self.channel
    }

    /// Appends `message` to the recipient's lane. The returned handle may be
    /// dropped; the message is still sent.
    pub async fn enqueue(&self, to: &str, message: OutboundMessage) -> Delivery {
        let (settled_tx, settled_rx) = oneshot::channel();
        let mut job = Job { message, settled: settled_tx };

        let mut lanes = self.lanes.lock().await;
        if let Some(lane) = lanes.get(to) {
            match lane.send(job) {
                Ok(()) => return Delivery { settled: settled_rx },
                Err(mpsc::error::SendError(returned)) => job = returned,
            }
        }

        let (lane, jobs) = mpsc::unbounded_channel();
        if lane.send(job).is_err() {
            return Delivery { settled: settled_rx };
        }
        lanes.insert(to.to_string(), lane.clone());
        drop(lanes);

        tokio::spawn(run_lane(
            to.to_string(),
            jobs,
            lane,
            Arc::clone(&self.channel),
            Arc::clone(&self.lanes),
            self.pause,
        ));
        Delivery { settled: settled_rx }
    }

    /// Enqueues every message in order and waits for the last one.
    pub async fn enqueue_all(&self, to: &str, messages: Vec<OutboundMessage>) -> Vec<Result<(), ChannelError>> {
        let mut deliveries = Vec::with_capacity(messages.len());
        for message in messages {
            deliveries.push(self.enqueue(to, message).await);
        }
        let mut results = Vec::with_capacity(deliveries.len());
        for delivery in deliveries {
            results.push(delivery.settled().await);
        }
        results
    }

    pub async fn active_lanes(&self) -> usize {
        self.lanes.lock().await.len()
    }
}

async fn run_lane(
    to: String,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    own: mpsc::UnboundedSender<Job>,
    channel: Arc<dyn ChannelAdapter>,
    lanes: Lanes,
    pause: Duration,
) {
    loop {
        let job = match tokio::time::timeout(LANE_IDLE, jobs.recv()).await {
            Ok(Some(job)) => job,
            Ok(None) => break,
            Err(_) => {
                // Enqueue sends under the registry lock, so an empty lane here
                // stays empty once removed.
                let mut registry = lanes.lock().await;
                match jobs.try_recv() {
                    Ok(job) => {
                        drop(registry);
                        job
                    }
                    Err(_) => {
                        if registry.get(&to).is_some_and(|lane| lane.same_channel(&own)) {
                            registry.remove(&to);
                        }
                        debug!(event_name = "egress.lane_retired", conversation_id = %to, "send lane idle");
                        return;
                    }
                }
            }
        };
        deliver(&to, job, channel.as_ref(), pause).await;
    }
}

async fn deliver(to: &str, job: Job, channel: &dyn ChannelAdapter, pause: Duration) {
    let result = channel.send(to, &job.message).await;
    if let Err(error) = &result {
        warn!(
            event_name = "egress.send_failed",
            conversation_id = %to,
            channel = channel.name(),
            error = %error,
            "message not delivered; continuing with the queue"
        );
    }
    let _ = job.settled.send(result);
    tokio::time::sleep(pause).await;
}
