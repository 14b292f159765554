//! In-process fan-out of job events to subscribers.
//!
//! One topic per job id, no replay buffer. Delivery is fire-and-forget per
//! subscriber: a slow or gone consumer never affects the pipeline or other
//! subscribers. Subscribers that miss everything fall back to the status
//! read path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use kyoku_models::{JobEvent, JobId};

/// Identifies one subscriber connection.
pub type SubscriberId = u64;

/// Buffered events per subscriber before updates are dropped.
const SUBSCRIBER_BUFFER_SIZE: usize = 32;

/// Per-job pub/sub table.
///
/// A connection holds at most one subscription target; re-subscribing
/// replaces the prior target. Dropping the receiver (disconnect) removes the
/// subscription lazily on the next publish; a terminal event removes every
/// subscription on its topic.
#[derive(Debug, Default)]
pub struct ProgressBroadcast {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<SubscriberId, (JobId, mpsc::Sender<JobEvent>)>>,
}

impl ProgressBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an identifier for a new connection.
    pub fn connection_id(&self) -> SubscriberId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Subscribe `connection` to `job_id`, replacing any prior target.
    pub async fn subscribe(
        &self,
        connection: SubscriberId,
        job_id: &JobId,
    ) -> mpsc::Receiver<JobEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER_SIZE);
        self.subscribers
            .write()
            .await
            .insert(connection, (job_id.clone(), tx));
        debug!(connection, job_id = %job_id, "Subscribed to job events");
        rx
    }

    /// Remove a connection's subscription, if any.
    pub async fn unsubscribe(&self, connection: SubscriberId) {
        self.subscribers.write().await.remove(&connection);
    }

    /// Deliver `event` to every connection subscribed to `job_id`.
    ///
    /// A terminal event ends the topic: the job's subscriptions are removed
    /// after delivery, so even a receiver whose buffer was full when the
    /// event was published observes the channel closing once it drains and
    /// can fall back to the job record for the outcome.
    pub async fn publish(&self, job_id: &JobId, event: JobEvent) {
        let terminal = event.is_terminal();
        let mut gone = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            for (connection, (target, tx)) in subscribers.iter() {
                if target != job_id {
                    continue;
                }
                match tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        // Intermediate updates are droppable; a dropped
                        // terminal event is recovered through the channel
                        // close below.
                        debug!(connection, "Subscriber buffer full, dropping event");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => gone.push(*connection),
                }
            }
        }
        if terminal || !gone.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            if terminal {
                subscribers.retain(|_, (target, _)| target != job_id);
            } else {
                for connection in gone {
                    subscribers.remove(&connection);
                }
            }
        }
    }

    /// Publish a log line.
    pub async fn log(&self, job_id: &JobId, message: impl Into<String>) {
        self.publish(job_id, JobEvent::log(message)).await;
    }

    /// Publish a progress update.
    pub async fn progress(&self, job_id: &JobId, value: u8, message: impl Into<String>) {
        self.publish(job_id, JobEvent::progress(value, message)).await;
    }

    /// Publish completion with the output reference.
    pub async fn done(&self, job_id: &JobId, output: impl Into<String>) {
        self.publish(job_id, JobEvent::done(job_id.as_str(), output)).await;
    }

    /// Publish a failure/cancellation message.
    pub async fn error(&self, job_id: &JobId, message: impl Into<String>) {
        self.publish(job_id, JobEvent::error(message)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_matching_subscribers_only() {
        let broadcast = ProgressBroadcast::new();
        let job_a = JobId::from_string("a");
        let job_b = JobId::from_string("b");

        let mut rx_a = broadcast.subscribe(broadcast.connection_id(), &job_a).await;
        let mut rx_b = broadcast.subscribe(broadcast.connection_id(), &job_b).await;

        broadcast.progress(&job_a, 10, "frames 0-9").await;

        let event = rx_a.try_recv().unwrap();
        assert!(matches!(event, JobEvent::Progress { value: 10, .. }));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_target() {
        let broadcast = ProgressBroadcast::new();
        let job_a = JobId::from_string("a");
        let job_b = JobId::from_string("b");
        let connection = broadcast.connection_id();

        let mut rx_old = broadcast.subscribe(connection, &job_a).await;
        let mut rx_new = broadcast.subscribe(connection, &job_b).await;

        broadcast.log(&job_a, "for a").await;
        broadcast.log(&job_b, "for b").await;

        assert!(rx_old.try_recv().is_err());
        assert!(matches!(rx_new.try_recv().unwrap(), JobEvent::Log { .. }));
    }

    #[tokio::test]
    async fn test_closed_subscriber_does_not_affect_others() {
        let broadcast = ProgressBroadcast::new();
        let job = JobId::from_string("a");

        let rx_gone = broadcast.subscribe(broadcast.connection_id(), &job).await;
        let mut rx_live = broadcast.subscribe(broadcast.connection_id(), &job).await;
        drop(rx_gone);

        broadcast.done(&job, "/outputs/a.mp4").await;
        assert!(matches!(rx_live.try_recv().unwrap(), JobEvent::Done { .. }));
    }

    #[tokio::test]
    async fn test_terminal_publish_closes_topic_when_buffer_full() {
        let broadcast = ProgressBroadcast::new();
        let job = JobId::from_string("a");
        let mut rx = broadcast.subscribe(broadcast.connection_id(), &job).await;

        // Overflow the subscriber buffer, then finish the job.
        for i in 0..40 {
            broadcast.progress(&job, i, "frames").await;
        }
        broadcast.done(&job, "/outputs/a.mp4").await;

        // The terminal event itself was dropped, but draining the backlog
        // must end with a closed channel so the consumer falls back to the
        // job record instead of waiting forever.
        let mut drained = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(!event.is_terminal());
            drained += 1;
        }
        assert_eq!(drained, SUBSCRIBER_BUFFER_SIZE);
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_terminal_publish_ends_subscription() {
        let broadcast = ProgressBroadcast::new();
        let job = JobId::from_string("a");
        let mut rx = broadcast.subscribe(broadcast.connection_id(), &job).await;

        broadcast.done(&job, "/outputs/a.mp4").await;
        assert!(rx.try_recv().unwrap().is_terminal());
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_explicit_unsubscribe() {
        let broadcast = ProgressBroadcast::new();
        let job = JobId::from_string("a");
        let connection = broadcast.connection_id();

        let mut rx = broadcast.subscribe(connection, &job).await;
        broadcast.unsubscribe(connection).await;
        broadcast.log(&job, "after unsubscribe").await;

        assert!(rx.try_recv().is_err());
    }
}
