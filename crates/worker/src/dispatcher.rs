//! Outbox dispatcher: publishes committed outbox records to the delivery channel.

use std::sync::Arc;
use std::time::Duration;

use ledgerline_core::event::PushEnvelope;
use ledgerline_core::outbox::PublishOutcome;
use ledgerline_db::repositories::{ClaimedRecord, OutboxError, OutboxRepository};
use ledgerline_shared::config::OutboxConfig;
use tokio_util::sync::CancellationToken;

use crate::publisher::EventPublisher;

/// Counters for one dispatch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Rows claimed.
    pub claimed: usize,
    /// Rows acknowledged by the channel.
    pub sent: usize,
    /// Rows scheduled for another publish attempt.
    pub retrying: usize,
    /// Rows that ran out of publish attempts.
    pub abandoned: usize,
    /// Rows whose claim was taken over before settling.
    pub stale: usize,
}

impl DispatchStats {
    fn record(&mut self, outcome: PublishOutcome) {
        match outcome {
            PublishOutcome::Sent => self.sent += 1,
            PublishOutcome::Retry { .. } => self.retrying += 1,
            PublishOutcome::Abandoned { .. } => self.abandoned += 1,
            PublishOutcome::StaleClaim => self.stale += 1,
        }
    }
}

/// Claims due outbox rows and publishes them.
pub struct OutboxDispatcher {
    outbox: OutboxRepository,
    publisher: Arc<dyn EventPublisher>,
    subscription: Option<String>,
    batch_size: u64,
    poll_interval: Duration,
}

impl OutboxDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(
        outbox: OutboxRepository,
        publisher: Arc<dyn EventPublisher>,
        subscription: Option<String>,
        config: &OutboxConfig,
    ) -> Self {
        Self {
            outbox,
            publisher,
            subscription,
            batch_size: config.batch_size,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    /// Runs until `cancel` fires. An in-flight batch always completes.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            batch_size = self.batch_size,
            poll_interval_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "Outbox dispatcher started"
        );

        while !cancel.is_cancelled() {
            match self.run_once().await {
                Ok(stats) if stats.claimed > 0 => {
                    tracing::debug!(
                        claimed = stats.claimed,
                        sent = stats.sent,
                        retrying = stats.retrying,
                        abandoned = stats.abandoned,
                        stale = stats.stale,
                        "Dispatch cycle finished"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Dispatch cycle failed"),
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        tracing::info!("Outbox dispatcher stopped");
    }

    /// Claims one batch and publishes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the claim fails. Failures settling a single row are
    /// logged and leave the row to be reclaimed after its TTL.
    pub async fn run_once(&self) -> Result<DispatchStats, OutboxError> {
        let claimed = self.outbox.claim_for_publish(self.batch_size).await?;
        let mut stats = DispatchStats {
            claimed: claimed.len(),
            ..DispatchStats::default()
        };

        for record in &claimed {
            match self.dispatch(record).await {
                Ok(outcome) => stats.record(outcome),
                Err(e) => {
                    tracing::warn!(outbox_record_id = %record.id(), error = %e, "Failed to settle publish");
                }
            }
        }
        Ok(stats)
    }

    async fn dispatch(&self, claimed: &ClaimedRecord) -> Result<PublishOutcome, OutboxError> {
        let id = claimed.id();
        let event = match claimed.event() {
            Ok(event) => event,
            Err(e) => {
                // Undecodable rows are dropped by the direct processor.
                return self
                    .outbox
                    .record_publish_failure(id, claimed.token, &format!("{}: {e}", e.error_code()))
                    .await;
            }
        };

        let envelope = PushEnvelope::wrap(&event, self.subscription.clone());
        match self.publisher.publish(&envelope).await {
            Ok(()) => {
                let outcome = self.outbox.record_published(id, claimed.token).await?;
                tracing::debug!(
                    outbox_record_id = %id,
                    tenant_id = %event.tenant_id,
                    message_id = %event.message_id,
                    "Outbox record published"
                );
                Ok(outcome)
            }
            Err(e) => {
                let outcome = self
                    .outbox
                    .record_publish_failure(id, claimed.token, &e.to_string())
                    .await?;
                match outcome {
                    PublishOutcome::Abandoned { attempts } => tracing::warn!(
                        outbox_record_id = %id,
                        attempts,
                        error = %e,
                        "Publishing abandoned, direct processor will post the record"
                    ),
                    _ => tracing::debug!(outbox_record_id = %id, error = %e, "Publish failed"),
                }
                Ok(outcome)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_count_each_outcome() {
        let mut stats = DispatchStats::default();
        stats.record(PublishOutcome::Sent);
        stats.record(PublishOutcome::Sent);
        stats.record(PublishOutcome::Abandoned { attempts: 20 });
        stats.record(PublishOutcome::StaleClaim);

        assert_eq!(stats.sent, 2);
        assert_eq!(stats.abandoned, 1);
        assert_eq!(stats.stale, 1);
        assert_eq!(stats.retrying, 0);
    }
}
