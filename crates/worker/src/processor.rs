//! Direct/backup processor: posts outbox records without waiting for the channel.
//!
//! Guarantees every committed record is eventually posted or DEAD, even when
//! publishing is abandoned or the channel never delivers.

use std::time::Duration;

use ledgerline_db::{OutboxError, PostingService, Settlement};
use ledgerline_shared::config::ProcessorConfig;
use tokio_util::sync::CancellationToken;

/// Counters for one processing cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    /// Rows claimed.
    pub claimed: usize,
    /// Rows posted or found already posted.
    pub succeeded: usize,
    /// Rows dropped (malformed or rejected by the posting gate).
    pub dropped: usize,
    /// Rows scheduled for retry.
    pub retrying: usize,
    /// Rows that became DEAD.
    pub dead: usize,
    /// Rows whose claim was taken over, or that were already terminal.
    pub skipped: usize,
    /// Earlier DEAD rows whose compensation request was accepted on retry.
    pub compensated: usize,
}

impl ProcessStats {
    fn record(&mut self, settlement: Settlement) {
        match settlement {
            Settlement::Succeeded => self.succeeded += 1,
            Settlement::Dropped => self.dropped += 1,
            Settlement::Retrying { .. } => self.retrying += 1,
            Settlement::Dead { .. } => self.dead += 1,
            Settlement::AlreadyTerminal | Settlement::StaleClaim => self.skipped += 1,
        }
    }
}

/// Claims unprocessed outbox rows and posts them.
pub struct DirectProcessor {
    service: PostingService,
    batch_size: u64,
    claim_ttl: Duration,
    poll_interval: Duration,
}

impl DirectProcessor {
    /// Creates a processor.
    #[must_use]
    pub fn new(service: PostingService, config: &ProcessorConfig) -> Self {
        Self {
            service,
            batch_size: config.batch_size,
            claim_ttl: Duration::from_secs(config.claim_ttl_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    /// Runs until `cancel` fires. An in-flight batch always completes.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(batch_size = self.batch_size, "Direct processor started");

        while !cancel.is_cancelled() {
            match self.run_once().await {
                Ok(stats) if stats.claimed > 0 || stats.compensated > 0 => {
                    tracing::info!(
                        claimed = stats.claimed,
                        succeeded = stats.succeeded,
                        dropped = stats.dropped,
                        retrying = stats.retrying,
                        dead = stats.dead,
                        skipped = stats.skipped,
                        compensated = stats.compensated,
                        "Processing cycle finished"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Processing cycle failed"),
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        tracing::info!("Direct processor stopped");
    }

    /// Claims one batch and posts it, then retries compensation requests
    /// that were not accepted when their record turned DEAD.
    ///
    /// # Errors
    ///
    /// Returns an error if the claim fails. A row that cannot be settled is
    /// logged and reclaimed after its TTL.
    pub async fn run_once(&self) -> Result<ProcessStats, OutboxError> {
        let claimed = self
            .service
            .outbox()
            .claim_for_processing(self.batch_size, self.claim_ttl)
            .await?;
        let mut stats = ProcessStats {
            claimed: claimed.len(),
            ..ProcessStats::default()
        };

        for record in &claimed {
            match self.service.process_claimed(record).await {
                Ok(settlement) => stats.record(settlement),
                Err(e) => {
                    tracing::warn!(outbox_record_id = %record.id(), error = %e, "Failed to settle outbox record");
                }
            }
        }

        match self.service.retry_pending_compensations(self.batch_size).await {
            Ok(accepted) => stats.compensated = accepted,
            Err(e) => tracing::warn!(error = %e, "Failed to retry pending compensations"),
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Settlement::Succeeded, ProcessStats { succeeded: 1, ..ProcessStats::default() })]
    #[case(Settlement::Dropped, ProcessStats { dropped: 1, ..ProcessStats::default() })]
    #[case(Settlement::Retrying { attempt: 2 }, ProcessStats { retrying: 1, ..ProcessStats::default() })]
    #[case(Settlement::Dead { attempts: 10 }, ProcessStats { dead: 1, ..ProcessStats::default() })]
    #[case(Settlement::StaleClaim, ProcessStats { skipped: 1, ..ProcessStats::default() })]
    #[case(Settlement::AlreadyTerminal, ProcessStats { skipped: 1, ..ProcessStats::default() })]
    fn test_stats_record(#[case] settlement: Settlement, #[case] expected: ProcessStats) {
        let mut stats = ProcessStats::default();
        stats.record(settlement);
        assert_eq!(stats, expected);
    }
}
