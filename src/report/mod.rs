//! Reporting seam for aggregated statistics.
//!
//! The stats task hands each cycle's aggregate to a reporter; what sits
//! behind the seam (log pipeline, channel, an embedder's own sink) is
//! opaque to the core.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::registry::AggregateStats;

/// Sink for per-cycle aggregate statistics
#[async_trait]
pub trait StatsReporter: Send + Sync {
    async fn report(&self, stats: &AggregateStats);
}

/// Emits the human-readable stats block through the tracing pipeline
pub struct LogReporter;

#[async_trait]
impl StatsReporter for LogReporter {
    async fn report(&self, stats: &AggregateStats) {
        tracing::info!("{}", stats.render());
    }
}

/// Forwards each aggregate over a channel, for embedders and tests
pub struct ChannelReporter {
    tx: mpsc::Sender<AggregateStats>,
}

impl ChannelReporter {
    pub fn new(tx: mpsc::Sender<AggregateStats>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl StatsReporter for ChannelReporter {
    async fn report(&self, stats: &AggregateStats) {
        if self.tx.send(stats.clone()).await.is_err() {
            tracing::debug!("Stats receiver dropped, report discarded");
        }
    }
}
