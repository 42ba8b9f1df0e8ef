use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::time::Duration;

use crate::client::Client;
use crate::config::StatsConfig;
use crate::registry::{AggregateStats, SessionRegistry};
use crate::report::StatsReporter;

/// Background task computing registry-wide bandwidth statistics.
///
/// Each cycle snapshots the registry, samples every client with the cycle
/// length as the interval, publishes the totals into the registry's
/// current-stats cell, and emits a report. The loop runs until the
/// shutdown channel fires; cancellation is cooperative, so an in-flight
/// cycle completes before the task stops.
pub struct StatsAggregator {
    config: StatsConfig,
    registry: Arc<SessionRegistry>,
    reporter: Arc<dyn StatsReporter>,
    shutdown: broadcast::Receiver<()>,
}

impl StatsAggregator {
    pub fn new(
        config: StatsConfig,
        registry: Arc<SessionRegistry>,
        reporter: Arc<dyn StatsReporter>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            registry,
            reporter,
            shutdown,
        }
    }

    /// Run the aggregation loop until shutdown
    pub async fn run(mut self) {
        let cycle = Duration::from_secs(self.config.cycle_interval);
        let mut timer = tokio::time::interval(cycle);

        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(
            cycle_interval_secs = self.config.cycle_interval,
            sample_batch_size = self.config.sample_batch_size,
            "Stats aggregator started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Stats aggregator received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    self.aggregate_cycle().await;
                }
            }
        }

        tracing::info!("Stats aggregator stopped");
    }

    /// One aggregation pass over the whole registry
    async fn aggregate_cycle(&self) {
        let start = Instant::now();
        let snapshot = self.registry.snapshot().await;

        // A registry that has never seen a session produces no report;
        // the interval timer still paces the next pass either way.
        if snapshot.is_empty() && !self.config.report_empty_cycles {
            return;
        }

        let clients: Vec<Arc<dyn Client>> = snapshot
            .iter()
            .flat_map(|session| session.clients.iter().cloned())
            .collect();
        let total_clients = clients.len();

        let interval_secs = self.config.cycle_interval;
        let mut total_recv_kbps: u64 = 0;
        let mut total_send_kbps: u64 = 0;
        let mut failed = 0usize;

        // Sample in bounded batches so one cycle cannot flood the clients
        for batch in clients.chunks(self.config.sample_batch_size.max(1)) {
            let samples = join_all(batch.iter().map(|client| {
                let client = client.clone();
                async move {
                    let sample = client.bandwidth(interval_secs).await;
                    (client, sample)
                }
            }))
            .await;

            for (client, sample) in samples {
                match sample {
                    Ok(bw) => {
                        total_recv_kbps = total_recv_kbps.saturating_add(bw.recv_kbps);
                        total_send_kbps = total_send_kbps.saturating_add(bw.send_kbps);
                    }
                    Err(e) => {
                        failed += 1;
                        tracing::warn!(
                            session_id = %client.session_id(),
                            client_id = %client.client_id(),
                            error = %e,
                            "Bandwidth sample failed, skipping client"
                        );
                    }
                }
            }
        }

        let stats = AggregateStats {
            clients: total_clients,
            total_recv_kbps,
            total_send_kbps,
            computed_at: Some(Utc::now()),
        };

        self.registry.publish_stats(&stats);
        self.reporter.report(&stats).await;

        tracing::debug!(
            clients = total_clients,
            failed = failed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Aggregation cycle completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Bandwidth, ClientError};
    use crate::report::ChannelReporter;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct FixedClient {
        sid: String,
        cid: String,
        bw: Bandwidth,
        fail_sampling: bool,
    }

    impl FixedClient {
        fn new(sid: &str, cid: &str, recv: u64, send: u64) -> Arc<Self> {
            Arc::new(Self {
                sid: sid.to_string(),
                cid: cid.to_string(),
                bw: Bandwidth::new(recv, send),
                fail_sampling: false,
            })
        }

        fn failing(sid: &str, cid: &str) -> Arc<Self> {
            Arc::new(Self {
                sid: sid.to_string(),
                cid: cid.to_string(),
                bw: Bandwidth::default(),
                fail_sampling: true,
            })
        }
    }

    #[async_trait]
    impl Client for FixedClient {
        fn session_id(&self) -> &str {
            &self.sid
        }

        fn client_id(&self) -> &str {
            &self.cid
        }

        async fn bandwidth(
            &self,
            _interval_secs: u64,
        ) -> std::result::Result<Bandwidth, ClientError> {
            if self.fail_sampling {
                Err(ClientError::SampleFailed("probe disconnected".into()))
            } else {
                Ok(self.bw)
            }
        }

        async fn close(&self) -> std::result::Result<(), ClientError> {
            Ok(())
        }
    }

    fn test_config(cycle_interval: u64) -> StatsConfig {
        StatsConfig {
            cycle_interval,
            report_empty_cycles: false,
            sample_batch_size: 256,
        }
    }

    #[tokio::test]
    async fn test_aggregator_shutdown() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, _rx) = mpsc::channel(4);
        let reporter = Arc::new(ChannelReporter::new(tx));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = StatsAggregator::new(test_config(30), registry, reporter, shutdown_rx);

        let handle = tokio::spawn(async move {
            task.run().await;
        });

        // Wait a bit then send shutdown
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        // Task should complete
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_aggregation_totals() {
        let registry = Arc::new(SessionRegistry::new());
        registry
            .add_client(FixedClient::new("room-a", "c1", 10, 5))
            .await
            .unwrap();
        registry
            .add_client(FixedClient::new("room-a", "c2", 20, 15))
            .await
            .unwrap();
        registry
            .add_client(FixedClient::new("room-b", "c3", 0, 0))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let reporter = Arc::new(ChannelReporter::new(tx));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = StatsAggregator::new(test_config(1), registry.clone(), reporter, shutdown_rx);
        let handle = tokio::spawn(async move {
            task.run().await;
        });

        let stats = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("Should receive a report")
            .expect("Channel should not be closed");

        assert_eq!(stats.clients, 3);
        assert_eq!(stats.total_recv_kbps, 30);
        assert_eq!(stats.total_send_kbps, 20);
        assert!(stats.computed_at.is_some());

        // The cycle's totals were published into the registry accessor
        let current = registry.current_stats();
        assert_eq!(current.clients, 3);
        assert_eq!(current.total_recv_kbps, 30);
        assert_eq!(current.total_send_kbps, 20);

        shutdown_tx.send(()).unwrap();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_failed_sample_is_isolated() {
        let registry = Arc::new(SessionRegistry::new());
        registry
            .add_client(FixedClient::new("room-a", "c1", 12, 7))
            .await
            .unwrap();
        registry
            .add_client(FixedClient::failing("room-a", "c2"))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let reporter = Arc::new(ChannelReporter::new(tx));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = StatsAggregator::new(test_config(1), registry, reporter, shutdown_rx);
        let handle = tokio::spawn(async move {
            task.run().await;
        });

        let stats = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("Should receive a report")
            .expect("Channel should not be closed");

        // The failing client is counted but contributes no bandwidth
        assert_eq!(stats.clients, 2);
        assert_eq!(stats.total_recv_kbps, 12);
        assert_eq!(stats.total_send_kbps, 7);

        shutdown_tx.send(()).unwrap();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_empty_registry_reports_nothing() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, mut rx) = mpsc::channel(4);
        let reporter = Arc::new(ChannelReporter::new(tx));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = StatsAggregator::new(test_config(1), registry, reporter, shutdown_rx);
        let handle = tokio::spawn(async move {
            task.run().await;
        });

        // Two cycles' worth of silence
        let report = tokio::time::timeout(Duration::from_millis(2500), rx.recv()).await;
        assert!(report.is_err(), "empty registry must not report");

        shutdown_tx.send(()).unwrap();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_empty_registry_zero_report_when_configured() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, mut rx) = mpsc::channel(4);
        let reporter = Arc::new(ChannelReporter::new(tx));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let config = StatsConfig {
            cycle_interval: 1,
            report_empty_cycles: true,
            sample_batch_size: 256,
        };
        let task = StatsAggregator::new(config, registry, reporter, shutdown_rx);
        let handle = tokio::spawn(async move {
            task.run().await;
        });

        let stats = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("Should receive a zero report")
            .expect("Channel should not be closed");

        assert_eq!(stats.clients, 0);
        assert_eq!(stats.total_recv_kbps, 0);
        assert_eq!(stats.total_send_kbps, 0);

        shutdown_tx.send(()).unwrap();
        let _ = handle.await;
    }
}
