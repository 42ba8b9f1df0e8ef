//! Aggregate and registry-shape statistics structures

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Registry-wide bandwidth aggregate for one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    pub clients: usize,
    pub total_recv_kbps: u64,
    pub total_send_kbps: u64,
    /// When the aggregation pass finished; None until the first cycle has
    /// been published
    pub computed_at: Option<DateTime<Utc>>,
}

impl AggregateStats {
    pub fn zero() -> Self {
        Self {
            clients: 0,
            total_recv_kbps: 0,
            total_send_kbps: 0,
            computed_at: None,
        }
    }

    /// Human-readable stats block emitted on the reporting channel
    pub fn render(&self) -> String {
        let mut info = String::from("\n-------stats-------\n");
        info.push_str(&format!("Clients: {}\n", self.clients));
        info.push_str(&format!("RecvBandWidth: {} KB/s\n", self.total_recv_kbps));
        info.push_str(&format!("SendBandWidth: {} KB/s\n", self.total_send_kbps));
        info
    }
}

/// Point-in-time shape of the registry
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_clients: usize,
    pub total_sessions: usize,
    pub sessions: HashMap<String, usize>,
}

/// Lock-free cell holding the last published aggregate.
///
/// Timestamps are stored as Unix seconds in an AtomicI64 so readers never
/// touch the registry lock; 0 means nothing has been published yet.
pub(crate) struct PublishedStats {
    clients: AtomicUsize,
    total_recv_kbps: AtomicU64,
    total_send_kbps: AtomicU64,
    computed_at: AtomicI64,
}

impl PublishedStats {
    pub(crate) fn new() -> Self {
        Self {
            clients: AtomicUsize::new(0),
            total_recv_kbps: AtomicU64::new(0),
            total_send_kbps: AtomicU64::new(0),
            computed_at: AtomicI64::new(0),
        }
    }

    pub(crate) fn publish(&self, stats: &AggregateStats) {
        self.clients.store(stats.clients, Ordering::Relaxed);
        self.total_recv_kbps
            .store(stats.total_recv_kbps, Ordering::Relaxed);
        self.total_send_kbps
            .store(stats.total_send_kbps, Ordering::Relaxed);
        let ts = stats
            .computed_at
            .map(|t| t.timestamp())
            .unwrap_or_else(|| Utc::now().timestamp());
        self.computed_at.store(ts, Ordering::Relaxed);
    }

    pub(crate) fn load(&self) -> AggregateStats {
        let ts = self.computed_at.load(Ordering::Relaxed);
        AggregateStats {
            clients: self.clients.load(Ordering::Relaxed),
            total_recv_kbps: self.total_recv_kbps.load(Ordering::Relaxed),
            total_send_kbps: self.total_send_kbps.load(Ordering::Relaxed),
            computed_at: (ts != 0).then(|| DateTime::from_timestamp(ts, 0)).flatten(),
        }
    }
}
