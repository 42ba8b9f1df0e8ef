//! The client collaborator contract.
//!
//! A `Client` is an externally-owned connection handle. The registry only
//! ever holds shared references to it for lookup, enumeration, and removal;
//! its bandwidth accounting and resource teardown are opaque capabilities
//! called into through this trait.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// One bandwidth sample for a client over an elapsed interval, in KB/s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Bandwidth {
    pub recv_kbps: u64,
    pub send_kbps: u64,
}

impl Bandwidth {
    pub fn new(recv_kbps: u64, send_kbps: u64) -> Self {
        Self {
            recv_kbps,
            send_kbps,
        }
    }
}

/// Error surfaced by a client capability call
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Bandwidth sample failed: {0}")]
    SampleFailed(String),

    #[error("Close failed: {0}")]
    CloseFailed(String),
}

/// A live connection tracked by the registry.
///
/// A client belongs to exactly one session and is unique within that
/// session by its client id. Both capabilities may block or fail; the
/// registry and the stats task never invoke them while holding the
/// registry lock, and a failure in one client never affects another.
#[async_trait]
pub trait Client: Send + Sync {
    /// Session this client belongs to
    fn session_id(&self) -> &str;

    /// Identity of this client within its session
    fn client_id(&self) -> &str;

    /// Sample received/sent bandwidth over the last `interval_secs` seconds
    async fn bandwidth(&self, interval_secs: u64) -> Result<Bandwidth, ClientError>;

    /// Release the connection's resources. Intended to be idempotent; the
    /// registry calls it at most once per tracked entry.
    async fn close(&self) -> Result<(), ClientError>;
}
