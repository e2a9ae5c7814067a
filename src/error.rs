use thiserror::Error;

/// The error kinds surfaced by the bus core. Everything else that can go
/// wrong on the wire (stale acks, unknown handles, late handshakes) is
/// tolerated silently as part of the protocol's idempotency rules.
#[derive(Debug, Error)]
pub enum BusError {
    /// A consumer with this handle is already attached to the producer.
    #[error("a consumer with this handle is already attached")]
    ConsumerExists,

    /// An operation referenced a peering that does not exist (any more).
    #[error("no peering with this endpoint")]
    PeerInvalid,

    /// The BYE handshake for a graceful disconnect did not complete within
    /// the configured grace period.
    #[error("graceful disconnect timed out")]
    PeerTimeout,

    /// Opaque error from a consumer backend, surfaced through
    /// [crate::channel::ConsumerBackend::consume_gap].
    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),
}
