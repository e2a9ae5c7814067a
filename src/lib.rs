//! A topic-based publish/subscribe message bus for distributed event-driven
//! applications. Endpoints exchange data messages addressed by hierarchical
//! topics over long-lived peerings, routed through a mesh of directly
//! connected nodes.
//!
//! The crate is built around two tightly coupled subsystems:
//! * [channel] - a reliable, ordered, at-most-once message channel layered on
//!   top of an unreliable and possibly reordering transport, with cumulative
//!   acknowledgements, negative acknowledgements, retransmission and
//!   heartbeats
//! * [endpoint] - the peering lifecycle and routing substrate that connects
//!   endpoints, maintains per-destination distances and performs graceful
//!   shutdown via an end-of-stream handshake
//!
//! The transport itself is *not* part of this crate: a peering produces and
//! consumes [endpoint::messages::LinkMessage] values on plain channels, and
//! whatever moves those values between processes (TCP, WebSocket, an
//! in-process queue for tests) is glue code outside the core.

pub mod channel;
pub mod endpoint;
pub mod error;
pub mod routing;
pub mod util;

#[cfg(test)]
pub(crate) mod test_util;
