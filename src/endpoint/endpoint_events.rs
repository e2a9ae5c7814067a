use std::net::SocketAddr;

use crate::endpoint::endpoint_id::EndpointId;

/// Lifecycle notifications about peerings, emitted on the endpoint's event
/// channel. The distinction between `PeerRemoved` and `PeerDisconnected`
/// encodes who ended the peering: `PeerRemoved` means this side asked for
/// the removal, `PeerDisconnected` means the link went away underneath us.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum EndpointEvent {
    PeerAdded {
        peer: EndpointId,
        addr: Option<SocketAddr>,
    },
    PeerRemoved {
        peer: EndpointId,
    },
    PeerDisconnected {
        peer: EndpointId,
    },
}
