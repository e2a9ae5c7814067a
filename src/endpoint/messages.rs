use bytes::Bytes;
use rustc_hash::FxHashMap;

use crate::channel::{ConsumerMessage, ProducerMessage};
use crate::endpoint::endpoint_id::EndpointId;
use crate::routing::filter::SubscriptionFilter;

/// An application payload published under a hierarchical, slash-delimited
/// topic. The payload bytes are opaque to the bus.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DataMessage {
    pub topic: String,
    pub payload: Bytes,

    /// remaining hop budget; decremented on every forwarding step, dropped
    /// when it reaches 0
    pub ttl: u16,
}

/// A peer's view of the mesh, exchanged on peering establishment and on
/// filter or topology changes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Advertisement {
    pub from: EndpointId,

    /// the sender's *aggregate* subscriptions: everything it wants delivered,
    /// either for itself or for nodes it forwards to
    pub filter: SubscriptionFilter,

    /// distances (in hops, from the sender) to the endpoints the sender can
    /// reach
    pub distances: FxHashMap<EndpointId, usize>,
}

/// Everything that travels *inside* the ordered, reliable channel of a
/// peering. Data and control share the stream, so a BYE sentinel is
/// guaranteed to arrive after everything produced before it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NodeMessage {
    Data(DataMessage),
    Advertisement(Advertisement),

    /// Graceful end-of-stream announcement. The token is random so that a
    /// stale acknowledgement from a previous peering incarnation cannot be
    /// mistaken for the current one.
    Bye { token: u64 },

    /// echo of a received BYE token, telling the initiator it is safe to
    /// tear the connection down
    ByeAck { token: u64 },
}

/// One frame on the wire between two peered endpoints: either channel
/// traffic from the producing side or acknowledgements from the consuming
/// side. This is what the transport glue moves around; its encoding is the
/// transport's business.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum LinkMessage {
    Producer(ProducerMessage<NodeMessage>),
    Consumer(ConsumerMessage),
}
