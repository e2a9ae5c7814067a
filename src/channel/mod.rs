//! A message-driven channel for reliable and ordered transport over an
//! unreliable and possibly reordering communication layer. A channel belongs
//! to a single [producer::Producer] with any number of [consumer::Consumer]s.
//!
//! The channel does not know anything about the transport: both sides are
//! parameterized with a backend that they call into for sending messages and
//! (on the consumer side) for delivering payloads in order. All backend
//! callbacks run to completion without yielding, so a channel can live inside
//! a single task without locks.
//!
//! Reliability is consumer-driven: the producer broadcasts every event once
//! and then forgets about it as soon as all consumers have acknowledged it.
//! Consumers detect gaps from sequence numbers (helped along by periodic
//! heartbeats carrying the producer's head) and request retransmission with
//! negative acknowledgements. When the producer has already dropped a
//! requested event, it answers with `retransmit_failed`, and the consumer
//! either skips the gap or shuts down, at its backend's discretion.

pub mod consumer;
pub mod producer;

use crate::error::BusError;

/// Sequence number of an event on a channel. Assigned by the producer,
/// starting at 1; 0 is reserved as a "before the handshake" sentinel.
pub type SeqNo = u64;

/// Messages sent from the producer to its consumers.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ProducerMessage<P> {
    /// Tells a fresh consumer which sequence number to expect first, and at
    /// what cadence the producer emits heartbeats (allowing the consumer to
    /// adjust its timeouts).
    Handshake {
        first_seq: SeqNo,
        heartbeat_interval: u16,
    },

    /// Ordered payload transmission.
    Event { seq: SeqNo, payload: P },

    /// The producer can no longer retransmit the event with this sequence
    /// number; the consumer has to deal with the gap.
    RetransmitFailed { seq: SeqNo },

    /// Liveness beacon carrying the producer's current head. Lets consumers
    /// learn about events they are missing even when the producer is
    /// otherwise idle.
    Heartbeat { seq: SeqNo },
}

/// Messages sent from a consumer to the producer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ConsumerMessage {
    /// "I have delivered everything up to and including `seq`." Also doubles
    /// as a periodic keepalive.
    CumulativeAck { seq: SeqNo },

    /// Sorted list of sequence numbers the consumer is missing. The special
    /// value `[0]` asks the producer to resend the handshake.
    Nack { seqs: Vec<SeqNo> },
}

/// The producer's view of the communication layer.
pub trait ProducerBackend<H, P> {
    /// unicast a message to a single consumer
    fn send(&mut self, hdl: &H, msg: ProducerMessage<P>);

    /// multicast a message to every known consumer
    fn broadcast(&mut self, msg: ProducerMessage<P>);
}

/// The consumer's view of the communication layer and of the application it
/// delivers to.
pub trait ConsumerBackend<P> {
    /// Deliver the next in-order payload. Must not fail.
    fn consume(&mut self, payload: P);

    /// Called in place of [ConsumerBackend::consume] when a sequence slot is
    /// known to be permanently lost. Returning an error aborts the consumer:
    /// it immediately calls [ConsumerBackend::close] with that error and
    /// stops processing.
    fn consume_gap(&mut self) -> Result<(), BusError>;

    /// send a message to the producer
    fn send(&mut self, msg: ConsumerMessage);

    /// Terminate this consumer. After this call, no further calls into the
    /// backend are made.
    fn close(&mut self, err: BusError);
}
