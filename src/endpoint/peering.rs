use std::collections::VecDeque;
use std::net::SocketAddr;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::channel::consumer::Consumer;
use crate::channel::producer::Producer;
use crate::channel::{ConsumerBackend, ConsumerMessage, ProducerBackend, ProducerMessage};
use crate::endpoint::endpoint_config::EndpointConfig;
use crate::endpoint::endpoint_driver::EndpointCommand;
use crate::endpoint::endpoint_events::EndpointEvent;
use crate::endpoint::endpoint_id::EndpointId;
use crate::endpoint::messages::{Advertisement, LinkMessage, NodeMessage};
use crate::error::BusError;

/// Producer backend of a peering: every channel message goes onto the
/// outbound link. The channel has exactly one consumer (the peer), so
/// unicast and broadcast coincide.
pub struct LinkOutbound {
    peer_id: EndpointId,
    tx: mpsc::UnboundedSender<LinkMessage>,
}

impl LinkOutbound {
    fn push(&mut self, msg: LinkMessage) {
        if self.tx.send(msg).is_err() {
            debug!("outbound link to {:?} is gone - dropping message", self.peer_id);
        }
    }
}

impl ProducerBackend<EndpointId, NodeMessage> for LinkOutbound {
    fn send(&mut self, _hdl: &EndpointId, msg: ProducerMessage<NodeMessage>) {
        self.push(LinkMessage::Producer(msg));
    }

    fn broadcast(&mut self, msg: ProducerMessage<NodeMessage>) {
        self.push(LinkMessage::Producer(msg));
    }
}

/// Consumer backend of a peering: acks and nacks go onto the outbound link,
/// in-order deliveries are queued for the orchestrator to drain after each
/// inbound frame. Queuing instead of calling back avoids any reference cycle
/// between peering and orchestrator.
pub struct InboundSink {
    peer_id: EndpointId,
    tx: mpsc::UnboundedSender<LinkMessage>,
    delivered: VecDeque<NodeMessage>,
    closed: Option<BusError>,
}

impl ConsumerBackend<NodeMessage> for InboundSink {
    fn consume(&mut self, payload: NodeMessage) {
        self.delivered.push_back(payload);
    }

    fn consume_gap(&mut self) -> Result<(), BusError> {
        // a permanently lost node message is tolerable: data is at-most-once
        // anyway, and advertisements are re-sent on every change
        warn!("lost a message from {:?} permanently - skipping", self.peer_id);
        Ok(())
    }

    fn send(&mut self, msg: ConsumerMessage) {
        if self.tx.send(LinkMessage::Consumer(msg)).is_err() {
            debug!("outbound link to {:?} is gone - dropping ack", self.peer_id);
        }
    }

    fn close(&mut self, err: BusError) {
        warn!("inbound channel from {:?} closed: {}", self.peer_id, err);
        self.closed = Some(err);
    }
}

/// Per-link state for one directly connected peer: the reliable channel in
/// both directions, the peer's advertised view of the mesh, and the BYE
/// bookkeeping for graceful shutdown.
///
/// Lifecycle: constructed when the orchestrator accepts a link, *active*
/// once the handshake went out, *closing* after [Peering::remove] (BYE
/// sent), terminated on BYE-ACK, BYE timeout or link loss.
pub struct Peering {
    peer_id: EndpointId,
    peer_addr: Option<SocketAddr>,

    producer: Producer<EndpointId, NodeMessage, LinkOutbound>,
    consumer: Consumer<NodeMessage, InboundSink>,

    /// the peer's aggregate subscriptions, from its latest advertisement
    advertised_filter: Option<Advertisement>,

    /// the last advertisement we sent to this peer, to suppress no-op
    /// re-advertisements
    last_sent_advertisement: Option<Advertisement>,

    /// true once we sent a BYE; the connection must stay up until the
    /// matching BYE-ACK arrives or the timeout fires
    removed: bool,

    /// the random token of our pending BYE
    bye_token: Option<u64>,

    bye_timeout: Option<JoinHandle<()>>,

    /// handle for aborting the inbound pump that feeds this peering
    in_handle: Option<AbortHandle>,
}

impl Peering {
    pub fn new(
        peer_id: EndpointId,
        peer_addr: Option<SocketAddr>,
        config: &EndpointConfig,
        out: mpsc::UnboundedSender<LinkMessage>,
        in_handle: Option<AbortHandle>,
    ) -> Peering {
        let mut producer = Producer::new(LinkOutbound {
            peer_id,
            tx: out.clone(),
        });
        producer.set_heartbeat_interval(config.heartbeat_interval_ticks);
        producer.set_send_buffer_high_water(config.send_buffer_high_water);
        producer
            .add(peer_id)
            .expect("a fresh producer cannot have this consumer yet");

        let mut consumer = Consumer::new(InboundSink {
            peer_id,
            tx: out,
            delivered: VecDeque::new(),
            closed: None,
        });
        consumer.set_nack_timeout(config.nack_timeout_ticks);

        Peering {
            peer_id,
            peer_addr,
            producer,
            consumer,
            advertised_filter: None,
            last_sent_advertisement: None,
            removed: false,
            bye_token: None,
            bye_timeout: None,
            in_handle,
        }
    }

    pub fn peer_id(&self) -> EndpointId {
        self.peer_id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn removed(&self) -> bool {
        self.removed
    }

    pub fn bye_token(&self) -> Option<u64> {
        self.bye_token
    }

    /// the peer's aggregate filter; an unadvertised peer matches nothing
    pub fn peer_filter_matches(&self, topic: &str) -> bool {
        self.advertised_filter
            .as_ref()
            .map(|adv| adv.filter.matches(topic))
            .unwrap_or(false)
    }

    pub fn peer_advertisement(&self) -> Option<&Advertisement> {
        self.advertised_filter.as_ref()
    }

    pub fn store_peer_advertisement(&mut self, adv: Advertisement) {
        self.advertised_filter = Some(adv);
    }

    /// Send `adv` to the peer unless it is identical to what the peer
    /// already got from us. Returns whether anything went out.
    pub fn advertise(&mut self, adv: Advertisement) -> bool {
        if self.last_sent_advertisement.as_ref() == Some(&adv) {
            return false;
        }
        self.producer.produce(NodeMessage::Advertisement(adv.clone()));
        self.last_sent_advertisement = Some(adv);
        true
    }

    /// enqueue a node message on the ordered outbound stream
    pub fn produce(&mut self, msg: NodeMessage) {
        self.producer.produce(msg);
    }

    /// Feed one inbound frame into the channel machinery and return the node
    /// messages that became deliverable in order because of it.
    pub fn handle_link_message(&mut self, msg: LinkMessage) -> Vec<NodeMessage> {
        match msg {
            LinkMessage::Producer(msg) => match msg {
                ProducerMessage::Handshake {
                    first_seq,
                    heartbeat_interval,
                } => self.consumer.handle_handshake(first_seq, heartbeat_interval),
                ProducerMessage::Event { seq, payload } => self.consumer.handle_event(seq, payload),
                ProducerMessage::RetransmitFailed { seq } => {
                    self.consumer.handle_retransmit_failed(seq)
                }
                ProducerMessage::Heartbeat { seq } => self.consumer.handle_heartbeat(seq),
            },
            LinkMessage::Consumer(msg) => {
                let peer_id = self.peer_id;
                match msg {
                    ConsumerMessage::CumulativeAck { seq } => self.producer.handle_ack(&peer_id, seq),
                    ConsumerMessage::Nack { seqs } => self.producer.handle_nack(&peer_id, &seqs),
                }
            }
        }
        self.consumer.backend_mut().delivered.drain(..).collect()
    }

    /// A terminal error from the inbound channel, if one occurred. The
    /// channel emits this at most once; the peering is unusable afterwards
    /// and should be torn down.
    pub fn channel_failure(&mut self) -> Option<BusError> {
        self.consumer.backend_mut().closed.take()
    }

    /// advance both channel ends by one tick
    pub fn tick(&mut self) {
        self.producer.tick();
        self.consumer.tick();
    }

    /// Tag this peering as removed and send a BYE sentinel through the
    /// ordered stream, so it arrives after everything produced before it.
    /// With `with_timeout`, a grace period is scheduled after which the
    /// connection is torn down even without a BYE-ACK.
    pub fn remove(
        &mut self,
        with_timeout: bool,
        config: &EndpointConfig,
        commands: mpsc::UnboundedSender<EndpointCommand>,
    ) {
        if self.removed {
            debug!("peering with {:?} is already being removed", self.peer_id);
            return;
        }
        self.removed = true;

        let token: u64 = rand::thread_rng().gen();
        self.bye_token = Some(token);
        self.producer.produce(NodeMessage::Bye { token });

        if with_timeout {
            let ticks = config.bye_timeout_ticks(self.consumer.heartbeat_interval());
            let grace_period = config.tick_interval * ticks;
            let peer_id = self.peer_id;
            self.bye_timeout = Some(tokio::spawn(async move {
                sleep(grace_period).await;
                let _ = commands.send(EndpointCommand::ByeTimeout { peer_id, token });
            }));
        }
    }

    /// Called for a received BYE-ACK. Returns true iff the token matches the
    /// pending BYE, i.e. the peering may now be torn down.
    pub fn on_bye_ack(&mut self, token: u64) -> bool {
        if self.removed && self.bye_token == Some(token) {
            if let Some(timeout) = self.bye_timeout.take() {
                timeout.abort();
            }
            true
        } else {
            debug!(
                "BYE-ACK with unexpected token from {:?} - ignoring",
                self.peer_id
            );
            false
        }
    }

    /// Shut the peering down without any further handshake: abort the
    /// inbound pump and cancel a pending BYE timeout. In-flight messages are
    /// discarded by virtue of nobody listening any more.
    pub fn force_disconnect(&mut self) {
        if let Some(timeout) = self.bye_timeout.take() {
            timeout.abort();
        }
        if let Some(in_handle) = self.in_handle.take() {
            in_handle.abort();
        }
    }

    /// The status to report when this peering ends: `PeerRemoved` if the
    /// local side asked for the removal, `PeerDisconnected` if the link was
    /// lost underneath us.
    pub fn status_msg(&self) -> EndpointEvent {
        if self.removed {
            EndpointEvent::PeerRemoved { peer: self.peer_id }
        } else {
            EndpointEvent::PeerDisconnected { peer: self.peer_id }
        }
    }
}
