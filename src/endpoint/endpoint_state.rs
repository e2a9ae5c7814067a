use std::net::SocketAddr;

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, trace, warn};

use crate::endpoint::endpoint_config::EndpointConfig;
use crate::endpoint::endpoint_driver::EndpointCommand;
use crate::endpoint::endpoint_events::EndpointEvent;
use crate::endpoint::endpoint_id::EndpointId;
use crate::endpoint::messages::{Advertisement, DataMessage, LinkMessage, NodeMessage};
use crate::endpoint::peering::Peering;
use crate::error::BusError;
use crate::routing::filter::SubscriptionFilter;
use crate::routing::routing_table::RoutingTable;

struct LocalSubscriber {
    filter: SubscriptionFilter,
    sink: mpsc::UnboundedSender<DataMessage>,
}

/// The heart of an endpoint: owns all peerings, the routing table, the local
/// filter and the local subscriber sinks, and decides for every data message
/// where it goes - local sinks, other peerings, or nowhere.
///
/// All of this state belongs to a single task ([super::endpoint_driver::run_endpoint])
/// and is mutated without locks; every mutation enters through
/// [EndpointState::on_command].
pub struct EndpointState {
    id: EndpointId,
    config: EndpointConfig,

    peerings: FxHashMap<EndpointId, Peering>,
    routing: RoutingTable,

    local_filter: SubscriptionFilter,
    subscribers: Vec<LocalSubscriber>,

    events: mpsc::UnboundedSender<EndpointEvent>,

    /// handle to this endpoint's own mailbox, for scheduling BYE timeouts
    commands: mpsc::UnboundedSender<EndpointCommand>,

    /// set when filters or topology changed; advertisements are rebuilt and
    /// sent on the next tick rather than per change
    advertisements_dirty: bool,
}

impl EndpointState {
    pub fn new(
        id: EndpointId,
        config: EndpointConfig,
        events: mpsc::UnboundedSender<EndpointEvent>,
        commands: mpsc::UnboundedSender<EndpointCommand>,
    ) -> EndpointState {
        EndpointState {
            id,
            config,
            peerings: FxHashMap::default(),
            routing: RoutingTable::new(id),
            local_filter: SubscriptionFilter::new(),
            subscribers: Vec::new(),
            events,
            commands,
            advertisements_dirty: false,
        }
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn has_peering(&self, peer_id: EndpointId) -> bool {
        self.peerings.contains_key(&peer_id)
    }

    pub fn on_command(&mut self, cmd: EndpointCommand) {
        match cmd {
            EndpointCommand::Publish { topic, payload } => {
                let msg = DataMessage {
                    topic,
                    payload,
                    ttl: self.config.initial_ttl,
                };
                self.dispatch_data(None, msg);
            }
            EndpointCommand::Subscribe { prefixes, sink } => self.subscribe(prefixes, sink),
            EndpointCommand::AddFilter { prefix } => {
                if self.local_filter.add(prefix) {
                    self.advertisements_dirty = true;
                }
            }
            EndpointCommand::InitPeering {
                peer_id,
                peer_addr,
                out,
                in_handle,
            } => self.init_peering(peer_id, peer_addr, out, in_handle),
            EndpointCommand::RemovePeering {
                peer_id,
                with_timeout,
            } => self.remove_peering(peer_id, with_timeout),
            EndpointCommand::LinkInbound { peer_id, msg } => self.on_link_inbound(peer_id, msg),
            EndpointCommand::LinkClosed { peer_id } => self.on_link_closed(peer_id),
            EndpointCommand::ByeTimeout { peer_id, token } => self.on_bye_timeout(peer_id, token),
            EndpointCommand::Tick => self.on_tick(),
        }
    }

    fn subscribe(&mut self, prefixes: Vec<String>, sink: mpsc::UnboundedSender<DataMessage>) {
        let filter = SubscriptionFilter::from_prefixes(prefixes);
        if self.local_filter.merge(&filter) {
            self.advertisements_dirty = true;
        }
        self.subscribers.push(LocalSubscriber { filter, sink });
    }

    fn init_peering(
        &mut self,
        peer_id: EndpointId,
        peer_addr: Option<SocketAddr>,
        out: mpsc::UnboundedSender<LinkMessage>,
        in_handle: Option<AbortHandle>,
    ) {
        if peer_id == self.id {
            warn!("refusing to peer {:?} with itself", self.id);
            return;
        }
        if self.peerings.contains_key(&peer_id) {
            warn!("already peered with {:?} - ignoring duplicate init", peer_id);
            return;
        }

        info!("{:?}: new peering with {:?}", self.id, peer_id);
        self.routing.insert(peer_id, peer_id, 1);

        let mut peering = Peering::new(peer_id, peer_addr, &self.config, out, in_handle);
        // the peer gets our current view right away; everyone else learns
        // about the new link on the next tick
        peering.advertise(self.build_advertisement_for(peer_id));
        self.peerings.insert(peer_id, peering);
        self.advertisements_dirty = true;

        self.send_event(EndpointEvent::PeerAdded {
            peer: peer_id,
            addr: peer_addr,
        });
    }

    fn remove_peering(&mut self, peer_id: EndpointId, with_timeout: bool) {
        let Some(peering) = self.peerings.get_mut(&peer_id) else {
            warn!("cannot remove peering with {:?}: {}", peer_id, BusError::PeerInvalid);
            return;
        };
        info!("{:?}: removing peering with {:?}", self.id, peer_id);
        peering.remove(with_timeout, &self.config, self.commands.clone());
    }

    fn on_link_inbound(&mut self, peer_id: EndpointId, msg: LinkMessage) {
        let Some(peering) = self.peerings.get_mut(&peer_id) else {
            debug!("link frame from unknown peer {:?} - dropping", peer_id);
            return;
        };
        let delivered = peering.handle_link_message(msg);
        let failure = peering.channel_failure();
        for node_msg in delivered {
            self.on_node_message(peer_id, node_msg);
        }
        if let Some(err) = failure {
            warn!("{:?}: channel from {:?} failed: {}", self.id, peer_id, err);
            self.finish_peering(peer_id);
        }
    }

    fn on_node_message(&mut self, from: EndpointId, msg: NodeMessage) {
        match msg {
            NodeMessage::Data(mut data) => {
                data.ttl = data.ttl.saturating_sub(1);
                if data.ttl == 0 {
                    trace!("hop budget of {:?} exhausted - dropping", data.topic);
                    return;
                }
                self.dispatch_data(Some(from), data);
            }
            NodeMessage::Advertisement(adv) => self.on_advertisement(from, adv),
            NodeMessage::Bye { token } => {
                debug!("{:?}: BYE from {:?}", self.id, from);
                if let Some(peering) = self.peerings.get_mut(&from) {
                    peering.produce(NodeMessage::ByeAck { token });
                }
            }
            NodeMessage::ByeAck { token } => {
                let Some(peering) = self.peerings.get_mut(&from) else {
                    return;
                };
                if peering.on_bye_ack(token) {
                    self.finish_peering(from);
                }
            }
        }
    }

    fn on_advertisement(&mut self, from: EndpointId, adv: Advertisement) {
        let Some(peering) = self.peerings.get_mut(&from) else {
            debug!("advertisement from unknown peer {:?} - dropping", from);
            return;
        };
        trace!("{:?}: advertisement from {:?}: {:?}", self.id, from, adv);
        self.routing.apply_advertisement(from, &adv.distances);
        peering.store_peer_advertisement(adv);
        // our own aggregate towards everyone else may have changed
        self.advertisements_dirty = true;
    }

    /// Deliver a data message to matching local subscribers and forward it to
    /// peerings that want it, never back to where it came from. A peering
    /// wants a message if its advertised aggregate filter matches and the
    /// direct link is (one of) the shortest paths to that peer.
    fn dispatch_data(&mut self, ingress: Option<EndpointId>, msg: DataMessage) {
        self.subscribers.retain(|sub| {
            if !sub.filter.matches(&msg.topic) {
                return true;
            }
            // a closed sink means the subscriber is gone
            sub.sink.send(msg.clone()).is_ok()
        });

        let routing = &self.routing;
        for (&peer_id, peering) in self.peerings.iter_mut() {
            if Some(peer_id) == ingress || peering.removed() {
                continue;
            }
            if !peering.peer_filter_matches(&msg.topic) {
                continue;
            }
            if !routing.next_hops_for(peer_id).any(|hop| hop == peer_id) {
                continue;
            }
            trace!("forwarding {:?} to {:?}", msg.topic, peer_id);
            peering.produce(NodeMessage::Data(msg.clone()));
        }
    }

    fn on_link_closed(&mut self, peer_id: EndpointId) {
        if self.peerings.contains_key(&peer_id) {
            info!("{:?}: link to {:?} is gone", self.id, peer_id);
            self.finish_peering(peer_id);
        }
    }

    fn on_bye_timeout(&mut self, peer_id: EndpointId, token: u64) {
        let Some(peering) = self.peerings.get(&peer_id) else {
            return;
        };
        if peering.removed() && peering.bye_token() == Some(token) {
            warn!(
                "{:?}: peering with {:?}: {}",
                self.id,
                peer_id,
                BusError::PeerTimeout
            );
            self.finish_peering(peer_id);
        } else {
            debug!("stale BYE timeout for {:?} - ignoring", peer_id);
        }
    }

    /// Final teardown of a peering, graceful or not: abort its inbound pump,
    /// drop its routes, notify listeners, and let everyone else know the
    /// topology changed.
    fn finish_peering(&mut self, peer_id: EndpointId) {
        let Some(mut peering) = self.peerings.remove(&peer_id) else {
            return;
        };
        let event = peering.status_msg();
        peering.force_disconnect();
        self.routing.remove_next_hop(peer_id);
        self.advertisements_dirty = true;
        self.send_event(event);
    }

    fn on_tick(&mut self) {
        for peering in self.peerings.values_mut() {
            peering.tick();
        }

        if self.advertisements_dirty {
            self.advertisements_dirty = false;
            let peer_ids: Vec<_> = self.peerings.keys().copied().collect();
            for peer_id in peer_ids {
                let adv = self.build_advertisement_for(peer_id);
                let peering = self
                    .peerings
                    .get_mut(&peer_id)
                    .expect("peer ids were just collected");
                if !peering.removed() {
                    peering.advertise(adv);
                }
            }
        }
    }

    /// The advertisement for one specific peer: our own filter plus
    /// everything the *other* peers asked us to forward, and our distances
    /// over routes that do not run through the recipient (split horizon).
    fn build_advertisement_for(&self, target: EndpointId) -> Advertisement {
        let mut filter = self.local_filter.clone();
        for (&peer_id, peering) in &self.peerings {
            if peer_id == target || peering.removed() {
                continue;
            }
            if let Some(adv) = peering.peer_advertisement() {
                filter.merge(&adv.filter);
            }
        }

        let mut distances = FxHashMap::default();
        for dst in self.routing.reachable() {
            if dst == target {
                continue;
            }
            if let Some(distance) = self.routing.distance_to_excluding(dst, target) {
                distances.insert(dst, distance);
            }
        }

        Advertisement {
            from: self.id,
            filter,
            distances,
        }
    }

    fn send_event(&self, event: EndpointEvent) {
        if self.events.send(event).is_err() {
            error!("nobody listens to endpoint events any more");
        }
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::channel::ProducerMessage;
    use crate::test_util::test_endpoint_id;

    /// one endpoint state plus all the channel ends a test needs to poke it
    struct TestNode {
        state: EndpointState,
        events: mpsc::UnboundedReceiver<EndpointEvent>,
        commands_rx: mpsc::UnboundedReceiver<EndpointCommand>,
        /// outbound link frames per peer, readable by the test
        links: Vec<(EndpointId, mpsc::UnboundedReceiver<LinkMessage>)>,
    }

    impl TestNode {
        fn new(n: u8) -> TestNode {
            TestNode::with_config(n, EndpointConfig::new())
        }

        fn with_config(n: u8, config: EndpointConfig) -> TestNode {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let (commands_tx, commands_rx) = mpsc::unbounded_channel();
            TestNode {
                state: EndpointState::new(test_endpoint_id(n), config, events_tx, commands_tx),
                events: events_rx,
                commands_rx,
                links: Vec::new(),
            }
        }

        fn peer_with(&mut self, peer: EndpointId) {
            let (tx, rx) = mpsc::unbounded_channel();
            self.state.on_command(EndpointCommand::InitPeering {
                peer_id: peer,
                peer_addr: None,
                out: tx,
                in_handle: None,
            });
            self.links.push((peer, rx));
        }

        fn outbound_for(&mut self, peer: EndpointId) -> Vec<LinkMessage> {
            let (_, rx) = self
                .links
                .iter_mut()
                .find(|(id, _)| *id == peer)
                .expect("no link to this peer");
            let mut result = Vec::new();
            while let Ok(msg) = rx.try_recv() {
                result.push(msg);
            }
            result
        }

        fn next_event(&mut self) -> Option<EndpointEvent> {
            self.events.try_recv().ok()
        }
    }

    /// shuttle link frames between two nodes until both are quiescent
    fn pump(a: &mut TestNode, b: &mut TestNode) {
        loop {
            let a_id = a.state.id();
            let b_id = b.state.id();
            let a_to_b = a.outbound_for(b_id);
            let b_to_a = b.outbound_for(a_id);
            if a_to_b.is_empty() && b_to_a.is_empty() {
                return;
            }
            for msg in a_to_b {
                b.state
                    .on_command(EndpointCommand::LinkInbound { peer_id: a_id, msg });
            }
            for msg in b_to_a {
                a.state
                    .on_command(EndpointCommand::LinkInbound { peer_id: b_id, msg });
            }
        }
    }

    fn connect(a: &mut TestNode, b: &mut TestNode) {
        let a_id = a.state.id();
        let b_id = b.state.id();
        a.peer_with(b_id);
        b.peer_with(a_id);
        pump(a, b);
    }

    fn subscribe(node: &mut TestNode, prefixes: &[&str]) -> mpsc::UnboundedReceiver<DataMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        node.state.on_command(EndpointCommand::Subscribe {
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
            sink: tx,
        });
        rx
    }

    fn publish(node: &mut TestNode, topic: &str, payload: &'static str) {
        node.state.on_command(EndpointCommand::Publish {
            topic: topic.to_string(),
            payload: Bytes::from_static(payload.as_bytes()),
        });
    }

    fn received(rx: &mut mpsc::UnboundedReceiver<DataMessage>) -> Vec<(String, Bytes)> {
        let mut result = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            result.push((msg.topic, msg.payload));
        }
        result
    }

    /// advertisement dampening: changes propagate on the next tick
    fn settle(a: &mut TestNode, b: &mut TestNode) {
        for _ in 0..2 {
            a.state.on_command(EndpointCommand::Tick);
            b.state.on_command(EndpointCommand::Tick);
            pump(a, b);
        }
    }

    #[tokio::test]
    async fn test_direct_peers_have_symmetric_distance_one() {
        let mut a = TestNode::new(1);
        let mut b = TestNode::new(2);
        connect(&mut a, &mut b);

        assert_eq!(a.state.routing().distance_to(test_endpoint_id(2)), Some(1));
        assert_eq!(b.state.routing().distance_to(test_endpoint_id(1)), Some(1));
        assert_eq!(a.state.routing().distance_to(test_endpoint_id(1)), Some(0));
    }

    #[tokio::test]
    async fn test_init_peering_emits_peer_added_and_handshake() {
        let mut a = TestNode::new(1);
        a.peer_with(test_endpoint_id(2));

        assert_eq!(
            a.next_event(),
            Some(EndpointEvent::PeerAdded {
                peer: test_endpoint_id(2),
                addr: None
            })
        );
        let out = a.outbound_for(test_endpoint_id(2));
        assert!(matches!(
            out[0],
            LinkMessage::Producer(ProducerMessage::Handshake { first_seq: 0, .. })
        ));
        // followed by the initial advertisement
        assert!(matches!(
            out[1],
            LinkMessage::Producer(ProducerMessage::Event { seq: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_init_peering_is_ignored() {
        let mut a = TestNode::new(1);
        a.peer_with(test_endpoint_id(2));
        let _ = a.next_event();
        a.peer_with(test_endpoint_id(2));
        assert_eq!(a.next_event(), None);
    }

    #[tokio::test]
    async fn test_local_publish_reaches_local_subscribers() {
        let mut a = TestNode::new(1);
        let mut rx = subscribe(&mut a, &["zeek/events"]);

        publish(&mut a, "zeek/events/http", "req");
        publish(&mut a, "other", "nope");

        assert_eq!(
            received(&mut rx),
            vec![("zeek/events/http".to_string(), Bytes::from_static(b"req"))]
        );
    }

    #[tokio::test]
    async fn test_publish_forwards_to_subscribed_peer_in_order() {
        let mut a = TestNode::new(1);
        let mut b = TestNode::new(2);
        connect(&mut a, &mut b);

        let mut rx = subscribe(&mut b, &["t"]);
        settle(&mut a, &mut b);

        publish(&mut a, "t/1", "x");
        publish(&mut a, "t/2", "y");
        pump(&mut a, &mut b);

        assert_eq!(
            received(&mut rx)
                .iter()
                .map(|(t, _)| t.as_str())
                .collect::<Vec<_>>(),
            vec!["t/1", "t/2"]
        );
    }

    #[tokio::test]
    async fn test_publish_is_not_forwarded_without_matching_filter() {
        let mut a = TestNode::new(1);
        let mut b = TestNode::new(2);
        connect(&mut a, &mut b);

        let mut rx = subscribe(&mut b, &["t"]);
        settle(&mut a, &mut b);

        publish(&mut a, "u/1", "x");
        pump(&mut a, &mut b);
        assert!(received(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_chain_forwards_through_non_subscribing_middle_node() {
        let mut a = TestNode::new(1);
        let mut b = TestNode::new(2);
        let mut c = TestNode::new(3);
        connect(&mut a, &mut b);
        connect(&mut b, &mut c);

        let mut rx = subscribe(&mut c, &["t"]);
        // let the filter and routing changes ripple a -> b -> c and back
        for _ in 0..3 {
            settle(&mut b, &mut c);
            settle(&mut a, &mut b);
        }

        assert_eq!(a.state.routing().distance_to(test_endpoint_id(3)), Some(2));
        assert_eq!(c.state.routing().distance_to(test_endpoint_id(1)), Some(2));

        publish(&mut a, "t/x", "payload");
        pump(&mut a, &mut b);
        pump(&mut b, &mut c);

        assert_eq!(
            received(&mut rx),
            vec![("t/x".to_string(), Bytes::from_static(b"payload"))]
        );
    }

    #[tokio::test]
    async fn test_ttl_limits_the_hop_count() {
        let mut config = EndpointConfig::new();
        config.initial_ttl = 2;

        let mut a = TestNode::with_config(1, config);
        let mut b = TestNode::new(2);
        let mut c = TestNode::new(3);
        connect(&mut a, &mut b);
        connect(&mut b, &mut c);

        let mut rx_b = subscribe(&mut b, &["t"]);
        let mut rx_c = subscribe(&mut c, &["t"]);
        for _ in 0..3 {
            settle(&mut b, &mut c);
            settle(&mut a, &mut b);
        }

        publish(&mut a, "t/x", "payload");
        pump(&mut a, &mut b);
        pump(&mut b, &mut c);

        // two hops of budget reach b (ttl 2 -> 1), but die on the way to c
        assert_eq!(received(&mut rx_b).len(), 1);
        assert!(received(&mut rx_c).is_empty());
    }

    #[tokio::test]
    async fn test_no_echo_back_on_the_ingress_peering() {
        let mut a = TestNode::new(1);
        let mut b = TestNode::new(2);
        connect(&mut a, &mut b);

        // both sides subscribe the same topic
        let mut rx_a = subscribe(&mut a, &["t"]);
        let mut rx_b = subscribe(&mut b, &["t"]);
        settle(&mut a, &mut b);

        publish(&mut a, "t/x", "payload");
        pump(&mut a, &mut b);

        // exactly one copy on either side - no reflection
        assert_eq!(received(&mut rx_a).len(), 1);
        assert_eq!(received(&mut rx_b).len(), 1);
    }

    #[tokio::test]
    async fn test_graceful_removal_with_bye_ack() {
        let mut a = TestNode::new(1);
        let mut b = TestNode::new(2);
        connect(&mut a, &mut b);
        let _ = a.next_event();
        let _ = b.next_event();

        a.state.on_command(EndpointCommand::RemovePeering {
            peer_id: test_endpoint_id(2),
            with_timeout: false,
        });
        pump(&mut a, &mut b);

        assert_eq!(
            a.next_event(),
            Some(EndpointEvent::PeerRemoved {
                peer: test_endpoint_id(2)
            })
        );
        assert!(!a.state.has_peering(test_endpoint_id(2)));
        assert_eq!(a.state.routing().distance_to(test_endpoint_id(2)), None);

        // the peer keeps its side until the transport reports the link loss
        assert!(b.state.has_peering(test_endpoint_id(1)));
        b.state.on_command(EndpointCommand::LinkClosed {
            peer_id: test_endpoint_id(1),
        });
        assert_eq!(
            b.next_event(),
            Some(EndpointEvent::PeerDisconnected {
                peer: test_endpoint_id(1)
            })
        );
        assert!(!b.state.has_peering(test_endpoint_id(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bye_timeout_force_disconnects_and_reports_removed() {
        let mut a = TestNode::new(1);
        a.peer_with(test_endpoint_id(2));
        let _ = a.next_event();

        a.state.on_command(EndpointCommand::RemovePeering {
            peer_id: test_endpoint_id(2),
            with_timeout: true,
        });

        // nobody acks; the scheduled timeout arrives on the mailbox
        let cmd = a.commands_rx.recv().await.unwrap();
        assert!(matches!(cmd, EndpointCommand::ByeTimeout { .. }));
        a.state.on_command(cmd);

        assert_eq!(
            a.next_event(),
            Some(EndpointEvent::PeerRemoved {
                peer: test_endpoint_id(2)
            })
        );
        assert!(!a.state.has_peering(test_endpoint_id(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_bye_timeout_is_ignored() {
        let mut a = TestNode::new(1);
        a.peer_with(test_endpoint_id(2));

        a.state.on_command(EndpointCommand::RemovePeering {
            peer_id: test_endpoint_id(2),
            with_timeout: true,
        });
        a.state.on_command(EndpointCommand::ByeTimeout {
            peer_id: test_endpoint_id(2),
            token: 12345,
        });
        assert!(a.state.has_peering(test_endpoint_id(2)));
    }

    #[tokio::test]
    async fn test_remove_unknown_peering_is_tolerated() {
        let mut a = TestNode::new(1);
        a.state.on_command(EndpointCommand::RemovePeering {
            peer_id: test_endpoint_id(9),
            with_timeout: true,
        });
        assert_eq!(a.next_event(), None);
    }

    #[tokio::test]
    async fn test_removed_peering_gets_no_more_data() {
        let mut a = TestNode::new(1);
        let mut b = TestNode::new(2);
        connect(&mut a, &mut b);
        let _ = subscribe(&mut b, &["t"]);
        settle(&mut a, &mut b);

        a.state.on_command(EndpointCommand::RemovePeering {
            peer_id: test_endpoint_id(2),
            with_timeout: false,
        });
        let _ = a.outbound_for(test_endpoint_id(2));

        publish(&mut a, "t/x", "payload");
        let out = a.outbound_for(test_endpoint_id(2));
        assert!(
            out.iter().all(|m| !matches!(
                m,
                LinkMessage::Producer(ProducerMessage::Event {
                    payload: NodeMessage::Data(_),
                    ..
                })
            )),
            "data leaked to a closing peering: {:?}",
            out
        );
    }

    #[tokio::test]
    async fn test_peer_disappearing_purges_its_routes() {
        let mut a = TestNode::new(1);
        let mut b = TestNode::new(2);
        let mut c = TestNode::new(3);
        connect(&mut a, &mut b);
        connect(&mut b, &mut c);
        for _ in 0..3 {
            settle(&mut b, &mut c);
            settle(&mut a, &mut b);
        }
        assert_eq!(a.state.routing().distance_to(test_endpoint_id(3)), Some(2));

        a.state.on_command(EndpointCommand::LinkClosed {
            peer_id: test_endpoint_id(2),
        });
        assert_eq!(a.state.routing().distance_to(test_endpoint_id(3)), None);
        assert_eq!(a.state.routing().distance_to(test_endpoint_id(2)), None);
    }
}
