use std::net::SocketAddr;

use anyhow::anyhow;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

use crate::endpoint::endpoint_config::EndpointConfig;
use crate::endpoint::endpoint_driver::{run_endpoint, EndpointCommand};
use crate::endpoint::endpoint_events::EndpointEvent;
use crate::endpoint::endpoint_id::EndpointId;
use crate::endpoint::endpoint_state::EndpointState;
use crate::endpoint::messages::{DataMessage, LinkMessage};

/// An endpoint's public API: a cheap handle that talks to the endpoint task
/// through its mailbox. Spawning an endpoint also yields the stream of
/// peering lifecycle events.
///
/// Transport glue attaches peers via [Endpoint::init_peering]: it provides
/// the sender onto which this endpoint emits outbound link frames, and feeds
/// inbound frames back through [Endpoint::command_sender] as
/// [EndpointCommand::LinkInbound] / [EndpointCommand::LinkClosed].
pub struct Endpoint {
    id: EndpointId,
    commands: mpsc::UnboundedSender<EndpointCommand>,
    driver: JoinHandle<()>,
}

impl Endpoint {
    pub fn spawn(config: EndpointConfig) -> (Endpoint, mpsc::UnboundedReceiver<EndpointEvent>) {
        Self::spawn_with_id(EndpointId::random(), config)
    }

    pub fn spawn_with_id(
        id: EndpointId,
        config: EndpointConfig,
    ) -> (Endpoint, mpsc::UnboundedReceiver<EndpointEvent>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let state = EndpointState::new(id, config, events_tx, commands_tx.clone());
        let driver = tokio::spawn(run_endpoint(state, commands_rx));

        (
            Endpoint {
                id,
                commands: commands_tx,
                driver,
            },
            events_rx,
        )
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn publish(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> anyhow::Result<()> {
        self.send(EndpointCommand::Publish {
            topic: topic.into(),
            payload: payload.into(),
        })
    }

    /// Subscribe to all topics matching any of the prefixes. The prefixes
    /// also extend the endpoint's filter, so peers start forwarding matching
    /// traffic here. Dropping the receiver unsubscribes.
    pub fn subscribe(
        &self,
        prefixes: impl IntoIterator<Item = impl Into<String>>,
    ) -> anyhow::Result<mpsc::UnboundedReceiver<DataMessage>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.send(EndpointCommand::Subscribe {
            prefixes: prefixes.into_iter().map(|p| p.into()).collect(),
            sink: tx,
        })?;
        Ok(rx)
    }

    /// extend the local filter without attaching a subscriber
    pub fn add_filter(&self, prefix: impl Into<String>) -> anyhow::Result<()> {
        self.send(EndpointCommand::AddFilter {
            prefix: prefix.into(),
        })
    }

    pub fn init_peering(
        &self,
        peer_id: EndpointId,
        peer_addr: Option<SocketAddr>,
        out: mpsc::UnboundedSender<LinkMessage>,
        in_handle: Option<AbortHandle>,
    ) -> anyhow::Result<()> {
        self.send(EndpointCommand::InitPeering {
            peer_id,
            peer_addr,
            out,
            in_handle,
        })
    }

    pub fn remove_peering(&self, peer_id: EndpointId, with_timeout: bool) -> anyhow::Result<()> {
        self.send(EndpointCommand::RemovePeering {
            peer_id,
            with_timeout,
        })
    }

    /// the endpoint's mailbox, for transport glue that needs to feed inbound
    /// link traffic
    pub fn command_sender(&self) -> mpsc::UnboundedSender<EndpointCommand> {
        self.commands.clone()
    }

    /// Stop the endpoint task. In-flight commands are discarded; peers will
    /// observe the links going away.
    pub fn stop(&self) {
        self.driver.abort();
    }

    fn send(&self, cmd: EndpointCommand) -> anyhow::Result<()> {
        self.commands
            .send(cmd)
            .map_err(|_| anyhow!("endpoint task is gone"))
    }
}
