use std::net::SocketAddr;

use bytes::Bytes;
use tokio::select;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::endpoint::endpoint_id::EndpointId;
use crate::endpoint::endpoint_state::EndpointState;
use crate::endpoint::messages::{DataMessage, LinkMessage};

/// Everything an endpoint task can be asked to do. All state mutation goes
/// through this one mailbox, so the state itself needs no locks; `Tick` is
/// the scheduled periodic command that drives heartbeats, nack timeouts and
/// advertisement flushing.
#[derive(Debug)]
pub enum EndpointCommand {
    /// publish a payload under a topic on this node
    Publish { topic: String, payload: Bytes },

    /// register a local subscriber; matching data messages are cloned onto
    /// the sink
    Subscribe {
        prefixes: Vec<String>,
        sink: mpsc::UnboundedSender<DataMessage>,
    },

    /// extend the local filter without attaching a subscriber (forward-only
    /// interest)
    AddFilter { prefix: String },

    /// Attach a new peering. `out` is where this endpoint emits link frames
    /// for the peer; `in_handle` (if any) aborts whatever feeds inbound
    /// frames when the peering is torn down.
    InitPeering {
        peer_id: EndpointId,
        peer_addr: Option<SocketAddr>,
        out: mpsc::UnboundedSender<LinkMessage>,
        in_handle: Option<AbortHandle>,
    },

    /// start a graceful (or, without timeout, indefinitely patient) removal
    /// of a peering
    RemovePeering {
        peer_id: EndpointId,
        with_timeout: bool,
    },

    /// a link frame arrived from the peer
    LinkInbound {
        peer_id: EndpointId,
        msg: LinkMessage,
    },

    /// the transport reported the link as gone
    LinkClosed { peer_id: EndpointId },

    /// the BYE grace period for a pending removal elapsed
    ByeTimeout { peer_id: EndpointId, token: u64 },

    Tick,
}

/// Runs an endpoint until its command channel closes or the task is aborted.
/// This is the only place that touches the [EndpointState]; everything else
/// talks to it through [EndpointCommand]s.
pub async fn run_endpoint(
    mut state: EndpointState,
    mut commands: mpsc::UnboundedReceiver<EndpointCommand>,
) {
    let tick_interval = state.config().tick_interval;
    let mut ticks = interval_at(Instant::now() + tick_interval, tick_interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("starting endpoint {:?}", state.id());

    loop {
        select! {
            cmd = commands.recv() => {
                match cmd {
                    Some(cmd) => state.on_command(cmd),
                    None => break,
                }
            }
            _ = ticks.tick() => {
                state.on_command(EndpointCommand::Tick);
            }
        }
    }

    debug!("command channel of {:?} closed - endpoint loop exiting", state.id());
}
