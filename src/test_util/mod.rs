//! Utilities for testing bus functionality: deterministic endpoint ids and
//! in-process duplex links that splice two endpoint tasks together the way a
//! real transport would.

use tokio::sync::mpsc;

use crate::endpoint::endpoint::Endpoint;
use crate::endpoint::endpoint_driver::EndpointCommand;
use crate::endpoint::endpoint_id::EndpointId;
use crate::endpoint::messages::LinkMessage;

/// convenience for unit test code: create an [EndpointId] based on a number,
/// the same number generating the same id and different numbers different ids
pub fn test_endpoint_id(number: u8) -> EndpointId {
    EndpointId::from_u128(number as u128)
}

/// Connect two spawned endpoints with a lossless in-process link: each
/// side's outbound frames are pumped into the other side's mailbox, and a
/// closed link surfaces as [EndpointCommand::LinkClosed] - exactly the
/// contract real transport glue has to fulfill.
pub fn connect(a: &Endpoint, b: &Endpoint) -> anyhow::Result<()> {
    let (a_to_b_tx, a_to_b_rx) = mpsc::unbounded_channel();
    let (b_to_a_tx, b_to_a_rx) = mpsc::unbounded_channel();

    let into_b = tokio::spawn(pump(a_to_b_rx, b.command_sender(), a.id()));
    let into_a = tokio::spawn(pump(b_to_a_rx, a.command_sender(), b.id()));

    a.init_peering(b.id(), None, a_to_b_tx, Some(into_a.abort_handle()))?;
    b.init_peering(a.id(), None, b_to_a_tx, Some(into_b.abort_handle()))?;
    Ok(())
}

async fn pump(
    mut rx: mpsc::UnboundedReceiver<LinkMessage>,
    commands: mpsc::UnboundedSender<EndpointCommand>,
    from: EndpointId,
) {
    while let Some(msg) = rx.recv().await {
        if commands
            .send(EndpointCommand::LinkInbound { peer_id: from, msg })
            .is_err()
        {
            return;
        }
    }
    let _ = commands.send(EndpointCommand::LinkClosed { peer_id: from });
}
