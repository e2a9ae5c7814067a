//! Minimal two-node mesh: peer two endpoints over an in-process link,
//! subscribe on one side, publish on the other, and watch the peering go
//! away gracefully.

use std::time::Duration;

use meshbus::endpoint::endpoint::Endpoint;
use meshbus::endpoint::endpoint_config::EndpointConfig;
use meshbus::endpoint::endpoint_driver::EndpointCommand;
use meshbus::endpoint::endpoint_id::EndpointId;
use meshbus::endpoint::messages::LinkMessage;
use tokio::sync::mpsc;
use tracing::info;

/// What a real transport has to do, in miniature: move link frames from one
/// endpoint's outbound channel into the other endpoint's mailbox, and report
/// the link as closed when the stream ends.
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

fn connect(a: &Endpoint, b: &Endpoint) -> anyhow::Result<()> {
    let (a_to_b_tx, a_to_b_rx) = mpsc::unbounded_channel();
    let (b_to_a_tx, b_to_a_rx) = mpsc::unbounded_channel();

    let into_b = tokio::spawn(pump(a_to_b_rx, b.command_sender(), a.id()));
    let into_a = tokio::spawn(pump(b_to_a_rx, a.command_sender(), b.id()));

    a.init_peering(b.id(), None, a_to_b_tx, Some(into_a.abort_handle()))?;
    b.init_peering(a.id(), None, b_to_a_tx, Some(into_b.abort_handle()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let mut config = EndpointConfig::new();
    config.tick_interval = Duration::from_millis(100);

    let (alpha, mut alpha_events) = Endpoint::spawn(config.clone());
    let (beta, mut beta_events) = Endpoint::spawn(config);
    info!("alpha is {:?}, beta is {:?}", alpha.id(), beta.id());

    connect(&alpha, &beta)?;
    info!("alpha sees: {:?}", alpha_events.recv().await);
    info!("beta sees: {:?}", beta_events.recv().await);

    let mut inbox = beta.subscribe(["demo/greetings"])?;

    // give the filter advertisement a tick to reach alpha
    tokio::time::sleep(Duration::from_millis(300)).await;

    for n in 0..3 {
        alpha.publish("demo/greetings/hello", format!("hello #{}", n))?;
    }
    for _ in 0..3 {
        let msg = inbox.recv().await.expect("endpoint went away");
        info!(
            "beta received {:?}: {:?}",
            msg.topic,
            String::from_utf8_lossy(&msg.payload)
        );
    }

    alpha.remove_peering(beta.id(), true)?;
    info!("alpha says: {:?}", alpha_events.recv().await);
    info!("beta says: {:?}", beta_events.recv().await);

    alpha.stop();
    beta.stop();
    Ok(())
}
