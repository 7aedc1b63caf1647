use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gossip_chat::config::{init_tracing, Args, Config};
use gossip_chat::discovery::{bridge, Advertise, Announce, DhtRendezvous, Discovery, Strategy};
use gossip_chat::ui::{TerminalView, Ui};
use gossip_chat::{ChatRoom, TransportBuilder};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::try_from(Args::parse())?;
    init_tracing(&config).context("failed to set up logging")?;
    for warning in &config.warnings {
        warn!("{warning}");
    }

    println!("gossip-chat is starting.");
    println!("This may take a few seconds.");
    println!();

    let transport = TransportBuilder::new()
        .secret_key(config.secret_key.clone())
        .relay(config.relay)
        .spawn()
        .await
        .context("P2P host creation failed")?;
    let transport = Arc::new(transport);
    info!(id = %transport.endpoint().id(), "P2P setup completed");

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let rendezvous = DhtRendezvous::new(transport.endpoint());
    let discovery: Box<dyn Discovery> = match config.strategy {
        Strategy::Announce => {
            Box::new(Announce::new(rendezvous).poll_interval(config.poll_interval))
        }
        Strategy::Advertise => Box::new(Advertise::new(rendezvous)),
    };
    let publisher = discovery.advertise(&config.namespace, shutdown.child_token());
    let peers = discovery.find_peers(&config.namespace);
    let connector = bridge::spawn(Arc::clone(&transport), peers, shutdown.child_token());
    info!(strategy = discovery.name(), namespace = %config.namespace, "peer discovery started");

    let pubsub = Arc::new(transport.pubsub());
    let room = ChatRoom::join(&*pubsub, &config.user, &config.room)
        .await
        .context("could not join chat room")?;
    info!(room = %room.room_name(), user = %room.user_name(), "Joined chat room");

    tokio::select! {
        _ = tokio::time::sleep(config.settle) => {}
        _ = shutdown.cancelled() => {}
    }

    let mut view = TerminalView::stdout();
    view.banner();
    let input = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let room = Ui::new(Arc::clone(&pubsub), room, view)
        .refresh_every(config.refresh)
        .with_shutdown(shutdown.clone())
        .run(input)
        .await;

    if let Err(e) = room.exit().await {
        warn!(error = %e, "failed to leave chat room");
    }
    shutdown.cancel();
    if let Err(e) = publisher.await {
        warn!(error = %e, "DHT publisher task failed");
    }
    match connector.await {
        Ok(attempts) => info!(attempts, "discovery stopped"),
        Err(e) => warn!(error = %e, "discovery task failed"),
    }
    transport.shutdown().await?;

    println!("bye");
    Ok(())
}
