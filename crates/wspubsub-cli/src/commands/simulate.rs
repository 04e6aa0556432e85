//! `wspubsub simulate`

use tracing::info;
use wspubsub_protocol::{Direction, parse_b2s_frame, parse_s2b_frame};
use wspubsub_session::{
    BroadcasterSession, ChannelTransport, LocalHub, ReceivedNotification, SessionConfig,
    SubscriberClient, SubscriberSession, serve_subscriber,
};

use super::direction_label;
use crate::error::CliResult;
use crate::recording::{RecordedFrame, RecordingTransport, Transcript};

/// Outcome of one simulated connection.
#[derive(Debug)]
pub struct Simulation {
    pub frames: Vec<RecordedFrame>,
    pub reached: u64,
    pub received: ReceivedNotification,
}

/// Connects one subscriber to an in-process broadcaster, subscribes to
/// `topic`, publishes `payload` on it and waits for the delivery.
pub async fn simulate(config: SessionConfig, topic: &str, payload: &str) -> CliResult<Simulation> {
    let hub = LocalHub::new();
    let (client_end, server_end) = ChannelTransport::pair(16);

    let (handle, deliveries) = hub.connect();
    let broadcaster = BroadcasterSession::new(config.clone(), Box::new(handle))?;
    let server = tokio::spawn(serve_subscriber(server_end, broadcaster, deliveries));

    let transcript = Transcript::default();
    let transport = RecordingTransport::new(client_end, transcript.clone());
    let mut client = SubscriberClient::connect(transport, SubscriberSession::new(config)?).await?;

    client.subscribe_exact(topic.to_owned()).await?;
    let reached = client.notify(topic.to_owned(), payload.to_owned()).await?;
    let received = client.next_notification().await?;
    info!(reached, parts = received.parts, "Simulation finished");

    drop(client);
    server.await??;

    Ok(Simulation {
        frames: transcript.frames(),
        reached,
        received,
    })
}

fn frame_kind(recorded: &RecordedFrame) -> String {
    let kind = match recorded.direction {
        Direction::SubscriberToBroadcaster => {
            parse_s2b_frame(&recorded.frame).map(|m| m.kind().to_string())
        }
        Direction::BroadcasterToSubscriber => {
            parse_b2s_frame(&recorded.frame).map(|m| m.kind().to_string())
        }
    };
    kind.unwrap_or_else(|e| format!("<{e}>"))
}

/// One transcript line per frame.
pub fn render(simulation: &Simulation) -> Vec<String> {
    simulation
        .frames
        .iter()
        .map(|recorded| {
            format!(
                "{} {:<26} {}",
                direction_label(recorded.direction),
                frame_kind(recorded),
                hex::encode(&recorded.frame)
            )
        })
        .collect()
}

/// Runs the simulation and prints the transcript.
pub async fn run(config: SessionConfig, topic: &str, payload: &str) -> CliResult<()> {
    let simulation = simulate(config, topic, payload).await?;
    for line in render(&simulation) {
        println!("{line}");
    }
    println!(
        "reached {} subscriber(s); received {} bytes in {} part(s)",
        simulation.reached,
        simulation.received.payload.len(),
        simulation.received.parts
    );
    Ok(())
}
