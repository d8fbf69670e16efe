//! Monitor live FLARM adaptor events.
//!
//! Demonstrates subscribing to the adaptor event stream and printing all
//! events as they arrive, with a timestamp relative to start. Useful for
//! checking a cockpit WiFi setup or watching a recorded log replay.
//!
//! # Requirements
//!
//! - A FLARM device reachable on its data port, or a simulator log passed
//!   as the first argument
//!
//! # Usage
//!
//! ```sh
//! cargo run -p flarmlink --example monitor_events
//! cargo run -p flarmlink --example monitor_events -- flight.log
//! ```

use std::time::Duration;

use flarmlink::{AdaptorEvent, FlarmAdaptorBuilder};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut builder = FlarmAdaptorBuilder::new();
    match std::env::args().nth(1) {
        Some(log) => {
            println!("Replaying {}...", log);
            builder = builder.simulator_file(log);
        }
        None => println!(
            "Connecting to {}:{}...",
            flarmlink::DEFAULT_HOST,
            flarmlink::DEFAULT_PORT
        ),
    }

    let adaptor = builder.build().await?;
    let mut events = adaptor.subscribe();
    adaptor.start().await?;

    println!("Monitoring for 60 seconds...\n");
    println!("{:<12} Event", "Timestamp");
    println!("{:-<12} {:-<50}", "", "");

    let start = tokio::time::Instant::now();
    let deadline = start + Duration::from_secs(60);

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(event)) => {
                let elapsed = start.elapsed();
                let timestamp = format!("{:>6}.{:03}s", elapsed.as_secs(), elapsed.subsec_millis());

                match event {
                    AdaptorEvent::StatusChanged { status } => {
                        println!("{} StatusChanged     -> {} ({})", timestamp, status, status.description());
                    }
                    AdaptorEvent::HardwareVersionChanged { version } => {
                        println!("{} Hardware          {}", timestamp, version.as_deref().unwrap_or("-"));
                    }
                    AdaptorEvent::SoftwareVersionChanged { version } => {
                        println!("{} Software          {}", timestamp, version.as_deref().unwrap_or("-"));
                    }
                    AdaptorEvent::ObstacleDatabaseVersionChanged { version } => {
                        println!("{} ObstacleDatabase  {}", timestamp, version.as_deref().unwrap_or("-"));
                    }
                    AdaptorEvent::SelfTestResultChanged { result } => {
                        println!("{} SelfTest          {}", timestamp, result.as_deref().unwrap_or("-"));
                    }
                    AdaptorEvent::SelfTestFailed { text } => {
                        println!("{} SelfTestFailed    {}", timestamp, text);
                    }
                    AdaptorEvent::LastFixChanged { fix: Some(fix) } => {
                        println!("{} LastFix           {}", timestamp, fix);
                    }
                    AdaptorEvent::LastFixChanged { fix: None } => {
                        println!("{} LastFix           -", timestamp);
                    }
                    AdaptorEvent::Reconnecting { attempt } => {
                        println!("{} Reconnecting      attempt {}", timestamp, attempt);
                    }
                    AdaptorEvent::RuntimeError { message } => {
                        println!("{} RuntimeError      {}", timestamp, message);
                    }
                }
            }
            Ok(Err(RecvError::Lagged(n))) => {
                println!("(missed {} events due to lag)", n);
            }
            Ok(Err(RecvError::Closed)) => {
                println!("Event channel closed.");
                break;
            }
            Err(_) => break,
        }
    }

    adaptor.shutdown().await;
    println!("\nMonitoring complete.");
    Ok(())
}
