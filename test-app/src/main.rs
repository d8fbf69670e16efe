// flarmlink test application -- CLI tool for exercising the adaptor against
// a real FLARM device, a recorded simulator log, or a file of raw sentences.
//
// Usage:
//   flarmlink-test-app monitor
//   flarmlink-test-app monitor --host 192.168.1.1 --port 2000 --capture flight.log
//   flarmlink-test-app replay flight.log
//   flarmlink-test-app parse sentences.txt
//   flarmlink-test-app parse --log flight.log
//   flarmlink-test-app checksum "PFLAV,R"
//
// Logging is controlled with RUST_LOG (default: flarmlink=info, or
// flarmlink=debug with --verbose).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::prelude::*;

use flarmlink::{
    AdaptorEvent, ClassifiedSentence, ConnectionStatus, FlarmAdaptor, FlarmAdaptorBuilder,
    SentenceCatalogue, SimulatorLog,
};
use flarmlink_nmea::frame_sentence;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// flarmlink test application -- exercises the FLARM adaptor from the command line.
#[derive(Parser)]
#[command(name = "flarmlink-test-app", version, about)]
struct Cli {
    /// Log adaptor internals at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to a device and print adaptor events in real time.
    Monitor {
        /// Device host name or IP address.
        #[arg(long, default_value = flarmlink::DEFAULT_HOST)]
        host: String,

        /// Device data port.
        #[arg(long, default_value_t = flarmlink::DEFAULT_PORT)]
        port: u16,

        /// Record the session to this file in simulator-log format.
        #[arg(long)]
        capture: Option<PathBuf>,

        /// Heartbeat timeout in seconds.
        #[arg(long, default_value_t = 5)]
        heartbeat: u64,

        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// Replay a simulator log through the adaptor and print its events.
    Replay {
        /// Simulator log to replay.
        file: PathBuf,

        /// Heartbeat timeout in seconds.
        #[arg(long, default_value_t = 5)]
        heartbeat: u64,
    },

    /// Classify every sentence in a file and print the result.
    Parse {
        /// File with one sentence per line.
        file: PathBuf,

        /// Read the file as a simulator log (`<delay_ms> <sentence>` lines).
        #[arg(long)]
        log: bool,

        /// Reject sentences without a `*HH` checksum.
        #[arg(long)]
        require_checksum: bool,
    },

    /// Print a sentence body framed as `$body*HH`.
    Checksum {
        /// Sentence body without `$` and checksum, e.g. "PFLAV,R".
        body: String,
    },
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn print_event(event: &AdaptorEvent) {
    match event {
        AdaptorEvent::StatusChanged { status } => {
            println!("[status]     {} -- {}", status, status.description());
        }
        AdaptorEvent::HardwareVersionChanged { version } => {
            println!("[hardware]   {}", version.as_deref().unwrap_or("-"));
        }
        AdaptorEvent::SoftwareVersionChanged { version } => {
            println!("[software]   {}", version.as_deref().unwrap_or("-"));
        }
        AdaptorEvent::ObstacleDatabaseVersionChanged { version } => {
            println!("[obstacles]  {}", version.as_deref().unwrap_or("-"));
        }
        AdaptorEvent::SelfTestResultChanged { result } => {
            println!("[self-test]  {}", result.as_deref().unwrap_or("-"));
        }
        AdaptorEvent::SelfTestFailed { text } => {
            println!("[FAILED]     {}", text);
        }
        AdaptorEvent::LastFixChanged { fix } => match fix {
            Some(fix) => println!("[fix]        {}", fix),
            None => println!("[fix]        -"),
        },
        AdaptorEvent::Reconnecting { attempt } => {
            println!("[reconnect]  attempt {}", attempt);
        }
        AdaptorEvent::RuntimeError { message } => {
            println!("[error]      {}", message);
        }
    }
}

fn print_summary(adaptor: &FlarmAdaptor) {
    let state = adaptor.state();
    let info = &state.device_info;
    let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());

    println!();
    println!("Status:            {}", state.status);
    println!("Hardware version:  {}", show(&info.hardware_version));
    println!("Software version:  {}", show(&info.software_version));
    println!("Obstacle database: {}", show(&info.obstacle_database_version));
    println!("Self-test:         {}", show(&info.self_test_result));
    match state.last_fix {
        Some(fix) => println!("Last fix:          {}", fix),
        None => println!("Last fix:          -"),
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

/// Print events until `duration` elapses, Ctrl-C, or `until` matches one.
async fn pump_events(
    adaptor: &FlarmAdaptor,
    duration: Option<Duration>,
    until: impl Fn(&AdaptorEvent) -> bool,
) -> Result<()> {
    let mut events = adaptor.subscribe();
    let deadline = duration.map(|d| tokio::time::Instant::now() + d);

    loop {
        let timeout = match deadline {
            Some(dl) => {
                let remaining = dl.saturating_duration_since(tokio::time::Instant::now());
                if remaining.is_zero() {
                    println!("Duration elapsed.");
                    break;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted.");
                break;
            }
            received = tokio::time::timeout(timeout, events.recv()) => match received {
                Ok(Ok(event)) => {
                    print_event(&event);
                    if until(&event) {
                        break;
                    }
                }
                Ok(Err(RecvError::Lagged(n))) => {
                    println!("[warning]    missed {n} events (consumer too slow)");
                }
                Ok(Err(RecvError::Closed)) => {
                    println!("Event channel closed.");
                    break;
                }
                Err(_) => {
                    if deadline.is_some() {
                        println!("Duration elapsed.");
                        break;
                    }
                }
            },
        }
    }

    Ok(())
}

async fn cmd_monitor(
    host: &str,
    port: u16,
    capture: Option<&Path>,
    heartbeat: u64,
    duration: u64,
) -> Result<()> {
    let mut builder = FlarmAdaptorBuilder::new()
        .host(host)
        .port(port)
        .heartbeat_timeout(Duration::from_secs(heartbeat));
    if let Some(path) = capture {
        builder = builder.capture_file(path);
    }
    let adaptor = builder
        .build()
        .await
        .with_context(|| format!("failed to create adaptor for {host}:{port}"))?;

    tracing::info!(host, port, capture = ?capture, "monitor starting");
    println!("Monitoring {host}:{port} (Ctrl-C to stop)...");
    adaptor.start().await.context("failed to start adaptor")?;

    let duration = (duration > 0).then(|| Duration::from_secs(duration));
    pump_events(&adaptor, duration, |_| false).await?;

    adaptor.stop().await?;
    print_summary(&adaptor);
    adaptor.shutdown().await;
    Ok(())
}

async fn cmd_replay(file: &Path, heartbeat: u64) -> Result<()> {
    let log = SimulatorLog::load(file)
        .await
        .with_context(|| format!("failed to load {}", file.display()))?;
    println!(
        "Replaying {} records ({:.1}s) from {}",
        log.len(),
        log.duration().as_secs_f64(),
        file.display()
    );

    let adaptor = FlarmAdaptorBuilder::new()
        .simulator_file(file)
        .heartbeat_timeout(Duration::from_secs(heartbeat))
        .build()
        .await?;

    // Subscribe before starting so the first events are not missed.
    let pump = pump_events(&adaptor, None, |event| {
        *event
            == AdaptorEvent::StatusChanged {
                status: ConnectionStatus::Disconnected,
            }
    });
    let (pumped, started) = tokio::join!(pump, adaptor.start());
    started.context("failed to start replay")?;
    pumped?;

    print_summary(&adaptor);
    adaptor.shutdown().await;
    Ok(())
}

async fn cmd_parse(file: &Path, log: bool, require_checksum: bool) -> Result<()> {
    let sentences: Vec<String> = if log {
        SimulatorLog::load(file)
            .await
            .with_context(|| format!("failed to load {}", file.display()))?
            .records()
            .iter()
            .map(|record| record.sentence.clone())
            .collect()
    } else {
        tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("failed to read {}", file.display()))?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.trim_end().to_string())
            .collect()
    };

    let catalogue = SentenceCatalogue::default().require_checksum(require_checksum);
    let mut rejected = 0usize;

    for sentence in &sentences {
        match catalogue.classify(sentence) {
            Ok(ClassifiedSentence::PositionFix {
                latitude,
                longitude,
                altitude_m,
                fix_time,
            }) => println!(
                "fix        {latitude:.5} {longitude:.5} {altitude_m:.1} m {fix_time}"
            ),
            Ok(ClassifiedSentence::DeviceIdentity {
                hardware_version,
                software_version,
                obstacle_database_version,
            }) => println!(
                "identity   hw={} sw={} obst={}",
                hardware_version.as_deref().unwrap_or("-"),
                software_version.as_deref().unwrap_or("-"),
                obstacle_database_version.as_deref().unwrap_or("-"),
            ),
            Ok(ClassifiedSentence::SelfTestResult { text }) => println!("self-test  {text}"),
            Ok(ClassifiedSentence::Unrecognized { identifier }) => {
                println!("ignored    {identifier}")
            }
            Err(rejection) => {
                rejected += 1;
                println!("REJECTED   {rejection}: {sentence}");
            }
        }
    }

    println!("\n{} sentences, {} rejected", sentences.len(), rejected);
    Ok(())
}

fn cmd_checksum(body: &str) -> Result<()> {
    let body = body.trim().trim_start_matches('$');
    if body.is_empty() {
        bail!("sentence body must not be empty");
    }
    if !body.is_ascii() || body.contains('*') {
        bail!("sentence body must be ASCII without '*'");
    }
    println!("{}", frame_sentence(body));
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_logging(verbose: bool) {
    let default_directive = if verbose {
        "flarmlink=debug,flarmlink_nmea=debug,flarmlink_transport=debug,info"
    } else {
        "flarmlink=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Command::Monitor {
            host,
            port,
            capture,
            heartbeat,
            duration,
        } => cmd_monitor(host, *port, capture.as_deref(), *heartbeat, *duration).await,
        Command::Replay { file, heartbeat } => cmd_replay(file, *heartbeat).await,
        Command::Parse {
            file,
            log,
            require_checksum,
        } => cmd_parse(file, *log, *require_checksum).await,
        Command::Checksum { body } => cmd_checksum(body),
    }
}
