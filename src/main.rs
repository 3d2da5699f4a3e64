//! Headless CLI sender
//!
//! Streams a G-code file to a GRBL-family controller over serial or TCP,
//! printing console traffic and progress. Used for bench testing the
//! streaming engine against real hardware.

use anyhow::{bail, Context};
use carvekit::{
    Communicator, ConnectionParams, ControllerEvent, GrblController, GrblControllerConfig,
    JobState, SerialCommunicator, TcpCommunicator,
};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "carvekit", version, about = "Stream G-code to a GRBL controller")]
struct Args {
    /// Serial port (/dev/ttyUSB0, COM3) or host:port with --tcp
    #[arg(short, long)]
    port: String,

    /// Connect over TCP instead of serial
    #[arg(long)]
    tcp: bool,

    /// Baud rate for serial connections
    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    /// G-code file to stream; omit to just watch status
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    carvekit::init_logging()?;
    let args = Args::parse();

    let mut config = GrblControllerConfig::default();
    let communicator: Box<dyn Communicator> = if args.tcp {
        config.connection = ConnectionParams::tcp(&args.port);
        Box::new(TcpCommunicator::new())
    } else {
        config.connection = ConnectionParams::serial(&args.port);
        config.connection.baud_rate = args.baud;
        Box::new(SerialCommunicator::new())
    };

    let controller = GrblController::new(communicator, config);
    controller.connect()?;

    // Echo console traffic and state changes
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match events.recv().await {
                Ok(
                    event @ (ControllerEvent::LineSent(_)
                    | ControllerEvent::LineReceived(_)
                    | ControllerEvent::JobStateChanged(_)
                    | ControllerEvent::AlarmRaised { .. }
                    | ControllerEvent::FirmwareError { .. }),
                ) => println!("{}", event),
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    match args.file {
        Some(path) => {
            let program = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            controller.send_job(program.lines())?;

            loop {
                tokio::time::sleep(Duration::from_millis(500)).await;
                let progress = controller.progress();
                match controller.job_state() {
                    JobState::Completed => {
                        println!(
                            "Done: {} lines sent",
                            progress.completed_lines
                        );
                        break;
                    }
                    JobState::Error(message) => {
                        controller.disconnect()?;
                        bail!("job failed: {}", message);
                    }
                    _ => {
                        let status = controller.status();
                        println!(
                            "{:5.1}%  {}  {}",
                            progress.percent_complete, status.state, status.work_position
                        );
                    }
                }
            }
        }
        None => {
            // No file: report live status until interrupted
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = ticker.tick() => {
                        let status = controller.status();
                        println!(
                            "{}  {}  F{} S{}",
                            status.state, status.work_position, status.feed_rate, status.spindle_speed
                        );
                    }
                }
            }
        }
    }

    controller.disconnect()?;
    Ok(())
}
