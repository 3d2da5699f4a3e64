//! # CarveKit
//!
//! An offline G-code sender core for CNC machines running GRBL-family
//! firmware (GRBL v1.1, grblHAL, FluidNC).
//!
//! ## Architecture
//!
//! CarveKit is organized as a workspace:
//!
//! 1. **carvekit-core** - data model, error taxonomy, event dispatch
//! 2. **carvekit-communication** - transports, GRBL protocol, the
//!    character-counting streaming engine, and the controller session
//! 3. **carvekit** - this facade plus a headless CLI sender used for
//!    bench testing
//!
//! The streaming engine keeps the controller's 128-byte receive buffer
//! filled without overflowing it, tracks machine state from asynchronous
//! status reports, and supports real-time control (pause/resume/stop,
//! overrides, jogging) concurrently with an active job.

pub use carvekit_core::{
    Axis, ConnectionError, ControllerError, ControllerEvent, Error, EventDispatcher, JobProgress,
    JobState, MachineState, MachineStatus, OverrideValues, PinState, Position4, Result,
};

pub use carvekit_communication::{
    detect_firmware, error_decoder, list_ports, Communicator, ConnectionDriver, ConnectionParams,
    ControllerType, GrblController, GrblControllerConfig, GrblResponse, JobStreamer,
    NoOpCommunicator, RealtimeCommand, SerialCommunicator, SerialParity, SerialPortInfo,
    StatusReport, StreamerConfig, TcpCommunicator,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging for the CLI sender
///
/// Structured console output with `RUST_LOG` filtering; defaults to INFO.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    Ok(())
}
