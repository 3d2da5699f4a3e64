//! # CarveKit Communication
//!
//! Transport abstraction and GRBL protocol handling for CarveKit.
//! Provides serial and TCP transports, the GRBL response/status parsers,
//! the character-counting streaming engine, and the controller session
//! object that ties them together.

pub mod communication;
pub mod firmware;
pub mod streaming;

pub use communication::{
    serial::{list_ports, SerialCommunicator, SerialPortInfo},
    tcp::TcpCommunicator,
    Communicator, ConnectionDriver, ConnectionParams, NoOpCommunicator, SerialParity,
    TransportHandle,
};

pub use firmware::{
    grbl::{
        error_decoder,
        realtime::RealtimeCommand,
        response_parser::{FeedbackMessage, GrblResponse, GrblSetting},
        status_parser::StatusReport,
        GrblController, GrblControllerConfig,
    },
    detect_firmware, ControllerType,
};

pub use streaming::{preprocess_program, JobStreamer, QueuedLine, StreamerConfig};
