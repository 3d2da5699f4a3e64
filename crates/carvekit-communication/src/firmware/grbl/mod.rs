//! GRBL protocol implementation
//!
//! Covers the GRBL v1.1 line protocol shared by grblHAL and FluidNC:
//! response classification, status report decoding, error/alarm code
//! tables, real-time command bytes, and the controller session object.

pub mod controller;
pub mod error_decoder;
pub mod realtime;
pub mod response_parser;
pub mod status_parser;

pub use controller::{GrblController, GrblControllerConfig};
