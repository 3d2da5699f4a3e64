//! Event system for controller notifications
//!
//! Provides:
//! - Event types for connection, machine, and job state changes
//! - A broadcast-based dispatcher so the UI/console layer can observe the
//!   session without holding locks on engine state

use crate::data::{JobProgress, JobState, MachineState, Position4};
use tokio::sync::broadcast;

/// Controller event types
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// Transport connected
    Connected {
        /// Port or endpoint name.
        port: String,
    },
    /// Transport disconnected
    Disconnected,
    /// Firmware identified itself via its startup banner
    FirmwareDetected {
        /// Firmware family name.
        firmware: String,
        /// Reported version string.
        version: String,
    },
    /// Machine state changed between status reports
    StateChanged(MachineState),
    /// Job lifecycle state changed
    JobStateChanged(JobState),
    /// Job progress was recomputed
    ProgressChanged(JobProgress),
    /// Firmware raised an alarm
    AlarmRaised {
        /// The alarm code.
        code: u8,
        /// Decoded human-readable message.
        message: String,
    },
    /// Firmware rejected a line with an error response
    FirmwareError {
        /// The error code.
        code: u8,
        /// Decoded human-readable message.
        message: String,
    },
    /// A `$n=value` setting line was reported
    SettingReported {
        /// Setting identifier.
        id: u16,
        /// Raw setting value.
        value: String,
    },
    /// A probe cycle reported its result
    ProbeResult {
        /// Probe contact position.
        position: Position4,
        /// Whether the probe made contact.
        triggered: bool,
    },
    /// A line was written to the wire (console echo)
    LineSent(String),
    /// A non-status line arrived from the firmware (console echo)
    LineReceived(String),
}

impl std::fmt::Display for ControllerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerEvent::Connected { port } => write!(f, "Connected to {}", port),
            ControllerEvent::Disconnected => write!(f, "Disconnected"),
            ControllerEvent::FirmwareDetected { firmware, version } => {
                write!(f, "Detected {} {}", firmware, version)
            }
            ControllerEvent::StateChanged(state) => write!(f, "State: {}", state),
            ControllerEvent::JobStateChanged(state) => write!(f, "Job: {}", state),
            ControllerEvent::ProgressChanged(progress) => {
                write!(
                    f,
                    "Progress: {}/{} ({:.1}%)",
                    progress.completed_lines, progress.total_lines, progress.percent_complete
                )
            }
            ControllerEvent::AlarmRaised { message, .. } => write!(f, "{}", message),
            ControllerEvent::FirmwareError { message, .. } => write!(f, "{}", message),
            ControllerEvent::SettingReported { id, value } => {
                write!(f, "${}={}", id, value)
            }
            ControllerEvent::ProbeResult {
                position,
                triggered,
            } => {
                write!(
                    f,
                    "Probe {}: {}",
                    if *triggered { "contact" } else { "no contact" },
                    position
                )
            }
            ControllerEvent::LineSent(line) => write!(f, "> {}", line),
            ControllerEvent::LineReceived(line) => write!(f, "< {}", line),
        }
    }
}

/// Event dispatcher for publishing events to subscribers
#[derive(Clone)]
pub struct EventDispatcher {
    /// Broadcast sender channel for controller events.
    tx: broadcast::Sender<ControllerEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer (default 256)
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers
    ///
    /// Events published with no active subscriber are dropped; dispatch
    /// never blocks the engine.
    pub fn publish(&self, event: ControllerEvent) {
        let _ = self.tx.send(event);
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let dispatcher = EventDispatcher::default();
        dispatcher.publish(ControllerEvent::Disconnected);
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let dispatcher = EventDispatcher::default();
        let mut rx = dispatcher.subscribe();

        dispatcher.publish(ControllerEvent::Connected {
            port: "/dev/ttyUSB0".to_string(),
        });

        match rx.try_recv() {
            Ok(ControllerEvent::Connected { port }) => assert_eq!(port, "/dev/ttyUSB0"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
