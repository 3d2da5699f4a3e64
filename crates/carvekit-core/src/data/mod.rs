//! Data models for machine status and job tracking
//!
//! This module provides:
//! - 4-axis position tracking (X, Y, Z, A)
//! - Machine state machine states as reported by the firmware
//! - Live machine status snapshot (positions, feed/spindle, pins)
//! - Job lifecycle state and derived progress view

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 4-axis machine coordinate (X, Y, Z, A)
///
/// Axes missing from a firmware report default to 0.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position4 {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
    /// A-axis (4th axis) position
    pub a: f64,
}

impl Position4 {
    /// Create a new position from all four axes
    pub fn new(x: f64, y: f64, z: f64, a: f64) -> Self {
        debug_assert!(
            x.is_finite() && y.is_finite() && z.is_finite() && a.is_finite(),
            "Position4 axes must be finite: x={x}, y={y}, z={z}, a={a}"
        );
        Self { x, y, z, a }
    }

    /// Create a position from the three linear axes, A at zero
    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Self::new(x, y, z, 0.0)
    }

    /// Component-wise subtraction, used to derive work position from
    /// machine position and a work coordinate offset.
    pub fn minus(&self, other: &Position4) -> Position4 {
        Position4 {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
            a: self.a - other.a,
        }
    }
}

impl fmt::Display for Position4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "X:{:.3} Y:{:.3} Z:{:.3} A:{:.3}",
            self.x, self.y, self.z, self.a
        )
    }
}

/// A single machine axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    /// X axis
    X,
    /// Y axis
    Y,
    /// Z axis
    Z,
    /// A axis (rotary/4th)
    A,
}

impl Axis {
    /// The G-code word letter for this axis
    pub fn letter(&self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
            Axis::A => 'A',
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Machine states reported by GRBL-family firmware
///
/// Decoded from the first token of a `<...>` status report. Sub-states
/// such as `Hold:0` or `Door:1` map to their base variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MachineState {
    /// Ready for commands
    Idle,
    /// Executing a program
    Run,
    /// Feed hold in effect
    Hold,
    /// Jog motion in progress
    Jog,
    /// Alarm lockout, requires reset/unlock
    Alarm,
    /// Check mode (dry run)
    Check,
    /// Safety door open
    Door,
    /// Low-power sleep
    Sleep,
    /// Homing cycle in progress
    Home,
    /// State not yet reported or not recognized
    #[default]
    Unknown,
}

impl MachineState {
    /// Decode a status-report state token (e.g. `Idle`, `Hold:0`)
    pub fn from_token(token: &str) -> MachineState {
        let token = token.trim();
        if token.starts_with("Idle") {
            MachineState::Idle
        } else if token.starts_with("Run") {
            MachineState::Run
        } else if token.starts_with("Hold") {
            MachineState::Hold
        } else if token.starts_with("Jog") {
            MachineState::Jog
        } else if token.starts_with("Alarm") {
            MachineState::Alarm
        } else if token.starts_with("Check") {
            MachineState::Check
        } else if token.starts_with("Door") {
            MachineState::Door
        } else if token.starts_with("Sleep") {
            MachineState::Sleep
        } else if token.starts_with("Home") {
            MachineState::Home
        } else {
            MachineState::Unknown
        }
    }

    /// Check if jogging is permitted in this state
    pub fn accepts_jog(&self) -> bool {
        matches!(self, MachineState::Idle | MachineState::Jog)
    }

    /// Check if a homing cycle may be started in this state
    pub fn accepts_homing(&self) -> bool {
        matches!(self, MachineState::Idle)
    }

    /// Check if this state is an alarm lockout
    pub fn is_alarm(&self) -> bool {
        matches!(self, MachineState::Alarm)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Run => write!(f, "Run"),
            Self::Hold => write!(f, "Hold"),
            Self::Jog => write!(f, "Jog"),
            Self::Alarm => write!(f, "Alarm"),
            Self::Check => write!(f, "Check"),
            Self::Door => write!(f, "Door"),
            Self::Sleep => write!(f, "Sleep"),
            Self::Home => write!(f, "Home"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Input pin states from the `Pn:` status field
///
/// Each boolean mirrors the presence of the corresponding character in the
/// report (`X`, `Y`, `Z`, `A`, `P`, `D`, `H`, `R`, `S`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PinState {
    /// X limit switch triggered
    pub x_limit: bool,
    /// Y limit switch triggered
    pub y_limit: bool,
    /// Z limit switch triggered
    pub z_limit: bool,
    /// A limit switch triggered
    pub a_limit: bool,
    /// Probe input active
    pub probe: bool,
    /// Safety door input active
    pub door: bool,
    /// Feed-hold button held
    pub feed_hold: bool,
    /// Soft-reset button held
    pub soft_reset: bool,
    /// Cycle-start button held
    pub cycle_start: bool,
}

impl PinState {
    /// Decode the pin flags string of a `Pn:` field
    pub fn from_flags(flags: &str) -> PinState {
        let mut pins = PinState::default();
        for c in flags.chars() {
            match c {
                'X' => pins.x_limit = true,
                'Y' => pins.y_limit = true,
                'Z' => pins.z_limit = true,
                'A' => pins.a_limit = true,
                'P' => pins.probe = true,
                'D' => pins.door = true,
                'H' => pins.feed_hold = true,
                'R' => pins.soft_reset = true,
                'S' => pins.cycle_start = true,
                _ => {}
            }
        }
        pins
    }

    /// Check if any pin is active
    pub fn any(&self) -> bool {
        self.x_limit
            || self.y_limit
            || self.z_limit
            || self.a_limit
            || self.probe
            || self.door
            || self.feed_hold
            || self.soft_reset
            || self.cycle_start
    }
}

/// Override percentages from the `Ov:` status field (informational)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideValues {
    /// Feed override percentage
    pub feed: u16,
    /// Rapid override percentage
    pub rapid: u16,
    /// Spindle override percentage
    pub spindle: u16,
}

impl Default for OverrideValues {
    fn default() -> Self {
        Self {
            feed: 100,
            rapid: 100,
            spindle: 100,
        }
    }
}

/// Live snapshot of firmware-reported machine state
///
/// Updated from parsed status reports. Fields absent from a given report
/// carry their previous value forward; a startup banner resets the whole
/// snapshot to defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MachineStatus {
    /// Current machine state
    pub state: MachineState,
    /// Position in machine coordinates
    pub machine_position: Position4,
    /// Position in work coordinates
    pub work_position: Position4,
    /// Current feed rate (units/min)
    pub feed_rate: u32,
    /// Current spindle speed (RPM)
    pub spindle_speed: u32,
    /// Last executed line number (`Ln:` field)
    pub last_line: u32,
    /// Bytes available in the firmware RX buffer (`Bf:` field)
    pub buffer_available: u16,
    /// Override percentages
    pub overrides: OverrideValues,
    /// Input pin states
    pub pins: PinState,
}

impl MachineStatus {
    /// Snapshot for a freshly connected (or reset) controller
    pub fn connected() -> Self {
        Self {
            state: MachineState::Idle,
            ..Default::default()
        }
    }
}

/// Lifecycle state of a streaming job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// No job submitted
    Idle,
    /// Lines are being dispatched
    Sending,
    /// Dispatch suspended, firmware in feed hold
    Paused,
    /// All lines sent and acknowledged
    Completed,
    /// Job aborted by a firmware error or alarm
    Error(String),
}

impl JobState {
    /// Check if a job is currently occupying the streamer
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Sending | JobState::Paused)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Sending => write!(f, "Sending"),
            Self::Paused => write!(f, "Paused"),
            Self::Completed => write!(f, "Completed"),
            Self::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}

/// Read-only progress view of the active job
///
/// Recomputed after every buffer mutation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JobProgress {
    /// Lines queued when the job was submitted
    pub total_lines: usize,
    /// Lines transmitted so far (including unacknowledged)
    pub sent_lines: usize,
    /// Lines acknowledged by the firmware
    pub completed_lines: usize,
    /// Engine's estimate of bytes in the firmware RX buffer
    pub bytes_in_flight: usize,
    /// Completion percentage (0-100)
    pub percent_complete: f32,
    /// Sequence number of the most recently acknowledged line
    pub current_line: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_token() {
        assert_eq!(MachineState::from_token("Idle"), MachineState::Idle);
        assert_eq!(MachineState::from_token("Hold:0"), MachineState::Hold);
        assert_eq!(MachineState::from_token("Door:1"), MachineState::Door);
        assert_eq!(MachineState::from_token("Bogus"), MachineState::Unknown);
    }

    #[test]
    fn test_pin_flags() {
        let pins = PinState::from_flags("XZP");
        assert!(pins.x_limit);
        assert!(!pins.y_limit);
        assert!(pins.z_limit);
        assert!(pins.probe);
        assert!(pins.any());
        assert!(!PinState::default().any());
    }

    #[test]
    fn test_jog_gating() {
        assert!(MachineState::Idle.accepts_jog());
        assert!(MachineState::Jog.accepts_jog());
        assert!(!MachineState::Run.accepts_jog());
        assert!(!MachineState::Alarm.accepts_jog());
    }

    #[test]
    fn test_position_minus() {
        let mpos = Position4::new(10.0, 5.0, -2.0, 0.0);
        let wco = Position4::new(1.0, 1.0, 1.0, 0.0);
        assert_eq!(mpos.minus(&wco), Position4::new(9.0, 4.0, -3.0, 0.0));
    }
}
