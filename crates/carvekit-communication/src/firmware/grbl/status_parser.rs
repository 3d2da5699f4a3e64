//! GRBL status report decoding
//!
//! Decodes `<...>` status reports into a [`StatusReport`] and applies it to
//! the live [`MachineStatus`]. Transient corruption on the wire must never
//! crash the engine: a malformed report is discarded, and a malformed field
//! inside an otherwise valid report is dropped, leaving the previous value
//! in place.

use carvekit_core::{MachineState, MachineStatus, OverrideValues, PinState, Position4};
use serde::{Deserialize, Serialize};

/// One decoded status report
///
/// Fields the firmware omitted from this report are `None`. Which fields
/// appear depends on the firmware's `$10` report mask and on report
/// throttling (`Ov`/`Pn` only appear when changed or active).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Machine state (first token)
    pub state: MachineState,
    /// Machine position (`MPos:`)
    pub machine_position: Option<Position4>,
    /// Work position (`WPos:`)
    pub work_position: Option<Position4>,
    /// Work coordinate offset (`WCO:`)
    pub work_offset: Option<Position4>,
    /// Planner blocks available (`Bf:` first value)
    pub planner_blocks: Option<u16>,
    /// RX buffer bytes available (`Bf:` second value)
    pub buffer_available: Option<u16>,
    /// Last executed line number (`Ln:`)
    pub last_line: Option<u32>,
    /// Feed rate (`F:` or `FS:` first value)
    pub feed_rate: Option<u32>,
    /// Spindle speed (`S:` or `FS:` second value)
    pub spindle_speed: Option<u32>,
    /// Override percentages (`Ov:`)
    pub overrides: Option<OverrideValues>,
    /// Active input pins (`Pn:`)
    pub pins: Option<PinState>,
}

/// Parse a `<...>` status report line
///
/// Returns `None` when the line is not a structurally valid report.
pub fn parse_status(line: &str) -> Option<StatusReport> {
    let line = line.trim();
    let content = line.strip_prefix('<')?.strip_suffix('>')?;

    let mut fields = content.split('|');
    let state_token = fields.next()?.trim();
    if !state_token.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }

    let mut report = StatusReport {
        state: MachineState::from_token(state_token),
        machine_position: None,
        work_position: None,
        work_offset: None,
        planner_blocks: None,
        buffer_available: None,
        last_line: None,
        feed_rate: None,
        spindle_speed: None,
        overrides: None,
        pins: None,
    };

    for field in fields {
        let field = field.trim();
        if let Some(value) = field.strip_prefix("MPos:") {
            report.machine_position = parse_axes(value);
        } else if let Some(value) = field.strip_prefix("WPos:") {
            report.work_position = parse_axes(value);
        } else if let Some(value) = field.strip_prefix("WCO:") {
            report.work_offset = parse_axes(value);
        } else if let Some(value) = field.strip_prefix("Bf:") {
            if let Some((blocks, bytes)) = parse_buffer(value) {
                report.planner_blocks = Some(blocks);
                report.buffer_available = Some(bytes);
            }
        } else if let Some(value) = field.strip_prefix("Ln:") {
            report.last_line = value.trim().parse::<u32>().ok();
        } else if let Some(value) = field.strip_prefix("FS:") {
            let mut parts = value.split(',');
            report.feed_rate = parts.next().and_then(parse_rate);
            report.spindle_speed = parts.next().and_then(parse_rate);
        } else if let Some(value) = field.strip_prefix("F:") {
            report.feed_rate = parse_rate(value);
        } else if let Some(value) = field.strip_prefix("S:") {
            report.spindle_speed = parse_rate(value);
        } else if let Some(value) = field.strip_prefix("Ov:") {
            report.overrides = parse_overrides(value);
        } else if let Some(value) = field.strip_prefix("Pn:") {
            report.pins = Some(PinState::from_flags(value));
        }
        // Unrecognized fields (A:, accessory state, etc.) are skipped
    }

    // GRBL reports only one coordinate space ($10); derive the other
    // from WCO when possible: WPos = MPos - WCO.
    if report.work_position.is_none() {
        if let (Some(mpos), Some(wco)) = (report.machine_position, report.work_offset) {
            report.work_position = Some(mpos.minus(&wco));
        }
    }

    Some(report)
}

/// Parse up to four comma-separated axis values; missing axes default to 0
fn parse_axes(value: &str) -> Option<Position4> {
    let mut coords = [0.0f64; 4];
    let mut count = 0;

    for part in value.split(',') {
        let axis = part.trim().parse::<f64>().ok()?;
        if !axis.is_finite() {
            return None;
        }
        if count < 4 {
            coords[count] = axis;
        }
        count += 1;
    }

    if count == 0 {
        return None;
    }

    Some(Position4::new(coords[0], coords[1], coords[2], coords[3]))
}

/// Parse `Bf:blocks,bytes`
fn parse_buffer(value: &str) -> Option<(u16, u16)> {
    let mut parts = value.split(',');
    let blocks = parts.next()?.trim().parse::<u16>().ok()?;
    let bytes = parts.next()?.trim().parse::<u16>().ok()?;
    Some((blocks, bytes))
}

/// Parse a feed/spindle value, tolerating the decimal point GRBL prints
fn parse_rate(value: &str) -> Option<u32> {
    let rate = value.trim().parse::<f64>().ok()?;
    if !rate.is_finite() || rate < 0.0 {
        return None;
    }
    Some(rate.round() as u32)
}

/// Parse `Ov:feed,rapid,spindle`
fn parse_overrides(value: &str) -> Option<OverrideValues> {
    let mut parts = value.split(',');
    let feed = parts.next()?.trim().parse::<u16>().ok()?;
    let rapid = parts.next()?.trim().parse::<u16>().ok()?;
    let spindle = parts.next()?.trim().parse::<u16>().ok()?;
    Some(OverrideValues {
        feed,
        rapid,
        spindle,
    })
}

impl StatusReport {
    /// Merge this report into the live status
    ///
    /// Fields absent from the report keep their previous value, with one
    /// exception: `Pn:` is only reported while a pin is active, so an
    /// absent `Pn:` clears the pin state.
    pub fn apply_to(&self, status: &mut MachineStatus) {
        status.state = self.state;
        if let Some(mpos) = self.machine_position {
            status.machine_position = mpos;
        }
        if let Some(wpos) = self.work_position {
            status.work_position = wpos;
        }
        if let Some(bytes) = self.buffer_available {
            status.buffer_available = bytes;
        }
        if let Some(line) = self.last_line {
            status.last_line = line;
        }
        if let Some(feed) = self.feed_rate {
            status.feed_rate = feed;
        }
        if let Some(speed) = self.spindle_speed {
            status.spindle_speed = speed;
        }
        if let Some(overrides) = self.overrides {
            status.overrides = overrides;
        }
        status.pins = self.pins.unwrap_or_default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_report() {
        let report = parse_status("<Idle>").unwrap();
        assert_eq!(report.state, MachineState::Idle);
        assert!(report.machine_position.is_none());
    }

    #[test]
    fn test_axes_default_to_zero() {
        let report = parse_status("<Idle|MPos:1.000,2.000,3.000>").unwrap();
        assert_eq!(
            report.machine_position,
            Some(Position4::new(1.0, 2.0, 3.0, 0.0))
        );
    }

    #[test]
    fn test_wpos_derived_from_wco() {
        let report = parse_status("<Idle|MPos:10.0,10.0,0.0|WCO:5.0,2.5,0.0>").unwrap();
        assert_eq!(
            report.work_position,
            Some(Position4::new(5.0, 7.5, 0.0, 0.0))
        );
    }

    #[test]
    fn test_malformed_report_rejected() {
        assert!(parse_status("Idle|MPos:0,0,0").is_none());
        assert!(parse_status("<>").is_none());
    }

    #[test]
    fn test_malformed_field_dropped() {
        let report = parse_status("<Run|MPos:garbage|F:500>").unwrap();
        assert!(report.machine_position.is_none());
        assert_eq!(report.feed_rate, Some(500));
    }

    #[test]
    fn test_carry_forward_on_apply() {
        let mut status = MachineStatus::default();
        parse_status("<Run|MPos:1.0,2.0,3.0|F:800>")
            .unwrap()
            .apply_to(&mut status);
        parse_status("<Run|MPos:1.5,2.0,3.0>")
            .unwrap()
            .apply_to(&mut status);

        // Feed rate persists across a report that omits it
        assert_eq!(status.feed_rate, 800);
        assert_eq!(status.machine_position.x, 1.5);
    }

    #[test]
    fn test_pins_clear_when_absent() {
        let mut status = MachineStatus::default();
        parse_status("<Hold:0|Pn:XP>").unwrap().apply_to(&mut status);
        assert!(status.pins.x_limit);
        parse_status("<Hold:0>").unwrap().apply_to(&mut status);
        assert!(!status.pins.any());
    }
}
