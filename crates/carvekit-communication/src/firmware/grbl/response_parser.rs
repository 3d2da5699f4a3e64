//! GRBL response classification
//!
//! Stateless classifier over each newline-delimited unit coming back from
//! the firmware. Classification is by prefix/shape; anything unrecognized
//! is passed through as [`GrblResponse::Unknown`] so line noise on a
//! half-duplex link can never wedge the engine.

use crate::firmware::grbl::status_parser::{self, StatusReport};
use crate::firmware::{detect_firmware, ControllerType};
use carvekit_core::Position4;
use serde::{Deserialize, Serialize};

/// Classified firmware responses
#[derive(Debug, Clone, PartialEq)]
pub enum GrblResponse {
    /// Line acknowledgement; `ok` carries no line number, `ok:N` does
    Ack {
        /// Line number, when the firmware echoes one (`ok:N`).
        line: Option<u32>,
    },
    /// `error:N` response; the offending line was rejected
    Error(u8),
    /// `ALARM:N` condition; motion is locked out
    Alarm(u8),
    /// `<...>` status report
    Status(StatusReport),
    /// `$N=value` setting line
    Setting(GrblSetting),
    /// `[...]` feedback block
    Feedback(FeedbackMessage),
    /// Startup banner; the controller has (re)booted
    Startup {
        /// Detected firmware family.
        firmware: ControllerType,
        /// Reported version token.
        version: String,
    },
    /// Anything else, passed through untouched
    Unknown(String),
}

/// A `$N=value` settings line, with the parenthesized description old
/// firmware appends (`$0=10 (step pulse, usec)`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrblSetting {
    /// Setting identifier
    pub id: u16,
    /// Raw value text
    pub value: String,
    /// Description, when the firmware prints one
    pub description: Option<String>,
}

/// Sub-classified `[...]` feedback blocks
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackMessage {
    /// `[MSG:...]` operator message
    Message(String),
    /// `[GC:...]` parser modal state
    ParserState(String),
    /// `[VER:...]` version/build details
    Version(String),
    /// `[PRB:x,y,z,a:1]` probe result
    Probe {
        /// Probe contact position.
        position: Position4,
        /// Whether the probe cycle made contact.
        triggered: bool,
    },
    /// `[G54:...]`..`[G59:...]`, `[G28:...]`, `[G30:...]`, `[TLO:...]`
    /// stored offset reports
    WorkOffset {
        /// Offset label (`G54`, `G28`, `TLO`, ...).
        label: String,
        /// Offset value.
        offset: Position4,
    },
    /// Any other bracketed block
    Other(String),
}

impl GrblResponse {
    /// Classify one trimmed response line
    pub fn parse(line: &str) -> GrblResponse {
        let line = line.trim();

        if line == "ok" {
            return GrblResponse::Ack { line: None };
        }

        if let Some(rest) = line.strip_prefix("ok:") {
            return match rest.trim().parse::<u32>() {
                Ok(n) => GrblResponse::Ack { line: Some(n) },
                Err(_) => GrblResponse::Unknown(line.to_string()),
            };
        }

        if let Some(rest) = line.strip_prefix("error:") {
            // grblHAL may append detail after a second colon
            let code = rest.split(':').next().unwrap_or_default().trim();
            return match code.parse::<u8>() {
                Ok(code) => GrblResponse::Error(code),
                Err(_) => GrblResponse::Unknown(line.to_string()),
            };
        }

        if let Some(rest) = line.strip_prefix("ALARM:") {
            return match rest.trim().parse::<u8>() {
                Ok(code) => GrblResponse::Alarm(code),
                Err(_) => GrblResponse::Unknown(line.to_string()),
            };
        }

        if line.starts_with('<') {
            return match status_parser::parse_status(line) {
                Some(report) => GrblResponse::Status(report),
                None => GrblResponse::Unknown(line.to_string()),
            };
        }

        if line.starts_with('[') && line.ends_with(']') {
            return GrblResponse::Feedback(parse_feedback(&line[1..line.len() - 1]));
        }

        if line.starts_with('$') && line.contains('=') {
            if let Some(setting) = parse_setting(line) {
                return GrblResponse::Setting(setting);
            }
            return GrblResponse::Unknown(line.to_string());
        }

        if let Some((firmware, version)) = detect_firmware(line) {
            return GrblResponse::Startup { firmware, version };
        }

        GrblResponse::Unknown(line.to_string())
    }
}

/// Parse the content of a `[...]` block
fn parse_feedback(content: &str) -> FeedbackMessage {
    if let Some(msg) = content.strip_prefix("MSG:") {
        return FeedbackMessage::Message(msg.trim().to_string());
    }
    if let Some(state) = content.strip_prefix("GC:") {
        return FeedbackMessage::ParserState(state.trim().to_string());
    }
    if let Some(version) = content.strip_prefix("VER:") {
        return FeedbackMessage::Version(version.trim().to_string());
    }
    if let Some(probe) = content.strip_prefix("PRB:") {
        if let Some(result) = parse_probe(probe) {
            return result;
        }
        return FeedbackMessage::Other(content.to_string());
    }

    // Stored offset labels: [G54:0.000,0.000,0.000] etc.
    if let Some((label, value)) = content.split_once(':') {
        if is_offset_label(label) {
            if let Some(offset) = parse_position(value) {
                return FeedbackMessage::WorkOffset {
                    label: label.to_string(),
                    offset,
                };
            }
        }
    }

    FeedbackMessage::Other(content.to_string())
}

fn is_offset_label(label: &str) -> bool {
    matches!(
        label,
        "G54" | "G55" | "G56" | "G57" | "G58" | "G59" | "G28" | "G30" | "G92" | "TLO"
    )
}

/// Parse `PRB:x,y,z[,a]:success`
fn parse_probe(content: &str) -> Option<FeedbackMessage> {
    let (coords, success) = content.rsplit_once(':')?;
    let position = parse_position(coords)?;
    let triggered = success.trim() == "1";
    Some(FeedbackMessage::Probe {
        position,
        triggered,
    })
}

fn parse_position(value: &str) -> Option<Position4> {
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

/// Parse `$N=value` with optional `(description)`
fn parse_setting(line: &str) -> Option<GrblSetting> {
    let rest = line.strip_prefix('$')?;
    let (id, value) = rest.split_once('=')?;
    let id = id.trim().parse::<u16>().ok()?;

    let value = value.trim();
    let (value, description) = match value.split_once('(') {
        Some((v, desc)) => (
            v.trim().to_string(),
            Some(desc.trim_end_matches(')').trim().to_string()),
        ),
        None => (value.to_string(), None),
    };

    Some(GrblSetting {
        id,
        value,
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ack() {
        assert_eq!(GrblResponse::parse("ok"), GrblResponse::Ack { line: None });
    }

    #[test]
    fn test_numbered_ack() {
        assert_eq!(
            GrblResponse::parse("ok:12"),
            GrblResponse::Ack { line: Some(12) }
        );
    }

    #[test]
    fn test_error_with_detail_suffix() {
        assert_eq!(GrblResponse::parse("error:9"), GrblResponse::Error(9));
        assert_eq!(
            GrblResponse::parse("error:20:Unsupported command"),
            GrblResponse::Error(20)
        );
    }

    #[test]
    fn test_alarm() {
        assert_eq!(GrblResponse::parse("ALARM:1"), GrblResponse::Alarm(1));
    }

    #[test]
    fn test_setting_with_description() {
        let response = GrblResponse::parse("$0=10 (step pulse, usec)");
        match response {
            GrblResponse::Setting(setting) => {
                assert_eq!(setting.id, 0);
                assert_eq!(setting.value, "10");
                assert_eq!(setting.description.as_deref(), Some("step pulse, usec"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_probe_feedback() {
        let response = GrblResponse::parse("[PRB:1.000,2.000,-5.500:1]");
        match response {
            GrblResponse::Feedback(FeedbackMessage::Probe {
                position,
                triggered,
            }) => {
                assert_eq!(position, Position4::new(1.0, 2.0, -5.5, 0.0));
                assert!(triggered);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_noise_is_unknown() {
        assert!(matches!(
            GrblResponse::parse("\u{0}\u{0}garbage"),
            GrblResponse::Unknown(_)
        ));
        assert!(matches!(
            GrblResponse::parse("error:notanumber"),
            GrblResponse::Unknown(_)
        ));
    }
}
