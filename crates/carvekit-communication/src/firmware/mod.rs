//! Firmware support for GRBL-family controllers
//!
//! Supported firmware:
//! - GRBL v1.1: the reference implementation
//! - grblHAL: enhanced GRBL with extended error/alarm codes
//! - FluidNC: ESP32 GRBL derivative (reports a GRBL-compatible protocol)

pub mod grbl;

/// Supported controller firmware families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerType {
    /// GRBL v1.1 (default, most common)
    #[default]
    Grbl,
    /// grblHAL (enhanced GRBL)
    GrblHal,
    /// FluidNC
    FluidNC,
    /// Unknown/generic
    Unknown,
}

impl std::fmt::Display for ControllerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grbl => write!(f, "GRBL"),
            Self::GrblHal => write!(f, "grblHAL"),
            Self::FluidNC => write!(f, "FluidNC"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Identify firmware from its startup banner
///
/// Recognized banner shapes:
/// - `Grbl 1.1h ['$' for help]`
/// - `GrblHAL 1.1f ['$' or '$HELP' for help]`
/// - `Grbl 3.7 [FluidNC v3.7.8 ...]` / `FluidNC v3.7.8`
///
/// Returns the firmware family and its version token, or `None` when the
/// line is not a startup banner.
pub fn detect_firmware(line: &str) -> Option<(ControllerType, String)> {
    let line = line.trim();

    let (kind, rest) = if let Some(rest) = line.strip_prefix("GrblHAL ") {
        (ControllerType::GrblHal, rest)
    } else if let Some(rest) = line.strip_prefix("FluidNC ") {
        (ControllerType::FluidNC, rest)
    } else if let Some(rest) = line.strip_prefix("Grbl ") {
        if line.contains("FluidNC") {
            (ControllerType::FluidNC, rest)
        } else {
            (ControllerType::Grbl, rest)
        }
    } else {
        return None;
    };

    let version = rest
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string();
    Some((kind, version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_grbl_banner() {
        let (kind, version) = detect_firmware("Grbl 1.1h ['$' for help]").unwrap();
        assert_eq!(kind, ControllerType::Grbl);
        assert_eq!(version, "1.1h");
    }

    #[test]
    fn test_detect_grblhal_banner() {
        let (kind, version) = detect_firmware("GrblHAL 1.1f ['$' or '$HELP' for help]").unwrap();
        assert_eq!(kind, ControllerType::GrblHal);
        assert_eq!(version, "1.1f");
    }

    #[test]
    fn test_detect_fluidnc_banner() {
        let (kind, _) = detect_firmware("Grbl 3.7 [FluidNC v3.7.8 (wifi) '$' for help]").unwrap();
        assert_eq!(kind, ControllerType::FluidNC);
    }

    #[test]
    fn test_non_banner_lines() {
        assert!(detect_firmware("ok").is_none());
        assert!(detect_firmware("<Idle|MPos:0,0,0>").is_none());
    }
}
