//! GRBL real-time command bytes
//!
//! Real-time commands are single bytes picked out of the firmware's serial
//! interrupt, ahead of the line buffer. They bypass the streaming queue and
//! character-counting budget entirely.

/// Real-time commands understood by GRBL v1.1 and derivatives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeCommand {
    /// Request a status report (`?`)
    StatusQuery,
    /// Resume from feed hold (`~`)
    CycleStart,
    /// Pause motion (`!`)
    FeedHold,
    /// Soft reset (Ctrl-X)
    SoftReset,
    /// Cancel an in-progress jog
    JogCancel,
    /// Reset feed override to 100%
    FeedOverrideReset,
    /// Increase feed override by 10%
    FeedOverridePlus10,
    /// Decrease feed override by 10%
    FeedOverrideMinus10,
    /// Reset rapid override to 100%
    RapidOverrideReset,
    /// Set rapid override to 50%
    RapidOverrideMedium,
    /// Set rapid override to 25%
    RapidOverrideLow,
    /// Reset spindle override to 100%
    SpindleOverrideReset,
    /// Increase spindle override by 10%
    SpindleOverridePlus10,
    /// Decrease spindle override by 10%
    SpindleOverrideMinus10,
    /// Toggle spindle stop during feed hold
    SpindleStop,
    /// Toggle flood coolant
    CoolantFloodToggle,
    /// Toggle mist coolant
    CoolantMistToggle,
}

impl RealtimeCommand {
    /// The wire byte for this command
    pub const fn byte(self) -> u8 {
        match self {
            Self::StatusQuery => b'?',
            Self::CycleStart => b'~',
            Self::FeedHold => b'!',
            Self::SoftReset => 0x18,
            Self::JogCancel => 0x85,
            Self::FeedOverrideReset => 0x90,
            Self::FeedOverridePlus10 => 0x91,
            Self::FeedOverrideMinus10 => 0x92,
            Self::RapidOverrideReset => 0x95,
            Self::RapidOverrideMedium => 0x96,
            Self::RapidOverrideLow => 0x97,
            Self::SpindleOverrideReset => 0x99,
            Self::SpindleOverridePlus10 => 0x9A,
            Self::SpindleOverrideMinus10 => 0x9B,
            Self::SpindleStop => 0x9E,
            Self::CoolantFloodToggle => 0xA0,
            Self::CoolantMistToggle => 0xA1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_commands() {
        assert_eq!(RealtimeCommand::StatusQuery.byte(), b'?');
        assert_eq!(RealtimeCommand::CycleStart.byte(), b'~');
        assert_eq!(RealtimeCommand::FeedHold.byte(), b'!');
    }

    #[test]
    fn test_extended_commands() {
        assert_eq!(RealtimeCommand::SoftReset.byte(), 0x18);
        assert_eq!(RealtimeCommand::JogCancel.byte(), 0x85);
        assert_eq!(RealtimeCommand::FeedOverridePlus10.byte(), 0x91);
        assert_eq!(RealtimeCommand::SpindleOverrideMinus10.byte(), 0x9B);
        assert_eq!(RealtimeCommand::CoolantMistToggle.byte(), 0xA1);
    }
}
