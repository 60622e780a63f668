use std::fmt;

use serde::Serialize;

/// Snapshot of the fan for display.
#[derive(Debug, Clone, Serialize)]
pub struct FanStatus {
    /// Machine the fan belongs to (e.g. "GPD Win 4 (7840U/8840U)")
    pub system: String,
    /// Current speed in RPM
    pub rpm: u16,
    /// Whether the duty cycle, not the EC firmware, drives the fan
    pub manual: bool,
    /// Requested duty cycle 0–255, when known and applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duty: Option<u8>,
    /// Raw PWM register value 1–184, when read directly from the EC
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_pwm: Option<u8>,
}

impl fmt::Display for FanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.manual { "manual" } else { "auto" };
        write!(f, "{}: {} RPM [{}", self.system, self.rpm, mode)?;
        if let Some(duty) = self.duty {
            write!(f, ", duty {}", duty)?;
        }
        if let Some(native) = self.native_pwm {
            write!(f, ", pwm register {}", native)?;
        }
        write!(f, "]")
    }
}
