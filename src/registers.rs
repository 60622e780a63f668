//! Embedded controller register map for the GPD Win 4 (7840U/8840U).
//!
//! Same layout as the Win Max 2.

/// Manual fan control flag: 0 = firmware (auto), 1 = manual.
pub const REG_MANUAL_ENABLE: u16 = 0x0275;

/// Fan tachometer, high byte.
pub const REG_RPM_HIGH: u16 = 0x0218;

/// Fan tachometer, low byte.
pub const REG_RPM_LOW: u16 = 0x0219;

/// Fan duty cycle in the controller's native range.
pub const REG_PWM: u16 = 0x1809;

/// Lowest duty the PWM register accepts. Zero is not a valid duty here.
pub const PWM_NATIVE_MIN: u8 = 1;

/// Highest duty the PWM register accepts.
pub const PWM_NATIVE_MAX: u8 = 184;

pub const MANUAL_ENABLE_OFF: u8 = 0;
pub const MANUAL_ENABLE_ON: u8 = 1;
