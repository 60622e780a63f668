use crate::registers::{PWM_NATIVE_MAX, PWM_NATIVE_MIN};

/// Map a public duty cycle (0–255) onto the controller's native 1–184 range.
///
/// Both ends are pinned so rounding can never leave the valid range, and the
/// interior rounds half up.
pub fn scale(duty: u8) -> u8 {
    match duty {
        u8::MAX => PWM_NATIVE_MAX,
        0 => PWM_NATIVE_MIN,
        _ => {
            let span = u32::from(PWM_NATIVE_MAX - PWM_NATIVE_MIN);
            let max = u32::from(u8::MAX);
            let scaled = (u32::from(duty) * span + max / 2) / max;
            // scaled <= span < 256
            PWM_NATIVE_MIN + scaled as u8
        }
    }
}
