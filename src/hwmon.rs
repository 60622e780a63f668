//! hwmon-style attribute surface over the fan controller.
//!
//! Exposes one fan and one PWM channel using the sysfs naming convention:
//! `fan1_input` (RPM), `pwm1_enable` (0 = auto, 1 = manual) and `pwm1`
//! (duty 0–255).

use std::fmt;
use std::str::FromStr;

use crate::controller::FanController;
use crate::ec::PortIo;
use crate::errors::FanControlError;

pub const MODE_READ_ONLY: u32 = 0o444;
pub const MODE_READ_WRITE: u32 = 0o644;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorType {
    Fan,
    Pwm,
    Temp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorAttr {
    Input,
    Enable,
    Label,
}

/// One sensor attribute; `channel` is zero-based, names are one-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    pub sensor: SensorType,
    pub attr: SensorAttr,
    pub channel: u32,
}

impl Attribute {
    pub const FAN_INPUT: Attribute = Attribute::new(SensorType::Fan, SensorAttr::Input);
    pub const PWM_ENABLE: Attribute = Attribute::new(SensorType::Pwm, SensorAttr::Enable);
    pub const PWM_INPUT: Attribute = Attribute::new(SensorType::Pwm, SensorAttr::Input);

    const fn new(sensor: SensorType, attr: SensorAttr) -> Self {
        Self {
            sensor,
            attr,
            channel: 0,
        }
    }
}

/// Attributes published by this chip.
pub const ATTRIBUTES: [Attribute; 3] = [
    Attribute::FAN_INPUT,
    Attribute::PWM_ENABLE,
    Attribute::PWM_INPUT,
];

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.sensor {
            SensorType::Fan => "fan",
            SensorType::Pwm => "pwm",
            SensorType::Temp => "temp",
        };
        let suffix = match (self.sensor, self.attr) {
            (SensorType::Pwm, SensorAttr::Input) => "",
            (_, SensorAttr::Input) => "_input",
            (_, SensorAttr::Enable) => "_enable",
            (_, SensorAttr::Label) => "_label",
        };
        write!(f, "{}{}{}", prefix, self.channel + 1, suffix)
    }
}

impl FromStr for Attribute {
    type Err = FanControlError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let unknown = || FanControlError::Unsupported(format!("unknown attribute '{}'", name));

        let (sensor, rest) = [
            ("fan", SensorType::Fan),
            ("pwm", SensorType::Pwm),
            ("temp", SensorType::Temp),
        ]
        .iter()
        .find_map(|(prefix, sensor)| name.strip_prefix(prefix).map(|rest| (*sensor, rest)))
        .ok_or_else(unknown)?;

        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (digits, suffix) = rest.split_at(digits_end);
        // Only the spelling Display produces: no zero padding, no index 0.
        if digits.starts_with('0') {
            return Err(unknown());
        }
        let index: u32 = digits.parse().map_err(|_| unknown())?;

        let attr = match (sensor, suffix) {
            (SensorType::Pwm, "") => SensorAttr::Input,
            (SensorType::Pwm, "_input") => return Err(unknown()),
            (_, "_input") => SensorAttr::Input,
            (_, "_enable") => SensorAttr::Enable,
            (_, "_label") => SensorAttr::Label,
            _ => return Err(unknown()),
        };

        Ok(Attribute {
            sensor,
            attr,
            channel: index - 1,
        })
    }
}

/// Translates attribute reads and writes into controller operations.
pub struct HwmonAdapter<'a, P> {
    controller: &'a FanController<P>,
}

impl<'a, P: PortIo> HwmonAdapter<'a, P> {
    pub fn new(controller: &'a FanController<P>) -> Self {
        Self { controller }
    }

    /// File mode the attribute would be published with; 0 means absent.
    pub fn is_visible(&self, attribute: Attribute) -> u32 {
        match attribute {
            Attribute::FAN_INPUT => MODE_READ_ONLY,
            Attribute::PWM_ENABLE | Attribute::PWM_INPUT => MODE_READ_WRITE,
            _ => 0,
        }
    }

    pub fn read(&self, attribute: Attribute) -> Result<i64, FanControlError> {
        match attribute {
            Attribute::FAN_INPUT => Ok(i64::from(self.controller.read_rpm()?)),
            Attribute::PWM_ENABLE => Ok(i64::from(self.controller.state().manual_mode)),
            Attribute::PWM_INPUT => {
                let state = self.controller.state();
                // 0 while the firmware drives the fan
                Ok(if state.manual_mode {
                    i64::from(state.duty_value)
                } else {
                    0
                })
            }
            other => Err(FanControlError::Unsupported(format!("cannot read {}", other))),
        }
    }

    pub fn write(&self, attribute: Attribute, value: i64) -> Result<(), FanControlError> {
        match attribute {
            Attribute::PWM_ENABLE => match value {
                1 => self.controller.enter_manual(),
                0 => self.controller.enter_auto(),
                _ => Err(FanControlError::InvalidArgument(format!(
                    "{}: {} is not 0 (auto) or 1 (manual)",
                    attribute, value
                ))),
            },
            Attribute::PWM_INPUT => {
                let duty = u8::try_from(value).map_err(|_| {
                    FanControlError::InvalidArgument(format!(
                        "{}: {} out of range (0–255)",
                        attribute, value
                    ))
                })?;
                self.controller.set_duty(duty)
            }
            other => Err(FanControlError::Unsupported(format!("cannot write {}", other))),
        }
    }
}
