//! Attachment lifecycle: firmware gate, hardware claim, and teardown.

use std::path::Path;

use log::{info, warn};

use crate::config::Config;
use crate::controller::FanController;
use crate::dmi::{DmiInfo, DmiMatch};
use crate::ec::{DevPort, EcTransport, PortIo};
use crate::errors::FanControlError;
use crate::fan::FanStatus;
use crate::hwmon::HwmonAdapter;
use crate::registers::{MANUAL_ENABLE_ON, REG_MANUAL_ENABLE, REG_PWM, REG_RPM_HIGH, REG_RPM_LOW};

/// Check the firmware identity, failing with `NoSuchDevice` on any machine
/// not in the supported table.
pub fn identify(dmi_dir: &Path) -> Result<&'static DmiMatch, FanControlError> {
    let info = DmiInfo::read_from(dmi_dir);
    info.matching_system().ok_or_else(|| {
        FanControlError::NoSuchDevice(format!(
            "unsupported system '{}' '{}'",
            info.sys_vendor, info.product_name
        ))
    })
}

/// Read the live fan registers without taking ownership of the fan.
///
/// The port lock is held for the whole read, so an attached controller in
/// another process cannot interleave. No mode is changed and nothing is
/// restored afterwards.
pub fn inspect(config: &Config) -> Result<FanStatus, FanControlError> {
    let system = identify(&config.dmi_dir)?;
    let mut ec = EcTransport::new(DevPort::open(&config.port_device)?);
    read_status(system, &mut ec)
}

fn read_status<P: PortIo>(
    system: &DmiMatch,
    ec: &mut EcTransport<P>,
) -> Result<FanStatus, FanControlError> {
    let mut ec = ec.lock()?;
    let rpm = u16::from_be_bytes([ec.read(REG_RPM_HIGH)?, ec.read(REG_RPM_LOW)?]);
    let manual = ec.read(REG_MANUAL_ENABLE)? == MANUAL_ENABLE_ON;
    let native_pwm = ec.read(REG_PWM)?;
    Ok(FanStatus {
        system: system.description.to_string(),
        rpm,
        manual,
        duty: None,
        native_pwm: Some(native_pwm),
    })
}

/// An attached fan. Dropping or detaching it returns the fan to firmware
/// control.
pub struct FanDevice<P: PortIo> {
    system: &'static DmiMatch,
    controller: FanController<P>,
    detached: bool,
}

impl FanDevice<DevPort> {
    /// Gate on the firmware identity, then claim the port device.
    pub fn attach(config: &Config) -> Result<Self, FanControlError> {
        let system = identify(&config.dmi_dir)?;
        let port = DevPort::open(&config.port_device)?;
        Ok(Self::new(system, port))
    }
}

impl<P: PortIo> FanDevice<P> {
    pub fn new(system: &'static DmiMatch, port: P) -> Self {
        info!("{} fan control loaded", system.description);
        Self {
            system,
            controller: FanController::new(port),
            detached: false,
        }
    }

    pub fn system(&self) -> &'static DmiMatch {
        self.system
    }

    pub fn controller(&self) -> &FanController<P> {
        &self.controller
    }

    pub fn hwmon(&self) -> HwmonAdapter<'_, P> {
        HwmonAdapter::new(&self.controller)
    }

    pub fn status(&self) -> Result<FanStatus, FanControlError> {
        let rpm = self.controller.read_rpm()?;
        let state = self.controller.state();
        Ok(FanStatus {
            system: self.system.description.to_string(),
            rpm,
            manual: state.manual_mode,
            duty: state.manual_mode.then_some(state.duty_value),
            native_pwm: None,
        })
    }

    /// Hand the fan back to the EC firmware and release the port.
    ///
    /// On failure the drop that follows retries once more.
    pub fn detach(mut self) -> Result<(), FanControlError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), FanControlError> {
        if self.detached {
            return Ok(());
        }
        self.controller.enter_auto()?;
        self.detached = true;
        info!("{} fan control unloaded", self.system.description);
        Ok(())
    }
}

impl<P: PortIo> Drop for FanDevice<P> {
    fn drop(&mut self) {
        if let Err(error) = self.release() {
            warn!("failed to return fan to firmware control: {}", error);
        }
    }
}
