//! Fan mode state machine on top of the EC transport.
//!
//! One mutex guards both the transport and [`FanState`], and it is held for
//! a whole logical operation together with the cross-process port lock. The
//! manual flag and the EC's manual-enable register therefore change inside
//! the same critical section.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info};

use crate::duty;
use crate::ec::{EcGuard, EcTransport, PortIo};
use crate::errors::FanControlError;
use crate::registers::{
    MANUAL_ENABLE_OFF, MANUAL_ENABLE_ON, REG_MANUAL_ENABLE, REG_PWM, REG_RPM_HIGH, REG_RPM_LOW,
};

/// Duty applied on the first switch to manual mode: full speed.
pub const DEFAULT_DUTY: u8 = u8::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanState {
    /// Last duty cycle (0–255) requested by a caller. Kept while in auto
    /// mode so the next switch to manual reapplies it.
    pub duty_value: u8,
    /// Mirrors the EC manual-enable register.
    pub manual_mode: bool,
}

impl Default for FanState {
    fn default() -> Self {
        Self {
            duty_value: DEFAULT_DUTY,
            manual_mode: false,
        }
    }
}

struct Inner<P> {
    ec: EcTransport<P>,
    state: FanState,
}

/// Program the duty register, then hand the fan to it.
fn apply_duty<P: PortIo>(
    ec: &mut EcGuard<'_, P>,
    state: &mut FanState,
    duty_value: u8,
) -> Result<(), FanControlError> {
    let native = duty::scale(duty_value);
    debug!("applying duty {} (native {})", duty_value, native);
    ec.write(REG_PWM, native)?;
    ec.write(REG_MANUAL_ENABLE, MANUAL_ENABLE_ON)?;
    state.manual_mode = true;
    Ok(())
}

pub struct FanController<P> {
    inner: Mutex<Inner<P>>,
}

impl<P: PortIo> FanController<P> {
    /// Wrap a claimed port in a controller starting in auto mode.
    ///
    /// Nothing is written to the EC until the first operation.
    pub fn new(port: P) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ec: EcTransport::new(port),
                state: FanState::default(),
            }),
        }
    }

    // A panic mid-operation must not keep teardown from restoring auto mode.
    fn lock(&self) -> MutexGuard<'_, Inner<P>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> FanState {
        self.lock().state
    }

    /// Live tachometer reading in RPM.
    pub fn read_rpm(&self) -> Result<u16, FanControlError> {
        let mut inner = self.lock();
        let mut ec = inner.ec.lock()?;
        let high = ec.read(REG_RPM_HIGH)?;
        let low = ec.read(REG_RPM_LOW)?;
        Ok(u16::from_be_bytes([high, low]))
    }

    /// Remember `duty_value`, and apply it right away when in manual mode.
    pub fn set_duty(&self, duty_value: u8) -> Result<(), FanControlError> {
        let mut inner = self.lock();
        let Inner { ec, state } = &mut *inner;
        state.duty_value = duty_value;
        if !state.manual_mode {
            debug!("stored duty {} for the next manual switch", duty_value);
            return Ok(());
        }
        let mut ec = ec.lock()?;
        apply_duty(&mut ec, state, duty_value)
    }

    pub fn enter_manual(&self) -> Result<(), FanControlError> {
        let mut inner = self.lock();
        let Inner { ec, state } = &mut *inner;
        let duty_value = state.duty_value;
        apply_duty(&mut ec.lock()?, state, duty_value)?;
        info!("fan in manual mode at duty {}", duty_value);
        Ok(())
    }

    /// Return the fan to the EC firmware. The stored duty is kept.
    pub fn enter_auto(&self) -> Result<(), FanControlError> {
        let mut inner = self.lock();
        let Inner { ec, state } = &mut *inner;
        ec.lock()?.write(REG_MANUAL_ENABLE, MANUAL_ENABLE_OFF)?;
        state.manual_mode = false;
        info!("fan returned to firmware control");
        Ok(())
    }
}
