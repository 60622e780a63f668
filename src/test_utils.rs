//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::ec::{
    PortIo, CTRL_ADDR_HIGH, CTRL_ADDR_LOW, CTRL_DATA, EC_ADDR_PORT, EC_DATA_PORT, INDEX_CONTROL,
    INDEX_DATA,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortOp {
    Out(u16, u8),
    In(u16),
}

#[derive(Default)]
struct FakeEcState {
    registers: HashMap<u16, u8>,
    index: Option<u8>,
    control: Option<u8>,
    address_high: Option<u8>,
    address_low: Option<u8>,
    port_log: Vec<PortOp>,
    register_writes: Vec<(u16, u8)>,
    violations: usize,
    unlocked_ops: usize,
    ops_before_failure: Option<usize>,
    failures_pending: usize,
}

impl FakeEcState {
    fn consume_op(&mut self) -> io::Result<()> {
        if self.failures_pending > 0 {
            self.failures_pending -= 1;
            return Err(io::Error::new(io::ErrorKind::Other, "injected port failure"));
        }
        match self.ops_before_failure {
            Some(0) => Err(io::Error::new(io::ErrorKind::Other, "injected port failure")),
            Some(ref mut remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Address latched by the handshake, consumed by the data exchange.
    fn take_address(&mut self) -> Option<u16> {
        let high = self.address_high.take();
        let low = self.address_low.take();
        self.control = None;
        match (high, low) {
            (Some(high), Some(low)) => Some(u16::from_be_bytes([high, low])),
            _ => None,
        }
    }

    fn write_data_port(&mut self, value: u8) {
        match self.index {
            Some(INDEX_CONTROL) => {
                let in_order = match value {
                    CTRL_ADDR_HIGH => {
                        self.address_high = None;
                        self.address_low = None;
                        true
                    }
                    CTRL_ADDR_LOW => self.address_high.is_some(),
                    CTRL_DATA => self.address_high.is_some() && self.address_low.is_some(),
                    _ => false,
                };
                if !in_order {
                    self.violations += 1;
                }
                self.control = Some(value);
            }
            Some(INDEX_DATA) => match self.control {
                Some(CTRL_ADDR_HIGH) => self.address_high = Some(value),
                Some(CTRL_ADDR_LOW) => self.address_low = Some(value),
                Some(CTRL_DATA) => match self.take_address() {
                    Some(address) => {
                        self.registers.insert(address, value);
                        self.register_writes.push((address, value));
                    }
                    None => self.violations += 1,
                },
                _ => self.violations += 1,
            },
            _ => self.violations += 1,
        }
    }

    fn read_data_port(&mut self) -> u8 {
        if self.index != Some(INDEX_DATA) || self.control != Some(CTRL_DATA) {
            self.violations += 1;
            return 0xFF;
        }
        match self.take_address() {
            Some(address) => self.registers.get(&address).copied().unwrap_or(0),
            None => {
                self.violations += 1;
                0xFF
            }
        }
    }
}

/// In-memory embedded controller speaking the index/data handshake.
///
/// Clones share state, so a test keeps one handle for inspection after
/// handing another to the code under test.
#[derive(Clone, Default)]
pub struct FakeEc {
    state: Arc<Mutex<FakeEcState>>,
    /// Port lock shared by every handle, like flock on one device.
    port_lock: Arc<(Mutex<bool>, Condvar)>,
}

impl FakeEc {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeEcState> {
        self.state.lock().unwrap()
    }

    pub fn register(&self, address: u16) -> u8 {
        self.state().registers.get(&address).copied().unwrap_or(0)
    }

    pub fn set_register(&self, address: u16, value: u8) {
        self.state().registers.insert(address, value);
    }

    pub fn port_log(&self) -> Vec<PortOp> {
        self.state().port_log.clone()
    }

    /// Every completed register write, in order.
    pub fn register_writes(&self) -> Vec<(u16, u8)> {
        self.state().register_writes.clone()
    }

    pub fn clear_log(&self) {
        let mut state = self.state();
        state.port_log.clear();
        state.register_writes.clear();
    }

    /// Handshake steps that arrived out of order.
    pub fn violations(&self) -> usize {
        self.state().violations
    }

    /// Let `ops` more port operations succeed, then fail every one after.
    pub fn fail_after(&self, ops: usize) {
        self.state().ops_before_failure = Some(ops);
    }

    /// Fail the next `ops` port operations, then recover.
    pub fn fail_next(&self, ops: usize) {
        self.state().failures_pending = ops;
    }

    pub fn heal(&self) {
        let mut state = self.state();
        state.ops_before_failure = None;
        state.failures_pending = 0;
    }

    /// Port operations issued while no handle held the port lock.
    pub fn unlocked_ops(&self) -> usize {
        self.state().unlocked_ops
    }

    pub fn is_locked(&self) -> bool {
        *self.port_lock.0.lock().unwrap()
    }

    fn count_unlocked_op(&self, state: &mut FakeEcState) {
        if !self.is_locked() {
            state.unlocked_ops += 1;
        }
    }
}

impl PortIo for FakeEc {
    fn outb(&mut self, port: u16, value: u8) -> io::Result<()> {
        let mut state = self.state();
        state.consume_op()?;
        self.count_unlocked_op(&mut state);
        state.port_log.push(PortOp::Out(port, value));
        match port {
            EC_ADDR_PORT => state.index = Some(value),
            EC_DATA_PORT => state.write_data_port(value),
            _ => state.violations += 1,
        }
        Ok(())
    }

    fn inb(&mut self, port: u16) -> io::Result<u8> {
        let mut state = self.state();
        state.consume_op()?;
        self.count_unlocked_op(&mut state);
        state.port_log.push(PortOp::In(port));
        if port != EC_DATA_PORT {
            state.violations += 1;
            return Ok(0xFF);
        }
        Ok(state.read_data_port())
    }

    fn lock(&mut self) -> io::Result<()> {
        let (held, released) = &*self.port_lock;
        let mut held = held.lock().unwrap();
        while *held {
            held = released.wait(held).unwrap();
        }
        *held = true;
        Ok(())
    }

    fn unlock(&mut self) -> io::Result<()> {
        let (held, released) = &*self.port_lock;
        *held.lock().unwrap() = false;
        released.notify_one();
        Ok(())
    }
}
