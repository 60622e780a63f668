//! Addressed access to the embedded controller's RAM over two I/O ports.
//!
//! The EC exposes a 16-bit register space behind an index/data port pair.
//! Every access selects the address with a fixed sequence of control bytes
//! before the data byte is exchanged, so one access is twelve port operations
//! and two accesses must never interleave.

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};
use std::os::unix::fs::FileExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use log::{trace, warn};

use crate::errors::FanControlError;

/// Index port of the EC RAM window on 7840U+ Win 4 units.
pub const EC_ADDR_PORT: u16 = 0x4E;
/// Data port of the EC RAM window.
pub const EC_DATA_PORT: u16 = 0x4F;

/// Index value selecting the control register.
pub const INDEX_CONTROL: u8 = 0x2E;
/// Index value selecting the data register.
pub const INDEX_DATA: u8 = 0x2F;

/// Control byte announcing the address high byte.
pub const CTRL_ADDR_HIGH: u8 = 0x11;
/// Control byte announcing the address low byte.
pub const CTRL_ADDR_LOW: u8 = 0x10;
/// Control byte announcing the data byte.
pub const CTRL_DATA: u8 = 0x12;

/// Byte-wide access to x86 I/O ports.
pub trait PortIo {
    fn outb(&mut self, port: u16, value: u8) -> io::Result<()>;

    fn inb(&mut self, port: u16) -> io::Result<u8>;

    /// Take exclusive ownership of the EC window, blocking while any other
    /// handle (in this or another process) holds it.
    fn lock(&mut self) -> io::Result<()>;

    fn unlock(&mut self) -> io::Result<()>;
}

/// Port I/O through the kernel's `/dev/port` device, where the file offset
/// is the port number.
pub struct DevPort {
    file: File,
}

impl DevPort {
    /// Open the port device read-write. Requires CAP_SYS_RAWIO.
    pub fn open(path: &Path) -> Result<Self, FanControlError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|error| match error.kind() {
                ErrorKind::PermissionDenied => FanControlError::PermissionDenied(format!(
                    "cannot open {}: run as root",
                    path.display()
                )),
                _ => FanControlError::Io(error),
            })?;
        Ok(Self { file })
    }
}

impl PortIo for DevPort {
    fn outb(&mut self, port: u16, value: u8) -> io::Result<()> {
        self.file.write_all_at(&[value], u64::from(port))
    }

    fn inb(&mut self, port: u16) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.file.read_exact_at(&mut buf, u64::from(port))?;
        Ok(buf[0])
    }

    fn lock(&mut self) -> io::Result<()> {
        flock(&self.file, libc::LOCK_EX)
    }

    fn unlock(&mut self) -> io::Result<()> {
        flock(&self.file, libc::LOCK_UN)
    }
}

/// Advisory lock on the port device, shared by every process that opens it.
fn flock(file: &File, operation: libc::c_int) -> io::Result<()> {
    loop {
        if unsafe { libc::flock(file.as_raw_fd(), operation) } == 0 {
            return Ok(());
        }
        let error = io::Error::last_os_error();
        if error.kind() != ErrorKind::Interrupted {
            return Err(error);
        }
    }
}

/// Addressed register reads and writes on top of a [`PortIo`].
///
/// Registers are only reachable through [`EcTransport::lock`], so every
/// access runs under the port lock.
pub struct EcTransport<P> {
    port: P,
}

impl<P: PortIo> EcTransport<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Hold the port lock until the returned guard is dropped.
    pub fn lock(&mut self) -> Result<EcGuard<'_, P>, FanControlError> {
        self.port.lock()?;
        Ok(EcGuard { ec: self })
    }

    fn read(&mut self, address: u16) -> Result<u8, FanControlError> {
        self.select(address)?;
        self.port.outb(EC_ADDR_PORT, INDEX_DATA)?;
        let value = self.port.inb(EC_DATA_PORT)?;
        trace!("ec read  {:#06x} -> {:#04x}", address, value);
        Ok(value)
    }

    fn write(&mut self, address: u16, value: u8) -> Result<(), FanControlError> {
        trace!("ec write {:#06x} <- {:#04x}", address, value);
        self.select(address)?;
        self.port.outb(EC_ADDR_PORT, INDEX_DATA)?;
        self.port.outb(EC_DATA_PORT, value)?;
        Ok(())
    }

    /// Program the address cursor and announce the data byte.
    fn select(&mut self, address: u16) -> io::Result<()> {
        let [high, low] = address.to_be_bytes();
        self.control(CTRL_ADDR_HIGH)?;
        self.data(high)?;
        self.control(CTRL_ADDR_LOW)?;
        self.data(low)?;
        self.control(CTRL_DATA)
    }

    fn control(&mut self, byte: u8) -> io::Result<()> {
        self.port.outb(EC_ADDR_PORT, INDEX_CONTROL)?;
        self.port.outb(EC_DATA_PORT, byte)
    }

    fn data(&mut self, byte: u8) -> io::Result<()> {
        self.port.outb(EC_ADDR_PORT, INDEX_DATA)?;
        self.port.outb(EC_DATA_PORT, byte)
    }
}

/// Exclusive access to the EC for a sequence of register accesses.
pub struct EcGuard<'a, P: PortIo> {
    ec: &'a mut EcTransport<P>,
}

impl<P: PortIo> EcGuard<'_, P> {
    pub fn read(&mut self, address: u16) -> Result<u8, FanControlError> {
        self.ec.read(address)
    }

    pub fn write(&mut self, address: u16, value: u8) -> Result<(), FanControlError> {
        self.ec.write(address, value)
    }
}

impl<P: PortIo> Drop for EcGuard<'_, P> {
    fn drop(&mut self) {
        if let Err(error) = self.ec.port.unlock() {
            warn!("failed to release the EC port lock: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeEc, PortOp};

    fn handshake(address: u16) -> Vec<PortOp> {
        vec![
            PortOp::Out(EC_ADDR_PORT, 0x2E),
            PortOp::Out(EC_DATA_PORT, 0x11),
            PortOp::Out(EC_ADDR_PORT, 0x2F),
            PortOp::Out(EC_DATA_PORT, (address >> 8) as u8),
            PortOp::Out(EC_ADDR_PORT, 0x2E),
            PortOp::Out(EC_DATA_PORT, 0x10),
            PortOp::Out(EC_ADDR_PORT, 0x2F),
            PortOp::Out(EC_DATA_PORT, (address & 0xFF) as u8),
            PortOp::Out(EC_ADDR_PORT, 0x2E),
            PortOp::Out(EC_DATA_PORT, 0x12),
            PortOp::Out(EC_ADDR_PORT, 0x2F),
        ]
    }

    #[test]
    fn write_drives_exact_port_sequence() {
        let fake = FakeEc::new();
        let mut ec = EcTransport::new(fake.clone());

        ec.lock().unwrap().write(0x1809, 0x5D).unwrap();

        let mut expected = handshake(0x1809);
        expected.push(PortOp::Out(EC_DATA_PORT, 0x5D));
        assert_eq!(fake.port_log(), expected);
        assert_eq!(fake.register(0x1809), 0x5D);
    }

    #[test]
    fn read_drives_exact_port_sequence() {
        let fake = FakeEc::new();
        fake.set_register(0x0218, 0x02);
        let mut ec = EcTransport::new(fake.clone());

        assert_eq!(ec.lock().unwrap().read(0x0218).unwrap(), 0x02);

        let mut expected = handshake(0x0218);
        expected.push(PortOp::In(EC_DATA_PORT));
        assert_eq!(fake.port_log(), expected);
        assert!(fake.register_writes().is_empty());
    }

    #[test]
    fn back_to_back_accesses_hit_their_own_registers() {
        let fake = FakeEc::new();
        let mut ec = EcTransport::new(fake.clone());
        let mut guard = ec.lock().unwrap();

        guard.write(0x0275, 1).unwrap();
        guard.write(0x1809, 93).unwrap();
        assert_eq!(guard.read(0x0275).unwrap(), 1);
        assert_eq!(guard.read(0x1809).unwrap(), 93);
        drop(guard);
        assert_eq!(fake.violations(), 0);
        assert_eq!(fake.unlocked_ops(), 0);
        assert!(!fake.is_locked());
    }

    #[test]
    fn port_failure_is_reported() {
        let fake = FakeEc::new();
        fake.fail_after(3);
        let mut ec = EcTransport::new(fake.clone());

        let result = ec.lock().unwrap().write(0x0275, 1);
        assert!(matches!(result, Err(FanControlError::Io(_))));
        assert!(fake.register_writes().is_empty());
        assert!(!fake.is_locked());
    }

    #[test]
    fn open_missing_device_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = DevPort::open(&dir.path().join("no_such_port"));
        assert!(matches!(result, Err(FanControlError::Io(_))));
    }

    #[test]
    fn dev_port_uses_port_number_as_offset() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("port");
        std::fs::write(&path, vec![0u8; 0x50]).unwrap();

        let mut port = DevPort::open(&path).unwrap();
        port.outb(EC_DATA_PORT, 0xAB).unwrap();
        assert_eq!(port.inb(EC_DATA_PORT).unwrap(), 0xAB);
        assert_eq!(port.inb(EC_ADDR_PORT).unwrap(), 0x00);

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents[0x4F], 0xAB);
    }

    #[test]
    fn dev_port_lock_excludes_other_handles() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("port");
        std::fs::write(&path, vec![0u8; 0x50]).unwrap();

        let mut first = DevPort::open(&path).unwrap();
        let mut second = DevPort::open(&path).unwrap();
        first.lock().unwrap();

        let acquired = Arc::new(AtomicBool::new(false));
        let waiter = {
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                second.lock().unwrap();
                acquired.store(true, Ordering::SeqCst);
                second.unlock().unwrap();
            })
        };

        thread::sleep(Duration::from_millis(200));
        assert!(!acquired.load(Ordering::SeqCst));

        first.unlock().unwrap();
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }
}
