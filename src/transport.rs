// Copyright 2024, F. Stan
//
// Licensed under the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// This file may not be copied, modified, or distributed
// except according to those terms.

use i2cdev::core::*;
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};
use std::error::Error;
use std::fmt;
use std::io;

///
///Transport error enum, including Io error from
///the standard library. Bus when the kernel reports a
///failed transaction (device NACK, arbitration loss,
///timeout)
///
#[derive(Debug)]
pub enum TransportError {
    /// Input/output error
    Io(io::Error),
    /// Bus error when the device does not acknowledge or the transaction times out
    Bus(String),
}
///Implementation for Io error to TransportError
impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Io(e)
    }
}
///Implementation for i2cdev bus errors to TransportError
impl From<LinuxI2CError> for TransportError {
    fn from(e: LinuxI2CError) -> Self {
        TransportError::Bus(e.to_string())
    }
}
///Implementation of display for TransportError
impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TransportError::Io(ref e) => fmt::Display::fmt(e, f),
            TransportError::Bus(ref msg) => write!(f, "Bus transaction failed: {}", msg),
        }
    }
}
///Implementation for Error to TransportError
impl Error for TransportError {}

/// Register-addressed bus operations shared by both sensor drivers.
///
/// The device address is bound into the handle when it is opened, the
/// way `LinuxI2CDevice::new` does it. Implementing this trait for a mock
/// lets the compensation math run without hardware.
pub trait BusTransport {
    /// Read one byte from a device register
    fn read_byte(&mut self, register: u8) -> Result<u8, TransportError>;

    /// Read a block of exactly `length` bytes starting at `register`
    fn read_block(&mut self, register: u8, length: u8) -> Result<Vec<u8>, TransportError>;

    /// Write one byte to a device register
    fn write_byte(&mut self, register: u8, value: u8) -> Result<(), TransportError>;

    /// Write a block of bytes to a device register. A zero-length block
    /// is a valid transaction (the CCS811 boots its firmware off one).
    fn write_block(&mut self, register: u8, bytes: &[u8]) -> Result<(), TransportError>;
}

impl BusTransport for LinuxI2CDevice {
    fn read_byte(&mut self, register: u8) -> Result<u8, TransportError> {
        Ok(self.smbus_read_byte_data(register)?)
    }

    fn read_block(&mut self, register: u8, length: u8) -> Result<Vec<u8>, TransportError> {
        let data = self.smbus_read_i2c_block_data(register, length)?;
        if data.len() != length as usize {
            return Err(TransportError::Bus(format!(
                "short block read from register {:#04x}: expected {} bytes, got {}",
                register,
                length,
                data.len()
            )));
        }
        Ok(data)
    }

    fn write_byte(&mut self, register: u8, value: u8) -> Result<(), TransportError> {
        Ok(self.smbus_write_byte_data(register, value)?)
    }

    fn write_block(&mut self, register: u8, bytes: &[u8]) -> Result<(), TransportError> {
        Ok(self.smbus_write_i2c_block_data(register, bytes)?)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::{BusTransport, TransportError};
    use std::collections::HashMap;

    /// Scripted register map standing in for a real device on the bus.
    /// Reads come from the scripted maps, writes are recorded in order.
    pub(crate) struct MockBus {
        bytes: HashMap<u8, u8>,
        blocks: HashMap<u8, Vec<u8>>,
        pub written: Vec<(u8, Vec<u8>)>,
    }

    impl MockBus {
        pub fn new() -> Self {
            MockBus {
                bytes: HashMap::new(),
                blocks: HashMap::new(),
                written: Vec::new(),
            }
        }

        pub fn set_byte(&mut self, register: u8, value: u8) {
            self.bytes.insert(register, value);
        }

        pub fn set_block(&mut self, register: u8, bytes: &[u8]) {
            self.blocks.insert(register, bytes.to_vec());
        }
    }

    impl BusTransport for MockBus {
        fn read_byte(&mut self, register: u8) -> Result<u8, TransportError> {
            self.bytes.get(&register).copied().ok_or_else(|| {
                TransportError::Bus(format!("no byte scripted for register {:#04x}", register))
            })
        }

        fn read_block(&mut self, register: u8, length: u8) -> Result<Vec<u8>, TransportError> {
            match self.blocks.get(&register) {
                Some(bytes) if bytes.len() >= length as usize => {
                    Ok(bytes[..length as usize].to_vec())
                }
                _ => Err(TransportError::Bus(format!(
                    "no block scripted for register {:#04x}",
                    register
                ))),
            }
        }

        fn write_byte(&mut self, register: u8, value: u8) -> Result<(), TransportError> {
            self.written.push((register, vec![value]));
            Ok(())
        }

        fn write_block(&mut self, register: u8, bytes: &[u8]) -> Result<(), TransportError> {
            self.written.push((register, bytes.to_vec()));
            Ok(())
        }
    }
}
