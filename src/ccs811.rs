// Copyright 2024, F. Stan
//
// Licensed under the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// This file may not be copied, modified, or distributed
// except according to those terms.

//! CCS811 eCO2/TVOC gas sensor.
//!
//! Protocol from the
//! [datasheet](https://cdn.sparkfun.com/assets/learn_tutorials/1/4/3/CCS811_Datasheet-DS000459.pdf):
//! boot the application firmware, set a measurement drive mode, poll the
//! data-ready flag and read the algorithm result block. Ambient humidity
//! and temperature can be written back to the device to improve the gas
//! algorithm's accuracy.

use log::debug;
use std::fmt;

use crate::decode;
use crate::transport::{BusTransport, TransportError};
use i2cdev::linux::LinuxI2CDevice;

/// CCS811 I2C default slave address
pub const CCS811_ADDR: u16 = 0x5B;

const REG_STATUS: u8 = 0x00;
const REG_MEAS_MODE: u8 = 0x01;
const REG_ALG_RESULT_DATA: u8 = 0x02;
const REG_ENV_DATA: u8 = 0x05;
const REG_APP_START: u8 = 0xF4;

const ALG_RESULT_LEN: u8 = 8;
const STATUS_DATA_READY: u8 = 1 << 3;

// Valid concentration ranges, both bounds exclusive. Readings outside
// are sporadic corrupt bursts and never reach the caller.
const ECO2_FLOOR_PPM: u16 = 400;
const ECO2_CEIL_PPM: u16 = 8192;
const TVOC_FLOOR_PPB: u16 = 0;
const TVOC_CEIL_PPB: u16 = 1187;

/// Measurement cadence written to the drive-mode field of the
/// measurement mode register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveMode {
    Idle,
    Ms250,
    Sec1,
    Sec10,
    Sec60,
}

impl DriveMode {
    const DRIVE_MODE_IDLE: u8 = 0x00;
    const DRIVE_MODE_1SEC: u8 = 0x01;
    const DRIVE_MODE_10SEC: u8 = 0x02;
    const DRIVE_MODE_60SEC: u8 = 0x03;
    const DRIVE_MODE_250MS: u8 = 0x04;

    fn value(&self) -> u8 {
        match *self {
            DriveMode::Idle => Self::DRIVE_MODE_IDLE,
            DriveMode::Ms250 => Self::DRIVE_MODE_250MS,
            DriveMode::Sec1 => Self::DRIVE_MODE_1SEC,
            DriveMode::Sec10 => Self::DRIVE_MODE_10SEC,
            DriveMode::Sec60 => Self::DRIVE_MODE_60SEC,
        }
    }
}

impl fmt::Display for DriveMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DriveMode::Idle => write!(f, "Idle"),
            DriveMode::Ms250 => write!(f, "Ms250"),
            DriveMode::Sec1 => write!(f, "Sec1"),
            DriveMode::Sec10 => write!(f, "Sec10"),
            DriveMode::Sec60 => write!(f, "Sec60"),
        }
    }
}

/// CCS811 struct, owns the bus handle for its device address and the
/// last valid eCO2/TVOC pair
///
pub struct Ccs811<B: BusTransport> {
    pub bus: B,
    drive_mode: DriveMode,
    tvoc: u16,
    eco2: u16,
}

impl Ccs811<LinuxI2CDevice> {
    /// Create a new CCS811 struct on the standard address 0x5B.
    ///
    /// Boots the application firmware and starts measuring once per
    /// second. If any bus operation fails, returns the TransportError.
    ///
    pub fn new() -> Result<Self, TransportError> {
        let device = LinuxI2CDevice::new("/dev/i2c-1", CCS811_ADDR)?;
        Self::from_device(device)
    }
}

impl<B: BusTransport> Ccs811<B> {
    /// Create a CCS811 struct over any bus transport, for a
    /// non-default bus path or address.
    ///
    pub fn from_device(bus: B) -> Result<Self, TransportError> {
        let mut sensor = Ccs811 {
            bus,
            drive_mode: DriveMode::Sec1,
            tvoc: 0,
            eco2: 0,
        };
        // a zero-length block write boots the application firmware
        sensor.bus.write_block(REG_APP_START, &[])?;
        sensor.set_drive_mode(DriveMode::Sec1)?;
        Ok(sensor)
    }

    /// Set the measurement cadence. The drive mode occupies bits 6-4 of
    /// the measurement mode register; the interrupt enable bit stays
    /// clear since data readiness is polled.
    ///
    pub fn set_drive_mode(&mut self, mode: DriveMode) -> Result<(), TransportError> {
        let meas_mode = mode.value() << 4;
        debug!("Setting measurement mode register to {meas_mode:#010b} ({mode})");
        self.bus.write_byte(REG_MEAS_MODE, meas_mode)?;
        self.drive_mode = mode;
        Ok(())
    }

    /// Current measurement cadence.
    pub fn drive_mode(&self) -> DriveMode {
        self.drive_mode
    }

    /// Gets if a fresh measurement is waiting in the result registers.
    /// Reads the status register; bit 3 is the data-ready flag.
    ///
    pub fn ready(&mut self) -> Result<bool, TransportError> {
        let status = self.bus.read_byte(REG_STATUS)?;
        Ok(status & STATUS_DATA_READY != 0)
    }

    /// Write ambient humidity (%) and temperature (Celsius) back to the
    /// device for the gas algorithm. The sensor's power-on assumption is
    /// 50 % and 25 C; call this whenever better values are known.
    ///
    /// Both values are encoded in 1/512 steps, the temperature with a
    /// +25 C offset. Inputs below the encodable floor saturate to zero.
    ///
    pub fn compensate(
        &mut self,
        humidity_pct: f64,
        temperature_c: f64,
    ) -> Result<(), TransportError> {
        let hum = (humidity_pct * 512.0).round() as u16;
        let temp = ((temperature_c + 25.0) * 512.0).round() as u16;
        let env = [
            (hum >> 8) as u8,
            (hum & 0xFF) as u8,
            (temp >> 8) as u8,
            (temp & 0xFF) as u8,
        ];
        debug!("Writing environment data {env:02x?}");
        self.bus.write_block(REG_ENV_DATA, &env)
    }

    /// Read the algorithm result block if a fresh measurement is ready.
    ///
    /// Does nothing when no new data is waiting; that is a normal tick,
    /// not an error. A fresh eCO2 or TVOC value is committed only when
    /// it falls strictly inside the sensor's valid range, so a corrupt
    /// burst leaves the previous reading in place.
    ///
    pub fn update(&mut self) -> Result<(), TransportError> {
        if !self.ready()? {
            return Ok(());
        }
        let buf = self.bus.read_block(REG_ALG_RESULT_DATA, ALG_RESULT_LEN)?;
        let eco2 = decode::word_be(buf[0], buf[1]);
        let tvoc = decode::word_be(buf[2], buf[3]);
        if eco2 > ECO2_FLOOR_PPM && eco2 < ECO2_CEIL_PPM {
            self.eco2 = eco2;
        } else {
            debug!("Discarding out-of-range eCO2 reading {eco2} ppm");
        }
        if tvoc > TVOC_FLOOR_PPB && tvoc < TVOC_CEIL_PPB {
            self.tvoc = tvoc;
        } else {
            debug!("Discarding out-of-range TVOC reading {tvoc} ppb");
        }
        Ok(())
    }

    /// Get TVOC (ppb) and eCO2 (ppm) as a u16 tuple.
    ///
    /// Polls for fresh data first, then returns the last valid pair, so
    /// the caller always gets usable values even on a tick with nothing
    /// new to read.
    ///
    pub fn get_measurements(&mut self) -> Result<(u16, u16), TransportError> {
        self.update()?;
        Ok((self.tvoc, self.eco2))
    }
}
