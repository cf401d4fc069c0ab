// Copyright 2024, F. Stan
//
// Licensed under the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// This file may not be copied, modified, or distributed
// except according to those terms.

//! BME280 combined humidity, pressure and temperature sensor.
//!
//! Register map and compensation formulas from the
//! [datasheet](https://cdn.sparkfun.com/assets/learn_tutorials/4/1/9/BST-BME280_DS001-10.pdf).
//!
//! The device is configured once for the datasheet's indoor navigation
//! profile: normal mode, standby 0.5 ms, oversampling pressure x16 /
//! temperature x2 / humidity x1, IIR filter coefficient 16.

use log::debug;

use crate::decode;
use crate::transport::{BusTransport, TransportError};
use i2cdev::linux::LinuxI2CDevice;

/// BME280 I2C default slave address
pub const BME280_ADDR: u16 = 0x77;

const REG_CTRL_HUM: u8 = 0xF2;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_CONFIG: u8 = 0xF5;
const REG_CALIB_BLOCK1: u8 = 0x88;
const REG_CALIB_H1: u8 = 0xA1;
const REG_CALIB_BLOCK2: u8 = 0xE1;
const REG_DATA: u8 = 0xF7;

const CALIB_BLOCK1_LEN: u8 = 24;
const CALIB_BLOCK2_LEN: u8 = 7;
const DATA_LEN: u8 = 8;

// Indoor navigation profile, fixed
const OSRS_T: u8 = 2; // Temperature oversampling x2
const OSRS_P: u8 = 5; // Pressure oversampling x16
const OSRS_H: u8 = 1; // Humidity oversampling x1
const MODE: u8 = 3; // Normal mode
const T_SB: u8 = 0; // Standby 0.5 ms
const FILTER: u8 = 4; // IIR filter coefficient 16

/// Raw pressure readings at or above this value are bus glitches the
/// sensor emits occasionally; they are dropped and the previous
/// compensated pressure is kept.
const PRESSURE_RAW_LIMIT: u32 = 0x80000;

/// Calibration coefficients burned into the device at manufacture.
///
/// Word widths and byte order follow the datasheet: temperature word 0
/// and pressure word 0 are unsigned 16-bit, the remaining 16-bit words
/// are signed; humidity mixes 8-bit values with two 12-bit coefficients
/// packed around a shared nibble byte.
#[derive(Debug, Default, Clone)]
pub struct CalibParams {
    pub temperature: [i32; 3],
    pub pressure: [i32; 9],
    pub humidity: [i32; 6],
}

/// One compensated sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Pressure in hPa. 0.0 until the first plausible raw pressure has
    /// been compensated.
    pub pressure: f64,
    /// Temperature in degrees Celsius
    pub temperature: f64,
    /// Relative humidity in %, clamped to 0..=100
    pub humidity: f64,
}

/// BME280 struct, owns the bus handle for its device address
/// and the calibration read at initialization
///
pub struct Bme280<B: BusTransport> {
    pub bus: B,
    calib: CalibParams,
    t_fine: f64,
    pressure: f64,
    temperature: f64,
    humidity: f64,
}

impl Bme280<LinuxI2CDevice> {
    /// Create a new BME280 struct on the standard address 0x77.
    ///
    /// Configures the fixed measurement profile and reads the
    /// calibration block. If any bus operation fails, returns the
    /// TransportError.
    ///
    pub fn new() -> Result<Self, TransportError> {
        let device = LinuxI2CDevice::new("/dev/i2c-1", BME280_ADDR)?;
        Self::from_device(device)
    }
}

impl<B: BusTransport> Bme280<B> {
    /// Create a BME280 struct over any bus transport, for a
    /// non-default bus path or address.
    ///
    pub fn from_device(bus: B) -> Result<Self, TransportError> {
        let mut sensor = Bme280 {
            bus,
            calib: CalibParams::default(),
            t_fine: 0.0,
            pressure: 0.0,
            temperature: 0.0,
            humidity: 0.0,
        };
        sensor.initialize()?;
        Ok(sensor)
    }

    /// Write the fixed measurement configuration and (re-)read the
    /// calibration block. Runs once from the constructors; calling it
    /// again re-initializes the device explicitly.
    ///
    pub fn initialize(&mut self) -> Result<(), TransportError> {
        let ctrl_meas = (OSRS_T << 5) | (OSRS_P << 2) | MODE;
        let config = (T_SB << 5) | (FILTER << 2);
        debug!("Configuring ctrl_hum {OSRS_H:#04x}, ctrl_meas {ctrl_meas:#04x}, config {config:#04x}");
        self.bus.write_byte(REG_CTRL_HUM, OSRS_H)?;
        self.bus.write_byte(REG_CTRL_MEAS, ctrl_meas)?;
        self.bus.write_byte(REG_CONFIG, config)?;
        self.calib = Self::read_calibration(&mut self.bus)?;
        Ok(())
    }

    fn read_calibration(bus: &mut B) -> Result<CalibParams, TransportError> {
        let block1 = bus.read_block(REG_CALIB_BLOCK1, CALIB_BLOCK1_LEN)?;
        let h1 = bus.read_byte(REG_CALIB_H1)?;
        let block2 = bus.read_block(REG_CALIB_BLOCK2, CALIB_BLOCK2_LEN)?;

        let mut temperature = [0i32; 3];
        temperature[0] = decode::word_le(block1[0], block1[1]);
        for i in 1..3 {
            temperature[i] = decode::sign_extend(decode::word_le(block1[2 * i], block1[2 * i + 1]));
        }

        let mut pressure = [0i32; 9];
        pressure[0] = decode::word_le(block1[6], block1[7]);
        for i in 1..9 {
            pressure[i] =
                decode::sign_extend(decode::word_le(block1[6 + 2 * i], block1[7 + 2 * i]));
        }

        let humidity = [
            h1 as i32,
            decode::sign_extend(decode::word_le(block2[0], block2[1])),
            block2[2] as i32,
            decode::sign_extend(decode::packed12_low(block2[3], block2[4])),
            decode::sign_extend(decode::packed12_high(block2[5], block2[4])),
            decode::sign_extend(block2[6] as i32),
        ];

        let calib = CalibParams {
            temperature,
            pressure,
            humidity,
        };
        debug!("Got calibration data: {calib:?}");
        Ok(calib)
    }

    /// Get pressure, temperature and humidity as one compensated sample.
    ///
    /// Reads the 8-byte measurement burst and compensates temperature
    /// first, since pressure and humidity compensation both consume the
    /// fine-temperature value it produces. An implausible raw pressure
    /// (top bit of the 20-bit field set) leaves the previous pressure in
    /// place. If a bus operation fails, returns the TransportError and
    /// keeps the previous sample.
    ///
    pub fn get_measurements(&mut self) -> Result<Measurement, TransportError> {
        let data = self.bus.read_block(REG_DATA, DATA_LEN)?;
        let pres_raw = decode::raw20(data[0], data[1], data[2]);
        let temp_raw = decode::raw20(data[3], data[4], data[5]);
        let hum_raw = decode::raw16(data[6], data[7]);
        debug!("Raw sample: pressure {pres_raw:#07x}, temperature {temp_raw:#07x}, humidity {hum_raw:#06x}");

        self.temperature = self.compensate_temperature(temp_raw);
        if pres_raw < PRESSURE_RAW_LIMIT {
            self.pressure = self.compensate_pressure(pres_raw);
        } else {
            debug!("Dropping out-of-range raw pressure {pres_raw:#07x}");
        }
        self.humidity = self.compensate_humidity(hum_raw);

        Ok(Measurement {
            pressure: self.pressure,
            temperature: self.temperature,
            humidity: self.humidity,
        })
    }

    /// Temperature compensation. Updates the fine-temperature
    /// accumulator as a side effect.
    fn compensate_temperature(&mut self, adc_t: u32) -> f64 {
        let adc_t = adc_t as f64;
        let dig_t = &self.calib.temperature;
        let v1 = (adc_t / 16384.0 - dig_t[0] as f64 / 1024.0) * dig_t[1] as f64;
        let v2 = (adc_t / 131072.0 - dig_t[0] as f64 / 8192.0)
            * (adc_t / 131072.0 - dig_t[0] as f64 / 8192.0)
            * dig_t[2] as f64;
        self.t_fine = v1 + v2;
        self.t_fine / 5120.0
    }

    /// Pressure compensation in hPa. Yields 0.0 if the first-stage
    /// denominator is zero, which callers read as "not computed".
    fn compensate_pressure(&self, adc_p: u32) -> f64 {
        let dig_p = &self.calib.pressure;
        let mut v1 = (self.t_fine / 2.0) - 64000.0;
        let mut v2 = (((v1 / 4.0) * (v1 / 4.0)) / 2048.0) * dig_p[5] as f64;
        v2 += (v1 * dig_p[4] as f64) * 2.0;
        v2 = (v2 / 4.0) + (dig_p[3] as f64 * 65536.0);
        v1 = (((dig_p[2] as f64 * (((v1 / 4.0) * (v1 / 4.0)) / 8192.0)) / 8.0)
            + ((dig_p[1] as f64 * v1) / 2.0))
            / 262144.0;
        v1 = ((32768.0 + v1) * dig_p[0] as f64) / 32768.0;
        if v1 == 0.0 {
            return 0.0;
        }
        let mut pressure = ((1048576.0 - adc_p as f64) - (v2 / 4096.0)) * 3125.0;
        if pressure < 2147483648.0 {
            pressure = (pressure * 2.0) / v1;
        } else {
            pressure = (pressure / v1) * 2.0;
        }
        v1 = (dig_p[8] as f64 * (((pressure / 8.0) * (pressure / 8.0)) / 8192.0)) / 4096.0;
        v2 = ((pressure / 4.0) * dig_p[7] as f64) / 8192.0;
        pressure += (v1 + v2 + dig_p[6] as f64) / 16.0;

        pressure / 100.0
    }

    /// Humidity compensation in %, clamped to 0..=100. Yields 0.0 if
    /// the fine temperature sits exactly on the formula's offset.
    fn compensate_humidity(&self, adc_h: u32) -> f64 {
        let dig_h = &self.calib.humidity;
        let mut h = self.t_fine - 76800.0;
        if h == 0.0 {
            return 0.0;
        }
        h = (adc_h as f64 - (dig_h[3] as f64 * 64.0 + dig_h[4] as f64 / 16384.0 * h))
            * (dig_h[1] as f64 / 65536.0
                * (1.0
                    + dig_h[5] as f64 / 67108864.0
                        * h
                        * (1.0 + dig_h[2] as f64 / 67108864.0 * h)));
        h *= 1.0 - dig_h[0] as f64 * h / 524288.0;
        if h > 100.0 {
            100.0
        } else if h < 0.0 {
            0.0
        } else {
            h
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockBus;

    // Datasheet worked-example coefficients:
    // dig_T = [27504, 26435, -1000]
    // dig_P = [36477, -10685, 3024, 2855, 140, -7, 15500, -14600, 6000]
    // dig_H = [75, 323, 0, 371, 30, 30]
    fn datasheet_bus() -> MockBus {
        let mut bus = MockBus::new();
        bus.set_block(
            REG_CALIB_BLOCK1,
            &[
                0x70, 0x6B, 0x43, 0x67, 0x18, 0xFC, // dig_T
                0x7D, 0x8E, 0x43, 0xD6, 0xD0, 0x0B, 0x27, 0x0B, 0x8C, 0x00, 0xF9, 0xFF, 0x8C,
                0x3C, 0xF8, 0xC6, 0x70, 0x17, // dig_P
            ],
        );
        bus.set_byte(REG_CALIB_H1, 0x4B);
        bus.set_block(REG_CALIB_BLOCK2, &[0x43, 0x01, 0x00, 0x17, 0xE3, 0x01, 0x1E]);
        bus
    }

    // adc_P = 415148, adc_T = 519888, adc_H = 32768
    const DATASHEET_BURST: [u8; 8] = [0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x80, 0x00];

    fn burst(pres_raw: u32, temp_raw: u32, hum_raw: u32) -> [u8; 8] {
        [
            (pres_raw >> 12) as u8,
            (pres_raw >> 4) as u8,
            ((pres_raw & 0xF) << 4) as u8,
            (temp_raw >> 12) as u8,
            (temp_raw >> 4) as u8,
            ((temp_raw & 0xF) << 4) as u8,
            (hum_raw >> 8) as u8,
            hum_raw as u8,
        ]
    }

    #[test]
    fn writes_the_fixed_configuration() {
        let mut bus = datasheet_bus();
        bus.set_block(REG_DATA, &DATASHEET_BURST);
        let sensor = Bme280::from_device(bus).unwrap();
        assert_eq!(
            sensor.bus.written,
            vec![
                (REG_CTRL_HUM, vec![0x01]),
                (REG_CTRL_MEAS, vec![0x57]),
                (REG_CONFIG, vec![0x10]),
            ]
        );
    }

    #[test]
    fn parses_and_sign_extends_the_calibration_block() {
        let sensor = Bme280::from_device(datasheet_bus()).unwrap();
        assert_eq!(sensor.calib.temperature, [27504, 26435, -1000]);
        assert_eq!(
            sensor.calib.pressure,
            [36477, -10685, 3024, 2855, 140, -7, 15500, -14600, 6000]
        );
        assert_eq!(sensor.calib.humidity, [75, 323, 0, 371, 30, 30]);
    }

    #[test]
    fn reproduces_the_datasheet_worked_example() {
        let mut bus = datasheet_bus();
        bus.set_block(REG_DATA, &DATASHEET_BURST);
        let mut sensor = Bme280::from_device(bus).unwrap();
        let m = sensor.get_measurements().unwrap();
        assert!((m.temperature - 25.0824779308).abs() < 1e-6);
        assert!((m.pressure - 1006.5326677583).abs() < 1e-6);
        assert!((m.humidity - 44.7353255812).abs() < 1e-6);
    }

    #[test]
    fn humidity_is_clamped_to_its_physical_range() {
        let mut bus = datasheet_bus();
        bus.set_block(REG_DATA, &burst(415148, 519888, 0xFFFF));
        let mut sensor = Bme280::from_device(bus).unwrap();
        let m = sensor.get_measurements().unwrap();
        assert_eq!(m.humidity, 100.0);

        sensor.bus.set_block(REG_DATA, &burst(415148, 519888, 0));
        let m = sensor.get_measurements().unwrap();
        assert_eq!(m.humidity, 0.0);
    }

    #[test]
    fn implausible_raw_pressure_keeps_the_previous_value() {
        let mut bus = datasheet_bus();
        bus.set_block(REG_DATA, &DATASHEET_BURST);
        let mut sensor = Bme280::from_device(bus).unwrap();
        let good = sensor.get_measurements().unwrap();

        // 0x80000 is the first excluded value
        sensor.bus.set_block(REG_DATA, &burst(0x80000, 519888, 32768));
        let m = sensor.get_measurements().unwrap();
        assert_eq!(m.pressure, good.pressure);

        // 0x7FFFF is still compensated
        sensor.bus.set_block(REG_DATA, &burst(0x7FFFF, 519888, 32768));
        let m = sensor.get_measurements().unwrap();
        assert!(m.pressure != good.pressure);
    }

    #[test]
    fn repeated_samples_over_static_data_are_identical() {
        let mut bus = datasheet_bus();
        bus.set_block(REG_DATA, &DATASHEET_BURST);
        let mut sensor = Bme280::from_device(bus).unwrap();
        let first = sensor.get_measurements().unwrap();
        let second = sensor.get_measurements().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_pressure_denominator_yields_the_sentinel() {
        // All-zero calibration drives the first-stage denominator to zero
        let mut bus = MockBus::new();
        bus.set_block(REG_CALIB_BLOCK1, &[0; 24]);
        bus.set_byte(REG_CALIB_H1, 0);
        bus.set_block(REG_CALIB_BLOCK2, &[0; 7]);
        bus.set_block(REG_DATA, &DATASHEET_BURST);
        let mut sensor = Bme280::from_device(bus).unwrap();
        let m = sensor.get_measurements().unwrap();
        assert_eq!(m.pressure, 0.0);
    }

    #[test]
    fn humidity_guard_trips_exactly_on_the_offset() {
        // dig_T = [0, 16384, 0] and adc_T = 76800 land t_fine on 76800.0
        let mut bus = MockBus::new();
        let mut block1 = [0u8; 24];
        block1[2] = 0x00;
        block1[3] = 0x40;
        bus.set_block(REG_CALIB_BLOCK1, &block1);
        bus.set_byte(REG_CALIB_H1, 0x4B);
        bus.set_block(REG_CALIB_BLOCK2, &[0x43, 0x01, 0x00, 0x17, 0xE3, 0x01, 0x1E]);
        bus.set_block(REG_DATA, &burst(415148, 76800, 0x8000));
        let mut sensor = Bme280::from_device(bus).unwrap();
        let m = sensor.get_measurements().unwrap();
        assert_eq!(m.humidity, 0.0);
        assert!((m.temperature - 15.0).abs() < 1e-12);
    }

    #[test]
    fn reinitialization_rereads_calibration() {
        let mut sensor = Bme280::from_device(datasheet_bus()).unwrap();
        // swap dig_H1 on the wire, then re-initialize
        sensor.bus.set_byte(REG_CALIB_H1, 0x50);
        sensor.initialize().unwrap();
        assert_eq!(sensor.calib.humidity[0], 0x50);
    }
}
