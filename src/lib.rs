// Copyright 2024, F. Stan
//
// Licensed under the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Drivers implementing basic BME280 and CCS811 I2C environmental sensor operations
//!
//! Operations taken from the [BME280 datasheet](https://cdn.sparkfun.com/assets/learn_tutorials/4/1/9/BST-BME280_DS001-10.pdf)
//! and the [CCS811 datasheet](https://cdn.sparkfun.com/assets/learn_tutorials/1/4/3/CCS811_Datasheet-DS000459.pdf)
//!
//! The BME280 driver reads the factory calibration once and turns raw
//! ADC bursts into compensated hPa / Celsius / %RH values. The CCS811
//! driver polls the data-ready flag for eCO2 (ppm) and TVOC (ppb) and
//! accepts ambient humidity/temperature write-back for better accuracy.
//! Transient bus errors are returned to the caller; the usual policy is
//! to skip the tick and keep polling.
//!
//! ## Basic Example
//!
//! Obtaining measurements from both sensors on one bus
//!
//!
//!```no_run
//!use envsensor_i2c::bme280::Bme280;
//!use envsensor_i2c::ccs811::Ccs811;
//!use std::thread;
//!use std::time::Duration;
//!
//!fn main() {
//!    // Open the I2C devices on their standard addresses
//!    let mut bme280 = Bme280::new().unwrap();
//!    let mut ccs811 = Ccs811::new().unwrap();
//!
//!    loop {
//!        match (bme280.get_measurements(), ccs811.get_measurements()) {
//!            (Ok(m), Ok((tvoc, eco2))) => {
//!                println!(
//!                    "{:7.2} hPa, {:6.2} C, {:5.2} %, TVOC: {:4} ppb, eCO2: {:4} ppm",
//!                    m.pressure, m.temperature, m.humidity, tvoc, eco2
//!                );
//!                // feed the climate reading back into the gas algorithm
//!                ccs811.compensate(m.humidity, m.temperature).ok();
//!            }
//!            (Err(e), _) | (_, Err(e)) => {
//!                println!("Error obtaining measurements. More details: {}. Retrying next tick", e);
//!            }
//!        }
//!        thread::sleep(Duration::from_secs(1));
//!    }
//!}
//!```
//!

/// Bus transport trait, error type and the Linux I2C implementation
pub mod transport;

/// Register decoding helpers shared by both drivers
pub mod decode;

/// BME280 combined humidity, pressure and temperature sensor operations
pub mod bme280;

/// CCS811 eCO2/TVOC gas sensor operations
pub mod ccs811;
