/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

use embedded_hal as hal;
use hal::delay::DelayNs;

#[cfg(feature = "rttdebug")]
use panic_rtt_core::rprintln;

mod calibration;
mod interface;
pub use calibration::{Calibration, Compensated, PROM_WORDS};
pub use interface::{I2cInterface, SensorInterface};

/// Errors in this crate
#[derive(Debug, PartialEq)]
pub enum Error<CommE> {
    /// Sensor communication error
    Comm(CommE),

    /// Operation requires a successful `init`
    NotInitialized,
    /// PROM contents failed the CRC-4 check
    CrcMismatch { expected: u8, computed: u8 },
    /// Setting not supported by the selected device type
    InvalidArgument,
    /// PROM product code is not a known MS5837 variant
    UnknownDevice(u8),
}

pub struct Builder {}

impl Builder {
    /// Create a new driver using I2C interface
    pub fn new_i2c<I2C, CommE>(i2c: I2C, address: u8) -> MS5837<I2cInterface<I2C>>
    where
        I2C: hal::i2c::I2c<Error = CommE>,
    {
        let iface = interface::I2cInterface::new(i2c, address);
        MS5837::new_with_interface(iface)
    }

    /// Create a new driver using I2C interface at the fixed MS5837 address
    pub fn new_i2c_default<I2C, CommE>(i2c: I2C) -> MS5837<I2cInterface<I2C>>
    where
        I2C: hal::i2c::I2c<Error = CommE>,
    {
        Self::new_i2c(i2c, DEFAULT_ADDRESS)
    }
}

/// Static description of the chip and this driver
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Info {
    pub chip_name: &'static str,
    pub manufacturer_name: &'static str,
    pub interface: &'static str,
    pub supply_voltage_min_v: f32,
    pub supply_voltage_max_v: f32,
    pub max_current_ma: f32,
    pub temperature_min: f32,
    pub temperature_max: f32,
    pub driver_version: &'static str,
}

/// Chip information. Needs no sensor and no bus.
pub const fn info() -> Info {
    Info {
        chip_name: "TE MS5837",
        manufacturer_name: "TE",
        interface: "IIC",
        supply_voltage_min_v: 1.5,
        supply_voltage_max_v: 3.6,
        max_current_ma: 1.25,
        temperature_min: -40.0,
        temperature_max: 85.0,
        driver_version: env!("CARGO_PKG_VERSION"),
    }
}

/// A compensated temperature sample
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Temperature {
    /// raw 24-bit D2 ADC count
    pub raw: u32,
    pub celsius: f32,
}

/// A compensated pressure sample
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Pressure {
    /// raw 24-bit D1 ADC count
    pub raw: u32,
    pub mbar: f32,
}

/// Temperature and pressure taken in one read cycle
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Measurement {
    pub temperature: Temperature,
    pub pressure: Pressure,
}

pub struct MS5837<SI> {
    pub(crate) si: SI,

    device_type: Option<DeviceType>,
    temperature_osr: Oversampling,
    pressure_osr: Oversampling,
    prom: [u16; PROM_WORDS],
    calibration: Calibration,
    inited: bool,
}

impl<SI, CommE> MS5837<SI>
where
    SI: SensorInterface<InterfaceError = Error<CommE>>,
{
    pub fn new_with_interface(sensor_interface: SI) -> Self {
        Self {
            si: sensor_interface,
            device_type: None,
            temperature_osr: Oversampling::Osr_256,
            pressure_osr: Oversampling::Osr_256,
            prom: [0; PROM_WORDS],
            calibration: Calibration::default(),
            inited: false,
        }
    }

    /// Release the sensor interface, consuming the driver
    pub fn release(self) -> SI {
        self.si
    }

    pub fn is_initialized(&self) -> bool {
        self.inited
    }

    /// The configured or detected device type.
    /// `None` until either `set_device_type` or a successful `init`.
    pub fn device_type(&self) -> Option<DeviceType> {
        self.device_type
    }

    /// Select the compensation variant.
    ///
    /// A type set before `init` takes precedence over the product code found in PROM.
    pub fn set_device_type(&mut self, device_type: DeviceType) -> Result<(), SI::InterfaceError> {
        if !device_type.supports(self.temperature_osr) || !device_type.supports(self.pressure_osr) {
            #[cfg(feature = "rttdebug")]
            rprintln!("ms5837: {:?} can't run the configured osr", device_type);
            return Err(Error::InvalidArgument);
        }
        self.device_type = Some(device_type);
        Ok(())
    }

    pub fn temperature_osr(&self) -> Oversampling {
        self.temperature_osr
    }

    pub fn set_temperature_osr(&mut self, osr: Oversampling) -> Result<(), SI::InterfaceError> {
        self.check_osr(osr)?;
        self.temperature_osr = osr;
        Ok(())
    }

    pub fn pressure_osr(&self) -> Oversampling {
        self.pressure_osr
    }

    pub fn set_pressure_osr(&mut self, osr: Oversampling) -> Result<(), SI::InterfaceError> {
        self.check_osr(osr)?;
        self.pressure_osr = osr;
        Ok(())
    }

    /// Raw PROM words read by the last successful `init`
    pub fn prom(&self) -> Option<&[u16; PROM_WORDS]> {
        if self.inited {
            Some(&self.prom)
        } else {
            None
        }
    }

    /// Calibration coefficients read by the last successful `init`
    pub fn calibration(&self) -> Option<&Calibration> {
        if self.inited {
            Some(&self.calibration)
        } else {
            None
        }
    }

    /// Acquire the bus, reset the sensor and load its factory calibration.
    ///
    /// Does nothing if the driver is already initialized. On any error the
    /// driver stays uninitialized and `init` may be retried.
    pub fn init(&mut self, delay_source: &mut impl DelayNs) -> Result<(), SI::InterfaceError> {
        if self.inited {
            return Ok(());
        }

        self.si.setup()?;
        self.send_reset(delay_source)?;
        let prom = self.read_prom()?;

        let expected = calibration::stored_crc(&prom);
        let computed = calibration::crc4(&prom);
        if expected != computed {
            #[cfg(feature = "rttdebug")]
            rprintln!("ms5837: crc 0x{:x} != 0x{:x}", computed, expected);
            return Err(Error::CrcMismatch { expected, computed });
        }

        let code = calibration::product_code(&prom);
        let device_type = match (self.device_type, DeviceType::from_product_code(code)) {
            (Some(configured), _) => configured,
            (None, Some(detected)) => detected,
            (None, None) => {
                #[cfg(feature = "rttdebug")]
                rprintln!("ms5837: unknown product code 0x{:x}", code);
                return Err(Error::UnknownDevice(code));
            }
        };

        // 30BA26 tops out at 4096
        if !device_type.supports(self.temperature_osr) {
            self.temperature_osr = Oversampling::Osr_4096;
        }
        if !device_type.supports(self.pressure_osr) {
            self.pressure_osr = Oversampling::Osr_4096;
        }

        self.device_type = Some(device_type);
        self.prom = prom;
        self.calibration = Calibration::from_prom(&prom);
        self.inited = true;

        Ok(())
    }

    /// Reset the sensor and release the bus. Does nothing if not initialized.
    pub fn deinit(&mut self, delay_source: &mut impl DelayNs) -> Result<(), SI::InterfaceError> {
        if !self.inited {
            return Ok(());
        }

        self.send_reset(delay_source)?;
        self.si.teardown()?;
        self.inited = false;

        Ok(())
    }

    /// `init`, then select `device_type` and the default oversampling for both channels.
    ///
    /// If the configuration is rejected the sensor is deinitialized again.
    pub fn setup(
        &mut self,
        device_type: DeviceType,
        delay_source: &mut impl DelayNs,
    ) -> Result<(), SI::InterfaceError> {
        self.init(delay_source)?;

        let configured = self
            .set_device_type(device_type)
            .and_then(|_| self.set_temperature_osr(Oversampling::default()))
            .and_then(|_| self.set_pressure_osr(Oversampling::default()));
        if let Err(e) = configured {
            #[cfg(feature = "rttdebug")]
            rprintln!("ms5837: setup config failed");
            let _ = self.deinit(delay_source);
            return Err(e);
        }

        Ok(())
    }

    /// Perform a soft reset on the sensor.
    ///
    /// The cached calibration stays valid: the sensor reloads the same PROM.
    pub fn reset(&mut self, delay_source: &mut impl DelayNs) -> Result<(), SI::InterfaceError> {
        self.ensure_inited()?;
        self.send_reset(delay_source)
    }

    pub fn read_temperature(
        &mut self,
        delay_source: &mut impl DelayNs,
    ) -> Result<Temperature, SI::InterfaceError> {
        let device_type = self.ready_type()?;
        let raw = self.convert(delay_source, CMD_CONVERT_D2, self.temperature_osr)?;
        let centi = self.calibration.compensate_temperature(device_type, raw);

        Ok(Temperature {
            raw,
            celsius: centi as f32 / 100.0,
        })
    }

    /// Read pressure. Takes a temperature sample first, which compensation needs.
    pub fn read_pressure(
        &mut self,
        delay_source: &mut impl DelayNs,
    ) -> Result<Pressure, SI::InterfaceError> {
        Ok(self.read_temperature_pressure(delay_source)?.pressure)
    }

    /// Convert temperature then pressure and compensate both
    pub fn read_temperature_pressure(
        &mut self,
        delay_source: &mut impl DelayNs,
    ) -> Result<Measurement, SI::InterfaceError> {
        let device_type = self.ready_type()?;
        let d2 = self.convert(delay_source, CMD_CONVERT_D2, self.temperature_osr)?;
        let d1 = self.convert(delay_source, CMD_CONVERT_D1, self.pressure_osr)?;
        let compensated = self.calibration.compensate(device_type, d1, d2);

        Ok(Measurement {
            temperature: Temperature {
                raw: d2,
                celsius: compensated.temperature as f32 / 100.0,
            },
            pressure: Pressure {
                raw: d1,
                mbar: compensated.pressure as f32 / device_type.pressure_counts_per_mbar(),
            },
        })
    }

    /// Read `buf.len()` bytes after sending `reg`, bypassing compensation
    pub fn get_reg(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), SI::InterfaceError> {
        self.ensure_inited()?;
        self.si.register_read(reg, buf)
    }

    /// Send `reg` followed by `data`, bypassing compensation
    pub fn set_reg(&mut self, reg: u8, data: &[u8]) -> Result<(), SI::InterfaceError> {
        self.ensure_inited()?;
        self.si.register_write(reg, data)
    }

    fn ensure_inited(&self) -> Result<(), SI::InterfaceError> {
        if self.inited {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn ready_type(&self) -> Result<DeviceType, SI::InterfaceError> {
        self.ensure_inited()?;
        self.device_type.ok_or(Error::NotInitialized)
    }

    fn check_osr(&self, osr: Oversampling) -> Result<(), SI::InterfaceError> {
        match self.device_type {
            Some(device_type) if !device_type.supports(osr) => {
                #[cfg(feature = "rttdebug")]
                rprintln!("ms5837: {:?} can't support {:?}", device_type, osr);
                Err(Error::InvalidArgument)
            }
            _ => Ok(()),
        }
    }

    fn send_reset(&mut self, delay_source: &mut impl DelayNs) -> Result<(), SI::InterfaceError> {
        self.si.register_write(CMD_RESET, &[])?;
        // PROM reload after reset
        delay_source.delay_ms(RESET_DELAY_MS);
        Ok(())
    }

    fn read_prom(&mut self) -> Result<[u16; PROM_WORDS], SI::InterfaceError> {
        let mut prom = [0u16; PROM_WORDS];
        for (i, word) in prom.iter_mut().enumerate() {
            let mut block = [0u8; 2];
            self.si.register_read(CMD_PROM_READ + (i as u8) * 2, &mut block)?;
            *word = u16::from_be_bytes(block);
        }
        Ok(prom)
    }

    /// Start one conversion, wait for it and read the 24-bit result
    fn convert(
        &mut self,
        delay_source: &mut impl DelayNs,
        command: u8,
        osr: Oversampling,
    ) -> Result<u32, SI::InterfaceError> {
        self.si.register_write(command | osr.command_offset(), &[])?;
        delay_source.delay_ms(osr.conversion_time_ms());

        let mut block = [0u8; 4];
        self.si.register_read(CMD_ADC_READ, &mut block[1..])?;
        Ok(u32::from_be_bytes(block))
    }
}

/// 7-bit I2C address (0xEC in 8-bit form)
pub const DEFAULT_ADDRESS: u8 = 0x76;

/// Commands
///
const CMD_RESET: u8 = 0x1E;
const CMD_CONVERT_D1: u8 = 0x40;
const CMD_CONVERT_D2: u8 = 0x50;
const CMD_ADC_READ: u8 = 0x00;
const CMD_PROM_READ: u8 = 0xA0;

const RESET_DELAY_MS: u32 = 10;

#[repr(u8)]
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// Supported MS5837 variants. The discriminant is the product code in PROM word 0.
pub enum DeviceType {
    /// 2 bar, 0.01 mbar resolution
    Ms5837_02BA01 = 0x00,
    /// 2 bar, 0.01 mbar resolution
    Ms5837_02BA21 = 0x15,
    /// 30 bar, 0.1 mbar resolution
    Ms5837_30BA26 = 0x1A,
}

impl DeviceType {
    pub fn from_product_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::Ms5837_02BA01),
            0x15 => Some(Self::Ms5837_02BA21),
            0x1A => Some(Self::Ms5837_30BA26),
            _ => None,
        }
    }

    /// Whether this variant has a conversion mode for `osr`
    pub fn supports(&self, osr: Oversampling) -> bool {
        match self {
            Self::Ms5837_02BA01 | Self::Ms5837_02BA21 => true,
            Self::Ms5837_30BA26 => osr != Oversampling::Osr_8192,
        }
    }

    pub(crate) fn pressure_counts_per_mbar(&self) -> f32 {
        match self {
            Self::Ms5837_02BA01 | Self::Ms5837_02BA21 => 100.0,
            Self::Ms5837_30BA26 => 10.0,
        }
    }
}

#[repr(u8)]
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// ADC oversampling ratio. Higher ratios lower the noise and lengthen the conversion.
pub enum Oversampling {
    /// max 0.6 ms
    Osr_256 = 0,
    /// max 1.17 ms
    Osr_512 = 1,
    /// max 2.28 ms
    Osr_1024 = 2,
    /// max 4.54 ms
    Osr_2048 = 3,
    /// max 9.04 ms
    Osr_4096 = 4,
    /// max 18.08 ms, 02BA parts only
    Osr_8192 = 5,
}

impl Default for Oversampling {
    fn default() -> Self {
        Oversampling::Osr_4096
    }
}

impl Oversampling {
    /// Number of samples averaged per conversion
    pub fn ratio(&self) -> u16 {
        256 << (*self as u8)
    }

    /// Added to the D1/D2 convert command
    pub(crate) fn command_offset(&self) -> u8 {
        (*self as u8) << 1
    }

    /// Time to wait before reading the ADC, rounded up to whole milliseconds
    pub(crate) fn conversion_time_ms(&self) -> u32 {
        match self {
            Self::Osr_256 => 1,
            Self::Osr_512 => 2,
            Self::Osr_1024 => 3,
            Self::Osr_2048 => 5,
            Self::Osr_4096 => 10,
            Self::Osr_8192 => 19,
        }
    }
}

impl TryFrom<u16> for Oversampling {
    type Error = u16;

    /// Accepts the numeric ratio, e.g. `4096`. Any other number is handed back.
    fn try_from(ratio: u16) -> Result<Self, Self::Error> {
        match ratio {
            256 => Ok(Self::Osr_256),
            512 => Ok(Self::Osr_512),
            1024 => Ok(Self::Osr_1024),
            2048 => Ok(Self::Osr_2048),
            4096 => Ok(Self::Osr_4096),
            8192 => Ok(Self::Osr_8192),
            other => Err(other),
        }
    }
}
