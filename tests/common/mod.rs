#![allow(dead_code)]

use std::collections::VecDeque;

use embedded_hal::delay::DelayNs;
use ms5837::{Error, SensorInterface, PROM_WORDS};

/// 30BA26 PROM carrying the datasheet example coefficients
pub const PROM_30BA26: [u16; PROM_WORDS] = [0x9340, 34982, 36352, 20328, 22354, 26646, 26146];
/// 02BA01 PROM carrying the datasheet example coefficients
pub const PROM_02BA01: [u16; PROM_WORDS] = [0x8000, 46372, 43981, 29059, 27842, 31553, 28165];
/// Same coefficients as `PROM_02BA01`, product code of the 02BA21
pub const PROM_02BA21: [u16; PROM_WORDS] = [0x52A0, 46372, 43981, 29059, 27842, 31553, 28165];
/// Valid CRC, product code 0x7D
pub const PROM_UNKNOWN: [u16; PROM_WORDS] = [0x6FA6, 0x8E00, 0x4F68, 0x5752, 0x6622, 0x6622, 0x6622];

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Setup,
    Teardown,
    Write(u8, Vec<u8>),
    Read(u8, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusFault;

/// Scripted stand-in for the sensor that records every call
pub struct FakeInterface {
    pub ops: Vec<Op>,
    pub prom: [u16; PROM_WORDS],
    pub adc: VecDeque<u32>,
    pub fail_setup: bool,
    pub fail_reg: Option<u8>,
}

impl FakeInterface {
    pub fn new(prom: [u16; PROM_WORDS]) -> Self {
        Self {
            ops: Vec::new(),
            prom,
            adc: VecDeque::new(),
            fail_setup: false,
            fail_reg: None,
        }
    }

    pub fn with_adc(mut self, samples: &[u32]) -> Self {
        self.adc.extend(samples.iter().copied());
        self
    }

    /// Command bytes of the D1/D2 conversions issued so far
    pub fn conversions(&self) -> Vec<u8> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Write(cmd, data) if data.is_empty() && (cmd & 0xE0) == 0x40 => Some(*cmd),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Op) -> usize {
        self.ops.iter().filter(|op| *op == wanted).count()
    }

    fn check(&self, reg: u8) -> Result<(), Error<BusFault>> {
        if self.fail_reg == Some(reg) {
            Err(Error::Comm(BusFault))
        } else {
            Ok(())
        }
    }
}

impl SensorInterface for FakeInterface {
    type InterfaceError = Error<BusFault>;

    fn setup(&mut self) -> Result<(), Self::InterfaceError> {
        self.ops.push(Op::Setup);
        if self.fail_setup {
            return Err(Error::Comm(BusFault));
        }
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), Self::InterfaceError> {
        self.ops.push(Op::Teardown);
        Ok(())
    }

    fn register_read(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::InterfaceError> {
        self.ops.push(Op::Read(reg, buf.len()));
        self.check(reg)?;
        match reg {
            0x00 => {
                let sample = self.adc.pop_front().unwrap_or(0).to_be_bytes();
                buf.copy_from_slice(&sample[4 - buf.len()..]);
            }
            0xA0..=0xAC => {
                let word = self.prom[usize::from((reg - 0xA0) / 2)];
                buf.copy_from_slice(&word.to_be_bytes());
            }
            _ => buf.iter_mut().for_each(|b| *b = reg),
        }
        Ok(())
    }

    fn register_write(&mut self, reg: u8, data: &[u8]) -> Result<(), Self::InterfaceError> {
        self.ops.push(Op::Write(reg, data.to_vec()));
        self.check(reg)
    }
}

/// Delay that only records what it was asked for, in milliseconds
#[derive(Default)]
pub struct RecordingDelay {
    pub ms: Vec<u32>,
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.ms.push(ns / 1_000_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.ms.push(ms);
    }
}

pub fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-3,
        "{} is not close to {}",
        actual,
        expected
    );
}
