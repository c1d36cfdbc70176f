/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

//! Factory PROM layout, CRC-4 check and the MS5837 compensation arithmetic.
//!
//! All intermediate values are 64-bit and every power-of-two division is an
//! arithmetic shift, which is what reproduces the datasheet example results
//! for negative `dT`.

use crate::DeviceType;

/// Number of 16-bit PROM words the driver reads (word 0 plus C1..C6)
pub const PROM_WORDS: usize = 7;

/// Calibration coefficients C1..C6 from PROM words 1..6.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Calibration {
    /// C1: pressure sensitivity, SENS_T1
    pub pressure_sensitivity: u16,
    /// C2: pressure offset, OFF_T1
    pub pressure_offset: u16,
    /// C3: temperature coefficient of pressure sensitivity, TCS
    pub pressure_sensitivity_tc: u16,
    /// C4: temperature coefficient of pressure offset, TCO
    pub pressure_offset_tc: u16,
    /// C5: reference temperature, T_REF
    pub reference_temperature: u16,
    /// C6: temperature coefficient of the temperature, TEMPSENS
    pub temperature_tc: u16,
}

/// Compensated values in device units.
///
/// `temperature` is in 0.01 °C for every variant. `pressure` is in 0.01 mbar
/// on the 02BA parts and 0.1 mbar on the 30BA26.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Compensated {
    pub temperature: i32,
    pub pressure: i32,
}

/// First order terms shared by the temperature and pressure paths
struct FirstOrder {
    dt: i64,
    temp: i64,
    sens: i64,
    off: i64,
}

/// Second order low/high temperature corrections
#[derive(Default)]
struct SecondOrder {
    ti: i64,
    offi: i64,
    sensi: i64,
}

/// CRC nibble stored in the top four bits of PROM word 0
pub(crate) fn stored_crc(prom: &[u16; PROM_WORDS]) -> u8 {
    ((prom[0] >> 12) & 0x0F) as u8
}

/// Product code stored in bits [11:5] of PROM word 0
pub(crate) fn product_code(prom: &[u16; PROM_WORDS]) -> u8 {
    ((prom[0] >> 5) & 0x7F) as u8
}

/// CRC-4 over the PROM as described in the datasheet.
///
/// The stored CRC nibble is masked out and a zero pad word is appended, so the
/// result can be compared directly against `stored_crc`.
pub(crate) fn crc4(prom: &[u16; PROM_WORDS]) -> u8 {
    let mut n_rem: u16 = 0;
    let words = prom
        .iter()
        .enumerate()
        .map(|(i, word)| if i == 0 { word & 0x0FFF } else { *word })
        .chain(core::iter::once(0u16));

    for byte in words.flat_map(|word| word.to_be_bytes().into_iter()) {
        n_rem ^= byte as u16;
        for _ in 0..8 {
            if n_rem & 0x8000 != 0 {
                n_rem = (n_rem << 1) ^ 0x3000;
            } else {
                n_rem <<= 1;
            }
        }
    }

    ((n_rem >> 12) & 0x000F) as u8
}

impl Calibration {
    pub fn from_prom(prom: &[u16; PROM_WORDS]) -> Self {
        Self {
            pressure_sensitivity: prom[1],
            pressure_offset: prom[2],
            pressure_sensitivity_tc: prom[3],
            pressure_offset_tc: prom[4],
            reference_temperature: prom[5],
            temperature_tc: prom[6],
        }
    }

    /// Compensated temperature in 0.01 °C from a raw D2 sample
    pub fn compensate_temperature(&self, device: DeviceType, d2: u32) -> i32 {
        let (dt, temp) = self.temperature_terms(d2);
        let second = second_order(device, dt, temp);
        (temp - second.ti) as i32
    }

    /// Compensated temperature and pressure from raw D1 (pressure) and D2 (temperature) samples
    pub fn compensate(&self, device: DeviceType, d1: u32, d2: u32) -> Compensated {
        let first = self.first_order(device, d2);
        let second = second_order(device, first.dt, first.temp);

        let sens2 = first.sens - second.sensi;
        let off2 = first.off - second.offi;

        Compensated {
            temperature: (first.temp - second.ti) as i32,
            pressure: pressure(device, d1, sens2, off2) as i32,
        }
    }

    /// Pressure from the first order terms only, skipping the second order correction
    #[cfg(test)]
    pub(crate) fn first_order_pressure(&self, device: DeviceType, d1: u32, d2: u32) -> i32 {
        let first = self.first_order(device, d2);
        pressure(device, d1, first.sens, first.off) as i32
    }

    fn temperature_terms(&self, d2: u32) -> (i64, i64) {
        let dt = i64::from(d2) - (i64::from(self.reference_temperature) << 8);
        let temp = 2000 + ((dt * i64::from(self.temperature_tc)) >> 23);
        (dt, temp)
    }

    fn first_order(&self, device: DeviceType, d2: u32) -> FirstOrder {
        let (dt, temp) = self.temperature_terms(d2);
        let c1 = i64::from(self.pressure_sensitivity);
        let c2 = i64::from(self.pressure_offset);
        let c3 = i64::from(self.pressure_sensitivity_tc);
        let c4 = i64::from(self.pressure_offset_tc);

        let (sens, off) = match device {
            DeviceType::Ms5837_02BA01 | DeviceType::Ms5837_02BA21 => {
                ((c1 << 16) + ((c3 * dt) >> 7), (c2 << 17) + ((c4 * dt) >> 6))
            }
            DeviceType::Ms5837_30BA26 => {
                ((c1 << 15) + ((c3 * dt) >> 8), (c2 << 16) + ((c4 * dt) >> 7))
            }
        };

        FirstOrder {
            dt,
            temp,
            sens,
            off,
        }
    }
}

fn second_order(device: DeviceType, dt: i64, temp: i64) -> SecondOrder {
    let delta = temp - 2000;
    match device {
        DeviceType::Ms5837_02BA01 | DeviceType::Ms5837_02BA21 => {
            if temp < 2000 {
                SecondOrder {
                    ti: (11 * dt * dt) >> 35,
                    offi: (31 * delta * delta) >> 3,
                    sensi: (63 * delta * delta) >> 5,
                }
            } else {
                SecondOrder::default()
            }
        }
        DeviceType::Ms5837_30BA26 => {
            if temp < 2000 {
                let mut second = SecondOrder {
                    ti: (3 * dt * dt) >> 33,
                    offi: (3 * delta * delta) >> 1,
                    sensi: (5 * delta * delta) >> 3,
                };
                if temp < -1500 {
                    let very_low = temp + 1500;
                    second.offi += 7 * very_low * very_low;
                    second.sensi += 4 * very_low * very_low;
                }
                second
            } else {
                SecondOrder {
                    ti: (2 * dt * dt) >> 37,
                    offi: (delta * delta) >> 4,
                    sensi: 0,
                }
            }
        }
    }
}

fn pressure(device: DeviceType, d1: u32, sens: i64, off: i64) -> i64 {
    let scaled = ((i64::from(d1) * sens) >> 21) - off;
    match device {
        DeviceType::Ms5837_02BA01 | DeviceType::Ms5837_02BA21 => scaled >> 15,
        DeviceType::Ms5837_30BA26 => scaled >> 13,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Example coefficient sets from the MS5837-02BA and MS5837-30BA datasheets
    const COEFFS_02BA: [u16; 6] = [46372, 43981, 29059, 27842, 31553, 28165];
    const COEFFS_30BA: [u16; 6] = [34982, 36352, 20328, 22354, 26646, 26146];

    fn calibration(coeffs: [u16; 6]) -> Calibration {
        let mut prom = [0u16; PROM_WORDS];
        prom[1..].copy_from_slice(&coeffs);
        Calibration::from_prom(&prom)
    }

    #[test]
    fn datasheet_example_30ba() {
        let cal = calibration(COEFFS_30BA);
        let out = cal.compensate(DeviceType::Ms5837_30BA26, 4958179, 6815414);
        assert_eq!(out.temperature, 1981);
        assert_eq!(out.pressure, 39998);
    }

    #[test]
    fn datasheet_example_02ba() {
        let cal = calibration(COEFFS_02BA);
        for device in [DeviceType::Ms5837_02BA01, DeviceType::Ms5837_02BA21] {
            let out = cal.compensate(device, 6465444, 8077636);
            assert_eq!(out.temperature, 2000);
            assert_eq!(out.pressure, 110002);
        }
    }

    #[test]
    fn low_temperature_02ba() {
        let cal = calibration(COEFFS_02BA);
        let out = cal.compensate(DeviceType::Ms5837_02BA01, 6465444, 7900000);
        assert_eq!(out.temperature, 1393);
        assert_eq!(out.pressure, 108543);
        assert_eq!(
            cal.first_order_pressure(DeviceType::Ms5837_02BA01, 6465444, 7900000),
            108567
        );
    }

    #[test]
    fn high_temperature_02ba_has_no_correction() {
        let cal = calibration(COEFFS_02BA);
        let out = cal.compensate(DeviceType::Ms5837_02BA21, 6465444, 8300000);
        assert_eq!(out.temperature, 2746);
        assert_eq!(out.pressure, 111800);
        assert_eq!(
            cal.first_order_pressure(DeviceType::Ms5837_02BA21, 6465444, 8300000),
            out.pressure
        );
    }

    #[test]
    fn low_and_very_low_temperature_30ba() {
        let cal = calibration(COEFFS_30BA);

        let low = cal.compensate(DeviceType::Ms5837_30BA26, 4958179, 6600000);
        assert_eq!(low.temperature, 1293);
        assert_eq!(low.pressure, 39655);

        let very_low = cal.compensate(DeviceType::Ms5837_30BA26, 4958179, 6000000);
        assert_eq!(very_low.temperature, -796);
        assert_eq!(very_low.pressure, 38712);
        assert_eq!(
            cal.first_order_pressure(DeviceType::Ms5837_30BA26, 4958179, 6000000),
            38694
        );
    }

    #[test]
    fn high_temperature_30ba() {
        let cal = calibration(COEFFS_30BA);
        let out = cal.compensate(DeviceType::Ms5837_30BA26, 4958179, 7000000);
        assert_eq!(out.temperature, 2556);
        assert_eq!(out.pressure, 40295);
        assert_eq!(
            cal.first_order_pressure(DeviceType::Ms5837_30BA26, 4958179, 7000000),
            40293
        );
    }

    #[test]
    fn temperature_only_matches_combined_path() {
        let cal = calibration(COEFFS_30BA);
        for d2 in [6000000, 6600000, 6815414, 7000000] {
            assert_eq!(
                cal.compensate_temperature(DeviceType::Ms5837_30BA26, d2),
                cal.compensate(DeviceType::Ms5837_30BA26, 4958179, d2).temperature
            );
        }
        let cal = calibration(COEFFS_02BA);
        assert_eq!(cal.compensate_temperature(DeviceType::Ms5837_02BA01, 7900000), 1393);
    }

    #[test]
    fn crc_of_known_good_prom() {
        let prom = [0x6FA6, 0x8E00, 0x4F68, 0x5752, 0x6622, 0x6622, 0x6622];
        assert_eq!(stored_crc(&prom), 6);
        assert_eq!(crc4(&prom), 6);
        assert_eq!(product_code(&prom), 0x7D);
    }

    #[test]
    fn crc_ignores_stored_nibble() {
        let prom = [0x9340, 34982, 36352, 20328, 22354, 26646, 26146];
        let mut other = prom;
        other[0] &= 0x0FFF;
        assert_eq!(crc4(&prom), 9);
        assert_eq!(crc4(&other), 9);
        assert_eq!(product_code(&prom), 0x1A);
    }

    #[test]
    fn crc_detects_corrupted_coefficient() {
        let mut prom = [0x9340, 34982, 36352, 20328, 22354, 26646, 26146];
        prom[3] ^= 0x0100;
        assert_ne!(crc4(&prom), stored_crc(&prom));
    }
}
