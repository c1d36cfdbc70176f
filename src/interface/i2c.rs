use embedded_hal as hal;

use super::SensorInterface;
use crate::Error;
#[cfg(feature = "rttdebug")]
use panic_rtt_core::rprintln;

/// Longest payload `register_write` will frame after the command byte
pub const MAX_WRITE_LEN: usize = 16;

pub struct I2cInterface<I2C> {
    /// i2c port
    i2c_port: I2C,
    /// 7-bit address for i2c communications
    address: u8,
}

impl<I2C, CommE> I2cInterface<I2C>
where
    I2C: hal::i2c::I2c<Error = CommE>,
{
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            i2c_port: i2c,
            address,
        }
    }

    /// The 7-bit bus address this interface talks to
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Release owned resources
    pub fn release(self) -> I2C {
        self.i2c_port
    }
}

impl<I2C, CommE> SensorInterface for I2cInterface<I2C>
where
    I2C: hal::i2c::I2c<Error = CommE>,
{
    type InterfaceError = Error<CommE>;

    // The bus handed to `new` is already configured by the HAL.
    fn setup(&mut self) -> Result<(), Self::InterfaceError> {
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), Self::InterfaceError> {
        Ok(())
    }

    fn register_read(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::InterfaceError> {
        let rc = self.i2c_port.write_read(self.address, &[reg], buf);

        #[cfg(feature = "rttdebug")]
        rprintln!("read 0x{:x} {:x?} ", reg, buf);

        rc.map_err(Error::Comm)
    }

    fn register_write(&mut self, reg: u8, data: &[u8]) -> Result<(), Self::InterfaceError> {
        if data.len() > MAX_WRITE_LEN {
            return Err(Error::InvalidArgument);
        }
        let mut block = [0u8; MAX_WRITE_LEN + 1];
        block[0] = reg;
        block[1..=data.len()].copy_from_slice(data);

        #[cfg(feature = "rttdebug")]
        rprintln!("write {:x?} ", &block[..=data.len()]);

        self.i2c_port
            .write(self.address, &block[..=data.len()])
            .map_err(Error::Comm)
    }
}
