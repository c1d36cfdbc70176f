pub mod i2c;

pub use self::i2c::I2cInterface;

/// A method of communicating with the sensor
pub trait SensorInterface {
    /// Interface error type
    type InterfaceError;

    /// give the sensor interface a chance to set up (acquire the bus)
    fn setup(&mut self) -> Result<(), Self::InterfaceError>;

    /// release whatever `setup` acquired
    fn teardown(&mut self) -> Result<(), Self::InterfaceError>;

    /// Send `reg` (a register address or command byte) and read `buf.len()` bytes back
    fn register_read(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::InterfaceError>;

    /// Send `reg` followed by `data`. An empty `data` sends the bare command byte.
    fn register_write(&mut self, reg: u8, data: &[u8]) -> Result<(), Self::InterfaceError>;
}
