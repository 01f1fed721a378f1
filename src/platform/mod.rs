//! Interfaces to the OS-level pin and bus primitives.
//!
//! The adaptor only ever talks to hardware through the [`Platform`] trait, so
//! the acquisition and teardown logic can be exercised against the in-memory
//! [`mock`] implementation while production code runs on [`sysfs`].

use std::io;
use std::path::Path;

pub mod mock;
pub mod sysfs;

pub use sysfs::SysfsPlatform;

/// Direction of a digital GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// The string the kernel expects in a sysfs `direction` attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// One GPIO line, identified by its kernel line index.
///
/// Construction is cheap and infallible; `export` is the fallible step that
/// claims the line from the kernel.
pub trait DigitalPin {
    fn export(&mut self) -> io::Result<()>;
    fn unexport(&mut self) -> io::Result<()>;
    fn set_direction(&mut self, direction: Direction) -> io::Result<()>;
    fn read(&mut self) -> io::Result<u8>;
    fn write(&mut self, value: u8) -> io::Result<()>;
}

/// One PWM channel on a PWM chip.
pub trait PwmPin {
    fn export(&mut self) -> io::Result<()>;
    fn unexport(&mut self) -> io::Result<()>;
    /// Sets the signal period in nanoseconds.
    fn set_period(&mut self, nanos: u32) -> io::Result<()>;
    /// Sets the active time per period, in nanoseconds.
    fn set_duty_cycle(&mut self, nanos: u32) -> io::Result<()>;
}

/// An open I2C controller device.
pub trait I2cDevice {
    /// Selects the slave address for subsequent transfers.
    fn set_address(&mut self, address: u16) -> io::Result<()>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn close(&mut self) -> io::Result<()>;
}

/// An open SPI bus device, already configured for mode, word size, and speed.
pub trait SpiDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn close(&mut self) -> io::Result<()>;
}

/// Factory for the OS primitives the adaptor consumes.
///
/// `Send + Sync` because the adaptor is shared across threads and analog reads
/// go through [`Platform::read_file`] without any adaptor-level locking.
pub trait Platform: Send + Sync {
    type Digital: DigitalPin + Send;
    type Pwm: PwmPin + Send;
    type I2c: I2cDevice + Send;
    type Spi: SpiDevice + Send;

    fn digital_pin(&self, line: u32) -> Self::Digital;
    fn pwm_pin(&self, channel: u32, chip_path: &str) -> Self::Pwm;
    fn open_i2c(&self, path: &Path) -> io::Result<Self::I2c>;
    fn open_spi(
        &self,
        bus: u32,
        chip: u32,
        mode: u8,
        bits: u8,
        max_speed: u32,
    ) -> io::Result<Self::Spi>;

    /// Overwrites a control file with `contents`. Used for the pin-mux state
    /// attribute.
    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Opens `path` fresh and reads up to `buf.len()` bytes. Used for the
    /// analog raw-value files, which are not claimable resources.
    fn read_file(&self, path: &Path, buf: &mut [u8]) -> io::Result<usize>;
}
