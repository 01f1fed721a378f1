//! Digital GPIO, analog input, I2C, and SPI access for the Odroid XU4
//! single-board computer, backed by the Linux sysfs and character-device
//! interfaces.
//!
//! The [`Adaptor`] translates the XU4 header labels to kernel identifiers and
//! lazily claims each pin or bus from the kernel on first use: a line is
//! mux-routed and exported exactly once, every later request for the same pin
//! reuses the cached handle, and [`Adaptor::finalize`] releases everything in
//! one sweep. All of this is safe to drive from multiple threads.
//!
//! ```no_run
//! use odroid_gpio::Adaptor;
//!
//! # fn main() -> odroid_gpio::Result<()> {
//! let adaptor = Adaptor::new();
//!
//! adaptor.digital_write("7", 1)?;
//! let adc = adaptor.analog_read("AIN0")?;
//! println!("adc reads {}", adc);
//!
//! let display = adaptor.i2c_connection(0x3c, 2)?;
//! display.write(&[0x00, 0xaf])?;
//!
//! adaptor.finalize()?;
//! # Ok(())
//! # }
//! ```
//!
//! Everything below the adaptor goes through the [`platform::Platform`]
//! trait, so the acquisition and teardown logic can be tested against
//! [`platform::mock::MockPlatform`] without hardware.

mod adaptor;
mod error;
pub mod pins;
pub mod platform;

pub use adaptor::{Adaptor, I2cConnection, SpiConnection, PWM_DEFAULT_PERIOD};
pub use error::{Error, Result};
pub use platform::Direction;
