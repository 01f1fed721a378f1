//! The Odroid XU4 adaptor: lazy, thread-safe acquisition of pin and bus
//! handles with a single teardown sweep.
//!
//! All four caches (digital pins, PWM pins, I2C buses, SPI buses) live behind
//! one mutex, and the whole check-create-configure sequence for a resource
//! runs under it, so concurrent first requests for the same pin cannot race
//! into a double export. Analog reads bypass the lock entirely; they open an
//! independent file on every call and cache nothing.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::pins;
use crate::platform::{
    Direction, DigitalPin, I2cDevice, Platform, PwmPin, SpiDevice, SysfsPlatform,
};

/// Default PWM signal period in nanoseconds.
pub const PWM_DEFAULT_PERIOD: u32 = 500_000;

/// Base directory of the XU4 ADC device.
static ANALOG_PATH: &str = "/sys/devices/12d10000.adc/iio:device0";

/// Upper bound on one analog raw-value read.
const ANALOG_READ_LEN: usize = 1024;

/// Slots in the digital cache. Sized to cover the highest kernel line index
/// the header maps to (line 210).
const DIGITAL_LINE_COUNT: usize = 256;

/// Number of SPI buses on the board; bus numbers index this array directly.
const SPI_BUS_COUNT: usize = 2;

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // a panicked holder cannot have left the caches half-updated: entries are
    // only inserted after every fallible step has succeeded
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// All live handles, guarded by the adaptor's single lock.
struct Caches<P: Platform> {
    digital: Vec<Option<P::Digital>>,
    pwm: HashMap<String, P::Pwm>,
    i2c: HashMap<i32, Arc<Mutex<P::I2c>>>,
    spi: [Option<Arc<Mutex<P::Spi>>>; SPI_BUS_COUNT],
    finalized: bool,
}

/// Hardware-access adaptor for the Odroid XU4.
///
/// One instance owns every pin and bus handle it creates; handles are claimed
/// from the kernel on first use and released together by [`Adaptor::finalize`].
/// Methods take `&self` and may be called from any number of threads.
///
/// # Example
///
/// ```no_run
/// use odroid_gpio::Adaptor;
///
/// # fn main() -> odroid_gpio::Result<()> {
/// let adaptor = Adaptor::new();
/// adaptor.digital_write("7", 1)?;
/// let level = adaptor.digital_read("7")?;
/// adaptor.finalize()?;
/// # Ok(())
/// # }
/// ```
pub struct Adaptor<P: Platform = SysfsPlatform> {
    platform: P,
    caches: Mutex<Caches<P>>,
}

impl Adaptor<SysfsPlatform> {
    /// Creates an adaptor backed by the Linux sysfs and device interfaces.
    pub fn new() -> Self {
        Self::with_platform(SysfsPlatform::new())
    }
}

impl Default for Adaptor<SysfsPlatform> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Platform> Adaptor<P> {
    /// Creates an adaptor over a custom [`Platform`], e.g. the mock used by
    /// the test suite.
    pub fn with_platform(platform: P) -> Self {
        let mut digital = Vec::new();
        digital.resize_with(DIGITAL_LINE_COUNT, || None);
        Adaptor {
            platform,
            caches: Mutex::new(Caches {
                digital,
                pwm: HashMap::new(),
                i2c: HashMap::new(),
                spi: [None, None],
                finalized: false,
            }),
        }
    }

    /// No-op, present for lifecycle symmetry with [`Adaptor::finalize`].
    pub fn connect(&self) -> Result<()> {
        Ok(())
    }

    /// Releases every live handle: digital pins, then PWM pins, then I2C
    /// buses, then SPI buses.
    ///
    /// Each release is attempted independently; failures are collected into
    /// [`Error::Finalize`] so no unreleased resource goes unnoticed. After
    /// this returns the adaptor holds no OS resources and any further
    /// acquisition fails with [`Error::Finalized`].
    pub fn finalize(&self) -> Result<()> {
        let mut caches = relock(&self.caches);
        let mut failures = Vec::new();

        for (line, slot) in caches.digital.iter_mut().enumerate() {
            if let Some(mut pin) = slot.take() {
                if let Err(source) = pin.unexport() {
                    warn!("failed to unexport gpio{}: {}", line, source);
                    failures.push(Error::Io {
                        resource: format!("gpio{}", line),
                        source,
                    });
                }
            }
        }

        for (name, mut pin) in caches.pwm.drain() {
            if let Err(source) = pin.unexport() {
                warn!("failed to unexport pwm pin {}: {}", name, source);
                failures.push(Error::Io {
                    resource: format!("pwm pin {}", name),
                    source,
                });
            }
        }

        for (bus, device) in caches.i2c.drain() {
            if let Err(source) = relock(&device).close() {
                warn!("failed to close i2c-{}: {}", bus, source);
                failures.push(Error::Io {
                    resource: format!("i2c-{}", bus),
                    source,
                });
            }
        }

        for (bus, slot) in caches.spi.iter_mut().enumerate() {
            if let Some(device) = slot.take() {
                if let Err(source) = relock(&device).close() {
                    warn!("failed to close spi bus {}: {}", bus, source);
                    failures.push(Error::Io {
                        resource: format!("spi bus {}", bus),
                        source,
                    });
                }
            }
        }

        caches.finalized = true;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Finalize(failures))
        }
    }

    /// Reads the level of a digital header pin, acquiring it as an input.
    pub fn digital_read(&self, pin: &str) -> Result<u8> {
        self.with_digital(pin, Direction::In, |handle| handle.read())
    }

    /// Writes a level to a digital header pin, acquiring it as an output.
    /// Any non-zero `value` drives the line high.
    pub fn digital_write(&self, pin: &str, value: u8) -> Result<()> {
        self.with_digital(pin, Direction::Out, |handle| handle.write(value))
    }

    /// Reads the raw ADC value of an analog header pin.
    ///
    /// The raw-value file is opened fresh on every call; analog inputs are
    /// not claimable resources and no handle is cached. Open and read
    /// failures surface as errors, while malformed file contents read as 0,
    /// matching the long-standing behavior of this adaptor family.
    pub fn analog_read(&self, pin: &str) -> Result<i32> {
        let suffix =
            pins::translate_analog(pin).ok_or_else(|| Error::UnknownPin(pin.to_string()))?;
        let path = Path::new(ANALOG_PATH).join(suffix);

        let mut buf = [0u8; ANALOG_READ_LEN];
        let n = self
            .platform
            .read_file(&path, &mut buf)
            .map_err(|source| Error::Io {
                resource: format!("analog pin {}", pin),
                source,
            })?;

        let token = buf[..n].split(|&b| b == b'\n').next().unwrap_or_default();
        let value = std::str::from_utf8(token)
            .ok()
            .and_then(|s| s.parse::<i32>().ok())
            .unwrap_or(0);
        Ok(value)
    }

    /// Sets the duty cycle of a PWM-capable header pin, scaled so that 255
    /// covers the full default period.
    pub fn pwm_write(&self, pin: &str, value: u8) -> Result<()> {
        self.with_pwm(pin, |handle| {
            let duty = u64::from(PWM_DEFAULT_PERIOD) * u64::from(value) / 255;
            handle.set_duty_cycle(duty as u32)
        })
    }

    /// Returns a connection to the device at `address` on an I2C bus.
    ///
    /// The XU4 exposes buses 0 and 2 (`/dev/i2c-0`, `/dev/i2c-2`); any other
    /// bus number is rejected before anything is opened. The underlying bus
    /// device is opened once and shared between connections; the adaptor
    /// keeps ownership and closes it at [`Adaptor::finalize`].
    pub fn i2c_connection(&self, address: u16, bus: i32) -> Result<I2cConnection<P::I2c>> {
        let mut caches = relock(&self.caches);
        if caches.finalized {
            return Err(Error::Finalized);
        }
        if bus != 0 && bus != 2 {
            return Err(Error::InvalidBus(bus));
        }

        let device = match caches.i2c.entry(bus) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let path = PathBuf::from(format!("/dev/i2c-{}", bus));
                let device = self
                    .platform
                    .open_i2c(&path)
                    .map_err(|source| Error::Acquisition {
                        resource: format!("i2c-{}", bus),
                        source,
                    })?;
                debug!("opened i2c-{}", bus);
                let device = Arc::new(Mutex::new(device));
                entry.insert(Arc::clone(&device));
                device
            }
        };

        Ok(I2cConnection { device, address })
    }

    /// The default I2C bus number for this platform.
    pub fn default_i2c_bus(&self) -> i32 {
        1
    }

    /// Returns a connection to an SPI bus.
    ///
    /// Valid bus numbers are 0 and 1, backed by `/dev/spidev0.0` and
    /// `/dev/spidev0.1`. The device is opened and configured once per bus;
    /// later calls receive the already-configured connection regardless of
    /// the parameters they pass.
    pub fn spi_connection(
        &self,
        bus: i32,
        chip: u32,
        mode: u8,
        bits: u8,
        max_speed: u32,
    ) -> Result<SpiConnection<P::Spi>> {
        let mut caches = relock(&self.caches);
        if caches.finalized {
            return Err(Error::Finalized);
        }
        if bus < 0 || bus as usize >= SPI_BUS_COUNT {
            return Err(Error::InvalidBus(bus));
        }

        let idx = bus as usize;
        let device = match &caches.spi[idx] {
            Some(device) => Arc::clone(device),
            None => {
                let device = self
                    .platform
                    .open_spi(bus as u32, chip, mode, bits, max_speed)
                    .map_err(|source| Error::Acquisition {
                        resource: format!("spi bus {}", bus),
                        source,
                    })?;
                debug!("opened spi bus {}", bus);
                let device = Arc::new(Mutex::new(device));
                caches.spi[idx] = Some(Arc::clone(&device));
                device
            }
        };

        Ok(SpiConnection { device })
    }

    /// The default SPI bus for this platform.
    pub fn spi_default_bus(&self) -> i32 {
        0
    }

    /// The default SPI chip select for this platform.
    pub fn spi_default_chip(&self) -> u32 {
        0
    }

    /// The default SPI mode for this platform.
    pub fn spi_default_mode(&self) -> u8 {
        0
    }

    /// The default SPI word size for this platform.
    pub fn spi_default_bits(&self) -> u8 {
        8
    }

    /// The default SPI clock rate for this platform, in hertz.
    pub fn spi_default_max_speed(&self) -> u32 {
        500_000
    }

    /// Find-or-create for a digital pin, then run `f` on the handle. The
    /// whole sequence holds the adaptor lock.
    fn with_digital<T>(
        &self,
        pin: &str,
        direction: Direction,
        f: impl FnOnce(&mut P::Digital) -> io::Result<T>,
    ) -> Result<T> {
        let mut caches = relock(&self.caches);
        if caches.finalized {
            return Err(Error::Finalized);
        }
        let line = pins::translate_digital(pin).ok_or_else(|| Error::UnknownPin(pin.to_string()))?;
        let idx = line as usize;

        if caches.digital[idx].is_none() {
            let mut handle = self.platform.digital_pin(line);
            // the line must be routed to its gpio function before it can be
            // claimed; a mux failure leaves the slot empty
            self.mux_write(pin, "gpio")?;
            handle.export().map_err(|source| Error::Acquisition {
                resource: format!("gpio{}", line),
                source,
            })?;
            debug!("exported gpio{} for pin {}", line, pin);
            caches.digital[idx] = Some(handle);
        }

        match caches.digital[idx].as_mut() {
            Some(handle) => {
                // re-asserted on every request, cache hit or not: one
                // physical pin may be read and then written over its lifetime
                handle
                    .set_direction(direction)
                    .map_err(|source| Error::Io {
                        resource: format!("gpio{}", line),
                        source,
                    })?;
                f(handle).map_err(|source| Error::Io {
                    resource: format!("gpio{}", line),
                    source,
                })
            }
            None => unreachable!("digital slot {} populated above", idx),
        }
    }

    /// Find-or-create for a PWM pin, then run `f` on the handle.
    fn with_pwm<T>(
        &self,
        pin: &str,
        f: impl FnOnce(&mut P::Pwm) -> io::Result<T>,
    ) -> Result<T> {
        let mut caches = relock(&self.caches);
        if caches.finalized {
            return Err(Error::Finalized);
        }
        let data = pins::translate_pwm(pin).ok_or_else(|| Error::UnknownPin(pin.to_string()))?;

        let handle = match caches.pwm.entry(pin.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut handle = self.platform.pwm_pin(data.channel, data.chip_path);
                self.mux_write(pin, "pwm")?;
                let resource = format!("pwm{}", data.channel);
                handle.export().map_err(|source| Error::Acquisition {
                    resource: resource.clone(),
                    source,
                })?;
                handle
                    .set_period(PWM_DEFAULT_PERIOD)
                    .map_err(|source| Error::Acquisition { resource, source })?;
                debug!("exported pwm channel {} for pin {}", data.channel, pin);
                entry.insert(handle)
            }
        };

        f(handle).map_err(|source| Error::Io {
            resource: format!("pwm pin {}", pin),
            source,
        })
    }

    fn mux_write(&self, pin: &str, function: &str) -> Result<()> {
        let path = PathBuf::from(format!(
            "/sys/devices/platform/ocp/ocp:{}_pinmux/state",
            pin
        ));
        self.platform
            .write_file(&path, function.as_bytes())
            .map_err(|source| Error::Mux {
                pin: pin.to_string(),
                source,
            })
    }
}

/// A connection to one device on an I2C bus.
///
/// Connections are lightweight views onto a bus device owned by the adaptor;
/// the device address is asserted before every transfer, so connections to
/// different devices on the same bus can be used interleaved. Dropping a
/// connection releases nothing, the adaptor closes the bus at
/// [`Adaptor::finalize`].
#[derive(Debug)]
pub struct I2cConnection<D: I2cDevice> {
    device: Arc<Mutex<D>>,
    address: u16,
}

impl<D: I2cDevice> Clone for I2cConnection<D> {
    fn clone(&self) -> Self {
        I2cConnection {
            device: Arc::clone(&self.device),
            address: self.address,
        }
    }
}

impl<D: I2cDevice> I2cConnection<D> {
    /// The device address this connection talks to.
    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut device = relock(&self.device);
        device
            .set_address(self.address)
            .and_then(|()| device.read(buf))
            .map_err(|source| self.io_error(source))
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut device = relock(&self.device);
        device
            .set_address(self.address)
            .and_then(|()| device.write(buf))
            .map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: io::Error) -> Error {
        Error::Io {
            resource: format!("i2c device 0x{:02x}", self.address),
            source,
        }
    }
}

/// A connection to an SPI bus owned by the adaptor.
#[derive(Debug)]
pub struct SpiConnection<D: SpiDevice> {
    device: Arc<Mutex<D>>,
}

impl<D: SpiDevice> Clone for SpiConnection<D> {
    fn clone(&self) -> Self {
        SpiConnection {
            device: Arc::clone(&self.device),
        }
    }
}

impl<D: SpiDevice> SpiConnection<D> {
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        relock(&self.device).read(buf).map_err(|source| Error::Io {
            resource: "spi bus".to_string(),
            source,
        })
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        relock(&self.device).write(buf).map_err(|source| Error::Io {
            resource: "spi bus".to_string(),
            source,
        })
    }
}
