//! In-memory platform used by the test suite.
//!
//! Every OS-level call is recorded in a shared [`MockState`] so tests can
//! assert how often a line was exported or which mux files were written, and
//! individual calls can be scripted to fail.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{Direction, DigitalPin, I2cDevice, Platform, PwmPin, SpiDevice};

fn injected() -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, "injected failure")
}

/// Call log and failure script shared by a [`MockPlatform`] and all handles it
/// hands out.
#[derive(Debug, Default)]
pub struct MockState {
    pub gpio_exports: HashMap<u32, u32>,
    pub gpio_unexports: Vec<u32>,
    pub directions: Vec<(u32, Direction)>,
    pub gpio_values: HashMap<u32, u8>,
    pub fail_gpio_export: HashSet<u32>,
    pub fail_gpio_unexport: HashSet<u32>,

    pub pwm_exports: HashMap<u32, u32>,
    pub pwm_unexports: Vec<u32>,
    pub pwm_periods: Vec<(u32, u32)>,
    pub pwm_duty_cycles: Vec<(u32, u32)>,
    pub fail_pwm_unexport: HashSet<u32>,

    pub i2c_opens: Vec<PathBuf>,
    pub i2c_addresses: Vec<u16>,
    pub i2c_written: Vec<Vec<u8>>,
    pub i2c_read_data: Vec<u8>,
    pub i2c_closes: u32,
    pub fail_i2c_open: bool,
    pub fail_i2c_close: bool,

    pub spi_opens: Vec<(u32, u32, u8, u8, u32)>,
    pub spi_written: Vec<Vec<u8>>,
    pub spi_closes: u32,
    pub fail_spi_open: bool,
    pub fail_spi_close: bool,

    /// Contents served by `read_file`, keyed by full path.
    pub files: HashMap<PathBuf, Vec<u8>>,
    /// Log of `write_file` calls (mux writes end up here).
    pub written_files: Vec<(PathBuf, Vec<u8>)>,
    pub fail_write_paths: HashSet<PathBuf>,
}

/// A [`Platform`] that records everything and touches no hardware.
#[derive(Debug, Clone, Default)]
pub struct MockPlatform {
    state: Arc<Mutex<MockState>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared state, for scripting failures and inspecting call logs.
    pub fn state(&self) -> Arc<Mutex<MockState>> {
        Arc::clone(&self.state)
    }
}

impl Platform for MockPlatform {
    type Digital = MockDigitalPin;
    type Pwm = MockPwmPin;
    type I2c = MockI2c;
    type Spi = MockSpi;

    fn digital_pin(&self, line: u32) -> MockDigitalPin {
        MockDigitalPin {
            line,
            state: Arc::clone(&self.state),
        }
    }

    fn pwm_pin(&self, channel: u32, _chip_path: &str) -> MockPwmPin {
        MockPwmPin {
            channel,
            state: Arc::clone(&self.state),
        }
    }

    fn open_i2c(&self, path: &Path) -> io::Result<MockI2c> {
        let mut state = self.state.lock().unwrap();
        if state.fail_i2c_open {
            return Err(injected());
        }
        state.i2c_opens.push(path.to_path_buf());
        Ok(MockI2c {
            state: Arc::clone(&self.state),
        })
    }

    fn open_spi(
        &self,
        bus: u32,
        chip: u32,
        mode: u8,
        bits: u8,
        max_speed: u32,
    ) -> io::Result<MockSpi> {
        let mut state = self.state.lock().unwrap();
        if state.fail_spi_open {
            return Err(injected());
        }
        state.spi_opens.push((bus, chip, mode, bits, max_speed));
        Ok(MockSpi {
            state: Arc::clone(&self.state),
        })
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_write_paths.contains(path) {
            return Err(injected());
        }
        state
            .written_files
            .push((path.to_path_buf(), contents.to_vec()));
        Ok(())
    }

    fn read_file(&self, path: &Path, buf: &mut [u8]) -> io::Result<usize> {
        let state = self.state.lock().unwrap();
        match state.files.get(path) {
            Some(contents) => {
                let n = contents.len().min(buf.len());
                buf[..n].copy_from_slice(&contents[..n]);
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no mock file at {}", path.display()),
            )),
        }
    }
}

#[derive(Debug)]
pub struct MockDigitalPin {
    line: u32,
    state: Arc<Mutex<MockState>>,
}

impl DigitalPin for MockDigitalPin {
    fn export(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_gpio_export.contains(&self.line) {
            return Err(injected());
        }
        *state.gpio_exports.entry(self.line).or_insert(0) += 1;
        Ok(())
    }

    fn unexport(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_gpio_unexport.contains(&self.line) {
            return Err(injected());
        }
        state.gpio_unexports.push(self.line);
        Ok(())
    }

    fn set_direction(&mut self, direction: Direction) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.directions.push((self.line, direction));
        Ok(())
    }

    fn read(&mut self) -> io::Result<u8> {
        let state = self.state.lock().unwrap();
        Ok(state.gpio_values.get(&self.line).copied().unwrap_or(0))
    }

    fn write(&mut self, value: u8) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.gpio_values.insert(self.line, value);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockPwmPin {
    channel: u32,
    state: Arc<Mutex<MockState>>,
}

impl PwmPin for MockPwmPin {
    fn export(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        *state.pwm_exports.entry(self.channel).or_insert(0) += 1;
        Ok(())
    }

    fn unexport(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_pwm_unexport.contains(&self.channel) {
            return Err(injected());
        }
        state.pwm_unexports.push(self.channel);
        Ok(())
    }

    fn set_period(&mut self, nanos: u32) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.pwm_periods.push((self.channel, nanos));
        Ok(())
    }

    fn set_duty_cycle(&mut self, nanos: u32) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.pwm_duty_cycles.push((self.channel, nanos));
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockI2c {
    state: Arc<Mutex<MockState>>,
}

impl I2cDevice for MockI2c {
    fn set_address(&mut self, address: u16) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.i2c_addresses.push(address);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let state = self.state.lock().unwrap();
        let n = state.i2c_read_data.len().min(buf.len());
        buf[..n].copy_from_slice(&state.i2c_read_data[..n]);
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.i2c_written.push(buf.to_vec());
        Ok(buf.len())
    }

    fn close(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_i2c_close {
            return Err(injected());
        }
        state.i2c_closes += 1;
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockSpi {
    state: Arc<Mutex<MockState>>,
}

impl SpiDevice for MockSpi {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        buf.fill(0);
        Ok(buf.len())
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.spi_written.push(buf.to_vec());
        Ok(buf.len())
    }

    fn close(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_spi_close {
            return Err(injected());
        }
        state.spi_closes += 1;
        Ok(())
    }
}
