//! Linux implementations of the platform traits.
//!
//! GPIO and PWM go through the sysfs class interfaces, I2C and SPI through
//! their character devices. All handles are plain file descriptors; nothing
//! here caches anything, that is the adaptor's job.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::debug;

use super::{Direction, DigitalPin, I2cDevice, Platform, PwmPin, SpiDevice};

static GPIO_ROOT: &str = "/sys/class/gpio";

/// How long to wait for udev to surface the attribute files of a freshly
/// exported line before giving up.
const EXPORT_SETTLE_TRIES: u32 = 100;
const EXPORT_SETTLE_STEP: Duration = Duration::from_millis(10);

const I2C_SLAVE: libc::c_ulong = 0x0703;
const SPI_IOC_WR_MODE: libc::c_ulong = 0x4001_6b01;
const SPI_IOC_WR_BITS_PER_WORD: libc::c_ulong = 0x4001_6b03;
const SPI_IOC_WR_MAX_SPEED_HZ: libc::c_ulong = 0x4004_6b04;

fn check_ioctl(ret: libc::c_int) -> io::Result<()> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "device already closed")
}

/// The production [`Platform`] backed by the Linux kernel interfaces.
#[derive(Debug, Default)]
pub struct SysfsPlatform;

impl SysfsPlatform {
    pub fn new() -> Self {
        SysfsPlatform
    }
}

impl Platform for SysfsPlatform {
    type Digital = SysfsDigitalPin;
    type Pwm = SysfsPwmPin;
    type I2c = SysfsI2c;
    type Spi = SysfsSpi;

    fn digital_pin(&self, line: u32) -> SysfsDigitalPin {
        SysfsDigitalPin { line }
    }

    fn pwm_pin(&self, channel: u32, chip_path: &str) -> SysfsPwmPin {
        SysfsPwmPin {
            channel,
            chip_path: PathBuf::from(chip_path),
        }
    }

    fn open_i2c(&self, path: &Path) -> io::Result<SysfsI2c> {
        debug!("opening i2c device {}", path.display());
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(SysfsI2c { file: Some(file) })
    }

    fn open_spi(
        &self,
        bus: u32,
        chip: u32,
        mode: u8,
        bits: u8,
        max_speed: u32,
    ) -> io::Result<SysfsSpi> {
        let path = format!("/dev/spidev{}.{}", bus, chip);
        debug!("opening spi device {}", path);
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let fd = file.as_raw_fd();
        unsafe {
            check_ioctl(libc::ioctl(fd, SPI_IOC_WR_MODE, &mode))?;
            check_ioctl(libc::ioctl(fd, SPI_IOC_WR_BITS_PER_WORD, &bits))?;
            check_ioctl(libc::ioctl(fd, SPI_IOC_WR_MAX_SPEED_HZ, &max_speed))?;
        }
        Ok(SysfsSpi { file: Some(file) })
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).open(path)?;
        file.write_all(contents)
    }

    fn read_file(&self, path: &Path, buf: &mut [u8]) -> io::Result<usize> {
        let mut file = File::open(path)?;
        file.read(buf)
    }
}

/// One sysfs GPIO line under `/sys/class/gpio/gpio<line>`.
#[derive(Debug)]
pub struct SysfsDigitalPin {
    line: u32,
}

impl SysfsDigitalPin {
    fn dir(&self) -> PathBuf {
        PathBuf::from(format!("{}/gpio{}", GPIO_ROOT, self.line))
    }

    fn attribute(&self, name: &str) -> PathBuf {
        self.dir().join(name)
    }
}

impl DigitalPin for SysfsDigitalPin {
    fn export(&mut self) -> io::Result<()> {
        if !self.dir().exists() {
            debug!("exporting gpio line {}", self.line);
            let mut f = OpenOptions::new()
                .write(true)
                .open(format!("{}/export", GPIO_ROOT))?;
            f.write_all(self.line.to_string().as_bytes())?;
        }

        // udev needs a moment to create and chown the attribute files
        let value = self.attribute("value");
        for _ in 0..EXPORT_SETTLE_TRIES {
            if value.exists() {
                return Ok(());
            }
            thread::sleep(EXPORT_SETTLE_STEP);
        }
        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("gpio{} did not appear after export", self.line),
        ))
    }

    fn unexport(&mut self) -> io::Result<()> {
        if self.dir().exists() {
            debug!("unexporting gpio line {}", self.line);
            let mut f = OpenOptions::new()
                .write(true)
                .open(format!("{}/unexport", GPIO_ROOT))?;
            f.write_all(self.line.to_string().as_bytes())?;
        }
        Ok(())
    }

    fn set_direction(&mut self, direction: Direction) -> io::Result<()> {
        let mut f = OpenOptions::new()
            .write(true)
            .open(self.attribute("direction"))?;
        f.write_all(direction.as_str().as_bytes())
    }

    fn read(&mut self) -> io::Result<u8> {
        let raw = fs::read_to_string(self.attribute("value"))?;
        match raw.trim_end() {
            "0" => Ok(0),
            _ => Ok(1),
        }
    }

    fn write(&mut self, value: u8) -> io::Result<()> {
        let mut f = OpenOptions::new().write(true).open(self.attribute("value"))?;
        let s = if value == 0 { "0" } else { "1" };
        f.write_all(s.as_bytes())
    }
}

/// One channel under a sysfs PWM chip, e.g. `/sys/class/pwm/pwmchip0/pwm0`.
#[derive(Debug)]
pub struct SysfsPwmPin {
    channel: u32,
    chip_path: PathBuf,
}

impl SysfsPwmPin {
    fn channel_dir(&self) -> PathBuf {
        self.chip_path.join(format!("pwm{}", self.channel))
    }

    fn write_attribute(&self, name: &str, value: u32) -> io::Result<()> {
        let mut f = OpenOptions::new()
            .write(true)
            .open(self.channel_dir().join(name))?;
        f.write_all(value.to_string().as_bytes())
    }
}

impl PwmPin for SysfsPwmPin {
    fn export(&mut self) -> io::Result<()> {
        if !self.channel_dir().exists() {
            debug!("exporting pwm channel {}", self.channel);
            let mut f = OpenOptions::new()
                .write(true)
                .open(self.chip_path.join("export"))?;
            f.write_all(self.channel.to_string().as_bytes())?;
        }
        Ok(())
    }

    fn unexport(&mut self) -> io::Result<()> {
        if self.channel_dir().exists() {
            debug!("unexporting pwm channel {}", self.channel);
            let mut f = OpenOptions::new()
                .write(true)
                .open(self.chip_path.join("unexport"))?;
            f.write_all(self.channel.to_string().as_bytes())?;
        }
        Ok(())
    }

    fn set_period(&mut self, nanos: u32) -> io::Result<()> {
        self.write_attribute("period", nanos)
    }

    fn set_duty_cycle(&mut self, nanos: u32) -> io::Result<()> {
        self.write_attribute("duty_cycle", nanos)
    }
}

/// An open `/dev/i2c-N` controller.
#[derive(Debug)]
pub struct SysfsI2c {
    file: Option<File>,
}

impl I2cDevice for SysfsI2c {
    fn set_address(&mut self, address: u16) -> io::Result<()> {
        let file = self.file.as_ref().ok_or_else(closed)?;
        unsafe {
            check_ioctl(libc::ioctl(
                file.as_raw_fd(),
                I2C_SLAVE,
                libc::c_ulong::from(address),
            ))
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.as_mut().ok_or_else(closed)?.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.as_mut().ok_or_else(closed)?.write(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        self.file.take().ok_or_else(closed).map(drop)
    }
}

/// An open `/dev/spidevB.C` bus, configured at open time.
#[derive(Debug)]
pub struct SysfsSpi {
    file: Option<File>,
}

impl SpiDevice for SysfsSpi {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.as_mut().ok_or_else(closed)?.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.as_mut().ok_or_else(closed)?.write(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        self.file.take().ok_or_else(closed).map(drop)
    }
}
