use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;

use odroid_gpio::platform::mock::MockPlatform;
use odroid_gpio::{Adaptor, Error};

fn mock_adaptor() -> (Adaptor<MockPlatform>, MockPlatform) {
    let platform = MockPlatform::new();
    (Adaptor::with_platform(platform.clone()), platform)
}

#[test]
fn first_acquisition_exports_once_then_reuses_the_handle() {
    let (adaptor, platform) = mock_adaptor();

    adaptor.digital_read("7").unwrap();
    adaptor.digital_read("7").unwrap();
    adaptor.digital_write("7", 1).unwrap();

    let state = platform.state();
    let state = state.lock().unwrap();
    // pin "7" is kernel line 192; one mux write and one export total
    assert_eq!(state.gpio_exports.get(&192), Some(&1));
    assert_eq!(state.written_files.len(), 1);
    assert_eq!(state.gpio_values.get(&192), Some(&1));
}

#[test]
fn direction_is_reasserted_on_every_request() {
    let (adaptor, platform) = mock_adaptor();

    adaptor.digital_read("7").unwrap();
    adaptor.digital_write("7", 1).unwrap();
    adaptor.digital_read("7").unwrap();

    let state = platform.state();
    let state = state.lock().unwrap();
    assert_eq!(state.gpio_exports.get(&192), Some(&1));

    use odroid_gpio::Direction::{In, Out};
    assert_eq!(
        state.directions,
        vec![(192, In), (192, Out), (192, In)]
    );
}

#[test]
fn unknown_pin_fails_without_touching_the_platform() {
    let (adaptor, platform) = mock_adaptor();

    let err = adaptor.digital_read("99").unwrap_err();
    assert!(matches!(err, Error::UnknownPin(ref name) if name == "99"));

    let err = adaptor.analog_read("99").unwrap_err();
    assert!(matches!(err, Error::UnknownPin(_)));

    let state = platform.state();
    let state = state.lock().unwrap();
    assert!(state.gpio_exports.is_empty());
    assert!(state.written_files.is_empty());
}

#[test]
fn mux_failure_caches_nothing_and_allows_retry() {
    let (adaptor, platform) = mock_adaptor();
    let mux_path = PathBuf::from("/sys/devices/platform/ocp/ocp:7_pinmux/state");
    {
        let state = platform.state();
        let mut state = state.lock().unwrap();
        state.fail_write_paths.insert(mux_path.clone());
    }

    let err = adaptor.digital_read("7").unwrap_err();
    assert!(matches!(err, Error::Mux { ref pin, .. } if pin == "7"));

    {
        let state = platform.state();
        let mut state = state.lock().unwrap();
        assert!(state.gpio_exports.is_empty());
        state.fail_write_paths.remove(&mux_path);
    }

    // the failed attempt left the cache clean, so a retry exports normally
    adaptor.digital_read("7").unwrap();
    let state = platform.state();
    let state = state.lock().unwrap();
    assert_eq!(state.gpio_exports.get(&192), Some(&1));
}

#[test]
fn export_failure_caches_nothing() {
    let (adaptor, platform) = mock_adaptor();
    {
        let state = platform.state();
        state.lock().unwrap().fail_gpio_export.insert(192);
    }

    let err = adaptor.digital_write("7", 1).unwrap_err();
    assert!(matches!(err, Error::Acquisition { .. }));

    {
        let state = platform.state();
        state.lock().unwrap().fail_gpio_export.remove(&192);
    }
    adaptor.digital_write("7", 1).unwrap();
}

#[test]
fn concurrent_first_acquisitions_export_once() {
    let (adaptor, platform) = mock_adaptor();
    let adaptor = Arc::new(adaptor);
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let adaptor = Arc::clone(&adaptor);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                adaptor.digital_read("7").unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let state = platform.state();
    let state = state.lock().unwrap();
    assert_eq!(state.gpio_exports.get(&192), Some(&1));
    assert_eq!(state.written_files.len(), 1);
}

#[test]
fn i2c_bus_numbers_outside_the_allowed_set_are_rejected() {
    let (adaptor, platform) = mock_adaptor();

    for bus in [-1, 1, 3] {
        let err = adaptor.i2c_connection(0x40, bus).unwrap_err();
        assert!(matches!(err, Error::InvalidBus(b) if b == bus));
    }

    let state = platform.state();
    assert!(state.lock().unwrap().i2c_opens.is_empty());
}

#[test]
fn i2c_bus_is_opened_once_and_shared() {
    let (adaptor, platform) = mock_adaptor();

    let eeprom = adaptor.i2c_connection(0x50, 2).unwrap();
    let sensor = adaptor.i2c_connection(0x40, 2).unwrap();

    eeprom.write(&[0x01]).unwrap();
    let mut buf = [0u8; 2];
    sensor.read(&mut buf).unwrap();

    let state = platform.state();
    let state = state.lock().unwrap();
    assert_eq!(state.i2c_opens, vec![PathBuf::from("/dev/i2c-2")]);
    // the address is asserted before each transfer
    assert_eq!(state.i2c_addresses, vec![0x50, 0x40]);
    assert_eq!(state.i2c_written, vec![vec![0x01]]);
}

#[test]
fn spi_bus_numbers_outside_the_range_are_rejected() {
    let (adaptor, platform) = mock_adaptor();

    for bus in [-1, 2, 7] {
        let err = adaptor
            .spi_connection(bus, 0, 0, 8, 500_000)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBus(b) if b == bus));
    }

    let state = platform.state();
    assert!(state.lock().unwrap().spi_opens.is_empty());
}

#[test]
fn spi_bus_is_configured_once_with_the_first_parameters() {
    let (adaptor, platform) = mock_adaptor();

    adaptor.spi_connection(0, 0, 3, 8, 1_000_000).unwrap();
    // later parameters are ignored, the configured bus is reused
    adaptor.spi_connection(0, 1, 0, 16, 500_000).unwrap();

    let state = platform.state();
    let state = state.lock().unwrap();
    assert_eq!(state.spi_opens, vec![(0, 0, 3, 8, 1_000_000)]);
}

#[test]
fn analog_read_parses_the_first_line() {
    let (adaptor, platform) = mock_adaptor();
    {
        let state = platform.state();
        state.lock().unwrap().files.insert(
            PathBuf::from("/sys/devices/12d10000.adc/iio:device0/in_voltage0_raw"),
            b"512\n".to_vec(),
        );
    }

    assert_eq!(adaptor.analog_read("3").unwrap(), 512);
    // the AINx alias resolves to the same device file
    assert_eq!(adaptor.analog_read("AIN0").unwrap(), 512);
}

#[test]
fn analog_read_propagates_open_failures_but_not_parse_failures() {
    let (adaptor, platform) = mock_adaptor();

    // no file behind pin "23"
    let err = adaptor.analog_read("23").unwrap_err();
    assert!(matches!(err, Error::Io { .. }));

    {
        let state = platform.state();
        state.lock().unwrap().files.insert(
            PathBuf::from("/sys/devices/12d10000.adc/iio:device0/in_voltage3_raw"),
            b"not-a-number\n".to_vec(),
        );
    }
    // malformed contents read as zero without an error
    assert_eq!(adaptor.analog_read("23").unwrap(), 0);
}

#[test]
fn finalize_releases_every_kind_in_order() {
    let (adaptor, platform) = mock_adaptor();

    adaptor.digital_write("7", 1).unwrap();
    adaptor.digital_read("10").unwrap();
    adaptor.pwm_write("15", 128).unwrap();
    adaptor.i2c_connection(0x40, 0).unwrap();
    adaptor.spi_connection(1, 0, 0, 8, 500_000).unwrap();

    adaptor.finalize().unwrap();

    let state = platform.state();
    let state = state.lock().unwrap();
    let mut unexported = state.gpio_unexports.clone();
    unexported.sort_unstable();
    assert_eq!(unexported, vec![189, 192]);
    assert_eq!(state.pwm_unexports, vec![0]);
    assert_eq!(state.i2c_closes, 1);
    assert_eq!(state.spi_closes, 1);
}

#[test]
fn finalize_aggregates_release_failures_and_keeps_going() {
    let (adaptor, platform) = mock_adaptor();

    adaptor.digital_write("7", 1).unwrap(); // line 192
    adaptor.digital_read("10").unwrap(); // line 189
    adaptor.pwm_write("15", 10).unwrap(); // channel 0
    adaptor.i2c_connection(0x40, 0).unwrap();
    adaptor.spi_connection(0, 0, 0, 8, 500_000).unwrap();

    {
        let state = platform.state();
        let mut state = state.lock().unwrap();
        state.fail_gpio_unexport.insert(189);
        state.fail_pwm_unexport.insert(0);
    }

    let err = adaptor.finalize().unwrap_err();
    match err {
        Error::Finalize(failures) => assert_eq!(failures.len(), 2),
        other => panic!("expected aggregate error, got {:?}", other),
    }

    // the failures did not stop the remaining releases
    let state = platform.state();
    let state = state.lock().unwrap();
    assert_eq!(state.gpio_unexports, vec![192]);
    assert_eq!(state.i2c_closes, 1);
    assert_eq!(state.spi_closes, 1);
}

#[test]
fn acquisition_after_finalize_is_refused() {
    let (adaptor, _platform) = mock_adaptor();

    adaptor.digital_write("7", 1).unwrap();
    adaptor.finalize().unwrap();

    assert!(matches!(
        adaptor.digital_read("7").unwrap_err(),
        Error::Finalized
    ));
    assert!(matches!(
        adaptor.pwm_write("15", 1).unwrap_err(),
        Error::Finalized
    ));
    assert!(matches!(
        adaptor.i2c_connection(0x40, 0).unwrap_err(),
        Error::Finalized
    ));
    assert!(matches!(
        adaptor.spi_connection(0, 0, 0, 8, 500_000).unwrap_err(),
        Error::Finalized
    ));
}
