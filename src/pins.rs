//! Static pin translation tables for the Odroid XU4 expansion header (CON10).
//!
//! Header labels are strings rather than numbers because the XU4 silkscreen
//! uses bracketed variants (e.g. `"[4]"`) for the alternate shield labelling of
//! some pins. Those are distinct keys on purpose and are never merged with
//! their unbracketed counterparts.

/// PWM channel description: sysfs chip directory plus channel index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmPinData {
    pub channel: u32,
    pub chip_path: &'static str,
}

/// Translates a digital header label to its kernel GPIO line index.
///
/// Returns `None` for labels that are not part of the header map; callers
/// decide how a miss surfaces (the adaptor reports it as an unknown pin).
pub fn translate_digital(pin: &str) -> Option<u32> {
    let line = match pin {
        "4" => 173,
        "5" => 174,
        "6" => 171,
        "7" => 192,
        "8" => 172,
        "9" => 191,
        "10" => 189,
        "11" => 190,
        "13" => 21,
        "14" => 210,
        "15" => 18,
        "16" => 209,
        "17" => 22,
        "18" => 19,
        "19" => 30,
        "20" => 28,
        "21" => 29,
        "22" => 31,
        "24" => 25,
        "25" => 23,
        "26" => 24,
        "27" => 33,
        "[4]" => 188,
        "[5]" => 34,
        "[6]" => 187,
        _ => return None,
    };
    Some(line)
}

/// Translates an analog header label to the raw-value file name under the ADC
/// device directory. Both the header number and the `AINx` alias resolve to
/// the same file.
pub fn translate_analog(pin: &str) -> Option<&'static str> {
    let suffix = match pin {
        "3" | "AIN0" => "in_voltage0_raw",
        "23" | "AIN3" => "in_voltage3_raw",
        _ => return None,
    };
    Some(suffix)
}

/// Translates a PWM-capable header label to its channel on the XU4 PWM chip.
pub fn translate_pwm(pin: &str) -> Option<PwmPinData> {
    let data = match pin {
        "15" => PwmPinData {
            channel: 0,
            chip_path: "/sys/class/pwm/pwmchip0",
        },
        "33" => PwmPinData {
            channel: 1,
            chip_path: "/sys/class/pwm/pwmchip0",
        },
        _ => return None,
    };
    Some(data)
}
