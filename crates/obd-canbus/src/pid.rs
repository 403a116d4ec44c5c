//! Physical value decoders for common service 0x01/0x02 PIDs (SAE J1979).

use serde::Serialize;

/// Decoded PID value with metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PidValue {
    pub pid: u8,
    pub name: &'static str,
    pub value: f64,
    pub unit: &'static str,
}

struct PidFormula {
    pid: u8,
    name: &'static str,
    unit: &'static str,
    len: usize,
    decode: fn(&[u8]) -> f64,
}

fn byte(d: &[u8]) -> f64 {
    f64::from(d[0])
}

fn word(d: &[u8]) -> f64 {
    f64::from(u16::from_be_bytes([d[0], d[1]]))
}

fn percent(d: &[u8]) -> f64 {
    byte(d) * 100.0 / 255.0
}

fn temperature(d: &[u8]) -> f64 {
    byte(d) - 40.0
}

fn fuel_trim(d: &[u8]) -> f64 {
    (byte(d) - 128.0) * 100.0 / 128.0
}

#[rustfmt::skip]
const FORMULAS: &[PidFormula] = &[
    PidFormula { pid: 0x04, name: "Engine Load", unit: "%", len: 1, decode: percent },
    PidFormula { pid: 0x05, name: "Coolant Temperature", unit: "°C", len: 1, decode: temperature },
    PidFormula { pid: 0x06, name: "Short Term Fuel Trim B1", unit: "%", len: 1, decode: fuel_trim },
    PidFormula { pid: 0x07, name: "Long Term Fuel Trim B1", unit: "%", len: 1, decode: fuel_trim },
    PidFormula { pid: 0x0B, name: "Intake MAP", unit: "kPa", len: 1, decode: byte },
    PidFormula { pid: 0x0C, name: "Engine RPM", unit: "rpm", len: 2, decode: |d| word(d) / 4.0 },
    PidFormula { pid: 0x0D, name: "Vehicle Speed", unit: "km/h", len: 1, decode: byte },
    PidFormula { pid: 0x0E, name: "Timing Advance", unit: "°", len: 1, decode: |d| byte(d) / 2.0 - 64.0 },
    PidFormula { pid: 0x0F, name: "Intake Air Temp", unit: "°C", len: 1, decode: temperature },
    PidFormula { pid: 0x10, name: "MAF Rate", unit: "g/s", len: 2, decode: |d| word(d) / 100.0 },
    PidFormula { pid: 0x11, name: "Throttle Position", unit: "%", len: 1, decode: percent },
    PidFormula { pid: 0x1C, name: "OBD Standard", unit: "", len: 1, decode: byte },
    PidFormula { pid: 0x1F, name: "Runtime Since Start", unit: "s", len: 2, decode: word },
    PidFormula { pid: 0x2F, name: "Fuel Level", unit: "%", len: 1, decode: percent },
    PidFormula { pid: 0x33, name: "Barometric Pressure", unit: "kPa", len: 1, decode: byte },
    PidFormula { pid: 0x42, name: "Control Module Voltage", unit: "V", len: 2, decode: |d| word(d) / 1000.0 },
    PidFormula { pid: 0x46, name: "Ambient Air Temp", unit: "°C", len: 1, decode: temperature },
    PidFormula { pid: 0x49, name: "Accel Pedal D", unit: "%", len: 1, decode: percent },
    PidFormula { pid: 0x4C, name: "Cmd Throttle Actuator", unit: "%", len: 1, decode: percent },
    PidFormula { pid: 0x51, name: "Fuel Type", unit: "", len: 1, decode: byte },
];

/// Decode `data` (the bytes after the service and PID echo) for `pid`.
///
/// Returns `None` for PIDs without a known formula or when too few bytes
/// were received.
pub fn decode_pid(pid: u16, data: &[u8]) -> Option<PidValue> {
    let pid = u8::try_from(pid).ok()?;
    let formula = FORMULAS.iter().find(|f| f.pid == pid)?;
    let bytes = data.get(..formula.len)?;

    Some(PidValue {
        pid,
        name: formula.name,
        value: (formula.decode)(bytes),
        unit: formula.unit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_pid_rpm() {
        let v = decode_pid(0x0C, &[0x36, 0xB0]).unwrap();
        assert_eq!(v.name, "Engine RPM");
        assert!((v.value - 3500.0).abs() < 0.01);
        assert_eq!(v.unit, "rpm");
    }

    #[test]
    fn decode_pid_speed() {
        let v = decode_pid(0x0D, &[0x3C]).unwrap();
        assert_eq!(v.name, "Vehicle Speed");
        assert!((v.value - 60.0).abs() < 0.01);
    }

    #[test]
    fn decode_pid_coolant_temp() {
        let v = decode_pid(0x05, &[130]).unwrap();
        assert!((v.value - 90.0).abs() < 0.01);
    }

    #[test]
    fn decode_pid_fuel_trim_is_signed() {
        assert!((decode_pid(0x06, &[0]).unwrap().value + 100.0).abs() < 0.01);
        assert!(decode_pid(0x07, &[128]).unwrap().value.abs() < 0.01);
    }

    #[test]
    fn decode_pid_voltage() {
        let v = decode_pid(0x42, &[0x37, 0x5A]).unwrap();
        assert!((v.value - 14.17).abs() < 0.01);
    }

    #[test]
    fn extra_bytes_are_ignored() {
        let v = decode_pid(0x11, &[255, 0xAA, 0xBB]).unwrap();
        assert!((v.value - 100.0).abs() < 0.01);
    }

    #[test]
    fn unknown_or_short_is_none() {
        assert!(decode_pid(0xFF, &[0x00]).is_none());
        assert!(decode_pid(0x0C, &[0x36]).is_none());
        assert!(decode_pid(0x010C, &[0x36, 0xB0]).is_none());
    }
}
