//! Output formatting for the obd tool (text, json).

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use obd_canbus::{EcuReport, EnumerationReport};
use obd_protocol::{EcuSlot, FeatureBitmap};

use crate::commands::Outcome;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,
    /// JSON document on stdout
    Json,
}

/// Render `outcome` in the requested format. Text output for "no data" is
/// empty.
pub fn render(outcome: &Outcome, format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(outcome)),
        OutputFormat::Json => serde_json::to_string_pretty(outcome).map(|s| s + "\n"),
    }
}

pub fn render_text(outcome: &Outcome) -> String {
    let mut out = String::new();
    match outcome {
        Outcome::Enumeration(report) => write_enumeration(&mut out, report),
        Outcome::Response { response, decoded } => {
            let Some(r) = response else {
                return out;
            };
            let _ = write!(
                out,
                "Results (Service: {:02x}, PID: {:02x}, length: {})\n{}\n",
                r.service,
                r.pid.unwrap_or_default(),
                r.data.len(),
                hex(&r.data)
            );
            if let Some(v) = decoded {
                let _ = writeln!(out, "{}: {:.2} {}", v.name, v.value, v.unit);
            }
        }
        Outcome::Info { report, broadcast } => {
            if let Some(info) = report {
                if *broadcast {
                    write_ecu_header(&mut out, "ECU", info.ecu);
                }
                write_info(&mut out, info.bitmap);
            }
        }
        Outcome::Dtcs { report } => {
            if let Some(report) = report {
                out.push_str("Diagnostic trouble codes:\n");
                for code in &report.codes {
                    let _ = writeln!(out, "{code}");
                }
            }
        }
        Outcome::Cleared { .. } => out.push_str("Cleared DTC\n"),
        Outcome::Vin { vin } => {
            if let Some(vin) = vin {
                let _ = writeln!(out, "VIN: {vin}");
            }
        }
    }
    out
}

fn write_enumeration(out: &mut String, report: &EnumerationReport) {
    if report.is_empty() {
        out.push_str("No ECUs found\n");
        return;
    }
    for ecu in &report.ecus {
        write_ecu(out, ecu);
    }
}

fn write_ecu(out: &mut String, ecu: &EcuReport) {
    write_ecu_header(out, "Found ECU", ecu.ecu);
    for page in &ecu.pages {
        let (first, last) = page.range();
        let _ = writeln!(
            out,
            "    Available data [{first:02X}-{last:02X}]: {}",
            page.bitmap
        );
        let pids: Vec<String> = page.pids().map(|p| format!("{p:02X},")).collect();
        let _ = write!(out, "    {}\n\n", pids.concat());
    }
    if let Some(bitmap) = ecu.info {
        write_info(out, bitmap);
    }
}

fn write_ecu_header(out: &mut String, label: &str, ecu: EcuSlot) {
    let _ = writeln!(out, "{label}: {ecu} :");
}

fn write_info(out: &mut String, bitmap: FeatureBitmap) {
    let _ = writeln!(out, "    Available vehicle information: {bitmap}");
    let pids: Vec<String> = bitmap.pids().map(|p| format!("{p:02X},")).collect();
    let _ = write!(out, "    {}\n\n", pids.concat());
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_canbus::{DtcReport, InfoReport, ObdResponse};
    use obd_canbus::pid::decode_pid;
    use obd_protocol::{Dtc, DtcSource, FeaturePage};

    fn slot(n: u8) -> EcuSlot {
        EcuSlot::new(n).unwrap()
    }

    #[test]
    fn response_text_is_hex_dump() {
        let outcome = Outcome::Response {
            response: Some(ObdResponse {
                ecu: slot(0),
                service: 0x01,
                pid: Some(0x0C),
                data: vec![0x1B, 0x58],
            }),
            decoded: decode_pid(0x0C, &[0x1B, 0x58]),
        };
        assert_eq!(
            render_text(&outcome),
            "Results (Service: 01, PID: 0c, length: 2)\n1b58\nEngine RPM: 1750.00 rpm\n"
        );
    }

    #[test]
    fn no_data_renders_nothing() {
        let outcome = Outcome::Response {
            response: None,
            decoded: None,
        };
        assert_eq!(render_text(&outcome), "");
        assert_eq!(render_text(&Outcome::Dtcs { report: None }), "");
    }

    #[test]
    fn dtc_list() {
        let outcome = Outcome::Dtcs {
            report: Some(DtcReport {
                ecu: slot(0),
                source: DtcSource::Stored,
                codes: vec!["P0158".parse().unwrap(), Dtc::from_raw(0xF000)],
            }),
        };
        assert_eq!(
            render_text(&outcome),
            "Diagnostic trouble codes:\nP0158\nU3000\n"
        );
    }

    #[test]
    fn enumeration_text() {
        let outcome = Outcome::Enumeration(EnumerationReport {
            ecus: vec![EcuReport {
                ecu: slot(1),
                pages: vec![FeaturePage {
                    offset: 0x20,
                    bitmap: FeatureBitmap::new(0x8000_0001),
                }],
                info: Some(FeatureBitmap::new(0x4000_0000)),
            }],
        });
        let text = render_text(&outcome);
        assert!(text.starts_with("Found ECU: 1 (0x7e1/0x7e9) :\n"));
        assert!(text.contains("    Available data [21-40]: 0x80000001\n    21,40,\n"));
        assert!(text.contains("    Available vehicle information: 0x40000000\n    02,\n"));

        let empty = Outcome::Enumeration(EnumerationReport::default());
        assert_eq!(render_text(&empty), "No ECUs found\n");
    }

    #[test]
    fn broadcast_info_names_the_ecu() {
        let info = InfoReport {
            ecu: slot(0),
            bitmap: FeatureBitmap::new(0x5440_0000),
        };
        let text = render_text(&Outcome::Info {
            report: Some(info),
            broadcast: true,
        });
        assert!(text.starts_with("ECU: 0 (0x7e0/0x7e8) :\n"));
        assert!(text.contains("02,04,06,0A,"));

        let text = render_text(&Outcome::Info {
            report: Some(info),
            broadcast: false,
        });
        assert!(text.starts_with("    Available vehicle information: 0x54400000"));
    }

    #[test]
    fn json_is_tagged() {
        let outcome = Outcome::Dtcs {
            report: Some(DtcReport {
                ecu: slot(2),
                source: DtcSource::Pending,
                codes: vec![Dtc::from_raw(0x0158)],
            }),
        };
        let json = render(&outcome, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["kind"], "dtcs");
        assert_eq!(value["report"]["ecu"], 2);
        assert_eq!(value["report"]["source"], "pending");
        assert_eq!(value["report"]["codes"][0], "P0158");
    }
}
