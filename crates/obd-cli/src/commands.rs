//! Command names, argument checks and dispatch onto the OBD-II session.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use obd_canbus::pid::{PidValue, decode_pid};
use obd_canbus::{
    CanResult, DtcReport, EnumerationReport, InfoReport, ObdResponse, ObdSession, enumerate,
};
use obd_protocol::{
    DtcSource, EcuSlot, ObdRequest, RequestError, SERVICE_CURRENT_DATA, SERVICE_FREEZE_FRAME,
    SERVICE_VEHICLE_INFO, Target,
};

/// A command word from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Enumerate,
    Show,
    Frozen,
    Clear,
    Faults,
    Pending,
    Permanent,
    Info,
    Request,
    Vin,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown command '{0}'")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command = match s.to_ascii_lowercase().as_str() {
            "enum" | "list" => Command::Enumerate,
            "show" | "data" => Command::Show,
            "frozen" | "freeze" => Command::Frozen,
            "clear" => Command::Clear,
            "faults" | "dtc" => Command::Faults,
            "pending" => Command::Pending,
            "permanent" | "perm" => Command::Permanent,
            "info" => Command::Info,
            "request" | "read" => Command::Request,
            "vin" => Command::Vin,
            _ => return Err(UnknownCommand(s.to_string())),
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Enumerate => "enum",
            Command::Show => "show",
            Command::Frozen => "frozen",
            Command::Clear => "clear",
            Command::Faults => "faults",
            Command::Pending => "pending",
            Command::Permanent => "permanent",
            Command::Info => "info",
            Command::Request => "request",
            Command::Vin => "vin",
        };
        f.write_str(name)
    }
}

/// Argument problems found before the bus is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("'{0}' needs a PID (-p <hex>)")]
    MissingPid(Command),

    #[error("'{0}' needs a service ID (-s <hex>)")]
    MissingService(Command),

    #[error(transparent)]
    Request(#[from] RequestError),
}

/// What to do on the bus, with every argument already validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Enumerate,
    Request(ObdRequest),
    SupportedInfo,
    ReadDtcs(DtcSource),
    Clear,
    Vin,
}

impl Command {
    /// Check the service/PID arguments this command needs.
    pub fn action(self, service: Option<u32>, pid: Option<u32>) -> Result<Action, UsageError> {
        let with_pid = |service: u8| -> Result<Action, UsageError> {
            let pid = pid.ok_or(UsageError::MissingPid(self))?;
            Ok(Action::Request(ObdRequest::new(u32::from(service), Some(pid))?))
        };

        match self {
            Command::Enumerate => Ok(Action::Enumerate),
            Command::Show => with_pid(SERVICE_CURRENT_DATA),
            Command::Frozen => with_pid(SERVICE_FREEZE_FRAME),
            Command::Clear => Ok(Action::Clear),
            Command::Faults => Ok(Action::ReadDtcs(DtcSource::Stored)),
            Command::Pending => Ok(Action::ReadDtcs(DtcSource::Pending)),
            Command::Permanent => Ok(Action::ReadDtcs(DtcSource::Permanent)),
            // PID 0 is the supported-info bitmap itself
            Command::Info => match pid {
                None | Some(0) => Ok(Action::SupportedInfo),
                Some(_) => with_pid(SERVICE_VEHICLE_INFO),
            },
            Command::Request => {
                let service = service.ok_or(UsageError::MissingService(self))?;
                let pid = pid.ok_or(UsageError::MissingPid(self))?;
                Ok(Action::Request(ObdRequest::new(service, Some(pid))?))
            }
            Command::Vin => Ok(Action::Vin),
        }
    }
}

/// Result of one command, ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Enumeration(EnumerationReport),
    Response {
        response: Option<ObdResponse>,
        #[serde(skip_serializing_if = "Option::is_none")]
        decoded: Option<PidValue>,
    },
    Info {
        report: Option<InfoReport>,
        broadcast: bool,
    },
    Dtcs {
        report: Option<DtcReport>,
    },
    Cleared {
        ecu: Option<EcuSlot>,
    },
    Vin {
        vin: Option<String>,
    },
}

/// Run `action` against `target`.
pub async fn execute(
    session: &ObdSession<'_>,
    action: Action,
    target: Target,
) -> CanResult<Outcome> {
    let outcome = match action {
        Action::Enumerate => Outcome::Enumeration(enumerate(session).await?),
        Action::Request(request) => {
            let response = session.request(target, request).await?;
            let decoded = response.as_ref().and_then(|r| decode_value(&request, &r.data));
            Outcome::Response { response, decoded }
        }
        Action::SupportedInfo => Outcome::Info {
            report: session.supported_info(target).await?,
            broadcast: target == Target::Broadcast,
        },
        Action::ReadDtcs(source) => Outcome::Dtcs {
            report: session.read_dtcs(target, source).await?,
        },
        Action::Clear => {
            session.clear_dtcs(target).await?;
            info!(?target, "clear DTC request sent");
            Outcome::Cleared {
                ecu: match target {
                    Target::Broadcast => None,
                    Target::Ecu(slot) => Some(slot),
                },
            }
        }
        Action::Vin => Outcome::Vin {
            vin: session.read_vin(target).await?,
        },
    };
    Ok(outcome)
}

/// Physical value for live and freeze frame data.
fn decode_value(request: &ObdRequest, data: &[u8]) -> Option<PidValue> {
    match request.service {
        SERVICE_CURRENT_DATA | SERVICE_FREEZE_FRAME => decode_pid(request.pid?, data),
        _ => None,
    }
}
