use serde::Serialize;

use crate::control_store::ControlDomainState;
use crate::coordinator::commands::read_time::DeviceClock;
use crate::error::{Error, Result};
use crate::profile::Domain;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Get(Domain),
    Set(Domain),
    GetTime,
}

impl std::str::FromStr for Command {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        use Command::*;

        let command = match name {
            "getTouCharging" => Get(Domain::TouCharging),
            "setTouCharging" => Set(Domain::TouCharging),
            "getTouDischarging" => Get(Domain::TouDischarging),
            "setTouDischarging" => Set(Domain::TouDischarging),
            "getTime" => GetTime,
            other => return Err(Error::UnknownCommand(other.to_string())),
        };

        Ok(command)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Get(Domain::TouCharging) => f.write_str("getTouCharging"),
            Command::Set(Domain::TouCharging) => f.write_str("setTouCharging"),
            Command::Get(Domain::TouDischarging) => f.write_str("getTouDischarging"),
            Command::Set(Domain::TouDischarging) => f.write_str("setTouDischarging"),
            Command::GetTime => f.write_str("getTime"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Get,
    Set,
}

/// What a domain command did, and the domain's state afterwards.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommandEnvelope {
    pub domain: Domain,
    pub operation: Operation,
    pub state: ControlDomainState,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CommandResult {
    /// A domain refreshed from the device.
    Domain(CommandEnvelope),
    /// A domain written to the device. Carries no reply payload.
    Written(CommandEnvelope),
    Time(DeviceClock),
}

impl CommandResult {
    pub fn envelope(&self) -> Option<&CommandEnvelope> {
        match self {
            CommandResult::Domain(envelope) | CommandResult::Written(envelope) => Some(envelope),
            CommandResult::Time(_) => None,
        }
    }

    /// JSON reply for the caller; `None` when the command succeeds silently.
    pub fn payload(&self) -> serde_json::Result<Option<String>> {
        match self {
            CommandResult::Domain(envelope) => serde_json::to_string(&envelope.state).map(Some),
            CommandResult::Time(clock) => serde_json::to_string(clock).map(Some),
            CommandResult::Written(_) => Ok(None),
        }
    }
}
