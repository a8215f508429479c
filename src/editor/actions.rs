//! Scalar enumerations carried by a policy record
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::EditorError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Accept,
    Deny,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match &self {
            Action::Accept => "accept",
            Action::Deny => "deny",
        }
    }

    pub fn is_deny(&self) -> bool {
        *self == Action::Deny
    }
}

impl FromStr for Action {
    type Err = EditorError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(Action::Accept),
            "deny" => Ok(Action::Deny),
            _ => Err(EditorError::InvalidSelection(format!("unexpected action: {}", s))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InspectionMode {
    #[default]
    Flow,
    Proxy,
}

impl InspectionMode {
    pub fn as_str(&self) -> &'static str {
        match &self {
            InspectionMode::Flow => "flow",
            InspectionMode::Proxy => "proxy",
        }
    }
}

impl FromStr for InspectionMode {
    type Err = EditorError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flow" => Ok(InspectionMode::Flow),
            "proxy" => Ok(InspectionMode::Proxy),
            _ => Err(EditorError::InvalidSelection(format!(
                "unexpected inspection mode: {}",
                s
            ))),
        }
    }
}

/// enable/disable switch used by NAT, log-traffic-start and ASIC offload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    Enable,
    Disable,
}

pub type NatMode = Toggle;

impl Toggle {
    pub fn as_str(&self) -> &'static str {
        match &self {
            Toggle::Enable => "enable",
            Toggle::Disable => "disable",
        }
    }

    pub fn is_enabled(&self) -> bool {
        *self == Toggle::Enable
    }
}

impl FromStr for Toggle {
    type Err = EditorError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enable" => Ok(Toggle::Enable),
            "disable" => Ok(Toggle::Disable),
            _ => Err(EditorError::InvalidSelection(format!(
                "expected enable or disable, got: {}",
                s
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTraffic {
    #[default]
    All,
    Utm,
    Disable,
}

impl LogTraffic {
    pub fn as_str(&self) -> &'static str {
        match &self {
            LogTraffic::All => "all",
            LogTraffic::Utm => "utm",
            LogTraffic::Disable => "disable",
        }
    }
}

impl FromStr for LogTraffic {
    type Err = EditorError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(LogTraffic::All),
            "utm" => Ok(LogTraffic::Utm),
            "disable" => Ok(LogTraffic::Disable),
            _ => Err(EditorError::InvalidSelection(format!(
                "unexpected log traffic mode: {}",
                s
            ))),
        }
    }
}

/// Protocol of a custom service
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    TCP,
    UDP,
    ICMP,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match &self {
            Protocol::TCP => "TCP",
            Protocol::UDP => "UDP",
            Protocol::ICMP => "ICMP",
        }
    }
}

impl FromStr for Protocol {
    type Err = EditorError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TCP" => Ok(Protocol::TCP),
            "UDP" => Ok(Protocol::UDP),
            "ICMP" => Ok(Protocol::ICMP),
            _ => Err(EditorError::InvalidSelection(format!(
                "unexpected protocol: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {

    use assert2::check;

    use super::{Action, InspectionMode, LogTraffic, Protocol, Toggle};
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case("accept", Some(Action::Accept))]
    #[case("deny", Some(Action::Deny))]
    #[case("drop", None)]
    #[case("", None)]
    fn test_action(#[case] name: &str, #[case] value: Option<Action>) {
        if let Some(v) = value {
            check!(Action::from_str(name).unwrap() == v);
            check!(v.as_str() == name);
        } else {
            // an error case
            check!(Action::from_str(name).is_err());
        }
    }

    #[rstest]
    #[case("flow", Some(InspectionMode::Flow))]
    #[case("proxy", Some(InspectionMode::Proxy))]
    #[case("Flow", None)]
    fn test_inspection_mode(#[case] name: &str, #[case] value: Option<InspectionMode>) {
        match value {
            Some(v) => {
                check!(InspectionMode::from_str(name).unwrap() == v);
                check!(v.as_str() == name);
            }
            None => {
                check!(InspectionMode::from_str(name).is_err());
            }
        }
    }

    #[rstest]
    #[case("all", Some(LogTraffic::All))]
    #[case("utm", Some(LogTraffic::Utm))]
    #[case("disable", Some(LogTraffic::Disable))]
    #[case("enable", None)]
    fn test_log_traffic(#[case] name: &str, #[case] value: Option<LogTraffic>) {
        match value {
            Some(v) => {
                check!(LogTraffic::from_str(name).unwrap() == v);
            }
            None => {
                check!(LogTraffic::from_str(name).is_err());
            }
        }
    }

    #[test]
    fn test_toggle() {
        check!(Toggle::from_str("enable").unwrap().is_enabled());
        check!(!Toggle::from_str("disable").unwrap().is_enabled());
        check!(Toggle::from_str("yes").is_err());
        check!(Toggle::Enable.to_string() == "enable");
    }

    #[rstest]
    #[case("TCP", Protocol::TCP)]
    #[case("udp", Protocol::UDP)]
    #[case("Icmp", Protocol::ICMP)]
    fn test_protocol_is_case_insensitive(#[case] name: &str, #[case] value: Protocol) {
        check!(Protocol::from_str(name).unwrap() == value);
    }
}
