use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use super::actions::{Action, InspectionMode, LogTraffic, NatMode, Protocol, Toggle};
use super::errors::{EditorError, EditorResult};
use super::merger::{AddressBuckets, SubjectBuckets};
use super::utils::parse_flag;

/// Opaque, stable policy identifier. Never reused once minted.
#[derive(Clone, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[display("{_0}")]
#[serde(transparent)]
pub struct PolicyId(String);

impl PolicyId {
    pub fn mint() -> Self {
        PolicyId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PolicyId {
    fn from(s: &str) -> Self {
        PolicyId(s.to_string())
    }
}

impl From<String> for PolicyId {
    fn from(s: String) -> Self {
        PolicyId(s)
    }
}

/// Source or destination side of a policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Src,
    Dst,
}

impl FromStr for Direction {
    type Err = EditorError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "src" => Ok(Direction::Src),
            "dst" => Ok(Direction::Dst),
            _ => Err(EditorError::InvalidSelection(format!(
                "expected src or dst, got: {}",
                s
            ))),
        }
    }
}

/// The four security profiles that can be switched on and off
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    Webfilter,
    ApplicationList,
    Antivirus,
    IpsSensor,
}

impl Profile {
    pub const ALL: [Profile; 4] = [
        Profile::Webfilter,
        Profile::ApplicationList,
        Profile::Antivirus,
        Profile::IpsSensor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Webfilter => "webfilter-profile",
            Profile::ApplicationList => "application-list",
            Profile::Antivirus => "av-profile",
            Profile::IpsSensor => "ips-sensor",
        }
    }
}

/// A profile association with its enable switch. A disabled slot never holds a value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSlot {
    pub enabled: bool,
    pub value: String,
}

impl ProfileSlot {
    pub fn enabled() -> Self {
        ProfileSlot {
            enabled: true,
            value: String::new(),
        }
    }

    pub fn disabled() -> Self {
        ProfileSlot::default()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.value.clear();
        }
    }

    /// Returns false if the slot is disabled and the value was dropped
    pub fn set_value(&mut self, value: &str) -> bool {
        if !self.enabled {
            return false;
        }
        self.value = value.to_string();
        true
    }

    /// The value that actually applies
    pub fn effective(&self) -> Option<&str> {
        (self.enabled && !self.value.is_empty()).then_some(self.value.as_str())
    }
}

/// One entry of a policy's service list
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceSelection {
    Template {
        name: String,
    },
    Group {
        name: String,
    },
    Custom {
        name: String,
        protocol: Protocol,
        port: String,
    },
}

impl ServiceSelection {
    pub fn placeholder() -> Self {
        ServiceSelection::Template {
            name: String::new(),
        }
    }

    pub fn blank_custom() -> Self {
        ServiceSelection::Custom {
            name: String::new(),
            protocol: Protocol::TCP,
            port: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ServiceSelection::Template { name }
            | ServiceSelection::Group { name }
            | ServiceSelection::Custom { name, .. } => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServiceSelection::Template { .. } => "template",
            ServiceSelection::Group { .. } => "group",
            ServiceSelection::Custom { .. } => "custom",
        }
    }

    /// Name under which the service appears in generated policies
    pub fn service_name(&self) -> String {
        match self {
            ServiceSelection::Custom { name, .. } => format!("custom_{}", name),
            ServiceSelection::Template { name } | ServiceSelection::Group { name } => name.clone(),
        }
    }
}

impl FromStr for ServiceSelection {
    type Err = EditorError;

    /// Parses `template:<name>`, `group:<name>` or `custom`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "custom" {
            return Ok(ServiceSelection::blank_custom());
        }

        match s.split_once(':') {
            Some(("template", name)) => Ok(ServiceSelection::Template {
                name: name.to_string(),
            }),
            Some(("group", name)) => Ok(ServiceSelection::Group {
                name: name.to_string(),
            }),
            Some(("custom", _)) => Ok(ServiceSelection::blank_custom()),
            _ => Err(EditorError::InvalidSelection(format!(
                "unknown service selection '{}'",
                s
            ))),
        }
    }
}

/// Editable attribute of a custom service
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CustomServiceField {
    Name,
    Protocol,
    Port,
}

impl FromStr for CustomServiceField {
    type Err = EditorError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(CustomServiceField::Name),
            "protocol" => Ok(CustomServiceField::Protocol),
            "port" => Ok(CustomServiceField::Port),
            _ => Err(EditorError::InvalidSelection(format!(
                "unknown custom service field: {}",
                s
            ))),
        }
    }
}

/// Scalar fields committed through [PolicyRecord::apply_field_edit]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Name,
    Comment,
    Action,
    InspectionMode,
    SslSshProfile,
    ProfileValue(Profile),
    ProfileEnabled(Profile),
    LogTraffic,
    LogTrafficStart,
    AutoAsicOffload,
    Nat,
    IpPool,
}

impl FromStr for Field {
    type Err = EditorError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let field = match s {
            "name" => Field::Name,
            "comment" => Field::Comment,
            "action" => Field::Action,
            "inspection-mode" => Field::InspectionMode,
            "ssl-ssh-profile" => Field::SslSshProfile,
            "webfilter-profile" => Field::ProfileValue(Profile::Webfilter),
            "webfilter-enabled" => Field::ProfileEnabled(Profile::Webfilter),
            "application-list" => Field::ProfileValue(Profile::ApplicationList),
            "application-list-enabled" => Field::ProfileEnabled(Profile::ApplicationList),
            "av-profile" => Field::ProfileValue(Profile::Antivirus),
            "av-enabled" => Field::ProfileEnabled(Profile::Antivirus),
            "ips-sensor" => Field::ProfileValue(Profile::IpsSensor),
            "ips-sensor-enabled" => Field::ProfileEnabled(Profile::IpsSensor),
            "logtraffic" => Field::LogTraffic,
            "logtraffic-start" => Field::LogTrafficStart,
            "auto-asic-offload" => Field::AutoAsicOffload,
            "nat" => Field::Nat,
            "ip-pool" => Field::IpPool,
            _ => {
                return Err(EditorError::InvalidSelection(format!(
                    "unknown field: {}",
                    s
                )))
            }
        };
        Ok(field)
    }
}

/// One firewall policy being edited
#[derive(Clone, Debug, PartialEq)]
pub struct PolicyRecord {
    pub id: PolicyId,
    pub name: String,
    pub comment: String,
    pub action: Action,
    pub inspection_mode: InspectionMode,
    pub nat: NatMode,
    /// Only meaningful with NAT enabled; kept empty otherwise
    pub ip_pool: String,
    pub log_traffic: LogTraffic,
    pub log_traffic_start: Toggle,
    pub auto_asic_offload: Toggle,

    pub src_interfaces: Vec<String>,
    pub dst_interfaces: Vec<String>,
    pub src: AddressBuckets,
    pub dst: AddressBuckets,
    pub services: Vec<ServiceSelection>,
    pub subjects: SubjectBuckets,

    pub ssl_ssh_profile: String,
    pub webfilter: ProfileSlot,
    pub application_list: ProfileSlot,
    pub antivirus: ProfileSlot,
    pub ips_sensor: ProfileSlot,
}

impl PolicyRecord {
    pub fn new(id: PolicyId) -> Self {
        PolicyRecord {
            id,
            name: String::new(),
            comment: String::new(),
            action: Action::Accept,
            inspection_mode: InspectionMode::Flow,
            nat: Toggle::Disable,
            ip_pool: String::new(),
            log_traffic: LogTraffic::All,
            log_traffic_start: Toggle::Enable,
            auto_asic_offload: Toggle::Enable,
            src_interfaces: vec![],
            dst_interfaces: vec![],
            src: AddressBuckets::default(),
            dst: AddressBuckets::default(),
            services: vec![],
            subjects: SubjectBuckets::default(),
            ssl_ssh_profile: String::new(),
            webfilter: ProfileSlot::enabled(),
            application_list: ProfileSlot::enabled(),
            antivirus: ProfileSlot::disabled(),
            ips_sensor: ProfileSlot::enabled(),
        }
    }

    pub fn profile(&self, profile: Profile) -> &ProfileSlot {
        match profile {
            Profile::Webfilter => &self.webfilter,
            Profile::ApplicationList => &self.application_list,
            Profile::Antivirus => &self.antivirus,
            Profile::IpsSensor => &self.ips_sensor,
        }
    }

    pub fn profile_mut(&mut self, profile: Profile) -> &mut ProfileSlot {
        match profile {
            Profile::Webfilter => &mut self.webfilter,
            Profile::ApplicationList => &mut self.application_list,
            Profile::Antivirus => &mut self.antivirus,
            Profile::IpsSensor => &mut self.ips_sensor,
        }
    }

    pub fn addresses(&self, dir: Direction) -> &AddressBuckets {
        match dir {
            Direction::Src => &self.src,
            Direction::Dst => &self.dst,
        }
    }

    pub fn addresses_mut(&mut self, dir: Direction) -> &mut AddressBuckets {
        match dir {
            Direction::Src => &mut self.src,
            Direction::Dst => &mut self.dst,
        }
    }

    pub fn interfaces_mut(&mut self, dir: Direction) -> &mut Vec<String> {
        match dir {
            Direction::Src => &mut self.src_interfaces,
            Direction::Dst => &mut self.dst_interfaces,
        }
    }

    /// Commits one scalar field. Setting `action=deny` switches off and blanks every
    /// toggleable profile; while denied the profile switches can't be turned back on.
    pub fn apply_field_edit(&mut self, field: Field, value: &str) -> EditorResult<()> {
        match field {
            Field::Name => self.name = value.to_string(),
            Field::Comment => self.comment = value.to_string(),
            Field::Action => self.set_action(Action::from_str(value)?),
            Field::InspectionMode => self.inspection_mode = InspectionMode::from_str(value)?,
            Field::SslSshProfile => self.ssl_ssh_profile = value.to_string(),
            Field::ProfileValue(profile) => {
                if self.action.is_deny() || !self.profile_mut(profile).set_value(value) {
                    debug!(target: "policy",
                        "[{}] ignoring value for disabled profile {}", &self.id, profile.as_str());
                }
            }
            Field::ProfileEnabled(profile) => {
                let enabled = parse_flag(value)?;
                if self.action.is_deny() {
                    debug!(target: "policy",
                        "[{}] profile {} is locked while action is deny",
                        &self.id, profile.as_str());
                } else {
                    self.profile_mut(profile).set_enabled(enabled);
                }
            }
            Field::LogTraffic => self.log_traffic = LogTraffic::from_str(value)?,
            Field::LogTrafficStart => self.log_traffic_start = Toggle::from_str(value)?,
            Field::AutoAsicOffload => self.auto_asic_offload = Toggle::from_str(value)?,
            Field::Nat => {
                self.nat = Toggle::from_str(value)?;
                if !self.nat.is_enabled() {
                    self.ip_pool.clear();
                }
            }
            Field::IpPool => {
                if self.nat.is_enabled() {
                    self.ip_pool = value.to_string();
                } else {
                    debug!(target: "policy", "[{}] ip pool dropped, NAT is disabled", &self.id);
                }
            }
        }

        Ok(())
    }

    /// Sets the action; deny switches off and blanks every toggleable profile
    pub fn set_action(&mut self, action: Action) {
        self.action = action;
        if self.action.is_deny() {
            self.disable_profiles();
        }
    }

    fn disable_profiles(&mut self) {
        debug!(target: "policy", "[{}] action is deny, disabling profiles", &self.id);
        for profile in Profile::ALL {
            self.profile_mut(profile).set_enabled(false);
        }
    }

    /// Empties every list and puts the profile switches, inspection mode and ip pool back to
    /// their defaults. Name, comment, action and logging settings are kept.
    pub fn reset_selections(&mut self) {
        let defaults = PolicyRecord::new(self.id.clone());

        self.src_interfaces.clear();
        self.dst_interfaces.clear();
        self.src = defaults.src;
        self.dst = defaults.dst;
        self.services.clear();
        self.subjects = defaults.subjects;
        self.inspection_mode = defaults.inspection_mode;
        self.webfilter = defaults.webfilter;
        self.application_list = defaults.application_list;
        self.antivirus = defaults.antivirus;
        self.ips_sensor = defaults.ips_sensor;
        self.ip_pool.clear();

        if self.action.is_deny() {
            self.disable_profiles();
        }
    }

    //
    // Interfaces
    //

    pub fn add_interface(&mut self, dir: Direction) -> usize {
        let list = self.interfaces_mut(dir);
        list.push(String::new());
        list.len() - 1
    }

    pub fn set_interface(&mut self, dir: Direction, index: usize, value: &str) -> EditorResult<()> {
        let list = self.interfaces_mut(dir);
        check_index(index, list.len())?;
        list[index] = value.to_string();
        Ok(())
    }

    pub fn remove_interface(&mut self, dir: Direction, index: usize) -> EditorResult<String> {
        let list = self.interfaces_mut(dir);
        check_index(index, list.len())?;
        Ok(list.remove(index))
    }

    //
    // Services
    //

    pub fn add_service(&mut self) -> usize {
        self.services.push(ServiceSelection::placeholder());
        self.services.len() - 1
    }

    pub fn set_service(&mut self, index: usize, service: ServiceSelection) -> EditorResult<()> {
        check_index(index, self.services.len())?;
        self.services[index] = service;
        Ok(())
    }

    pub fn update_custom_service(
        &mut self,
        index: usize,
        field: CustomServiceField,
        value: &str,
    ) -> EditorResult<()> {
        check_index(index, self.services.len())?;

        match &mut self.services[index] {
            ServiceSelection::Custom {
                name,
                protocol,
                port,
            } => match field {
                CustomServiceField::Name => *name = value.to_string(),
                CustomServiceField::Protocol => *protocol = Protocol::from_str(value)?,
                CustomServiceField::Port => *port = value.to_string(),
            },
            other => {
                return Err(EditorError::InvalidSelection(format!(
                    "service {} is a {} service, not custom",
                    index,
                    other.kind()
                )))
            }
        }

        Ok(())
    }

    pub fn remove_service(&mut self, index: usize) -> EditorResult<ServiceSelection> {
        check_index(index, self.services.len())?;
        Ok(self.services.remove(index))
    }
}

fn check_index(index: usize, len: usize) -> EditorResult<()> {
    if index >= len {
        return Err(EditorError::OutOfRange {
            position: index,
            len,
        });
    }
    Ok(())
}
