//! The single edit form and its binding to one policy record.
//!
//! [FormSurface] holds what the form currently shows, as raw strings, the way an input widget
//! would. [FormController] knows which record the surface belongs to, rebuilds the surface from
//! it (`refresh`) and writes the surface back (`commit`).
use std::str::FromStr;
use tracing::debug;

use super::actions::{Action, InspectionMode, LogTraffic, Toggle};
use super::errors::{EditorError, EditorResult};
use super::merger::BucketedList;
use super::policies::{Field, PolicyId, PolicyRecord, Profile};
use super::utils::parse_flag;

/// Switch plus drop-down of one toggleable profile
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileControl {
    pub checked: bool,
    pub value: String,
    /// Set while the action is deny; the switch can't be changed
    pub locked: bool,
}

impl ProfileControl {
    fn new(checked: bool) -> Self {
        ProfileControl {
            checked,
            value: String::new(),
            locked: false,
        }
    }

    /// Whether the drop-down accepts a value
    pub fn selectable(&self) -> bool {
        self.checked && !self.locked
    }

    fn lock(&mut self) {
        self.checked = false;
        self.value.clear();
        self.locked = true;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormSurface {
    pub name: String,
    pub comment: String,
    pub action: String,
    pub inspection_mode: String,
    pub ssl_ssh_profile: String,
    pub webfilter: ProfileControl,
    pub application_list: ProfileControl,
    pub antivirus: ProfileControl,
    pub ips_sensor: ProfileControl,
    pub log_traffic: String,
    pub log_traffic_start: String,
    pub auto_asic_offload: String,
    pub nat: String,
    pub ip_pool: String,
    pub ip_pool_visible: bool,

    // Lists are display only; they change through the list operations of the session
    pub src_interfaces: Vec<String>,
    pub dst_interfaces: Vec<String>,
    pub src_addresses: Vec<String>,
    pub dst_addresses: Vec<String>,
    pub services: Vec<String>,
    pub subjects: Vec<String>,
}

impl Default for FormSurface {
    fn default() -> Self {
        FormSurface {
            name: String::new(),
            comment: String::new(),
            action: Action::Accept.as_str().to_string(),
            inspection_mode: InspectionMode::Flow.as_str().to_string(),
            ssl_ssh_profile: String::new(),
            webfilter: ProfileControl::new(true),
            application_list: ProfileControl::new(true),
            antivirus: ProfileControl::new(false),
            ips_sensor: ProfileControl::new(true),
            log_traffic: LogTraffic::All.as_str().to_string(),
            log_traffic_start: Toggle::Enable.as_str().to_string(),
            auto_asic_offload: Toggle::Enable.as_str().to_string(),
            nat: Toggle::Disable.as_str().to_string(),
            ip_pool: String::new(),
            ip_pool_visible: false,
            src_interfaces: vec![],
            dst_interfaces: vec![],
            src_addresses: vec![],
            dst_addresses: vec![],
            services: vec![],
            subjects: vec![],
        }
    }
}

impl FormSurface {
    /// Renders every field, switch and list of `record`
    pub fn from_record(record: &PolicyRecord) -> Self {
        let denied = record.action.is_deny();
        let control = |profile: Profile| {
            let slot = record.profile(profile);
            ProfileControl {
                checked: slot.enabled,
                value: if slot.enabled {
                    slot.value.clone()
                } else {
                    String::new()
                },
                locked: denied,
            }
        };

        FormSurface {
            name: record.name.clone(),
            comment: record.comment.clone(),
            action: record.action.as_str().to_string(),
            inspection_mode: record.inspection_mode.as_str().to_string(),
            ssl_ssh_profile: record.ssl_ssh_profile.clone(),
            webfilter: control(Profile::Webfilter),
            application_list: control(Profile::ApplicationList),
            antivirus: control(Profile::Antivirus),
            ips_sensor: control(Profile::IpsSensor),
            log_traffic: record.log_traffic.as_str().to_string(),
            log_traffic_start: record.log_traffic_start.as_str().to_string(),
            auto_asic_offload: record.auto_asic_offload.as_str().to_string(),
            nat: record.nat.as_str().to_string(),
            ip_pool: record.ip_pool.clone(),
            ip_pool_visible: record.nat.is_enabled(),
            src_interfaces: record.src_interfaces.clone(),
            dst_interfaces: record.dst_interfaces.clone(),
            src_addresses: record.src.entries().iter().map(|e| e.to_string()).collect(),
            dst_addresses: record.dst.entries().iter().map(|e| e.to_string()).collect(),
            services: record
                .services
                .iter()
                .map(|s| format!("{}:{}", s.kind(), s.name()))
                .collect(),
            subjects: record
                .subjects
                .entries()
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }

    pub fn profile(&self, profile: Profile) -> &ProfileControl {
        match profile {
            Profile::Webfilter => &self.webfilter,
            Profile::ApplicationList => &self.application_list,
            Profile::Antivirus => &self.antivirus,
            Profile::IpsSensor => &self.ips_sensor,
        }
    }

    fn profile_mut(&mut self, profile: Profile) -> &mut ProfileControl {
        match profile {
            Profile::Webfilter => &mut self.webfilter,
            Profile::ApplicationList => &mut self.application_list,
            Profile::Antivirus => &mut self.antivirus,
            Profile::IpsSensor => &mut self.ips_sensor,
        }
    }
}

/// Tracks the record bound to the form
#[derive(Debug, Default)]
pub struct FormController {
    bound: Option<PolicyId>,
    surface: FormSurface,
}

impl FormController {
    pub fn new() -> Self {
        FormController::default()
    }

    pub fn bound(&self) -> Option<&PolicyId> {
        self.bound.as_ref()
    }

    pub fn surface(&self) -> &FormSurface {
        &self.surface
    }

    /// Binds `record` and renders it
    pub fn bind(&mut self, record: &PolicyRecord) {
        debug!(target: "form", "binding policy {}", &record.id);
        self.bound = Some(record.id.clone());
        self.refresh(record);
    }

    /// Re-renders the surface from `record`, dropping any uncommitted edits
    pub fn refresh(&mut self, record: &PolicyRecord) {
        self.surface = FormSurface::from_record(record);
    }

    /// Re-renders only the lists, keeping uncommitted scalar edits
    pub fn refresh_lists(&mut self, record: &PolicyRecord) {
        let fresh = FormSurface::from_record(record);
        let s = &mut self.surface;

        s.src_interfaces = fresh.src_interfaces;
        s.dst_interfaces = fresh.dst_interfaces;
        s.src_addresses = fresh.src_addresses;
        s.dst_addresses = fresh.dst_addresses;
        s.services = fresh.services;
        s.subjects = fresh.subjects;
    }

    /// Resets the surface to defaults and forgets the bound record
    pub fn unbind(&mut self) {
        if let Some(id) = self.bound.take() {
            debug!(target: "form", "unbinding policy {}", id);
        }
        self.surface = FormSurface::default();
    }

    /// Applies one edit to the surface, with the dependency rules between fields.
    ///
    /// Returns true when the edit must also reach the bound record right away (switching the
    /// action, which drags the profile switches with it).
    pub fn edit(&mut self, field: Field, value: &str) -> EditorResult<bool> {
        let s = &mut self.surface;

        match field {
            Field::Name => s.name = value.to_string(),
            Field::Comment => s.comment = value.to_string(),
            Field::Action => {
                s.action = value.to_string();
                let denied = value == Action::Deny.as_str();
                for profile in Profile::ALL {
                    let control = s.profile_mut(profile);
                    if denied {
                        control.lock();
                    } else {
                        control.locked = false;
                    }
                }
                return Ok(true);
            }
            Field::InspectionMode => s.inspection_mode = value.to_string(),
            Field::SslSshProfile => s.ssl_ssh_profile = value.to_string(),
            Field::ProfileEnabled(profile) => {
                let checked = parse_flag(value)?;
                let control = s.profile_mut(profile);
                if control.locked {
                    debug!(target: "form", "switch {} is locked", profile.as_str());
                } else {
                    control.checked = checked;
                    if !checked {
                        control.value.clear();
                    }
                }
            }
            Field::ProfileValue(profile) => {
                let control = s.profile_mut(profile);
                if control.selectable() {
                    control.value = value.to_string();
                } else {
                    debug!(target: "form", "drop-down {} is disabled", profile.as_str());
                }
            }
            Field::LogTraffic => s.log_traffic = value.to_string(),
            Field::LogTrafficStart => s.log_traffic_start = value.to_string(),
            Field::AutoAsicOffload => s.auto_asic_offload = value.to_string(),
            Field::Nat => {
                s.nat = value.to_string();
                s.ip_pool_visible = value == Toggle::Enable.as_str();
            }
            Field::IpPool => s.ip_pool = value.to_string(),
        }

        Ok(false)
    }

    /// Writes the surface onto `record`. Values that don't parse fall back to the field's
    /// default. The surface is re-rendered from the record afterwards.
    pub fn commit(&mut self, record: &mut PolicyRecord) -> EditorResult<()> {
        match self.bound {
            Some(ref id) if *id == record.id => {}
            _ => return Err(EditorError::NoBoundRecord),
        }

        let s = self.surface.clone();

        let action = Action::from_str(&s.action).unwrap_or_default();
        let inspection = InspectionMode::from_str(&s.inspection_mode).unwrap_or_default();
        let log_traffic = LogTraffic::from_str(&s.log_traffic).unwrap_or_default();
        let log_start = Toggle::from_str(&s.log_traffic_start).unwrap_or(Toggle::Enable);
        let offload = Toggle::from_str(&s.auto_asic_offload).unwrap_or(Toggle::Enable);
        let nat = Toggle::from_str(&s.nat).unwrap_or(Toggle::Disable);

        record.apply_field_edit(Field::Name, &s.name)?;
        record.apply_field_edit(Field::Comment, &s.comment)?;
        record.apply_field_edit(Field::Action, action.as_str())?;
        record.apply_field_edit(Field::InspectionMode, inspection.as_str())?;
        record.apply_field_edit(Field::SslSshProfile, &s.ssl_ssh_profile)?;

        for profile in Profile::ALL {
            let control = s.profile(profile);
            let enabled = if control.checked { "true" } else { "false" };
            record.apply_field_edit(Field::ProfileEnabled(profile), enabled)?;
            record.apply_field_edit(Field::ProfileValue(profile), &control.value)?;
        }

        record.apply_field_edit(Field::LogTraffic, log_traffic.as_str())?;
        record.apply_field_edit(Field::LogTrafficStart, log_start.as_str())?;
        record.apply_field_edit(Field::AutoAsicOffload, offload.as_str())?;
        record.apply_field_edit(Field::Nat, nat.as_str())?;
        record.apply_field_edit(Field::IpPool, &s.ip_pool)?;

        debug!(target: "form", "committed form to policy {}", &record.id);

        self.refresh(record);

        Ok(())
    }
}
