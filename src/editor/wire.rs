//! Structures used for exchanging policies and templates as JSON.
//!
//! Field names follow the stored template format, which keeps the address-like lists split in
//! their four buckets. Decoding is lenient: missing fields take the policy defaults, unknown
//! enum values fall back to the field's default.
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::actions::{Action, InspectionMode, LogTraffic, Protocol, Toggle};
use super::catalog::CatalogStore;
use super::merger::{AddressBuckets, SubjectBuckets};
use super::policies::{PolicyId, PolicyRecord, Profile, ServiceSelection};

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceWire {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

impl From<&ServiceSelection> for ServiceWire {
    fn from(s: &ServiceSelection) -> Self {
        let (protocol, port) = match s {
            ServiceSelection::Custom { protocol, port, .. } => {
                (Some(protocol.as_str().to_string()), Some(port.clone()))
            }
            _ => (None, None),
        };

        ServiceWire {
            kind: s.kind().to_string(),
            name: s.name().to_string(),
            protocol,
            port,
        }
    }
}

impl From<ServiceWire> for ServiceSelection {
    fn from(w: ServiceWire) -> Self {
        match w.kind.as_str() {
            "group" => ServiceSelection::Group { name: w.name },
            "custom" => ServiceSelection::Custom {
                name: w.name,
                protocol: w
                    .protocol
                    .as_deref()
                    .and_then(|p| Protocol::from_str(p).ok())
                    .unwrap_or_default(),
                port: w.port.unwrap_or_default(),
            },
            _ => ServiceSelection::Template { name: w.name },
        }
    }
}

/// A policy as stored in templates and sent to the generator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyWire {
    #[serde(default)]
    pub policy_id: String,
    #[serde(default)]
    pub policy_name: String,
    #[serde(default)]
    pub policy_comment: String,
    #[serde(default)]
    pub src_interfaces: Vec<String>,
    #[serde(default)]
    pub dst_interfaces: Vec<String>,
    #[serde(default)]
    pub src_addresses: Vec<String>,
    #[serde(default)]
    pub src_address_groups: Vec<String>,
    #[serde(default)]
    pub src_internet_services: Vec<String>,
    #[serde(default)]
    pub src_vips: Vec<String>,
    #[serde(default)]
    pub dst_addresses: Vec<String>,
    #[serde(default)]
    pub dst_address_groups: Vec<String>,
    #[serde(default)]
    pub dst_internet_services: Vec<String>,
    #[serde(default)]
    pub dst_vips: Vec<String>,
    #[serde(default)]
    pub services: Vec<ServiceWire>,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub inspection_mode: String,
    #[serde(default)]
    pub ssl_ssh_profile: String,
    #[serde(default)]
    pub webfilter_profile: String,
    #[serde(default = "default_true")]
    pub webfilter_enabled: bool,
    #[serde(default)]
    pub application_list: String,
    #[serde(default = "default_true")]
    pub application_list_enabled: bool,
    #[serde(default)]
    pub av_profile: String,
    #[serde(default)]
    pub av_enabled: bool,
    #[serde(default)]
    pub ips_sensor: String,
    #[serde(default = "default_true")]
    pub ips_sensor_enabled: bool,
    #[serde(default)]
    pub logtraffic: String,
    #[serde(default)]
    pub logtraffic_start: String,
    #[serde(default)]
    pub auto_asic_offload: String,
    #[serde(default)]
    pub nat: String,
    #[serde(default)]
    pub ip_pool: String,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl From<&PolicyRecord> for PolicyWire {
    fn from(p: &PolicyRecord) -> Self {
        let value = |profile: Profile| p.profile(profile).effective().unwrap_or("").to_string();

        PolicyWire {
            policy_id: p.id.to_string(),
            policy_name: p.name.clone(),
            policy_comment: p.comment.clone(),
            src_interfaces: p.src_interfaces.clone(),
            dst_interfaces: p.dst_interfaces.clone(),
            src_addresses: p.src.addresses.clone(),
            src_address_groups: p.src.address_groups.clone(),
            src_internet_services: p.src.internet_services.clone(),
            src_vips: p.src.vips.clone(),
            dst_addresses: p.dst.addresses.clone(),
            dst_address_groups: p.dst.address_groups.clone(),
            dst_internet_services: p.dst.internet_services.clone(),
            dst_vips: p.dst.vips.clone(),
            services: p.services.iter().map(ServiceWire::from).collect(),
            action: p.action.as_str().to_string(),
            inspection_mode: p.inspection_mode.as_str().to_string(),
            ssl_ssh_profile: p.ssl_ssh_profile.clone(),
            webfilter_profile: value(Profile::Webfilter),
            webfilter_enabled: p.webfilter.enabled,
            application_list: value(Profile::ApplicationList),
            application_list_enabled: p.application_list.enabled,
            av_profile: value(Profile::Antivirus),
            av_enabled: p.antivirus.enabled,
            ips_sensor: value(Profile::IpsSensor),
            ips_sensor_enabled: p.ips_sensor.enabled,
            logtraffic: p.log_traffic.as_str().to_string(),
            logtraffic_start: p.log_traffic_start.as_str().to_string(),
            auto_asic_offload: p.auto_asic_offload.as_str().to_string(),
            nat: p.nat.as_str().to_string(),
            ip_pool: p.ip_pool.clone(),
            users: p.subjects.users.clone(),
            groups: p.subjects.groups.clone(),
        }
    }
}

impl From<PolicyWire> for PolicyRecord {
    /// Decodes leniently and restores the record invariants (disabled profiles hold no value,
    /// deny disables every profile, no ip pool without NAT)
    fn from(w: PolicyWire) -> Self {
        let id = if w.policy_id.is_empty() {
            PolicyId::mint()
        } else {
            PolicyId::from(w.policy_id)
        };

        let mut p = PolicyRecord::new(id);

        p.name = w.policy_name;
        p.comment = w.policy_comment;
        p.inspection_mode = InspectionMode::from_str(&w.inspection_mode).unwrap_or_default();
        p.log_traffic = LogTraffic::from_str(&w.logtraffic).unwrap_or_default();
        p.log_traffic_start = Toggle::from_str(&w.logtraffic_start).unwrap_or(Toggle::Enable);
        p.auto_asic_offload = Toggle::from_str(&w.auto_asic_offload).unwrap_or(Toggle::Enable);
        p.nat = Toggle::from_str(&w.nat).unwrap_or(Toggle::Disable);
        if p.nat.is_enabled() {
            p.ip_pool = w.ip_pool;
        }

        p.src_interfaces = w.src_interfaces;
        p.dst_interfaces = w.dst_interfaces;
        p.src = AddressBuckets {
            addresses: w.src_addresses,
            address_groups: w.src_address_groups,
            internet_services: w.src_internet_services,
            vips: w.src_vips,
        };
        p.dst = AddressBuckets {
            addresses: w.dst_addresses,
            address_groups: w.dst_address_groups,
            internet_services: w.dst_internet_services,
            vips: w.dst_vips,
        };
        p.services = w.services.into_iter().map(ServiceSelection::from).collect();
        p.subjects = SubjectBuckets {
            users: w.users,
            groups: w.groups,
        };

        p.ssl_ssh_profile = w.ssl_ssh_profile;
        let slots = [
            (Profile::Webfilter, w.webfilter_enabled, w.webfilter_profile),
            (
                Profile::ApplicationList,
                w.application_list_enabled,
                w.application_list,
            ),
            (Profile::Antivirus, w.av_enabled, w.av_profile),
            (Profile::IpsSensor, w.ips_sensor_enabled, w.ips_sensor),
        ];
        for (profile, enabled, value) in slots {
            let slot = p.profile_mut(profile);
            slot.set_enabled(enabled);
            slot.set_value(&value);
        }

        p.set_action(Action::from_str(&w.action).unwrap_or_default());

        p
    }
}

/// A stored template: its policies and the catalog they were written against
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateDocument {
    pub policies: Vec<PolicyWire>,
    #[serde(default)]
    pub config: CatalogStore,
}

/// Export/import file format
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportedTemplate {
    pub name: String,
    pub data: TemplateDocument,
}
