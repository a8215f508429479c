//! Reference data the editor offers for selection
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use super::actions::Protocol;
use super::merger::AddressKind;
use super::policies::{PolicyRecord, Profile, ServiceSelection};

/// A predefined service known to the device
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub port: String,
}

/// Available interfaces, addresses, services and profiles. Replaced as a whole on load or
/// import, never edited in place.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogStore {
    pub interfaces: Vec<String>,
    pub addresses: Vec<String>,
    pub address_groups: Vec<String>,
    pub internet_services: Vec<String>,
    pub vips: Vec<String>,
    pub ip_pools: Vec<String>,
    pub services: Vec<ServiceDefinition>,
    pub service_groups: IndexMap<String, Vec<String>>,
    pub ssl_ssh_profiles: Vec<String>,
    pub webfilter_profiles: Vec<String>,
    pub application_lists: Vec<String>,
    pub av_profiles: Vec<String>,
    pub ips_sensors: Vec<String>,
    pub users: Vec<String>,
    pub groups: Vec<String>,
}

fn union(a: &[String], b: &[String]) -> Vec<String> {
    a.iter()
        .chain(b.iter())
        .cloned()
        .collect::<IndexSet<String>>()
        .into_iter()
        .collect()
}

impl CatalogStore {
    /// Returns a new catalog holding the entries of both, `self` first, without duplicates.
    /// Services are matched by name; service groups from `other` win.
    pub fn union(&self, other: &CatalogStore) -> CatalogStore {
        let mut services = self.services.clone();
        for svc in other.services.iter() {
            if !services.iter().any(|s| s.name == svc.name) {
                services.push(svc.clone());
            }
        }

        let mut service_groups = self.service_groups.clone();
        service_groups.extend(
            other
                .service_groups
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        CatalogStore {
            interfaces: union(&self.interfaces, &other.interfaces),
            addresses: union(&self.addresses, &other.addresses),
            address_groups: union(&self.address_groups, &other.address_groups),
            internet_services: union(&self.internet_services, &other.internet_services),
            vips: union(&self.vips, &other.vips),
            ip_pools: union(&self.ip_pools, &other.ip_pools),
            services,
            service_groups,
            ssl_ssh_profiles: union(&self.ssl_ssh_profiles, &other.ssl_ssh_profiles),
            webfilter_profiles: union(&self.webfilter_profiles, &other.webfilter_profiles),
            application_lists: union(&self.application_lists, &other.application_lists),
            av_profiles: union(&self.av_profiles, &other.av_profiles),
            ips_sensors: union(&self.ips_sensors, &other.ips_sensors),
            users: union(&self.users, &other.users),
            groups: union(&self.groups, &other.groups),
        }
    }

    /// Catalog of everything the given policies refer to; used for templates stored without one.
    /// Group members are unknown and left empty.
    pub fn from_policies(policies: &[PolicyRecord]) -> CatalogStore {
        fn collect<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
            items
                .filter(|s| !s.is_empty())
                .cloned()
                .collect::<IndexSet<String>>()
                .into_iter()
                .collect()
        }

        let both = |f: fn(&PolicyRecord) -> [&Vec<String>; 2]| {
            collect(policies.iter().flat_map(move |p| f(p).into_iter().flatten()))
        };
        let profile = |profile: Profile| {
            policies
                .iter()
                .filter_map(|p| p.profile(profile).effective().map(|v| v.to_string()))
                .collect::<IndexSet<String>>()
                .into_iter()
                .collect::<Vec<String>>()
        };

        let mut services: Vec<ServiceDefinition> = vec![];
        let mut service_groups = IndexMap::new();
        for svc in policies.iter().flat_map(|p| p.services.iter()) {
            if svc.name().is_empty() {
                continue;
            }
            let definition = match svc {
                ServiceSelection::Group { name } => {
                    service_groups.entry(name.clone()).or_insert_with(Vec::new);
                    continue;
                }
                ServiceSelection::Template { name } => ServiceDefinition {
                    name: name.clone(),
                    protocol: Protocol::TCP,
                    port: String::new(),
                },
                ServiceSelection::Custom {
                    name,
                    protocol,
                    port,
                } => ServiceDefinition {
                    name: name.clone(),
                    protocol: *protocol,
                    port: port.clone(),
                },
            };
            if !services.iter().any(|s| s.name == definition.name) {
                services.push(definition);
            }
        }

        CatalogStore {
            interfaces: both(|p| [&p.src_interfaces, &p.dst_interfaces]),
            addresses: both(|p| [&p.src.addresses, &p.dst.addresses]),
            address_groups: both(|p| [&p.src.address_groups, &p.dst.address_groups]),
            internet_services: both(|p| [&p.src.internet_services, &p.dst.internet_services]),
            vips: both(|p| [&p.src.vips, &p.dst.vips]),
            ip_pools: collect(policies.iter().map(|p| &p.ip_pool)),
            services,
            service_groups,
            ssl_ssh_profiles: collect(policies.iter().map(|p| &p.ssl_ssh_profile)),
            webfilter_profiles: profile(Profile::Webfilter),
            application_lists: profile(Profile::ApplicationList),
            av_profiles: profile(Profile::Antivirus),
            ips_sensors: profile(Profile::IpsSensor),
            users: collect(policies.iter().flat_map(|p| p.subjects.users.iter())),
            groups: collect(policies.iter().flat_map(|p| p.subjects.groups.iter())),
        }
    }

    /// Choices offered for one bucket of the address-like list
    pub fn address_options(&self, kind: AddressKind) -> &[String] {
        match kind {
            AddressKind::Address => &self.addresses,
            AddressKind::AddressGroup => &self.address_groups,
            AddressKind::InternetService => &self.internet_services,
            AddressKind::Vip => &self.vips,
        }
    }

    pub fn profile_options(&self, profile: Profile) -> &[String] {
        match profile {
            Profile::Webfilter => &self.webfilter_profiles,
            Profile::ApplicationList => &self.application_lists,
            Profile::Antivirus => &self.av_profiles,
            Profile::IpsSensor => &self.ips_sensors,
        }
    }

    /// Total number of reference entries, for logging
    pub fn len(&self) -> usize {
        self.interfaces.len()
            + self.addresses.len()
            + self.address_groups.len()
            + self.internet_services.len()
            + self.vips.len()
            + self.ip_pools.len()
            + self.services.len()
            + self.service_groups.len()
            + self.ssl_ssh_profiles.len()
            + self.webfilter_profiles.len()
            + self.application_lists.len()
            + self.av_profiles.len()
            + self.ips_sensors.len()
            + self.users.len()
            + self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
