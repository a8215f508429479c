use anyhow::{anyhow, Result};
use indexmap::IndexMap;
use rstest::fixture;
use std::path::PathBuf;
use std::sync::Mutex;

use super::actions::{Protocol, Toggle};
use super::backend::{GeneratedPolicy, TemplateBackend, TemplateData};
use super::catalog::{CatalogStore, ServiceDefinition};
use super::policies::{Field, PolicyId, PolicyRecord, ServiceSelection};
use super::session::Session;
use super::wire::ExportedTemplate;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

//
// Model
//
#[fixture]
pub fn sample_record() -> PolicyRecord {
    let mut r = PolicyRecord::new(PolicyId::from("policy-1"));

    r.name = "web-out".to_string();
    r.comment = "staff web access".to_string();
    r.src_interfaces = strings(&["port1"]);
    r.dst_interfaces = strings(&["wan1"]);
    r.src.addresses = strings(&["lan-net"]);
    r.src.address_groups = strings(&["office"]);
    r.dst.internet_services = strings(&["Google-Web"]);
    r.services = vec![ServiceSelection::Template {
        name: "HTTPS".to_string(),
    }];
    r.subjects.groups = strings(&["staff"]);
    r.ssl_ssh_profile = "certificate-inspection".to_string();
    r.webfilter.value = "default".to_string();
    r.nat = Toggle::Enable;
    r.ip_pool = "pool1".to_string();

    r
}

#[fixture]
pub fn sample_catalog() -> CatalogStore {
    let service = |name: &str, protocol: Protocol, port: &str| ServiceDefinition {
        name: name.to_string(),
        protocol,
        port: port.to_string(),
    };

    let mut service_groups = IndexMap::new();
    service_groups.insert("Web Access".to_string(), strings(&["HTTP", "HTTPS"]));

    CatalogStore {
        interfaces: strings(&["port1", "port2", "wan1"]),
        addresses: strings(&["all", "lan-net"]),
        address_groups: strings(&["office"]),
        internet_services: strings(&["Google-Web", "Microsoft-Office365"]),
        vips: strings(&["vip-web"]),
        ip_pools: strings(&["pool1"]),
        services: vec![
            service("HTTP", Protocol::TCP, "80"),
            service("HTTPS", Protocol::TCP, "443"),
            service("SSH", Protocol::TCP, "22"),
        ],
        service_groups,
        ssl_ssh_profiles: strings(&["certificate-inspection", "deep-inspection"]),
        webfilter_profiles: strings(&["default", "strict"]),
        application_lists: strings(&["default"]),
        av_profiles: strings(&["default"]),
        ips_sensors: strings(&["default", "high_security"]),
        users: strings(&["alice", "bob"]),
        groups: strings(&["staff"]),
    }
}

//
// Sessions
//
#[fixture]
pub fn blank_session() -> Session {
    Session::default()
}

/// Ready session holding "first" (selected) and "second"
#[fixture]
pub fn two_policy_session(sample_catalog: CatalogStore) -> Session {
    let named = |name: &str| {
        let mut p = PolicyRecord::new(PolicyId::mint());
        p.apply_field_edit(Field::Name, name).unwrap();
        p
    };

    let mut session = Session::default();
    let ticket = session.begin_load(Some("pair"));
    session
        .finish_load(
            ticket,
            Ok(TemplateData {
                policies: vec![named("first"), named("second")],
                config: sample_catalog,
            }),
        )
        .unwrap();

    session
}

#[fixture]
pub fn fixture_dir() -> PathBuf {
    let mut dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    dir.push("resources");
    dir
}

/// In-memory backend. The device catalog is [sample_catalog]; templates hold [sample_record] and
/// a catalog listing the `tmpl-port` and `port1` interfaces.
#[derive(Default)]
pub struct StubBackend {
    pub templates: IndexMap<String, TemplateData>,
    pub catalog_fails: bool,
    pub saved: Mutex<Vec<String>>,
}

impl StubBackend {
    pub fn with_template(name: &str) -> Self {
        let mut templates = IndexMap::new();
        templates.insert(
            name.to_string(),
            TemplateData {
                policies: vec![sample_record()],
                config: CatalogStore {
                    interfaces: strings(&["tmpl-port", "port1"]),
                    ..CatalogStore::default()
                },
            },
        );

        StubBackend {
            templates,
            ..StubBackend::default()
        }
    }
}

impl TemplateBackend for StubBackend {
    async fn load_catalog(&self) -> Result<CatalogStore> {
        if self.catalog_fails {
            return Err(anyhow!("catalog service unavailable"));
        }
        Ok(sample_catalog())
    }

    async fn load_template(&self, name: &str) -> Result<TemplateData> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("template {} not found", name))
    }

    async fn list_templates(&self) -> Result<Vec<String>> {
        Ok(self.templates.keys().cloned().collect())
    }

    async fn save_template(
        &self,
        name: &str,
        policies: &[PolicyRecord],
        _config: &CatalogStore,
    ) -> Result<()> {
        if policies.is_empty() {
            return Err(anyhow!("no policies to save"));
        }
        self.saved
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .push(name.to_string());
        Ok(())
    }

    async fn clone_policy(&self, source: &PolicyRecord) -> Result<PolicyRecord> {
        let mut clone = source.clone();
        clone.id = PolicyId::mint();
        clone.name = format!("{}_clone", source.name);
        Ok(clone)
    }

    async fn clone_template(&self, name: &str) -> Result<String> {
        Ok(format!("{}_clone", name))
    }

    async fn rename_template(&self, old: &str, _new: &str) -> Result<()> {
        self.templates
            .get(old)
            .map(|_| ())
            .ok_or_else(|| anyhow!("template {} not found", old))
    }

    async fn delete_template(&self, name: &str) -> Result<()> {
        self.templates
            .get(name)
            .map(|_| ())
            .ok_or_else(|| anyhow!("template {} not found", name))
    }

    async fn export_template(&self, name: &str) -> Result<ExportedTemplate> {
        Err(anyhow!("export of {} not supported", name))
    }

    async fn import_template(&self, exported: ExportedTemplate) -> Result<String> {
        Ok(exported.name)
    }

    async fn generate_policy_text(
        &self,
        policies: &[PolicyRecord],
    ) -> Result<Vec<GeneratedPolicy>> {
        Ok(policies
            .iter()
            .map(|p| GeneratedPolicy {
                policy_id: p.id.clone(),
                policy_name: p.name.clone(),
                output1: String::new(),
                output2: String::new(),
                output3: String::new(),
            })
            .collect())
    }

    async fn shorten_url(&self, _url: &str) -> Result<String> {
        Ok("abc123".to_string())
    }
}
