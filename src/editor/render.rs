//! Generates FortiOS CLI text for policies.
//!
//! Each policy is rendered three ways: as a single policy, as one policy per service, and as one
//! policy per (source interface, destination interface, service) combination.
use anyhow::{Context, Result};
use itertools::{iproduct, Itertools};
use minijinja::value::ValueKind;
use minijinja::{Environment, ErrorKind, Template, Value};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, error};

use super::backend::GeneratedPolicy;
use super::policies::{PolicyRecord, Profile, ServiceSelection};
use super::utils::{quote, truncate_name};

const POLICY_TEMPLATE: &str = "policy.jinja";
const BUILTIN_TEMPLATE: &str = "builtin/policy.jinja";

pub const MISSING_FIELDS: &str = "No policy generated due to missing fields.";
pub const NO_SERVICES: &str = "No services defined for this policy.";
pub const MISSING_SERVICES: &str = "No policy generated due to missing services.";
pub const NO_COMBINATIONS: &str =
    "No valid source interfaces, destination interfaces, or services defined for this policy.";
pub const MISSING_COMBINATIONS: &str =
    "No policy generated due to missing interfaces or services.";

/// `quoted` filter: quotes a string, or each element of a sequence joined by spaces
fn quoted(value: Value) -> Result<String, minijinja::Error> {
    match value.kind() {
        ValueKind::Seq => Ok(value
            .try_iter()?
            .filter_map(|v| v.as_str().map(quote))
            .join(" ")),
        _ => Ok(quote(&value.to_string())),
    }
}

#[derive(Clone, Debug, Serialize)]
struct CustomService {
    name: String,
    protocol: &'static str,
    port: String,
}

#[derive(Clone, Debug, Serialize)]
struct ProfileLine {
    key: &'static str,
    value: String,
}

/// Everything one `config firewall policy` block needs
#[derive(Clone, Debug, Serialize)]
struct PolicyBlock {
    name: String,
    comment: String,
    srcintf: Vec<String>,
    dstintf: Vec<String>,
    srcaddr: Vec<String>,
    dstaddr: Vec<String>,
    src_isdb: Vec<String>,
    dst_isdb: Vec<String>,
    users: Vec<String>,
    groups: Vec<String>,
    services: Vec<String>,
    custom_services: Vec<CustomService>,
    action: &'static str,
    inspection_mode: &'static str,
    utm: bool,
    ssl_ssh_profile: String,
    profiles: Vec<ProfileLine>,
    logtraffic: &'static str,
    logtraffic_start: &'static str,
    auto_asic_offload: &'static str,
    nat: &'static str,
    ippool: String,
}

fn non_blank<'a>(items: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    items
        .into_iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect()
}

impl PolicyBlock {
    fn from_record(p: &PolicyRecord) -> Self {
        let plain = |side: &super::merger::AddressBuckets| {
            non_blank(
                side.addresses
                    .iter()
                    .chain(side.address_groups.iter())
                    .chain(side.vips.iter()),
            )
        };

        let services = p.services.iter().filter(|s| !s.name().is_empty());

        let profiles: Vec<ProfileLine> = Profile::ALL
            .iter()
            .filter_map(|profile| {
                p.profile(*profile).effective().map(|v| ProfileLine {
                    key: profile.as_str(),
                    value: v.to_string(),
                })
            })
            .collect();

        PolicyBlock {
            name: p.name.clone(),
            comment: p.comment.clone(),
            srcintf: non_blank(&p.src_interfaces),
            dstintf: non_blank(&p.dst_interfaces),
            srcaddr: plain(&p.src),
            dstaddr: plain(&p.dst),
            src_isdb: non_blank(&p.src.internet_services),
            dst_isdb: non_blank(&p.dst.internet_services),
            users: non_blank(&p.subjects.users),
            groups: non_blank(&p.subjects.groups),
            services: services.clone().map(|s| s.service_name()).collect(),
            custom_services: services
                .filter_map(|s| match s {
                    ServiceSelection::Custom {
                        protocol, port, ..
                    } => Some(CustomService {
                        name: s.service_name(),
                        protocol: protocol.as_str(),
                        port: port.clone(),
                    }),
                    _ => None,
                })
                .collect(),
            action: p.action.as_str(),
            inspection_mode: p.inspection_mode.as_str(),
            utm: !p.ssl_ssh_profile.is_empty() || !profiles.is_empty(),
            ssl_ssh_profile: p.ssl_ssh_profile.clone(),
            profiles,
            logtraffic: p.log_traffic.as_str(),
            logtraffic_start: p.log_traffic_start.as_str(),
            auto_asic_offload: p.auto_asic_offload.as_str(),
            nat: p.nat.as_str(),
            ippool: if p.nat.is_enabled() {
                p.ip_pool.clone()
            } else {
                String::new()
            },
        }
    }

    fn is_complete(&self) -> bool {
        !self.srcintf.is_empty()
            && !self.dstintf.is_empty()
            && !(self.srcaddr.is_empty() && self.src_isdb.is_empty())
            && !(self.dstaddr.is_empty() && self.dst_isdb.is_empty())
            && !self.services.is_empty()
    }

    /// A copy narrowed down to the given interfaces and service
    fn narrowed(
        &self,
        name: String,
        srcintf: Option<&String>,
        dstintf: Option<&String>,
        service: &String,
    ) -> Self {
        let mut block = self.clone();

        block.name = name;
        if let Some(i) = srcintf {
            block.srcintf = vec![i.clone()];
        }
        if let Some(i) = dstintf {
            block.dstintf = vec![i.clone()];
        }
        block.services = vec![service.clone()];
        block.custom_services.retain(|c| c.name == *service);

        block
    }
}

#[derive(Debug)]
pub struct PolicyRenderer {
    env: Environment<'static>,
    name_limit: usize,
}

impl PolicyRenderer {
    /// A `policy.jinja` found in `override_dir` replaces the built-in template
    pub fn new(override_dir: Option<&Path>, name_limit: usize) -> Result<Self> {
        let mut env = Environment::new();

        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);
        env.add_filter("quoted", quoted);
        env.add_template(BUILTIN_TEMPLATE, include_str!("policy.jinja"))?;

        if let Some(dir) = override_dir {
            let root_dir = dir
                .canonicalize()
                .with_context(|| format!("template directory {}", dir.display()))?;

            env.set_loader(move |name| -> Result<Option<String>, minijinja::Error> {
                debug!(target: "render", "loading template: {}", &name);

                // only paths under root_dir are allowed
                let template_path = root_dir.join(Path::new(name));

                let template_path = match template_path.canonicalize() {
                    Ok(x) => x,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                    Err(e) => {
                        error!("error canonicalizing path: {}", e);
                        return Err(minijinja::Error::new(
                            ErrorKind::InvalidOperation,
                            format!("invalid template path: {}", template_path.display()),
                        ));
                    }
                };

                if !template_path.starts_with(&root_dir) {
                    return Err(minijinja::Error::new(
                        ErrorKind::InvalidOperation,
                        format!(
                            "template path outside of {}: {:?}",
                            root_dir.display(),
                            &template_path
                        ),
                    ));
                }

                match fs::read_to_string(template_path) {
                    Ok(contents) => Ok(Some(contents)),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
                    Err(err) => Err(minijinja::Error::new(
                        ErrorKind::TemplateNotFound,
                        "cannot read template",
                    )
                    .with_source(err)),
                }
            });
        }

        Ok(PolicyRenderer { env, name_limit })
    }

    fn template(&self) -> Result<Template<'_, '_>> {
        match self.env.get_template(POLICY_TEMPLATE) {
            Ok(t) => Ok(t),
            Err(e) if e.kind() == ErrorKind::TemplateNotFound => {
                Ok(self.env.get_template(BUILTIN_TEMPLATE)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn render_block(&self, block: &PolicyBlock) -> Result<String> {
        if !block.is_complete() {
            debug!(target: "render", "skipping {}, missing required fields", &block.name);
            return Ok(String::new());
        }

        let ctx = Value::from_serialize(block);

        self.template()?
            .render(ctx)
            .with_context(|| format!("render policy {}", &block.name))
    }

    /// Renders all three layouts of `policy`
    pub fn render(&self, policy: &PolicyRecord) -> Result<GeneratedPolicy> {
        let mut base = PolicyBlock::from_record(policy);
        let full_name = base.name.clone();
        base.name = truncate_name(&full_name, self.name_limit);

        debug!(target: "render",
            "generating policy {} ({} services)", &full_name, base.services.len());

        let output1 = self.render_block(&base)?;

        let output2 = if base.services.is_empty() {
            NO_SERVICES.to_string()
        } else {
            base.services
                .iter()
                .map(|svc| {
                    let name = truncate_name(&format!("{}-{}", full_name, svc), self.name_limit);
                    self.render_block(&base.narrowed(name, None, None, svc))
                })
                .collect::<Result<Vec<String>>>()?
                .into_iter()
                .filter(|s| !s.is_empty())
                .join("\n")
        };

        let output3 = if base.srcintf.is_empty()
            || base.dstintf.is_empty()
            || base.services.is_empty()
        {
            NO_COMBINATIONS.to_string()
        } else {
            iproduct!(base.srcintf.iter(), base.dstintf.iter(), base.services.iter())
                .map(|(src, dst, svc)| {
                    let name = truncate_name(
                        &format!("{}-{}-{}-{}", full_name, src, dst, svc),
                        self.name_limit,
                    );
                    self.render_block(&base.narrowed(name, Some(src), Some(dst), svc))
                })
                .collect::<Result<Vec<String>>>()?
                .into_iter()
                .filter(|s| !s.is_empty())
                .join("\n")
        };

        let or_else = |text: String, msg: &str| {
            if text.is_empty() {
                msg.to_string()
            } else {
                text
            }
        };

        Ok(GeneratedPolicy {
            policy_id: policy.id.clone(),
            policy_name: full_name,
            output1: or_else(output1, MISSING_FIELDS),
            output2: or_else(output2, MISSING_SERVICES),
            output3: or_else(output3, MISSING_COMBINATIONS),
        })
    }

    pub fn render_all(&self, policies: &[PolicyRecord]) -> Result<Vec<GeneratedPolicy>> {
        policies.iter().map(|p| self.render(p)).collect()
    }
}
