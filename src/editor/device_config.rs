//! Builds a catalog out of a FortiOS configuration backup
use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;
use tracing::debug;

use super::actions::Protocol;
use super::catalog::{CatalogStore, ServiceDefinition};

/// Splits a CLI line into words, unquoting quoted ones
fn words(line: &str) -> Vec<String> {
    static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)"|(\S+)"#).unwrap());

    WORD.captures_iter(line)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().replace("\\\"", "\"").replace("\\\\", "\\"))
        .collect()
}

/// `config` blocks that only wrap other blocks
fn is_wrapper(path: &str) -> bool {
    matches!(path, "vdom" | "global")
}

struct Frame {
    path: String,
    edit: Option<String>,
}

impl CatalogStore {
    /// Collects the names defined in the top level sections of `text`. Unknown sections and
    /// nested blocks are skipped.
    pub fn from_device_config(text: &str) -> CatalogStore {
        let mut cat = CatalogStore::default();
        let mut stack: Vec<Frame> = vec![];

        for line in text.lines() {
            let w = words(line.trim());
            let Some(keyword) = w.first() else {
                continue;
            };

            match keyword.as_str() {
                "config" => stack.push(Frame {
                    path: w[1..].join(" "),
                    edit: None,
                }),
                "end" => {
                    stack.pop();
                }
                "next" => {
                    if let Some(frame) = stack.last_mut() {
                        frame.edit = None;
                    }
                }
                "edit" if w.len() > 1 => {
                    let Some(frame) = stack.last_mut() else {
                        continue;
                    };
                    frame.edit = Some(w[1].clone());

                    let depth = stack.iter().filter(|f| !is_wrapper(&f.path)).count();
                    if depth == 1 {
                        if let Some(frame) = stack.last() {
                            cat.add_definition(&frame.path, &w[1]);
                        }
                    }
                }
                "set" if w.len() > 2 => {
                    let depth = stack.iter().filter(|f| !is_wrapper(&f.path)).count();
                    let Some(frame) = stack.last() else {
                        continue;
                    };
                    if let (1, Some(name)) = (depth, frame.edit.as_ref()) {
                        cat.add_setting(&frame.path, name, &w[1], &w[2..]);
                    }
                }
                _ => {}
            }
        }

        debug!(target: "catalog", "device configuration holds {} catalog entries", cat.len());

        cat
    }

    fn add_definition(&mut self, section: &str, name: &str) {
        let list = match section {
            "system interface" => &mut self.interfaces,
            "firewall address" => &mut self.addresses,
            "firewall addrgrp" => &mut self.address_groups,
            "firewall internet-service-name" => &mut self.internet_services,
            "firewall vip" => &mut self.vips,
            "firewall ippool" => &mut self.ip_pools,
            "firewall ssl-ssh-profile" => &mut self.ssl_ssh_profiles,
            "webfilter profile" => &mut self.webfilter_profiles,
            "application list" => &mut self.application_lists,
            "antivirus profile" => &mut self.av_profiles,
            "ips sensor" => &mut self.ips_sensors,
            "user local" => &mut self.users,
            "user group" => &mut self.groups,
            "firewall service custom" => {
                if !self.services.iter().any(|s| s.name == name) {
                    self.services.push(ServiceDefinition {
                        name: name.to_string(),
                        protocol: Protocol::TCP,
                        port: String::new(),
                    });
                }
                return;
            }
            "firewall service group" => {
                self.service_groups.entry(name.to_string()).or_default();
                return;
            }
            _ => return,
        };

        if !list.iter().any(|x| x == name) {
            list.push(name.to_string());
        }
    }

    fn add_setting(&mut self, section: &str, name: &str, key: &str, values: &[String]) {
        match (section, key) {
            ("firewall service group", "member") => {
                self.service_groups
                    .insert(name.to_string(), values.to_vec());
            }
            ("firewall service custom", "tcp-portrange" | "udp-portrange") => {
                if let Some(svc) = self.services.iter_mut().find(|s| s.name == name) {
                    svc.protocol = if key == "tcp-portrange" {
                        Protocol::TCP
                    } else {
                        Protocol::UDP
                    };
                    svc.port = values.join(" ");
                }
            }
            ("firewall service custom", "protocol") => {
                if let (Some(svc), Ok(protocol)) = (
                    self.services.iter_mut().find(|s| s.name == name),
                    Protocol::from_str(&values[0]),
                ) {
                    svc.protocol = protocol;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::words;
    use crate::editor::actions::Protocol;
    use crate::editor::catalog::CatalogStore;
    use crate::editor::testing::fixture_dir;
    use assert2::check;
    use rstest::rstest;
    use std::fs;
    use std::path::PathBuf;

    #[rstest]
    #[case(r#"edit "port1""#, vec!["edit", "port1"])]
    #[case(r#"set member "HTTP" "HTTPS""#, vec!["set", "member", "HTTP", "HTTPS"])]
    #[case(r#"set comment "say \"hi\"""#, vec!["set", "comment", "say \"hi\""])]
    #[case("next", vec!["next"])]
    fn test_words(#[case] line: &str, #[case] expected: Vec<&str>) {
        check!(words(line) == expected);
    }

    #[rstest]
    fn test_device_config(fixture_dir: PathBuf) {
        let text = fs::read_to_string(fixture_dir.join("device.conf")).unwrap();
        let cat = CatalogStore::from_device_config(&text);

        check!(cat.interfaces == vec!["port1", "port2", "wan1"]);
        check!(cat.addresses == vec!["all", "lan-net"]);
        check!(cat.address_groups == vec!["office"]);
        check!(cat.vips == vec!["vip-web"]);
        check!(cat.ip_pools == vec!["pool1"]);
        check!(cat.services.len() == 2);
        check!(cat.services[0].name == "web8080");
        check!(cat.services[0].port == "8080");
        check!(cat.services[1].protocol == Protocol::UDP);
        check!(cat.service_groups["Web Access"] == vec!["HTTP", "HTTPS"]);
        // nested blocks of a profile don't leak into the catalog
        check!(cat.webfilter_profiles == vec!["default", "strict"]);
        check!(cat.ssl_ssh_profiles == vec!["certificate-inspection"]);
        check!(cat.users == vec!["alice"]);
        check!(cat.groups == vec!["staff"]);
    }

    #[test]
    fn test_vdom_wrapper() {
        let text = "config vdom\nedit root\n\
                    config firewall address\nedit \"srv\"\nnext\nend\n\
                    end\n";
        let cat = CatalogStore::from_device_config(text);
        check!(cat.addresses == vec!["srv"]);
    }
}
