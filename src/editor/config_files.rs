//! The editor's configuration file
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_valid::Validate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::session::LoadOrdering;

pub const CONFIG_FILE: &str = "editor.conf";

#[derive(Debug, Deserialize, Validate, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EditorConfig {
    /// Where templates are stored, relative to the workspace
    pub templates_dir: PathBuf,
    /// Device catalog offered next to every template
    pub catalog_file: Option<PathBuf>,
    pub load_ordering: LoadOrdering,
    /// Maximum length of generated and cloned policy names
    #[validate(minimum = 1)]
    #[validate(maximum = 64)]
    pub name_limit: usize,
    /// Only URLs below this prefix can be shortened
    #[validate(pattern = r"^https?://")]
    pub trusted_url_prefix: String,
    /// Directory holding a `policy.jinja` replacing the built-in one
    pub render_templates_dir: Option<PathBuf>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        EditorConfig {
            templates_dir: PathBuf::from("templates"),
            catalog_file: None,
            load_ordering: LoadOrdering::default(),
            name_limit: 32,
            trusted_url_prefix: "http://localhost:5000/get_template/".to_string(),
            render_templates_dir: None,
        }
    }
}

impl EditorConfig {
    /// Reads `editor.conf` from `workspace`. A missing file means defaults.
    pub fn load(workspace: &Path) -> Result<EditorConfig> {
        let p = workspace.join(CONFIG_FILE);

        if !p.exists() {
            info!("no configuration file in {}, using defaults", workspace.display());
            return Ok(EditorConfig::default());
        }

        info!("loading configuration file: {}", p.display());

        let data = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;

        EditorConfig::parse(&data).with_context(|| format!("parse {}", p.display()))
    }

    pub fn parse(data: &str) -> Result<EditorConfig> {
        let conf: EditorConfig = serde_yaml::from_str(data)?;

        conf.validate()
            .map_err(|e| anyhow!("invalid configuration: {}", e))?;

        Ok(conf)
    }

    /// Resolves a configured path against the workspace
    pub fn resolve(workspace: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            workspace.join(path)
        }
    }
}
