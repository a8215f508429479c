//! Directory backed implementation of the collaborators.
//!
//! Each template is a JSON file in the templates directory. Short URLs live in
//! `short_urls.yaml` next to them.
use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::backend::{GeneratedPolicy, TemplateBackend, TemplateData};
use super::catalog::CatalogStore;
use super::config_files::EditorConfig;
use super::policies::{PolicyId, PolicyRecord};
use super::render::PolicyRenderer;
use super::utils::{truncate_name, valid_template_name};
use super::wire::{ExportedTemplate, PolicyWire, TemplateDocument};

const SHORT_URLS: &str = "short_urls.yaml";

/// Six random hex characters
fn suffix() -> String {
    Uuid::new_v4().simple().to_string()[..6].to_string()
}

#[derive(Debug)]
pub struct FileBackend {
    templates_dir: PathBuf,
    catalog_file: Option<PathBuf>,
    name_limit: usize,
    url_prefix: String,
    renderer: PolicyRenderer,
    // serializes read-modify-write cycles on the files
    lock: Mutex<()>,
}

impl FileBackend {
    pub async fn open(workspace: &Path, config: &EditorConfig) -> Result<FileBackend> {
        let templates_dir = EditorConfig::resolve(workspace, &config.templates_dir);

        fs::create_dir_all(&templates_dir)
            .await
            .with_context(|| format!("create {}", templates_dir.display()))?;

        let render_dir = config
            .render_templates_dir
            .as_ref()
            .map(|d| EditorConfig::resolve(workspace, d));

        info!("templates are stored in {}", templates_dir.display());

        Ok(FileBackend {
            templates_dir,
            catalog_file: config
                .catalog_file
                .as_ref()
                .map(|f| EditorConfig::resolve(workspace, f)),
            name_limit: config.name_limit,
            url_prefix: config.trusted_url_prefix.clone(),
            renderer: PolicyRenderer::new(render_dir.as_deref(), config.name_limit)?,
            lock: Mutex::new(()),
        })
    }

    fn template_path(&self, name: &str) -> Result<PathBuf> {
        if !valid_template_name(name) {
            bail!("invalid template name '{}'", name);
        }
        Ok(self.templates_dir.join(format!("{}.json", name)))
    }

    fn template_url(&self, name: &str) -> String {
        format!("{}{}", self.url_prefix, name)
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(fs::try_exists(self.template_path(name)?).await?)
    }

    async fn read_document(&self, name: &str) -> Result<TemplateDocument> {
        let p = self.template_path(name)?;

        if !fs::try_exists(&p).await? {
            bail!("template '{}' not found", name);
        }

        let data = fs::read_to_string(&p)
            .await
            .with_context(|| format!("read {}", p.display()))?;

        serde_json::from_str(&data).with_context(|| format!("decode {}", p.display()))
    }

    async fn write_document(&self, name: &str, doc: &TemplateDocument) -> Result<()> {
        let p = self.template_path(name)?;
        let data = serde_json::to_string_pretty(doc)?;

        fs::write(&p, data)
            .await
            .with_context(|| format!("write {}", p.display()))?;

        debug!(target: "store", "template '{}' saved with {} policies", name, doc.policies.len());

        Ok(())
    }

    async fn read_short_urls(&self) -> Result<IndexMap<String, String>> {
        let p = self.templates_dir.join(SHORT_URLS);

        if !fs::try_exists(&p).await? {
            return Ok(IndexMap::new());
        }

        let data = fs::read_to_string(&p).await?;
        let urls: Option<IndexMap<String, String>> =
            serde_yaml::from_str(&data).with_context(|| format!("decode {}", p.display()))?;

        Ok(urls.unwrap_or_default())
    }

    async fn write_short_urls(&self, urls: &IndexMap<String, String>) -> Result<()> {
        let p = self.templates_dir.join(SHORT_URLS);
        fs::write(&p, serde_yaml::to_string(urls)?)
            .await
            .with_context(|| format!("write {}", p.display()))
    }
}

impl TemplateBackend for FileBackend {
    async fn load_catalog(&self) -> Result<CatalogStore> {
        let Some(p) = &self.catalog_file else {
            return Ok(CatalogStore::default());
        };

        let data = fs::read_to_string(p)
            .await
            .with_context(|| format!("read catalog {}", p.display()))?;

        let catalog = if p.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&data).with_context(|| format!("decode {}", p.display()))?
        } else {
            CatalogStore::from_device_config(&data)
        };

        Ok(catalog)
    }

    async fn load_template(&self, name: &str) -> Result<TemplateData> {
        let doc = self.read_document(name).await?;

        let policies: Vec<PolicyRecord> =
            doc.policies.into_iter().map(PolicyRecord::from).collect();

        let config = if doc.config.is_empty() {
            CatalogStore::from_policies(&policies)
        } else {
            doc.config
        };

        debug!(target: "store", "template '{}' loaded with {} policies", name, policies.len());

        Ok(TemplateData { policies, config })
    }

    async fn list_templates(&self) -> Result<Vec<String>> {
        let mut names = vec![];
        let mut entries = fs::read_dir(&self.templates_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let p = entry.path();
            if p.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = p.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    async fn save_template(
        &self,
        name: &str,
        policies: &[PolicyRecord],
        config: &CatalogStore,
    ) -> Result<()> {
        if name.is_empty() {
            bail!("template name is required");
        }
        if policies.is_empty() {
            bail!("at least one policy is required");
        }

        let _guard = self.lock.lock().await;

        let doc = TemplateDocument {
            policies: policies.iter().map(PolicyWire::from).collect(),
            config: config.clone(),
        };

        self.write_document(name, &doc).await
    }

    async fn clone_policy(&self, source: &PolicyRecord) -> Result<PolicyRecord> {
        let _guard = self.lock.lock().await;

        let mut clone = source.clone();
        clone.id = PolicyId::mint();
        clone.name = truncate_name(
            &format!("{}_clone_{}", source.name, suffix()),
            self.name_limit,
        );

        // a stored policy gets its copy stored next to it
        for name in self.list_templates().await? {
            let mut doc = self.read_document(&name).await?;
            if doc.policies.iter().any(|p| p.policy_id == source.id.as_str()) {
                doc.policies.push(PolicyWire::from(&clone));
                self.write_document(&name, &doc).await?;
                break;
            }
        }

        debug!(target: "store", "policy {} cloned as {}", &source.id, &clone.id);

        Ok(clone)
    }

    async fn clone_template(&self, name: &str) -> Result<String> {
        let _guard = self.lock.lock().await;

        let mut doc = self.read_document(name).await?;
        let new_name = format!("{}_clone_{}", name, suffix());

        for p in doc.policies.iter_mut() {
            p.policy_id = PolicyId::mint().to_string();
        }

        self.write_document(&new_name, &doc).await?;

        Ok(new_name)
    }

    async fn rename_template(&self, old: &str, new: &str) -> Result<()> {
        if old == new {
            bail!("new template name must be different from the old name");
        }

        let _guard = self.lock.lock().await;

        if !self.exists(old).await? {
            bail!("template '{}' not found", old);
        }
        if self.exists(new).await? {
            bail!("a template named '{}' already exists", new);
        }

        fs::rename(self.template_path(old)?, self.template_path(new)?).await?;

        let old_url = self.template_url(old);
        let mut urls = self.read_short_urls().await?;
        let mut changed = false;
        for (code, url) in urls.iter_mut() {
            if *url == old_url {
                debug!(target: "store", "short url {} now points to '{}'", code, new);
                *url = self.template_url(new);
                changed = true;
            }
        }
        if changed {
            self.write_short_urls(&urls).await?;
        }

        Ok(())
    }

    async fn delete_template(&self, name: &str) -> Result<()> {
        let _guard = self.lock.lock().await;

        if !self.exists(name).await? {
            bail!("template '{}' not found", name);
        }

        fs::remove_file(self.template_path(name)?).await?;

        let url = self.template_url(name);
        let mut urls = self.read_short_urls().await?;
        let before = urls.len();
        urls.retain(|_, u| *u != url);
        if urls.len() != before {
            self.write_short_urls(&urls).await?;
        }

        Ok(())
    }

    async fn export_template(&self, name: &str) -> Result<ExportedTemplate> {
        Ok(ExportedTemplate {
            name: name.to_string(),
            data: self.read_document(name).await?,
        })
    }

    async fn import_template(&self, exported: ExportedTemplate) -> Result<String> {
        if exported.name.is_empty() {
            bail!("template name is required");
        }

        let _guard = self.lock.lock().await;

        let mut doc = exported.data;
        for p in doc.policies.iter_mut() {
            p.policy_id = PolicyId::mint().to_string();
        }

        self.write_document(&exported.name, &doc).await?;

        Ok(exported.name)
    }

    async fn generate_policy_text(
        &self,
        policies: &[PolicyRecord],
    ) -> Result<Vec<GeneratedPolicy>> {
        if policies.is_empty() {
            bail!("at least one policy is required");
        }

        self.renderer.render_all(policies)
    }

    async fn shorten_url(&self, url: &str) -> Result<String> {
        if !url.starts_with(&self.url_prefix) || url.len() == self.url_prefix.len() {
            bail!("short URLs are only allowed for templates under {}", self.url_prefix);
        }

        let _guard = self.lock.lock().await;

        let mut urls = self.read_short_urls().await?;

        if let Some((code, _)) = urls.iter().find(|(_, u)| *u == url) {
            return Ok(code.clone());
        }

        let code = (0..16)
            .map(|_| suffix())
            .find(|c| !urls.contains_key(c))
            .ok_or_else(|| anyhow!("can't find a free short code"))?;

        urls.insert(code.clone(), url.to_string());
        self.write_short_urls(&urls).await?;

        debug!(target: "store", "short url {} for {}", &code, url);

        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::FileBackend;
    use crate::editor::backend::TemplateBackend;
    use crate::editor::config_files::EditorConfig;
    use crate::editor::policies::{PolicyId, PolicyRecord};
    use crate::editor::testing::{fixture_dir, sample_catalog, sample_record};
    use crate::editor::wire::ExportedTemplate;
    use assert2::check;
    use std::path::PathBuf;
    use tempfile::TempDir;

    async fn backend() -> (TempDir, FileBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path(), &EditorConfig::default())
            .await
            .unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (_dir, backend) = backend().await;

        backend
            .save_template("office", &[sample_record()], &sample_catalog())
            .await
            .unwrap();

        let data = backend.load_template("office").await.unwrap();
        check!(data.policies == vec![sample_record()]);
        check!(data.config == sample_catalog());

        check!(backend.list_templates().await.unwrap() == vec!["office"]);
    }

    #[tokio::test]
    async fn test_save_rejects() {
        let (_dir, backend) = backend().await;

        check!(backend.save_template("office", &[], &sample_catalog()).await.is_err());
        check!(backend.save_template("", &[sample_record()], &sample_catalog()).await.is_err());
        let res = backend
            .save_template("../up", &[sample_record()], &sample_catalog())
            .await;
        check!(res.is_err());
        check!(backend.list_templates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_missing() {
        let (_dir, backend) = backend().await;
        let err = backend.load_template("nothing").await.unwrap_err();
        check!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_catalog_derived_from_policies() {
        let (_dir, backend) = backend().await;

        backend
            .save_template("bare", &[sample_record()], &Default::default())
            .await
            .unwrap();

        let data = backend.load_template("bare").await.unwrap();
        check!(data.config.interfaces == vec!["port1", "wan1"]);
        check!(data.config.groups == vec!["staff"]);
    }

    #[tokio::test]
    async fn test_fixture_workspace() {
        let dir = fixture_dir();
        let conf = EditorConfig::load(&dir).unwrap();
        let backend = FileBackend::open(&dir, &conf).await.unwrap();

        let catalog = backend.load_catalog().await.unwrap();
        check!(catalog.interfaces == vec!["port1", "port2", "wan1"]);

        let data = backend.load_template("branch").await.unwrap();
        check!(data.policies.len() == 2);
        check!(data.policies[0].name == "lan-to-wan");
    }

    #[tokio::test]
    async fn test_device_config_catalog() {
        let dir = fixture_dir();
        let conf = EditorConfig {
            catalog_file: Some(PathBuf::from("device.conf")),
            ..EditorConfig::default()
        };
        let tmp = tempfile::tempdir().unwrap();
        let conf = EditorConfig {
            templates_dir: tmp.path().to_path_buf(),
            ..conf
        };
        let backend = FileBackend::open(&dir, &conf).await.unwrap();

        let catalog = backend.load_catalog().await.unwrap();
        check!(catalog.vips == vec!["vip-web"]);
    }

    #[tokio::test]
    async fn test_clone_template() {
        let (_dir, backend) = backend().await;
        backend
            .save_template("office", &[sample_record()], &sample_catalog())
            .await
            .unwrap();

        let name = backend.clone_template("office").await.unwrap();
        check!(name.starts_with("office_clone_"));
        check!(name.len() == "office_clone_".len() + 6);

        let copy = backend.load_template(&name).await.unwrap();
        check!(copy.policies.len() == 1);
        check!(copy.policies[0].id != sample_record().id);
        check!(copy.policies[0].name == "web-out");

        check!(backend.clone_template("nothing").await.is_err());
    }

    #[tokio::test]
    async fn test_clone_policy() {
        let (_dir, backend) = backend().await;
        backend
            .save_template("office", &[sample_record()], &sample_catalog())
            .await
            .unwrap();

        let clone = backend.clone_policy(&sample_record()).await.unwrap();

        check!(clone.id != sample_record().id);
        check!(clone.name.starts_with("web-out_clone_"));
        check!(clone.services == sample_record().services);

        let stored = backend.load_template("office").await.unwrap();
        check!(stored.policies.len() == 2);
        check!(stored.policies[1].id == clone.id);

        // unsaved policies are cloned but not stored
        let unsaved = PolicyRecord::new(PolicyId::from("fresh"));
        backend.clone_policy(&unsaved).await.unwrap();
        check!(backend.load_template("office").await.unwrap().policies.len() == 2);
    }

    #[tokio::test]
    async fn test_clone_policy_name_limit() {
        let (_dir, backend) = backend().await;
        let mut source = sample_record();
        source.name = "a-policy-name-that-is-quite-long".to_string();

        let clone = backend.clone_policy(&source).await.unwrap();
        check!(clone.name.chars().count() == 32);
    }

    #[tokio::test]
    async fn test_rename_and_delete_with_short_urls() {
        let (_dir, backend) = backend().await;
        backend
            .save_template("office", &[sample_record()], &sample_catalog())
            .await
            .unwrap();
        backend
            .save_template("branch", &[sample_record()], &sample_catalog())
            .await
            .unwrap();

        let prefix = EditorConfig::default().trusted_url_prefix;
        let code = backend
            .shorten_url(&format!("{}office", prefix))
            .await
            .unwrap();

        check!(backend.rename_template("office", "office").await.is_err());
        check!(backend.rename_template("office", "branch").await.is_err());
        check!(backend.rename_template("gone", "new").await.is_err());

        backend.rename_template("office", "hq").await.unwrap();
        check!(backend.list_templates().await.unwrap() == vec!["branch", "hq"]);

        let urls = backend.read_short_urls().await.unwrap();
        check!(urls[&code] == format!("{}hq", prefix));

        backend.delete_template("hq").await.unwrap();
        check!(backend.read_short_urls().await.unwrap().is_empty());
        check!(backend.delete_template("hq").await.is_err());
    }

    #[tokio::test]
    async fn test_shorten_url() {
        let (_dir, backend) = backend().await;
        let prefix = EditorConfig::default().trusted_url_prefix;
        let url = format!("{}office", prefix);

        let code = backend.shorten_url(&url).await.unwrap();
        check!(code.len() == 6);
        check!(code.chars().all(|c| c.is_ascii_alphanumeric()));

        // same url, same code
        check!(backend.shorten_url(&url).await.unwrap() == code);

        check!(backend.shorten_url("https://elsewhere.example/x").await.is_err());
        check!(backend.shorten_url(&prefix).await.is_err());
    }

    #[tokio::test]
    async fn test_export_import() {
        let (_dir, backend) = backend().await;
        backend
            .save_template("office", &[sample_record()], &sample_catalog())
            .await
            .unwrap();

        let exported = backend.export_template("office").await.unwrap();
        let json = serde_json::to_string(&exported).unwrap();

        let mut imported: ExportedTemplate = serde_json::from_str(&json).unwrap();
        imported.name = "copy".to_string();
        check!(backend.import_template(imported).await.unwrap() == "copy");

        let copy = backend.load_template("copy").await.unwrap();
        check!(copy.policies[0].id != sample_record().id);
        check!(copy.policies[0].name == sample_record().name);

        // policies are mandatory
        check!(serde_json::from_str::<ExportedTemplate>(r#"{"name": "x", "data": {}}"#).is_err());
    }

    #[tokio::test]
    async fn test_generate() {
        let (_dir, backend) = backend().await;

        check!(backend.generate_policy_text(&[]).await.is_err());

        let out = backend.generate_policy_text(&[sample_record()]).await.unwrap();
        check!(out.len() == 1);
        check!(out[0].output1.starts_with("config firewall policy\n"));
    }
}
