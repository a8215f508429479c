//! Request/response collaborators the editor relies on for persistence and generation.
//!
//! Every call is opaque to the session: it only sees a result or an [anyhow::Error], which it
//! wraps into [ExternalFailure](super::errors::EditorError::ExternalFailure).
use anyhow::Result;

use super::catalog::CatalogStore;
use super::policies::{PolicyId, PolicyRecord};
use super::wire::ExportedTemplate;

/// A loaded template
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemplateData {
    pub policies: Vec<PolicyRecord>,
    pub config: CatalogStore,
}

/// Rendered text of one policy, in the three layouts
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedPolicy {
    pub policy_id: PolicyId,
    pub policy_name: String,
    /// One policy with every interface, address and service
    pub output1: String,
    /// One policy per service
    pub output2: String,
    /// One policy per source interface, destination interface and service
    pub output3: String,
}

#[allow(async_fn_in_trait)]
pub trait TemplateBackend {
    /// The device's default catalog
    async fn load_catalog(&self) -> Result<CatalogStore>;

    async fn load_template(&self, name: &str) -> Result<TemplateData>;

    async fn list_templates(&self) -> Result<Vec<String>>;

    async fn save_template(
        &self,
        name: &str,
        policies: &[PolicyRecord],
        config: &CatalogStore,
    ) -> Result<()>;

    /// Returns a copy of `source` with a new id, as decided by the backend
    async fn clone_policy(&self, source: &PolicyRecord) -> Result<PolicyRecord>;

    /// Returns the name of the copy
    async fn clone_template(&self, name: &str) -> Result<String>;

    async fn rename_template(&self, old: &str, new: &str) -> Result<()>;

    async fn delete_template(&self, name: &str) -> Result<()>;

    async fn export_template(&self, name: &str) -> Result<ExportedTemplate>;

    /// Returns the name the template was stored under
    async fn import_template(&self, exported: ExportedTemplate) -> Result<String>;

    async fn generate_policy_text(&self, policies: &[PolicyRecord]) -> Result<Vec<GeneratedPolicy>>;

    async fn shorten_url(&self, url: &str) -> Result<String>;
}
