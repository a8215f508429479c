//! The editing session: the policy collection, the catalog and the form bound to one policy.
//!
//! All mutations go through [Session]. Asynchronous collaborators are awaited by the caller and
//! their result is applied in one synchronous step, so there is a single writer at any time.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, warn};

use super::actions::Action;
use super::backend::{GeneratedPolicy, TemplateBackend, TemplateData};
use super::catalog::CatalogStore;
use super::errors::{EditorError, EditorResult};
use super::form::FormController;
use super::merger::{AddressKind, BucketedList, Selection, SubjectKind};
use super::policies::{
    CustomServiceField, Direction, Field, PolicyId, PolicyRecord, ServiceSelection,
};
use super::utils::valid_template_name;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Loading,
    Ready,
}

/// What to do with a load response when a newer load was requested in the meantime
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadOrdering {
    /// Apply every response, the last one to arrive wins
    #[default]
    LastWriteWins,
    /// Drop responses to requests that have been superseded
    DropStale,
}

impl FromStr for LoadOrdering {
    type Err = EditorError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last-write-wins" => Ok(LoadOrdering::LastWriteWins),
            "drop-stale" => Ok(LoadOrdering::DropStale),
            _ => Err(EditorError::InvalidSelection(format!(
                "unknown load ordering: {}",
                s
            ))),
        }
    }
}

/// Handed out by [Session::begin_load], given back with the response
#[derive(Debug, PartialEq, Eq)]
pub struct LoadTicket {
    seq: u64,
    template: Option<String>,
}

impl LoadTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

#[derive(Debug)]
pub struct Session {
    state: SessionState,
    catalog: CatalogStore,
    policies: IndexMap<PolicyId, PolicyRecord>,
    form: FormController,
    template: Option<String>,

    ordering: LoadOrdering,
    load_seq: u64,
    in_flight: usize,
    loaded: bool,
}

impl Default for Session {
    fn default() -> Self {
        Session::new(LoadOrdering::default())
    }
}

impl Session {
    pub fn new(ordering: LoadOrdering) -> Self {
        Session {
            state: SessionState::Empty,
            catalog: CatalogStore::default(),
            policies: IndexMap::new(),
            form: FormController::new(),
            template: None,
            ordering,
            load_seq: 0,
            in_flight: 0,
            loaded: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    /// Name of the template the policies were loaded from or last saved to
    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn form(&self) -> &FormController {
        &self.form
    }

    /// Policies in collection order
    pub fn policies(&self) -> impl Iterator<Item = &PolicyRecord> {
        self.policies.values()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn get(&self, id: &PolicyId) -> EditorResult<&PolicyRecord> {
        self.policies
            .get(id)
            .ok_or_else(|| EditorError::PolicyNotFound(id.clone()))
    }

    /// Id of the policy at `index` in collection order
    pub fn id_at(&self, index: usize) -> EditorResult<&PolicyId> {
        self.policies
            .get_index(index)
            .map(|(id, _)| id)
            .ok_or(EditorError::OutOfRange {
                position: index,
                len: self.policies.len(),
            })
    }

    pub fn selected(&self) -> Option<&PolicyId> {
        self.form.bound()
    }

    pub fn selected_record(&self) -> Option<&PolicyRecord> {
        self.form.bound().and_then(|id| self.policies.get(id))
    }

    //
    // Collection
    //

    /// Appends a policy with default values and selects it
    pub fn create(&mut self) -> PolicyId {
        let record = PolicyRecord::new(PolicyId::mint());
        let id = record.id.clone();

        debug!(target: "session", "created policy {}", &id);

        self.form.bind(&record);
        self.policies.insert(id.clone(), record);

        id
    }

    /// Merges a cloned record into the collection and selects it. A clone whose id is already
    /// taken gets a fresh one.
    pub fn insert_clone(&mut self, mut record: PolicyRecord) -> PolicyId {
        if self.policies.contains_key(&record.id) {
            let fresh = PolicyId::mint();
            warn!(target: "session", "cloned policy reuses id {}, using {}", &record.id, &fresh);
            record.id = fresh;
        }

        let id = record.id.clone();

        debug!(target: "session", "adding cloned policy {} ({})", &id, &record.name);

        self.form.bind(&record);
        self.policies.insert(id.clone(), record);

        id
    }

    /// Asks the backend for a copy of policy `id` and selects it
    pub async fn clone_policy<B: TemplateBackend>(
        &mut self,
        backend: &B,
        id: &PolicyId,
    ) -> EditorResult<PolicyId> {
        let source = self.get(id)?;

        let clone = backend
            .clone_policy(source)
            .await
            .map_err(|e| EditorError::external("clone policy", e))?;

        Ok(self.insert_clone(clone))
    }

    /// Removes policy `id`. If it was selected, the first remaining policy is selected instead.
    pub fn delete(&mut self, id: &PolicyId) -> EditorResult<PolicyRecord> {
        let removed = self
            .policies
            .shift_remove(id)
            .ok_or_else(|| EditorError::PolicyNotFound(id.clone()))?;

        debug!(target: "session", "deleted policy {}", id);

        if self.form.bound() == Some(id) {
            match self.policies.first() {
                Some((_, first)) => self.form.bind(first),
                None => self.form.unbind(),
            }
        }

        Ok(removed)
    }

    /// Commits one scalar field of policy `id`
    pub fn apply_field_edit(
        &mut self,
        id: &PolicyId,
        field: Field,
        value: &str,
    ) -> EditorResult<()> {
        let record = self
            .policies
            .get_mut(id)
            .ok_or_else(|| EditorError::PolicyNotFound(id.clone()))?;

        record.apply_field_edit(field, value)?;

        if self.form.bound() == Some(id) {
            self.form.refresh(record);
        }

        Ok(())
    }

    //
    // Form
    //

    /// Binds the form to policy `id`
    pub fn select(&mut self, id: &PolicyId) -> EditorResult<()> {
        let record = self
            .policies
            .get(id)
            .ok_or_else(|| EditorError::PolicyNotFound(id.clone()))?;

        self.form.bind(record);

        Ok(())
    }

    pub fn unbind(&mut self) {
        self.form.unbind();
    }

    /// Edits the form surface. Switching the action reaches the bound record right away.
    pub fn form_edit(&mut self, field: Field, value: &str) -> EditorResult<()> {
        let immediate = self.form.edit(field, value)?;

        if immediate {
            if let Some(id) = self.form.bound() {
                if let Some(record) = self.policies.get_mut(id) {
                    let action = Action::from_str(value).unwrap_or_default();
                    record.apply_field_edit(Field::Action, action.as_str())?;
                }
            }
        }

        Ok(())
    }

    /// Writes the form surface onto the bound policy
    pub fn commit(&mut self) -> EditorResult<()> {
        let id = self.form.bound().ok_or(EditorError::NoBoundRecord)?;
        let record = self
            .policies
            .get_mut(id)
            .ok_or_else(|| EditorError::PolicyNotFound(id.clone()))?;

        self.form.commit(record)
    }

    /// Empties the bound policy's lists and resets its profile switches, then re-renders the
    /// whole form
    pub fn reset_bound_record(&mut self) -> EditorResult<()> {
        let id = self.form.bound().ok_or(EditorError::NoBoundRecord)?;
        let record = self
            .policies
            .get_mut(id)
            .ok_or_else(|| EditorError::PolicyNotFound(id.clone()))?;

        debug!(target: "session", "resetting policy {}", &record.id);

        record.reset_selections();
        self.form.refresh(record);

        Ok(())
    }

    /// Runs a list operation on the bound policy and re-renders the form lists
    fn edit_bound<T>(
        &mut self,
        op: impl FnOnce(&mut PolicyRecord) -> EditorResult<T>,
    ) -> EditorResult<T> {
        let id = self.form.bound().ok_or(EditorError::NoBoundRecord)?;
        let record = self
            .policies
            .get_mut(id)
            .ok_or_else(|| EditorError::PolicyNotFound(id.clone()))?;

        let out = op(record)?;
        self.form.refresh_lists(record);

        Ok(out)
    }

    //
    // Lists of the bound policy
    //

    pub fn add_interface(&mut self, dir: Direction) -> EditorResult<usize> {
        self.edit_bound(|r| Ok(r.add_interface(dir)))
    }

    pub fn set_interface(&mut self, dir: Direction, index: usize, value: &str) -> EditorResult<()> {
        self.edit_bound(|r| r.set_interface(dir, index, value))
    }

    pub fn remove_interface(&mut self, dir: Direction, index: usize) -> EditorResult<String> {
        self.edit_bound(|r| r.remove_interface(dir, index))
    }

    /// Appends a blank address; returns its logical position
    pub fn add_address(&mut self, dir: Direction) -> EditorResult<usize> {
        self.edit_bound(|r| Ok(r.addresses_mut(dir).push_placeholder()))
    }

    pub fn set_address(
        &mut self,
        dir: Direction,
        position: usize,
        selection: Selection<AddressKind>,
    ) -> EditorResult<()> {
        self.edit_bound(|r| r.addresses_mut(dir).set_selection(position, selection))
    }

    pub fn remove_address(
        &mut self,
        dir: Direction,
        position: usize,
    ) -> EditorResult<Selection<AddressKind>> {
        self.edit_bound(|r| r.addresses_mut(dir).remove_at(position))
    }

    pub fn add_subject(&mut self) -> EditorResult<usize> {
        self.edit_bound(|r| Ok(r.subjects.push_placeholder()))
    }

    pub fn set_subject(
        &mut self,
        position: usize,
        selection: Selection<SubjectKind>,
    ) -> EditorResult<()> {
        self.edit_bound(|r| r.subjects.set_selection(position, selection))
    }

    pub fn remove_subject(&mut self, position: usize) -> EditorResult<Selection<SubjectKind>> {
        self.edit_bound(|r| r.subjects.remove_at(position))
    }

    pub fn add_service(&mut self) -> EditorResult<usize> {
        self.edit_bound(|r| Ok(r.add_service()))
    }

    pub fn set_service(&mut self, index: usize, service: ServiceSelection) -> EditorResult<()> {
        self.edit_bound(|r| r.set_service(index, service))
    }

    pub fn update_custom_service(
        &mut self,
        index: usize,
        field: CustomServiceField,
        value: &str,
    ) -> EditorResult<()> {
        self.edit_bound(|r| r.update_custom_service(index, field, value))
    }

    pub fn remove_service(&mut self, index: usize) -> EditorResult<ServiceSelection> {
        self.edit_bound(|r| r.remove_service(index))
    }

    //
    // Lifecycle
    //

    /// Starts a load; the catalog and the policies stay as they are until the response is
    /// applied with [Session::finish_load]
    pub fn begin_load(&mut self, template: Option<&str>) -> LoadTicket {
        self.load_seq += 1;
        self.in_flight += 1;
        self.state = SessionState::Loading;

        debug!(target: "session", "load #{} of {:?} started", self.load_seq, template);

        LoadTicket {
            seq: self.load_seq,
            template: template.map(|t| t.to_string()),
        }
    }

    /// Applies a load response. Returns false when the response was dropped as stale, which
    /// happens to failed responses too.
    ///
    /// On success the catalog and the policies are replaced as a whole and the first policy is
    /// selected; an empty template gets one blank policy. A failed load leaves everything as it
    /// was before [Session::begin_load].
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        response: anyhow::Result<TemplateData>,
    ) -> EditorResult<bool> {
        self.in_flight = self.in_flight.saturating_sub(1);

        if self.ordering == LoadOrdering::DropStale && ticket.seq != self.load_seq {
            debug!(target: "session",
                "dropping stale load #{}, latest is #{}", ticket.seq, self.load_seq);
            self.settle();
            return Ok(false);
        }

        let data = match response {
            Ok(data) => data,
            Err(e) => {
                warn!(target: "session", "load #{} failed: {:#}", ticket.seq, e);
                self.settle();
                return Err(EditorError::external("load template", e));
            }
        };

        debug!(target: "session",
            "load #{} applied: {} policies, {} catalog entries",
            ticket.seq, data.policies.len(), data.config.len());

        let mut policies: IndexMap<PolicyId, PolicyRecord> =
            IndexMap::with_capacity(data.policies.len());
        for mut p in data.policies {
            if policies.contains_key(&p.id) {
                let fresh = PolicyId::mint();
                warn!(target: "session", "duplicate policy id {} loaded as {}", &p.id, &fresh);
                p.id = fresh;
            }
            policies.insert(p.id.clone(), p);
        }

        self.form.unbind();
        self.catalog = data.config;
        self.policies = policies;
        self.template = ticket.template;
        self.loaded = true;

        match self.policies.first() {
            Some((_, first)) => self.form.bind(first),
            None => {
                self.create();
            }
        }

        self.settle();

        Ok(true)
    }

    fn settle(&mut self) {
        self.state = if self.in_flight > 0 {
            SessionState::Loading
        } else if self.loaded {
            SessionState::Ready
        } else {
            SessionState::Empty
        };
    }

    /// Loads the device catalog and starts with a single blank policy
    pub async fn load_blank<B: TemplateBackend>(&mut self, backend: &B) -> EditorResult<()> {
        let ticket = self.begin_load(None);

        let response = backend.load_catalog().await.map(|config| TemplateData {
            policies: vec![],
            config,
        });

        self.finish_load(ticket, response).map(|_| ())
    }

    /// Loads template `name`. Its catalog is merged with the device catalog; if the latter can't
    /// be fetched the template's catalog is used alone.
    pub async fn load_template<B: TemplateBackend>(
        &mut self,
        backend: &B,
        name: &str,
    ) -> EditorResult<()> {
        let ticket = self.begin_load(Some(name));

        let response = match backend.load_template(name).await {
            Ok(mut data) => {
                match backend.load_catalog().await {
                    Ok(defaults) => data.config = data.config.union(&defaults),
                    Err(e) => {
                        warn!(target: "session", "default catalog unavailable: {:#}", e)
                    }
                }
                Ok(data)
            }
            Err(e) => Err(e),
        };

        self.finish_load(ticket, response).map(|_| ())
    }

    /// Replaces the catalog and re-selects the first policy
    pub fn import_catalog(&mut self, catalog: CatalogStore) {
        debug!(target: "session", "importing catalog with {} entries", catalog.len());

        self.catalog = catalog;

        match self.policies.first() {
            Some((_, first)) => self.form.bind(first),
            None => self.form.unbind(),
        }
    }

    pub async fn save_template<B: TemplateBackend>(
        &mut self,
        backend: &B,
        name: &str,
    ) -> EditorResult<()> {
        if !valid_template_name(name) {
            return Err(EditorError::InvalidSelection(format!(
                "invalid template name '{}'",
                name
            )));
        }

        let policies: Vec<PolicyRecord> = self.policies.values().cloned().collect();

        backend
            .save_template(name, &policies, &self.catalog)
            .await
            .map_err(|e| EditorError::external("save template", e))?;

        debug!(target: "session", "saved {} policies as template {}", policies.len(), name);
        self.template = Some(name.to_string());

        Ok(())
    }

    /// Renames a stored template. Renaming the session's own template moves the session with it.
    pub async fn rename_template<B: TemplateBackend>(
        &mut self,
        backend: &B,
        old: &str,
        new: &str,
    ) -> EditorResult<()> {
        if !valid_template_name(new) {
            return Err(EditorError::InvalidSelection(format!(
                "invalid template name '{}'",
                new
            )));
        }

        backend
            .rename_template(old, new)
            .await
            .map_err(|e| EditorError::external("rename template", e))?;

        if self.template.as_deref() == Some(old) {
            debug!(target: "session", "session template renamed to {}", new);
            self.template = Some(new.to_string());
        }

        Ok(())
    }

    /// Deletes a stored template. The policies stay in the session, detached from any template.
    pub async fn delete_template<B: TemplateBackend>(
        &mut self,
        backend: &B,
        name: &str,
    ) -> EditorResult<()> {
        backend
            .delete_template(name)
            .await
            .map_err(|e| EditorError::external("delete template", e))?;

        if self.template.as_deref() == Some(name) {
            self.template = None;
        }

        Ok(())
    }

    /// Renders every policy of the session
    pub async fn generate<B: TemplateBackend>(
        &self,
        backend: &B,
    ) -> EditorResult<Vec<GeneratedPolicy>> {
        let policies: Vec<PolicyRecord> = self.policies.values().cloned().collect();

        backend
            .generate_policy_text(&policies)
            .await
            .map_err(|e| EditorError::external("generate policies", e))
    }
}
