//! Task reconciliation engine.
//!
//! `ChecklistEngine` is the single owner of the per-phase task sequences, the
//! cart of staged status changes, the commit gate and the admin edit mode.
//! Front ends read borrowed snapshots and request changes through its methods;
//! they never touch the sequences directly.
//!
//! Each phase sequence is the required template followed by the non-required
//! tasks stored in `tasks/{phase}`, followed by any tasks mirrored from the
//! external task API. Remote snapshots arrive on a channel and are folded in by
//! [`ChecklistEngine::sync`], so they interleave with user actions in whatever
//! order they happen to arrive.
//!
//! Remote writes never roll back local state. A failed write is reported as a
//! notice and the displayed state stays ahead of the stored one until the next
//! successful write.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::mpsc::{self, Receiver};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::asana::{TaskApi, TaskApiConfig, TaskSource};
use crate::config::Config;
use crate::error::{ChecklistError, Notice};
use crate::fields::{Phase, TaskStatus};
use crate::playback::Playback;
use crate::session::Session;
use crate::store::{DocumentChange, Fields, RemoteStore, SubscriptionId};
use crate::task::{Cart, PreStructuredTask, Task};
use crate::template::required_tasks;

const TASKS: &str = "tasks";
const ITEMS: &str = "items";

/// Result of staging a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// A cart entry was added.
    Staged,
    /// The same key was already staged and has been removed.
    Unstaged,
    /// The task is the music task; nothing was staged and the caller should
    /// offer playlist selection.
    OpenPlayback,
}

/// State of the passcode gate in front of `submit_cart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitGate {
    Idle,
    AwaitingPasscode,
    Committed,
    Rejected,
}

/// Merge the template with the tasks stored for a phase.
///
/// Stored tasks flagged as required are ignored, since required tasks only come
/// from the template. A stored task whose id is already present is dropped so
/// ids stay unique within the phase.
pub fn merge_phase(template: &[Task], stored: &[Task]) -> Vec<Task> {
    let mut seen: HashSet<&str> = template.iter().map(|t| t.id.as_str()).collect();
    let mut merged = template.to_vec();
    for task in stored.iter().filter(|t| !t.required) {
        if seen.insert(task.id.as_str()) {
            merged.push(task.clone());
        } else {
            warn!(id = %task.id, "dropping stored task with duplicate id");
        }
    }
    merged
}

/// Tasks listed in the `items` field of a phase document.
///
/// Missing documents and missing or non-array `items` give an empty list;
/// items that do not parse as tasks are skipped.
pub fn stored_items(fields: Option<&Fields>) -> Vec<Task> {
    let Some(items) = fields.and_then(|f| f.get(ITEMS)).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Task>(item.clone()) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(error = %e, "skipping malformed stored task");
                None
            }
        })
        .collect()
}

// Tasks mirrored from the external API are required and carry a remote id.
fn is_mirrored(task: &Task) -> bool {
    task.required && task.is_external()
}

fn is_template(task: &Task) -> bool {
    task.required && !task.is_external()
}

pub struct ChecklistEngine<S: RemoteStore> {
    store: S,
    config: Config,
    session: Session,
    tasks: BTreeMap<Phase, Vec<Task>>,
    cart: Cart,
    gate: CommitGate,
    edit_mode: bool,
    playback: Playback,
    pre_structured: Vec<PreStructuredTask>,
    task_api: Option<Box<dyn TaskApi>>,
    task_sources: Vec<(Phase, TaskSource)>,
    changes: Option<Receiver<DocumentChange>>,
    subscriptions: Vec<SubscriptionId>,
    notices: VecDeque<Notice>,
}

impl<S: RemoteStore> ChecklistEngine<S> {
    /// Create an engine showing the template only. Call [`attach`](Self::attach)
    /// to start following the stored phase documents.
    pub fn new(store: S, config: Config, session: Session) -> Self {
        let tasks = Phase::ALL.iter().map(|&p| (p, required_tasks(p))).collect();
        ChecklistEngine {
            store,
            config,
            session,
            tasks,
            cart: Cart::default(),
            gate: CommitGate::Idle,
            edit_mode: false,
            playback: Playback::default(),
            pre_structured: Vec::new(),
            task_api: None,
            task_sources: Vec::new(),
            changes: None,
            subscriptions: Vec::new(),
            notices: VecDeque::new(),
        }
    }

    /// Subscribe to the document of every phase.
    pub fn attach(&mut self) -> Result<(), ChecklistError> {
        self.detach();
        let (tx, rx) = mpsc::channel();
        self.changes = Some(rx);
        for phase in Phase::ALL {
            let subscription = self.store.subscribe(TASKS, phase.doc_id(), tx.clone())?;
            self.subscriptions.push(subscription);
        }
        debug!(count = self.subscriptions.len(), "attached to phase documents");
        Ok(())
    }

    /// Tear down every subscription. Pending snapshots are discarded.
    pub fn detach(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            self.store.unsubscribe(subscription);
        }
        self.changes = None;
    }

    /// Apply every snapshot received since the last call. Returns how many
    /// snapshots were applied.
    pub fn sync(&mut self) -> usize {
        let Some(rx) = &self.changes else {
            return 0;
        };
        let pending: Vec<DocumentChange> = rx.try_iter().collect();
        let mut applied = 0;
        for change in pending {
            if change.collection != TASKS {
                continue;
            }
            match change.id.parse::<Phase>() {
                Ok(phase) => {
                    self.apply_remote(phase, change.fields.as_ref());
                    applied += 1;
                }
                Err(e) => warn!(id = %change.id, error = %e, "ignoring snapshot for unknown phase"),
            }
        }
        applied
    }

    /// Recompute a phase from a stored snapshot.
    ///
    /// The in-memory template tasks stand in for the template, so progress
    /// committed on them in this session survives later snapshots. Mirrored
    /// external tasks are kept behind the merged sequence.
    pub fn apply_remote(&mut self, phase: Phase, fields: Option<&Fields>) {
        let current = self.tasks.remove(&phase).unwrap_or_else(|| required_tasks(phase));
        let template: Vec<Task> = current.iter().filter(|t| is_template(t)).cloned().collect();
        let mut merged = merge_phase(&template, &stored_items(fields));
        merged.extend(current.into_iter().filter(is_mirrored));
        debug!(%phase, tasks = merged.len(), "merged phase snapshot");
        self.tasks.insert(phase, merged);
    }

    // ---------------------------------------------------------------
    // Snapshots and derived queries
    // ---------------------------------------------------------------

    pub fn tasks(&self, phase: Phase) -> &[Task] {
        self.tasks.get(&phase).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn task(&self, phase: Phase, task_id: &str) -> Option<&Task> {
        self.tasks(phase).iter().find(|t| t.id == task_id)
    }

    fn task_mut(&mut self, phase: Phase, task_id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(&phase)?.iter_mut().find(|t| t.id == task_id)
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn gate(&self) -> CommitGate {
        self.gate
    }

    pub fn edit_mode(&self) -> bool {
        self.edit_mode
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    pub fn pre_structured(&self) -> &[PreStructuredTask] {
        &self.pre_structured
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable access to the store, for flows that write outside the engine.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Drain queued notices, oldest first.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    /// Percentage of done units in a phase. Each subtask is a unit; a task
    /// without subtasks is one unit.
    pub fn completion_percentage(&self, phase: Phase) -> f64 {
        let (total, done) = self
            .tasks(phase)
            .iter()
            .map(Task::completion_units)
            .fold((0, 0), |(total, done), (t, d)| (total + t, done + d));
        if total == 0 {
            0.0
        } else {
            done as f64 / total as f64 * 100.0
        }
    }

    /// True when every task is done or skipped. An empty phase counts as
    /// processed.
    pub fn is_fully_processed(&self, phase: Phase) -> bool {
        self.tasks(phase).iter().all(Task::is_processed)
    }

    // ---------------------------------------------------------------
    // Staging and committing
    // ---------------------------------------------------------------

    /// Stage a status change, or unstage it if the same key is already staged.
    ///
    /// Mirrored external tasks also get the new completion state pushed to
    /// the task API right away; a failed push is reported but does not stop
    /// the staging.
    pub fn stage(
        &mut self,
        phase: Phase,
        task_id: &str,
        sub_task_id: Option<&str>,
        status: TaskStatus,
    ) -> Result<StageOutcome, ChecklistError> {
        let unknown = || ChecklistError::UnknownTask {
            phase,
            task_id: match sub_task_id {
                Some(sub) => format!("{task_id}/{sub}"),
                None => task_id.to_string(),
            },
        };
        let task = self.task(phase, task_id).ok_or_else(unknown)?;
        if let Some(sub) = sub_task_id {
            if !task.sub_tasks.iter().flatten().any(|s| s.id == sub) {
                return Err(unknown());
            }
        }
        if self.config.is_playback_task(&task.id, &task.name) {
            debug!(task_id, "music task opens playback");
            return Ok(StageOutcome::OpenPlayback);
        }
        let external_ref = task.external_ref.clone();

        if let (Some(gid), Some(api)) = (external_ref, self.task_api.as_ref()) {
            if let Err(e) = api.set_completed(&gid, status == TaskStatus::Done) {
                warn!(gid = %gid, error = %e, "failed to push external task status");
                self.notices.push_back(Notice::error(format!("Failed to update task: {e}")));
            }
        }

        let outcome = if self.cart.toggle(phase, task_id, sub_task_id, status) {
            StageOutcome::Staged
        } else {
            StageOutcome::Unstaged
        };
        debug!(%phase, task_id, ?outcome, cart = self.cart.len(), "staged");
        Ok(outcome)
    }

    /// Open the passcode gate. Fails when there is nothing to submit.
    pub fn request_commit(&mut self) -> Result<(), ChecklistError> {
        if self.cart.is_empty() {
            return Err(ChecklistError::EmptyCart);
        }
        self.gate = CommitGate::AwaitingPasscode;
        Ok(())
    }

    pub fn cancel_commit(&mut self) {
        self.gate = CommitGate::Idle;
    }

    /// Return to idle after the outcome of a submission has been shown.
    pub fn acknowledge(&mut self) {
        if matches!(self.gate, CommitGate::Committed | CommitGate::Rejected) {
            self.gate = CommitGate::Idle;
        }
    }

    /// Commit every staged change under a shared passcode.
    ///
    /// With an accepted passcode every entry is applied, stamped with the
    /// passcode as `completed_by`, and the cart is emptied. Otherwise nothing
    /// changes. Returns the number of entries that matched a task.
    ///
    /// The gate only moves to `Committed` or `Rejected` from
    /// `AwaitingPasscode`; a direct submission leaves it where it was.
    pub fn submit_cart(&mut self, passcode: &str) -> Result<usize, ChecklistError> {
        let awaiting = self.gate == CommitGate::AwaitingPasscode;
        if !self.config.accepts_completion_code(passcode) {
            if awaiting {
                self.gate = CommitGate::Rejected;
            }
            warn!(staged = self.cart.len(), "rejected submission passcode");
            return Err(ChecklistError::InvalidPasscode);
        }

        let entries = self.cart.drain();
        let mut applied = 0;
        for entry in &entries {
            match self.task_mut(entry.phase, &entry.task_id) {
                Some(task) => {
                    if task.apply_status(entry.sub_task_id.as_deref(), entry.status, passcode) {
                        applied += 1;
                    }
                }
                None => debug!(task_id = %entry.task_id, "staged task no longer present"),
            }
        }
        if awaiting {
            self.gate = CommitGate::Committed;
        }
        info!(applied, staged = entries.len(), "submitted cart");
        self.notices
            .push_back(Notice::success("Success", "Tasks submitted successfully!"));
        Ok(applied)
    }

    // ---------------------------------------------------------------
    // Editing
    // ---------------------------------------------------------------

    /// Store the non-required tasks of a phase. Failure becomes a notice.
    fn persist_custom(&mut self, phase: Phase, failure: &str) {
        let items: Result<Vec<Value>, _> = self
            .tasks(phase)
            .iter()
            .filter(|t| !t.required)
            .map(serde_json::to_value)
            .collect();
        let result = items
            .map_err(ChecklistError::from)
            .and_then(|items| {
                let mut fields = Fields::new();
                fields.insert(ITEMS.to_string(), Value::Array(items));
                self.store
                    .update(TASKS, phase.doc_id(), fields)
                    .map_err(ChecklistError::from)
            });
        if let Err(e) = result {
            warn!(%phase, error = %e, "failed to persist tasks");
            self.notices.push_back(Notice::error(format!("{failure}: {e}")));
        }
    }

    /// Move a non-required task within the non-required part of the phase and
    /// store the new order.
    ///
    /// `to` indexes the full sequence and is clamped to the non-required part.
    /// Returns false, changing nothing, when `from` is out of range or names a
    /// required task.
    pub fn move_task(&mut self, phase: Phase, from: usize, to: usize) -> bool {
        let Some(tasks) = self.tasks.get_mut(&phase) else {
            return false;
        };
        match tasks.get(from) {
            Some(task) if !task.required => {}
            _ => {
                debug!(%phase, from, "refusing to move required or missing task");
                return false;
            }
        }

        let moving = tasks.remove(from);
        let slot = tasks[..to.min(tasks.len())].iter().filter(|t| !t.required).count();
        let mut custom: Vec<Task> = tasks.iter().filter(|t| !t.required).cloned().collect();
        custom.insert(slot, moving);

        let mut reordered: Vec<Task> = tasks.iter().filter(|t| is_template(t)).cloned().collect();
        reordered.extend(custom);
        reordered.extend(tasks.iter().filter(|t| is_mirrored(t)).cloned());
        *tasks = reordered;

        self.persist_custom(phase, "Failed to save task order");
        true
    }

    /// Enable edit mode with an admin code.
    ///
    /// Accepted codes are the `validCodes` of `settings/admin` plus the
    /// configured master code. The settings document must exist.
    pub fn enable_edit_mode(&mut self, code: &str) -> Result<(), ChecklistError> {
        let settings = self
            .store
            .get_by_id("settings", "admin")?
            .ok_or(ChecklistError::AdminConfigMissing)?;
        let listed = !code.is_empty()
            && settings
                .fields
                .get("validCodes")
                .and_then(Value::as_array)
                .is_some_and(|codes| codes.iter().any(|c| c.as_str() == Some(code)));
        if !listed && !self.config.is_master_code(code) {
            return Err(ChecklistError::InvalidAdminCode);
        }
        self.edit_mode = true;
        info!("edit mode enabled");
        self.notices.push_back(Notice::success("Success", "Edit mode enabled"));
        Ok(())
    }

    pub fn disable_edit_mode(&mut self) {
        self.edit_mode = false;
    }

    /// Change a task description while in edit mode.
    ///
    /// Only non-required tasks are written back to the store; template tasks
    /// keep the new description in memory for this session.
    pub fn edit_description(
        &mut self,
        phase: Phase,
        task_id: &str,
        description: &str,
    ) -> Result<(), ChecklistError> {
        if !self.edit_mode {
            return Err(ChecklistError::EditModeRequired);
        }
        let task = self.task_mut(phase, task_id).ok_or_else(|| ChecklistError::UnknownTask {
            phase,
            task_id: task_id.to_string(),
        })?;
        let description = description.trim();
        task.description = (!description.is_empty()).then(|| description.to_string());
        if task.required {
            debug!(task_id, "template description changed in memory only");
        } else {
            self.persist_custom(phase, "Failed to save description");
        }
        Ok(())
    }

    fn next_task_id(&self) -> String {
        let mut candidate = Utc::now().timestamp_millis();
        loop {
            let id = candidate.to_string();
            if !Phase::ALL.iter().any(|&p| self.task(p, &id).is_some()) {
                return id;
            }
            candidate += 1;
        }
    }

    /// Append a new custom task to a phase document. Admins only.
    ///
    /// The task shows up locally once the store echoes the document back
    /// through the subscription.
    pub fn add_task(&mut self, phase: Phase, name: &str) -> Result<String, ChecklistError> {
        if !self.session.is_admin() {
            return Err(ChecklistError::AdminRoleRequired);
        }
        if name.trim().is_empty() {
            return Err(ChecklistError::EmptyTaskName);
        }
        let id = self.next_task_id();
        let task = Task::custom(id.clone(), name, &self.config.locations);
        self.store
            .append_to_array_field(TASKS, phase.doc_id(), ITEMS, serde_json::to_value(&task)?)?;
        info!(%phase, id = %id, "added task");
        Ok(id)
    }

    /// Load the task suggestions of the session location.
    pub fn load_pre_structured(&mut self) -> Result<usize, ChecklistError> {
        let doc = self.store.get_by_id("pre_structured_tasks", &self.session.location)?;
        self.pre_structured = doc
            .and_then(|d| d.fields.get("tasks").and_then(Value::as_array).cloned())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        Ok(self.pre_structured.len())
    }

    /// Add the suggestion at `index` to a phase.
    pub fn add_pre_structured(&mut self, phase: Phase, index: usize) -> Result<String, ChecklistError> {
        let name = self
            .pre_structured
            .get(index)
            .map(|p| p.name.clone())
            .ok_or(ChecklistError::UnknownPreset(index))?;
        self.add_task(phase, &name)
    }

    // ---------------------------------------------------------------
    // External tasks and playback
    // ---------------------------------------------------------------

    /// Use `api` for mirrored tasks of the phases configured in `config`.
    pub fn connect_task_api(&mut self, api: Box<dyn TaskApi>, config: &TaskApiConfig) {
        self.task_api = Some(api);
        self.task_sources = config.sources();
    }

    /// Fetch the external tasks of every configured phase and mirror them.
    ///
    /// All phases are fetched before anything is merged, so a failure leaves
    /// the sequences untouched. Returns the number of tasks mirrored.
    pub fn load_external_tasks(&mut self) -> Result<usize, ChecklistError> {
        let Some(api) = &self.task_api else {
            return Ok(0);
        };
        let mut fetched = Vec::with_capacity(self.task_sources.len());
        for (phase, source) in &self.task_sources {
            fetched.push((*phase, api.fetch_tasks(source)?));
        }

        let mut mirrored = 0;
        for (phase, external) in fetched {
            let tasks = self.tasks.entry(phase).or_default();
            tasks.retain(|t| !is_mirrored(t));
            for item in external {
                let task = item.into_task(&self.session.location);
                if tasks.iter().any(|t| t.id == task.id) {
                    continue;
                }
                tasks.push(task);
                mirrored += 1;
            }
        }
        info!(mirrored, "loaded external tasks");
        Ok(mirrored)
    }

    /// Start the playlist at `index` of the configured playlists.
    pub fn select_playlist(&mut self, index: usize) -> bool {
        let Some(playlist) = self.config.playlists.get(index) else {
            return false;
        };
        let notice = self.playback.select(playlist);
        self.notices.push_back(notice);
        true
    }

    pub fn stop_playback(&mut self) {
        let notice = self.playback.stop();
        self.notices.push_back(notice);
    }
}

impl<S: RemoteStore> Drop for ChecklistEngine<S> {
    fn drop(&mut self) {
        self.detach();
    }
}
