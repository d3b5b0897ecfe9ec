//! Per-resource controller: the list, the one active overlay (form, pending
//! confirmation or import) and the rules for applying server results.
//!
//! The controller never talks to the network itself. `submit` hands back a
//! [`Submission`] for the caller to run, and the outcome is fed back through
//! `finish_mutation` / `finish_list`.

use time::OffsetDateTime;
use tracing::debug;

use crate::error::ApiError;
use crate::model::{
    FormDraft, Listing, MutationOp, Notice, PendingAction, PendingKind, Record, RecordId,
};
use crate::resource::{ActionSpec, ResourceSpec};

#[derive(Debug, Clone)]
pub enum ControllerState {
    Idle,
    Adding(FormDraft),
    Editing { id: RecordId, draft: FormDraft },
    Confirming(PendingAction),
    Importing(String),
}

/// Work the caller must run against the API.
#[derive(Debug, Clone)]
pub enum Submission {
    Create(FormDraft),
    Update { id: RecordId, draft: FormDraft },
    Remove(RecordId),
    Perform { id: RecordId, action: &'static ActionSpec },
    Import(String),
}

impl Submission {
    pub fn op(&self) -> MutationOp {
        match self {
            Submission::Create(_) => MutationOp::Create,
            Submission::Update { .. } => MutationOp::Update,
            Submission::Remove(_) => MutationOp::Remove,
            Submission::Perform { action, .. } => MutationOp::Perform(action),
            Submission::Import(_) => MutationOp::Import,
        }
    }
}

pub struct ResourceController {
    spec: &'static ResourceSpec,
    records: Vec<Record>,
    state: ControllerState,
    submitting: bool,
    loading: bool,
    loaded: bool,
    stale: bool,
    empty_message: Option<String>,
    generation: u64,
    refreshed_at: Option<OffsetDateTime>,
}

impl ResourceController {
    pub fn new(spec: &'static ResourceSpec) -> Self {
        Self {
            spec,
            records: Vec::new(),
            state: ControllerState::Idle,
            submitting: false,
            loading: false,
            loaded: false,
            stale: false,
            empty_message: None,
            generation: 0,
            refreshed_at: None,
        }
    }

    pub fn spec(&self) -> &'static ResourceSpec {
        self.spec
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record(&self, id: &RecordId) -> Option<&Record> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, ControllerState::Idle)
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Last refresh failed; the records shown are from an earlier response.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn empty_message(&self) -> Option<&str> {
        self.empty_message.as_deref()
    }

    pub fn refreshed_at(&self) -> Option<OffsetDateTime> {
        self.refreshed_at
    }

    pub fn open_add(&mut self) -> bool {
        if !self.is_idle() || !self.spec.capabilities.create {
            return false;
        }
        self.state = ControllerState::Adding(FormDraft::empty(self.spec));
        true
    }

    pub fn open_edit(&mut self, id: &RecordId) -> bool {
        if !self.is_idle() || !self.spec.capabilities.update {
            return false;
        }
        let Some(record) = self.record(id) else {
            return false;
        };
        let draft = FormDraft::from_record(self.spec, record);
        self.state = ControllerState::Editing {
            id: id.clone(),
            draft,
        };
        true
    }

    pub fn request_delete(&mut self, id: &RecordId) -> bool {
        if !self.spec.capabilities.delete {
            return false;
        }
        self.stage(id, PendingKind::Delete)
    }

    pub fn request_action(&mut self, id: &RecordId, key: char) -> bool {
        match self.spec.action(key) {
            Some(action) => self.stage(id, PendingKind::Action(action)),
            None => false,
        }
    }

    pub fn open_import(&mut self) -> bool {
        if !self.is_idle() || self.spec.capabilities.import_path.is_none() {
            return false;
        }
        self.state = ControllerState::Importing(String::new());
        true
    }

    fn stage(&mut self, id: &RecordId, kind: PendingKind) -> bool {
        if !self.is_idle() {
            return false;
        }
        let Some(record) = self.record(id) else {
            return false;
        };
        let label = self
            .spec
            .columns
            .first()
            .map(|c| record.display(c.path))
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| format!("#{}", id));
        self.state = ControllerState::Confirming(PendingAction {
            id: id.clone(),
            label,
            kind,
        });
        true
    }

    /// Drop the active draft, pending action or import and return to idle.
    pub fn cancel(&mut self) -> bool {
        if self.is_idle() {
            return false;
        }
        self.state = ControllerState::Idle;
        self.submitting = false;
        true
    }

    /// Leaving the page: in-flight work is abandoned and any overlay is dropped.
    pub fn abandon(&mut self) {
        self.state = ControllerState::Idle;
        self.submitting = false;
        self.loading = false;
    }

    pub fn draft_mut(&mut self) -> Option<&mut FormDraft> {
        match &mut self.state {
            ControllerState::Adding(draft) | ControllerState::Editing { draft, .. } => Some(draft),
            _ => None,
        }
    }

    pub fn import_path_mut(&mut self) -> Option<&mut String> {
        match &mut self.state {
            ControllerState::Importing(path) => Some(path),
            _ => None,
        }
    }

    /// Submit the form, confirm the pending action or start the import.
    /// `Err` is a client-side validation failure: nothing may be sent.
    pub fn submit(&mut self) -> Result<Option<Submission>, ApiError> {
        if self.submitting {
            return Ok(None);
        }
        let submission = match &self.state {
            ControllerState::Idle => return Ok(None),
            ControllerState::Adding(draft) => {
                draft.check_required()?;
                Submission::Create(draft.clone())
            }
            ControllerState::Editing { id, draft } => {
                draft.check_required()?;
                Submission::Update {
                    id: id.clone(),
                    draft: draft.clone(),
                }
            }
            ControllerState::Confirming(pending) => match pending.kind {
                PendingKind::Delete => Submission::Remove(pending.id.clone()),
                PendingKind::Action(action) => Submission::Perform {
                    id: pending.id.clone(),
                    action,
                },
            },
            ControllerState::Importing(path) => {
                if path.trim().is_empty() {
                    return Err(ApiError::required("file", "File"));
                }
                Submission::Import(path.trim().to_string())
            }
        };
        self.submitting = true;
        Ok(Some(submission))
    }

    /// Apply a mutation result. Returns the notice to show and whether the
    /// list must be refetched.
    pub fn finish_mutation(
        &mut self,
        op: MutationOp,
        result: Result<Option<String>, ApiError>,
    ) -> (Notice, bool) {
        self.submitting = false;
        match result {
            Ok(server_message) => {
                self.state = ControllerState::Idle;
                let text = server_message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| self.success_text(op));
                (Notice::success(text), true)
            }
            Err(e) => {
                // forms and imports stay open with their input; confirmations close
                if matches!(self.state, ControllerState::Confirming(_)) {
                    self.state = ControllerState::Idle;
                }
                if let (ApiError::Validation { field: Some(name), .. }, Some(draft)) =
                    (&e, self.draft_mut())
                {
                    draft.focus_field(name);
                }
                (Notice::from(&e), false)
            }
        }
    }

    fn success_text(&self, op: MutationOp) -> String {
        let what = self.spec.singular;
        match op {
            MutationOp::Create => format!("{} created.", what),
            MutationOp::Update => format!("{} updated.", what),
            MutationOp::Remove => format!("{} deleted.", what),
            MutationOp::Perform(action) => format!("{} {}.", what, action.past),
            MutationOp::Import => format!("{} imported.", self.spec.title),
        }
    }

    /// Start a refresh; the returned generation tags its response.
    pub fn begin_list(&mut self) -> u64 {
        self.generation += 1;
        self.loading = true;
        self.generation
    }

    /// Apply a list response. Responses older than the latest `begin_list`
    /// are dropped. A failure keeps the previous records.
    pub fn finish_list(
        &mut self,
        generation: u64,
        result: Result<Listing, ApiError>,
    ) -> Option<Notice> {
        if generation != self.generation {
            debug!(
                "Dropping stale {} list (generation {} < {})",
                self.spec.title, generation, self.generation
            );
            return None;
        }
        self.loading = false;
        match result {
            Ok(listing) => {
                self.empty_message = if listing.records.is_empty() {
                    listing.message
                } else {
                    None
                };
                self.records = listing.records;
                self.loaded = true;
                self.stale = false;
                self.refreshed_at = Some(OffsetDateTime::now_utc());
                None
            }
            Err(e) => {
                self.stale = true;
                Some(Notice::from(&e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NoticeLevel;
    use crate::resource::{APPROVALS, COLLEGES, STUDENT_INFO, STUDENTS};
    use serde_json::json;

    fn colleges(items: serde_json::Value) -> Listing {
        let records = serde_json::from_value(items).unwrap();
        Listing {
            records,
            message: None,
        }
    }

    fn loaded() -> ResourceController {
        let mut c = ResourceController::new(&COLLEGES);
        let generation = c.begin_list();
        c.finish_list(
            generation,
            Ok(colleges(json!([
                {"id": 1, "name": "Engineering College", "university_id": 101},
                {"id": 7, "name": "Business College", "university_id": 102}
            ]))),
        );
        c
    }

    #[test]
    fn test_add_submit_ok_returns_to_idle_and_refetches() {
        let mut c = loaded();
        assert!(c.open_add());
        let draft = c.draft_mut().unwrap();
        draft.set("name", "Engineering College");
        draft.set("university_id", "101");

        let submission = c.submit().unwrap().unwrap();
        assert!(matches!(submission, Submission::Create(_)));
        assert!(c.is_submitting());
        // a second Enter while in flight is ignored
        assert!(c.submit().unwrap().is_none());

        let (notice, refetch) = c.finish_mutation(MutationOp::Create, Ok(None));
        assert!(refetch);
        assert_eq!(notice.level, NoticeLevel::Success);
        assert_eq!(notice.text, "College created.");
        assert!(c.is_idle());
    }

    #[test]
    fn test_failed_submit_keeps_form_and_draft() {
        let mut c = loaded();
        c.open_add();
        c.draft_mut().unwrap().set("name", "Dup");
        c.draft_mut().unwrap().set("university_id", "101");
        c.draft_mut().unwrap().focus_next();
        c.submit().unwrap();

        let err = ApiError::Validation {
            field: Some("name".into()),
            message: "The name has already been taken.".into(),
            fields: vec![("name".into(), vec!["The name has already been taken.".into()])],
        };
        let (notice, refetch) = c.finish_mutation(MutationOp::Create, Err(err));
        assert!(!refetch);
        assert_eq!(notice.text, "The name has already been taken.");
        match c.state() {
            ControllerState::Adding(draft) => {
                assert_eq!(draft.value("name"), Some("Dup"));
                assert_eq!(draft.focus(), 0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(c.records().len(), 2);
    }

    #[test]
    fn test_required_field_blocks_submission() {
        let mut c = loaded();
        c.open_add();
        c.draft_mut().unwrap().set("university_id", "101");
        let err = c.submit().unwrap_err();
        assert_eq!(err.user_message(), "College Name is required.");
        assert!(!c.is_submitting());
        assert!(matches!(c.state(), ControllerState::Adding(_)));
    }

    #[test]
    fn test_overlays_are_mutually_exclusive() {
        let mut c = loaded();
        let id = RecordId::from("1");
        assert!(c.open_add());
        assert!(!c.open_edit(&id));
        assert!(!c.request_delete(&id));
        assert!(c.cancel());
        assert!(c.open_edit(&id));
        assert!(!c.open_add());
        assert!(c.cancel());
        assert!(c.request_delete(&id));
        assert!(!c.open_add());
        assert!(!c.open_edit(&id));
        assert!(c.cancel());
        assert!(c.is_idle());
        assert!(!c.cancel());
    }

    #[test]
    fn test_edit_draft_never_leaks_into_list() {
        let mut c = loaded();
        let id = RecordId::from("7");
        c.open_edit(&id);
        c.draft_mut().unwrap().set("name", "Renamed");
        assert_eq!(c.record(&id).unwrap().display("name"), "Business College");
        c.cancel();
        assert_eq!(c.record(&id).unwrap().display("name"), "Business College");
    }

    #[test]
    fn test_delete_confirmation_flow() {
        let mut c = loaded();
        let id = RecordId::from("7");
        assert!(c.request_delete(&id));
        match c.state() {
            ControllerState::Confirming(p) => {
                assert_eq!(p.kind, PendingKind::Delete);
                assert_eq!(p.label, "Business College");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(c.submit().unwrap(), Some(Submission::Remove(r)) if r == id));

        let (notice, refetch) = c.finish_mutation(
            MutationOp::Remove,
            Err(ApiError::Forbidden("Cannot delete: college has active departments".into())),
        );
        assert!(!refetch);
        assert_eq!(notice.text, "Cannot delete: college has active departments");
        assert!(c.is_idle());
        assert!(c.record(&id).is_some());
    }

    #[test]
    fn test_unknown_record_cannot_be_staged() {
        let mut c = loaded();
        assert!(!c.request_delete(&RecordId::from("999")));
        assert!(!c.open_edit(&RecordId::from("999")));
        assert!(c.is_idle());
    }

    #[test]
    fn test_failed_refresh_preserves_records() {
        let mut c = loaded();
        let generation = c.begin_list();
        let notice = c
            .finish_list(generation, Err(ApiError::Network("refused".into())))
            .unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(c.records().len(), 2);
        assert!(c.is_stale());
        assert!(!c.is_loading());
    }

    #[test]
    fn test_empty_success_is_informational() {
        let mut c = ResourceController::new(&COLLEGES);
        let generation = c.begin_list();
        let notice = c.finish_list(
            generation,
            Ok(Listing {
                records: Vec::new(),
                message: Some("No colleges found".into()),
            }),
        );
        assert!(notice.is_none());
        assert!(c.is_loaded());
        assert_eq!(c.empty_message(), Some("No colleges found"));
    }

    #[test]
    fn test_stale_generation_is_dropped() {
        let mut c = ResourceController::new(&COLLEGES);
        let first = c.begin_list();
        let second = c.begin_list();
        c.finish_list(second, Ok(colleges(json!([{"id": 1, "name": "New"}]))));
        let dropped = c.finish_list(first, Ok(colleges(json!([{"id": 2, "name": "Old"}]))));
        assert!(dropped.is_none());
        assert_eq!(c.records()[0].display("name"), "New");
    }

    #[test]
    fn test_list_twice_yields_same_records() {
        let mut c = loaded();
        let before: Vec<_> = c.records().iter().map(|r| r.id.clone()).collect();
        let generation = c.begin_list();
        c.finish_list(
            generation,
            Ok(colleges(json!([
                {"id": 7, "name": "Business College", "university_id": 102},
                {"id": 1, "name": "Engineering College", "university_id": 101}
            ]))),
        );
        let mut after: Vec<_> = c.records().iter().map(|r| r.id.clone()).collect();
        let mut before = before;
        before.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        after.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(before, after);
    }

    #[test]
    fn test_actions_require_confirmation() {
        let mut c = ResourceController::new(&APPROVALS);
        let generation = c.begin_list();
        c.finish_list(
            generation,
            Ok(Listing {
                records: serde_json::from_value(json!([
                    {"id": 2, "file": "iot-project.pdf", "groupNumber": "G-102", "projectName": "IoT Monitoring Platform"}
                ]))
                .unwrap(),
                message: None,
            }),
        );
        let id = RecordId::from("2");
        assert!(!c.open_add());
        assert!(!c.request_delete(&id));
        assert!(!c.request_action(&id, 'z'));
        assert!(c.request_action(&id, 'p'));
        let Some(Submission::Perform { action, .. }) = c.submit().unwrap() else {
            panic!("expected a perform submission");
        };
        assert_eq!(action.label, "Approve");
        let (notice, refetch) = c.finish_mutation(MutationOp::Perform(action), Ok(None));
        assert!(refetch);
        assert_eq!(notice.text, "Approval approved.");
    }

    #[test]
    fn test_import_needs_a_file() {
        let mut c = ResourceController::new(&STUDENTS);
        assert!(c.open_import());
        assert!(c.submit().is_err());
        c.import_path_mut().unwrap().push_str("students.xlsx");
        assert!(matches!(c.submit().unwrap(), Some(Submission::Import(p)) if p == "students.xlsx"));

        let mut read_only = ResourceController::new(&STUDENT_INFO);
        assert!(!read_only.open_import());
        assert!(!read_only.open_add());
    }

    #[test]
    fn test_server_message_preferred_on_success() {
        let mut c = loaded();
        c.request_delete(&RecordId::from("1"));
        c.submit().unwrap();
        let (notice, _) =
            c.finish_mutation(MutationOp::Remove, Ok(Some("College removed".into())));
        assert_eq!(notice.text, "College removed");
    }
}
