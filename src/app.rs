use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use clipboard::{ClipboardContext, ClipboardProvider};
use crossterm::event::KeyCode;
use futures::future::join_all;
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use ratatui::widgets::{ListState, TableState};
use throbber_widgets_tui::ThrobberState;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::controller::{ControllerState, ResourceController, Submission};
use crate::model::{AppEvent, AppScreen, Notice, Record};
use crate::resource::{FilterSpec, ResourceKind, Role};

pub struct App {
    pub screen: AppScreen,
    pub role: Role,
    pub client: Arc<ApiClient>,
    pub controllers: HashMap<ResourceKind, ResourceController>,
    pub current: Option<ResourceKind>,
    pub menu_state: ListState,
    pub table_state: TableState,
    pub selected: usize,
    /// Indices into the current controller's records, after search.
    pub displayed: Vec<usize>,
    pub search_mode: bool,
    pub search_query: String,
    /// Active value per column filter of the current resource.
    pub filters: Vec<Option<String>>,
    pub throbber_state: ThrobberState,
    pub message: Option<Notice>,
    pub welcome_shown_at: Instant,
    inflight: Vec<JoinHandle<()>>,
}

impl App {
    pub fn new(role: Role, client: Arc<ApiClient>) -> Self {
        let controllers = role
            .resources()
            .iter()
            .map(|kind| (*kind, ResourceController::new(kind.spec())))
            .collect();
        let mut menu_state = ListState::default();
        menu_state.select(Some(0));
        Self {
            screen: AppScreen::Welcome,
            role,
            client,
            controllers,
            current: None,
            menu_state,
            table_state: TableState::default(),
            selected: 0,
            displayed: Vec::new(),
            search_mode: false,
            search_query: String::new(),
            filters: Vec::new(),
            throbber_state: ThrobberState::default(),
            message: None,
            welcome_shown_at: Instant::now(),
            inflight: Vec::new(),
        }
    }

    pub fn controller(&self) -> Option<&ResourceController> {
        self.current.and_then(|k| self.controllers.get(&k))
    }

    fn controller_mut(&mut self) -> Option<&mut ResourceController> {
        let kind = self.current?;
        self.controllers.get_mut(&kind)
    }

    /// Spinner condition.
    pub fn busy(&self) -> bool {
        match self.controller() {
            Some(c) => c.is_loading() || c.is_submitting(),
            None => self.controllers.values().any(ResourceController::is_loading),
        }
    }

    pub fn selected_record(&self) -> Option<&Record> {
        let c = self.controller()?;
        let idx = *self.displayed.get(self.selected)?;
        c.records().get(idx)
    }

    /// Mount a records screen and fetch its list.
    pub fn open_resource(&mut self, kind: ResourceKind, tx: &UnboundedSender<AppEvent>) {
        self.leave_current();
        self.current = Some(kind);
        self.screen = AppScreen::Records;
        self.search_mode = false;
        self.search_query.clear();
        self.filters = vec![None; kind.spec().filters.len()];
        self.apply_search();
        self.spawn_list(kind, tx);
    }

    pub fn back_to_menu(&mut self) {
        self.leave_current();
        self.current = None;
        self.screen = AppScreen::Menu;
        self.search_mode = false;
        self.search_query.clear();
        self.filters.clear();
    }

    /// Abandon, without awaiting, whatever the current page still has in flight.
    fn leave_current(&mut self) {
        for handle in self.inflight.drain(..) {
            handle.abort();
        }
        if let Some(c) = self.controller_mut() {
            c.abandon();
        }
    }

    pub fn spawn_list(&mut self, kind: ResourceKind, tx: &UnboundedSender<AppEvent>) {
        let Some(controller) = self.controllers.get_mut(&kind) else {
            return;
        };
        let generation = controller.begin_list();
        let spec = kind.spec();
        let client = self.client.clone();
        let tx2 = tx.clone();
        debug!("Listing {} (generation {})", spec.title, generation);
        let handle = tokio::spawn(async move {
            let result = client.list(spec).await;
            let _ = tx2.send(AppEvent::ListLoaded {
                kind,
                generation,
                result,
            });
        });
        self.track(kind, handle);
    }

    /// Background refresh of every resource of the role, bounded to a few
    /// concurrent requests; fills the menu counts.
    pub fn preload_all(&mut self, tx: &UnboundedSender<AppEvent>, sem: Arc<Semaphore>) {
        let mut jobs = Vec::new();
        for kind in self.role.resources() {
            if let Some(c) = self.controllers.get_mut(kind) {
                jobs.push((*kind, c.begin_list()));
            }
        }
        let client = self.client.clone();
        let tx = tx.clone();
        info!("Preloading {} resources", jobs.len());
        tokio::spawn(async move {
            let tasks = jobs.into_iter().map(|(kind, generation)| {
                let client = client.clone();
                let tx = tx.clone();
                let sem = sem.clone();
                async move {
                    let Ok(_permit) = sem.acquire_owned().await else {
                        return;
                    };
                    let result = client.list(kind.spec()).await;
                    let _ = tx.send(AppEvent::ListLoaded {
                        kind,
                        generation,
                        result,
                    });
                }
            });
            join_all(tasks).await;
            debug!("Preload finished");
        });
    }

    fn spawn_submission(
        &mut self,
        kind: ResourceKind,
        submission: Submission,
        tx: &UnboundedSender<AppEvent>,
    ) {
        let spec = kind.spec();
        let client = self.client.clone();
        let tx2 = tx.clone();
        let op = submission.op();
        let handle = tokio::spawn(async move {
            let result = match &submission {
                Submission::Create(draft) => client.create(spec, draft).await,
                Submission::Update { id, draft } => client.update(spec, id, draft).await,
                Submission::Remove(id) => client.remove(spec, id).await,
                Submission::Perform { id, action } => client.perform(action, id).await,
                Submission::Import(file) => client.import(spec, file).await,
            };
            let _ = tx2.send(AppEvent::Mutated { kind, op, result });
        });
        self.track(kind, handle);
    }

    fn track(&mut self, kind: ResourceKind, handle: JoinHandle<()>) {
        self.inflight.retain(|h| !h.is_finished());
        if self.current == Some(kind) {
            self.inflight.push(handle);
        }
    }

    /// Submit whatever overlay the current controller has open.
    pub fn submit(&mut self, tx: &UnboundedSender<AppEvent>) {
        let Some(kind) = self.current else {
            return;
        };
        let Some(controller) = self.controllers.get_mut(&kind) else {
            return;
        };
        match controller.submit() {
            Ok(Some(submission)) => {
                self.message = Some(Notice::info("Saving..."));
                self.spawn_submission(kind, submission, tx);
            }
            Ok(None) => {}
            Err(e) => self.message = Some(Notice::from(&e)),
        }
    }

    /// Route a background result to its controller. A successful mutation
    /// triggers the refetch here, after its response has been applied.
    pub fn handle_event(&mut self, ev: AppEvent, tx: &UnboundedSender<AppEvent>) {
        match ev {
            AppEvent::ListLoaded {
                kind,
                generation,
                result,
            } => {
                let Some(controller) = self.controllers.get_mut(&kind) else {
                    return;
                };
                let notice = controller.finish_list(generation, result);
                if self.current == Some(kind) {
                    self.apply_search();
                }
                if self.current == Some(kind) || self.current.is_none() {
                    if let Some(notice) = notice {
                        self.message = Some(notice);
                    }
                }
            }
            AppEvent::Mutated { kind, op, result } => {
                let Some(controller) = self.controllers.get_mut(&kind) else {
                    return;
                };
                let (notice, refetch) = controller.finish_mutation(op, result);
                if self.current == Some(kind) {
                    self.message = Some(notice);
                }
                if refetch {
                    self.spawn_list(kind, tx);
                }
            }
        }
    }

    /// Narrow the rows of the current resource by the active column filters,
    /// then fuzzy-match them into `displayed`.
    pub fn apply_search(&mut self) {
        let Some(c) = self.controller() else {
            self.displayed.clear();
            return;
        };
        let spec = c.spec();
        let columns = spec.columns;
        let candidates = c.records().iter().enumerate().filter(|(_, r)| {
            spec.filters
                .iter()
                .zip(&self.filters)
                .all(|(filter, wanted)| match wanted {
                    Some(wanted) => filter_value(filter, r) == *wanted,
                    None => true,
                })
        });
        let displayed = if self.search_query.is_empty() {
            candidates.map(|(i, _)| i).collect()
        } else {
            let matcher = SkimMatcherV2::default();
            let mut results: Vec<(i64, usize)> = candidates
                .filter_map(|(i, r)| {
                    let row = columns
                        .iter()
                        .map(|col| r.display(col.path))
                        .collect::<Vec<_>>()
                        .join(" ");
                    matcher
                        .fuzzy_match(&row, &self.search_query)
                        .map(|score| (score, i))
                })
                .collect();
            results.sort_by(|a, b| b.0.cmp(&a.0));
            results.into_iter().map(|(_, i)| i).collect()
        };
        self.displayed = displayed;
        if self.selected >= self.displayed.len() {
            self.selected = self.displayed.len().saturating_sub(1);
        }
        self.table_state.select(if self.displayed.is_empty() {
            None
        } else {
            Some(self.selected)
        });
    }

    /// Step a column filter to its next value, wrapping back to "all".
    fn cycle_filter(&mut self, idx: usize) {
        let Some(c) = self.controller() else {
            return;
        };
        let spec = c.spec();
        let Some(filter) = spec.filters.get(idx) else {
            return;
        };
        let mut values: Vec<String> = c
            .records()
            .iter()
            .map(|r| filter_value(filter, r))
            .filter(|v| !v.is_empty())
            .collect();
        values.sort();
        values.dedup();

        self.filters.resize(spec.filters.len(), None);
        let next = match &self.filters[idx] {
            None => values.first().cloned(),
            Some(current) => values
                .iter()
                .position(|v| v == current)
                .and_then(|i| values.get(i + 1))
                .cloned(),
        };
        self.message = Some(Notice::info(match &next {
            Some(v) => format!("{}: {}", filter.title, v),
            None => format!("{}: all", filter.title),
        }));
        self.filters[idx] = next;
        self.selected = 0;
        self.apply_search();
    }

    fn copy_selected(&mut self) {
        let Some(column) = self.controller().and_then(|c| c.spec().copy_column) else {
            return;
        };
        let Some(value) = self
            .selected_record()
            .map(|r| r.display(column))
            .filter(|v| !v.is_empty())
        else {
            self.message = Some(Notice::info("Nothing to copy"));
            return;
        };
        let ctx: Result<ClipboardContext, _> = ClipboardProvider::new();
        match ctx {
            Ok(mut ctx) => {
                if ctx.set_contents(value.clone()).is_ok() {
                    self.message = Some(Notice::success(format!("Copied '{}' to clipboard", value)));
                } else {
                    self.message = Some(Notice::error("Clipboard error"));
                }
            }
            Err(e) => {
                self.message = Some(Notice::error(format!("Clipboard init error: {}", e)));
            }
        }
    }

    /// Handle one key press. Returns `true` when the user asked to quit.
    pub fn handle_key(&mut self, code: KeyCode, tx: &UnboundedSender<AppEvent>) -> bool {
        if self.screen == AppScreen::Welcome {
            self.screen = AppScreen::Menu;
            return false;
        }
        if self.controller().is_some_and(|c| !c.is_idle()) {
            handle_modal_key(self, code, tx);
            return false;
        }
        if self.search_mode {
            match code {
                KeyCode::Esc => {
                    self.search_mode = false;
                    self.search_query.clear();
                    self.apply_search();
                }
                KeyCode::Enter => self.search_mode = false,
                KeyCode::Backspace => {
                    self.search_query.pop();
                    self.apply_search();
                }
                KeyCode::Char(c) => {
                    self.search_query.push(c);
                    self.apply_search();
                }
                _ => {}
            }
            return false;
        }
        if code == KeyCode::Char('q') {
            return true;
        }

        match self.screen {
            AppScreen::Welcome => false,
            AppScreen::Menu => self.handle_menu_key(code, tx),
            AppScreen::Records => {
                self.handle_records_key(code, tx);
                false
            }
        }
    }

    fn handle_menu_key(&mut self, code: KeyCode, tx: &UnboundedSender<AppEvent>) -> bool {
        let items = self.role.resources();
        let selected = self.menu_state.selected().unwrap_or(0);
        match code {
            KeyCode::Esc => return true,
            KeyCode::Down | KeyCode::Char('j') => {
                if !items.is_empty() {
                    self.menu_state.select(Some((selected + 1).min(items.len() - 1)));
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.menu_state.select(Some(selected.saturating_sub(1)));
            }
            KeyCode::Enter => {
                if let Some(kind) = items.get(selected) {
                    self.open_resource(*kind, tx);
                }
            }
            KeyCode::Char('r') => {
                self.message = Some(Notice::info("Refreshing..."));
                self.preload_all(tx, Arc::new(Semaphore::new(4)));
            }
            _ => {}
        }
        false
    }

    fn handle_records_key(&mut self, code: KeyCode, tx: &UnboundedSender<AppEvent>) {
        let Some(kind) = self.current else {
            return;
        };
        let selected_id = self.selected_record().map(|r| r.id.clone());
        match code {
            KeyCode::Esc | KeyCode::Char('m') => self.back_to_menu(),
            KeyCode::Down | KeyCode::Char('j') => {
                if !self.displayed.is_empty() {
                    self.selected = (self.selected + 1).min(self.displayed.len() - 1);
                    self.table_state.select(Some(self.selected));
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                if !self.displayed.is_empty() {
                    self.selected = self.selected.saturating_sub(1);
                    self.table_state.select(Some(self.selected));
                }
            }
            KeyCode::Char('r') => {
                self.message = Some(Notice::info("Refreshing..."));
                self.spawn_list(kind, tx);
            }
            KeyCode::Char('/') => {
                self.search_mode = true;
                self.search_query.clear();
            }
            KeyCode::Enter => self.copy_selected(),
            KeyCode::Char('a') => {
                if let Some(c) = self.controller_mut() {
                    c.open_add();
                }
            }
            KeyCode::Char('i') => {
                if let Some(c) = self.controller_mut() {
                    c.open_import();
                }
            }
            KeyCode::Char('e') => {
                if let (Some(id), Some(c)) = (selected_id, self.controller_mut()) {
                    c.open_edit(&id);
                }
            }
            KeyCode::Char('d') => {
                if let (Some(id), Some(c)) = (selected_id, self.controller_mut()) {
                    c.request_delete(&id);
                }
            }
            KeyCode::Char(key) => {
                if let Some(idx) = kind.spec().filter(key) {
                    self.cycle_filter(idx);
                } else if let (Some(id), Some(c)) = (selected_id, self.controller_mut()) {
                    c.request_action(&id, key);
                }
            }
            _ => {}
        }
    }
}

/// The value a record is grouped under for a column filter.
fn filter_value(filter: &FilterSpec, record: &Record) -> String {
    let value = record.display(filter.path);
    if filter.year_only {
        value.split('-').next().unwrap_or_default().trim().to_string()
    } else {
        value
    }
}

/// Keys while a form, confirmation or import overlay is open.
pub fn handle_modal_key(app: &mut App, code: KeyCode, tx: &UnboundedSender<AppEvent>) {
    let Some(controller) = app.controller_mut() else {
        return;
    };
    // the overlay is locked until the in-flight request answers
    if controller.is_submitting() {
        return;
    }
    if code == KeyCode::Esc {
        controller.cancel();
        return;
    }
    let mut submit = false;
    if let Some(draft) = controller.draft_mut() {
        match code {
            KeyCode::Tab | KeyCode::Down => draft.focus_next(),
            KeyCode::BackTab | KeyCode::Up => draft.focus_prev(),
            KeyCode::Backspace => draft.pop_char(),
            KeyCode::Char(c) => draft.push_char(c),
            KeyCode::Enter => submit = true,
            _ => {}
        }
    } else if let Some(path) = controller.import_path_mut() {
        match code {
            KeyCode::Backspace => {
                path.pop();
            }
            KeyCode::Char(c) => path.push(c),
            KeyCode::Enter => submit = true,
            _ => {}
        }
    } else if matches!(controller.state(), ControllerState::Confirming(_)) {
        match code {
            KeyCode::Char('y') | KeyCode::Char('Y') => submit = true,
            KeyCode::Char('n') | KeyCode::Char('N') => {
                controller.cancel();
            }
            _ => {}
        }
    }
    if submit {
        app.submit(tx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthContext, StaticToken};
    use crate::model::{Listing, NoticeLevel, RecordId};
    use std::time::Duration;
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app_for(server: &MockServer, role: Role) -> App {
        let client = ApiClient::new(
            server.uri(),
            AuthContext::new(StaticToken(Some("test-token"))),
            Duration::from_secs(10),
        );
        let mut app = App::new(role, Arc::new(client));
        app.screen = AppScreen::Menu;
        app
    }

    async fn pump(app: &mut App, rx: &mut UnboundedReceiver<AppEvent>, tx: &UnboundedSender<AppEvent>) {
        let ev = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event in time")
            .expect("channel open");
        app.handle_event(ev, tx);
    }

    fn type_text(app: &mut App, tx: &UnboundedSender<AppEvent>, text: &str) {
        for c in text.chars() {
            app.handle_key(KeyCode::Char(c), tx);
        }
    }

    async fn mount_colleges(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/admin/colleges"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_add_college_closes_modal_and_shows_server_row() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/colleges"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"success": true, "message": "No colleges found", "data": null}),
            ))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/admin/colleges"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "success": true,
                "data": {"id": 55, "name": "Engineering College"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_colleges(
            &server,
            serde_json::json!({"success": true, "data": [{"id": 55, "name": "Engineering College", "university_id": 101}]}),
        )
        .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = app_for(&server, Role::Admin);
        app.open_resource(ResourceKind::College, &tx);
        pump(&mut app, &mut rx, &tx).await;

        app.handle_key(KeyCode::Char('a'), &tx);
        type_text(&mut app, &tx, "Engineering College");
        app.handle_key(KeyCode::Tab, &tx);
        type_text(&mut app, &tx, "101");
        app.handle_key(KeyCode::Enter, &tx);

        pump(&mut app, &mut rx, &tx).await; // mutation result
        assert!(app.controller().unwrap().is_idle());
        pump(&mut app, &mut rx, &tx).await; // refetch

        let records = app.controller().unwrap().records();
        let matching: Vec<_> = records.iter().filter(|r| r.id.as_str() == "55").collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(app.displayed.len(), 1);
        assert_eq!(app.message.as_ref().unwrap().level, NoticeLevel::Success);
    }

    #[tokio::test]
    async fn test_blocked_delete_shows_reason_and_keeps_row() {
        let server = MockServer::start().await;
        mount_colleges(
            &server,
            serde_json::json!({"success": true, "data": [{"id": 7, "name": "Engineering College"}]}),
        )
        .await;
        Mock::given(method("DELETE"))
            .and(path("/admin/colleges/7"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "success": false,
                "message": "Cannot delete: college has active departments"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = app_for(&server, Role::Admin);
        app.open_resource(ResourceKind::College, &tx);
        pump(&mut app, &mut rx, &tx).await;

        app.handle_key(KeyCode::Char('d'), &tx);
        app.handle_key(KeyCode::Char('y'), &tx);
        pump(&mut app, &mut rx, &tx).await;

        let msg = app.message.clone().unwrap();
        assert_eq!(msg.text, "Cannot delete: college has active departments");
        assert!(app.controller().unwrap().record(&RecordId::from("7")).is_some());
        assert!(app.controller().unwrap().is_idle());
        // no refetch after a failed delete
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancelled_delete_sends_nothing() {
        let server = MockServer::start().await;
        mount_colleges(
            &server,
            serde_json::json!({"success": true, "data": [{"id": 7, "name": "Engineering College"}]}),
        )
        .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = app_for(&server, Role::Admin);
        app.open_resource(ResourceKind::College, &tx);
        pump(&mut app, &mut rx, &tx).await;

        app.handle_key(KeyCode::Char('d'), &tx);
        app.handle_key(KeyCode::Char('n'), &tx);
        app.handle_key(KeyCode::Char('d'), &tx);
        app.handle_key(KeyCode::Esc, &tx);

        assert!(app.controller().unwrap().is_idle());
        assert_eq!(app.controller().unwrap().records().len(), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_expired_session_message_is_distinct() {
        let server = MockServer::start().await;
        mount_colleges(&server, serde_json::json!({"success": true, "data": []})).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({"message": "Unauthenticated."})))
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = app_for(&server, Role::Admin);
        app.open_resource(ResourceKind::College, &tx);
        pump(&mut app, &mut rx, &tx).await;

        app.handle_key(KeyCode::Char('a'), &tx);
        type_text(&mut app, &tx, "Science");
        app.handle_key(KeyCode::Tab, &tx);
        type_text(&mut app, &tx, "101");
        app.handle_key(KeyCode::Enter, &tx);
        pump(&mut app, &mut rx, &tx).await;

        let msg = app.message.clone().unwrap();
        assert_eq!(msg.level, NoticeLevel::Auth);
        assert_ne!(
            msg.text,
            crate::error::ApiError::Network(String::new()).user_message()
        );
        // the form stays open with the draft intact
        match app.controller().unwrap().state() {
            ControllerState::Adding(draft) => assert_eq!(draft.value("name"), Some("Science")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_collection_is_not_an_error() {
        let server = MockServer::start().await;
        mount_colleges(
            &server,
            serde_json::json!({"success": true, "message": "No colleges found", "data": null}),
        )
        .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = app_for(&server, Role::Admin);
        app.open_resource(ResourceKind::College, &tx);
        pump(&mut app, &mut rx, &tx).await;

        let c = app.controller().unwrap();
        assert!(c.records().is_empty());
        assert_eq!(c.empty_message(), Some("No colleges found"));
        assert!(app.message.is_none());
    }

    #[tokio::test]
    async fn test_missing_required_field_sends_nothing() {
        let server = MockServer::start().await;
        mount_colleges(&server, serde_json::json!({"success": true, "data": []})).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = app_for(&server, Role::Admin);
        app.open_resource(ResourceKind::College, &tx);
        pump(&mut app, &mut rx, &tx).await;

        app.handle_key(KeyCode::Char('a'), &tx);
        app.handle_key(KeyCode::Tab, &tx);
        type_text(&mut app, &tx, "101");
        app.handle_key(KeyCode::Enter, &tx);

        let msg = app.message.clone().unwrap();
        assert_eq!(msg.text, "College Name is required.");
        assert!(!app.controller().unwrap().is_submitting());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_table() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/colleges"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"success": true, "data": [{"id": 1, "name": "A"}, {"id": 2, "name": "B"}]}),
            ))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = app_for(&server, Role::Admin);
        app.open_resource(ResourceKind::College, &tx);
        pump(&mut app, &mut rx, &tx).await;
        app.handle_key(KeyCode::Char('r'), &tx);
        pump(&mut app, &mut rx, &tx).await;

        assert_eq!(app.displayed.len(), 2);
        assert!(app.controller().unwrap().is_stale());
        assert_eq!(app.message.as_ref().unwrap().level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_preload_fills_every_controller() {
        let server = MockServer::start().await;
        mount_colleges(&server, serde_json::json!({"success": true, "data": [{"id": 1, "name": "A"}]})).await;
        Mock::given(method("GET"))
            .and(path("/admin/library-staff"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"success": true, "data": [{"id": 3, "name": "Khalid", "email": "k@uni.edu"}]}),
            ))
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = app_for(&server, Role::Admin);
        app.preload_all(&tx, Arc::new(Semaphore::new(1)));
        pump(&mut app, &mut rx, &tx).await;
        pump(&mut app, &mut rx, &tx).await;

        for kind in Role::Admin.resources() {
            let c = &app.controllers[kind];
            assert!(c.is_loaded());
            assert_eq!(c.records().len(), 1);
        }
        assert!(!app.busy());
    }

    #[tokio::test]
    async fn test_leaving_page_abandons_open_form() {
        let server = MockServer::start().await;
        mount_colleges(&server, serde_json::json!({"success": true, "data": []})).await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = app_for(&server, Role::Admin);
        app.open_resource(ResourceKind::College, &tx);
        pump(&mut app, &mut rx, &tx).await;
        app.handle_key(KeyCode::Char('a'), &tx);
        app.back_to_menu();

        assert_eq!(app.screen, AppScreen::Menu);
        assert!(app.controllers[&ResourceKind::College].is_idle());
    }

    #[tokio::test]
    async fn test_clearing_required_field_on_edit_sends_nothing() {
        let server = MockServer::start().await;
        mount_colleges(
            &server,
            serde_json::json!({"success": true, "data": [{"id": 7, "name": "Business", "university_id": 102}]}),
        )
        .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = app_for(&server, Role::Admin);
        app.open_resource(ResourceKind::College, &tx);
        pump(&mut app, &mut rx, &tx).await;

        app.handle_key(KeyCode::Char('e'), &tx);
        for _ in "Business".chars() {
            app.handle_key(KeyCode::Backspace, &tx);
        }
        app.handle_key(KeyCode::Enter, &tx);

        assert_eq!(app.message.clone().unwrap().text, "College Name is required.");
        let c = app.controller().unwrap();
        assert!(!c.is_submitting());
        assert!(matches!(c.state(), ControllerState::Editing { .. }));
        assert_eq!(c.record(&RecordId::from("7")).unwrap().display("name"), "Business");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_student_info_column_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/librarayStaff/students/information"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": [
                    {"id": 1, "name": "Lina", "email": "lina@uni.edu", "department": "CS", "graduation_year": "2024-06-30"},
                    {"id": 2, "name": "Sami", "email": "sami@uni.edu", "department": "Math", "graduation_year": "2023-06-30"},
                    {"id": 3, "name": "Nour", "email": "nour@uni.edu", "department": "CS", "graduation_year": 2023}
                ]
            })))
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = app_for(&server, Role::LibraryStaff);
        app.open_resource(ResourceKind::StudentInfo, &tx);
        pump(&mut app, &mut rx, &tx).await;
        assert_eq!(app.displayed.len(), 3);

        // department: CS -> Math -> all
        app.handle_key(KeyCode::Char('f'), &tx);
        assert_eq!(app.displayed, vec![0, 2]);
        assert_eq!(app.message.clone().unwrap().text, "Department: CS");
        app.handle_key(KeyCode::Char('f'), &tx);
        assert_eq!(app.displayed, vec![1]);
        app.handle_key(KeyCode::Char('f'), &tx);
        assert_eq!(app.displayed.len(), 3);

        // year combines with department and with search
        app.handle_key(KeyCode::Char('y'), &tx);
        assert_eq!(app.filters[1].as_deref(), Some("2023"));
        assert_eq!(app.displayed, vec![1, 2]);
        app.handle_key(KeyCode::Char('f'), &tx);
        assert_eq!(app.displayed, vec![2]);
        app.handle_key(KeyCode::Char('/'), &tx);
        type_text(&mut app, &tx, "lina");
        assert!(app.displayed.is_empty());
        assert_eq!(app.controller().unwrap().records().len(), 3);

        app.handle_key(KeyCode::Esc, &tx);
        app.back_to_menu();
        assert!(app.filters.is_empty());
    }

    #[test]
    fn test_apply_search_filtering() {
        let server_uri = "http://127.0.0.1:9";
        let client = ApiClient::new(
            server_uri,
            AuthContext::new(StaticToken(None)),
            Duration::from_secs(1),
        );
        let mut app = App::new(Role::LibraryStaff, Arc::new(client));
        app.current = Some(ResourceKind::SupervisorInfo);
        let c = app.controllers.get_mut(&ResourceKind::SupervisorInfo).unwrap();
        let generation = c.begin_list();
        c.finish_list(
            generation,
            Ok(Listing {
                records: serde_json::from_value(serde_json::json!([
                    {"id": 1, "user": {"name": "Dr. Sara Ahmed", "email": "sara@uni.edu"}, "supervisorDgree": "PhD"},
                    {"id": 2, "user": {"name": "Dr. Ali Hassan", "email": "ali@uni.edu"}, "supervisorDgree": "MSc"},
                    {"id": 3, "user": {"name": "Mona Saleh", "email": "mona@uni.edu"}, "supervisorDgree": "PhD"}
                ]))
                .unwrap(),
                message: None,
            }),
        );

        // 1. Search by nested name
        app.search_query = "sara".to_string();
        app.apply_search();
        assert_eq!(app.displayed.len(), 1);
        assert_eq!(app.selected_record().unwrap().display("user.email"), "sara@uni.edu");

        // 2. Search matches a degree column
        app.search_query = "msc".to_string();
        app.apply_search();
        assert_eq!(app.displayed, vec![1]);

        // 3. Search for non-existent
        app.search_query = "xyz123".to_string();
        app.apply_search();
        assert!(app.displayed.is_empty());
        assert!(app.selected_record().is_none());

        // 4. Empty search -> all rows, records untouched
        app.search_query.clear();
        app.apply_search();
        assert_eq!(app.displayed.len(), 3);
        assert_eq!(app.controller().unwrap().records().len(), 3);
    }
}
