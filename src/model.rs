use std::fmt;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::resource::{ActionSpec, FieldKind, FieldSpec, ResourceKind, ResourceSpec};

/// Server-assigned identifier. Numeric and string ids both arrive as JSON,
/// so it is kept in its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordId(String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(serde_json::Number),
            Text(String),
        }
        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => RecordId(n.to_string()),
            RawId::Text(s) => RecordId(s),
        })
    }
}

/// One server-owned row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Render the value at a dotted path (`supervisor.user.name`) for display.
    pub fn display(&self, path: &str) -> String {
        let mut parts = path.split('.');
        let Some(first) = parts.next() else {
            return String::new();
        };
        if first == "id" {
            return self.id.to_string();
        }
        let mut current = self.fields.get(first);
        for part in parts {
            current = current.and_then(|v| v.get(part));
        }
        current.map(display_value).unwrap_or_default()
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "yes".into(),
        Value::Bool(false) => "no".into(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) => map.get("name").map(display_value).unwrap_or_default(),
    }
}

/// `{ success, message?, data?, error? }` wrapped around every response.
#[derive(Debug, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, alias = "errors")]
    pub error: Option<ErrorPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ErrorPayload {
    Text(String),
    Fields(Map<String, Value>),
    List(Vec<String>),
    /// Any other shape; kept so the rest of the envelope still decodes.
    Other(Value),
}

impl Envelope {
    /// Most specific human-readable reason in the envelope: a string error,
    /// then the message, then whatever else the error carries.
    pub fn reason(&self) -> Option<String> {
        let text = match &self.error {
            Some(ErrorPayload::Text(t)) if !t.trim().is_empty() => Some(t.clone()),
            _ => None,
        };
        text.or_else(|| self.message.clone().filter(|m| !m.trim().is_empty()))
            .or_else(|| match &self.error {
                Some(ErrorPayload::List(items)) => {
                    items.iter().find(|i| !i.trim().is_empty()).cloned()
                }
                Some(ErrorPayload::Other(value)) => {
                    Some(display_value(value)).filter(|t| !t.trim().is_empty())
                }
                _ => None,
            })
    }

    /// Field errors in server order; a single string reason counts as a one-item list.
    pub fn field_errors(&self) -> Vec<(String, Vec<String>)> {
        let Some(ErrorPayload::Fields(map)) = &self.error else {
            return Vec::new();
        };
        map.iter()
            .map(|(field, reasons)| {
                let reasons = match reasons {
                    Value::Array(items) => items.iter().map(display_value).collect(),
                    Value::String(s) => vec![s.clone()],
                    other => vec![display_value(other)],
                };
                (field.clone(), reasons)
            })
            .filter(|(_, reasons)| !reasons.is_empty())
            .collect()
    }
}

/// Result of `list()`: the records plus the server's note when there are none.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub records: Vec<Record>,
    pub message: Option<String>,
}

impl Listing {
    pub fn from_envelope(envelope: Envelope) -> Result<Self, ApiError> {
        let records = match envelope.data {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(serde_json::from_value::<Record>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ApiError::Contract(format!("malformed record: {}", e)))?,
            Some(Value::Object(_)) => {
                return Err(ApiError::Contract(
                    "expected a list under `data`, found an object".into(),
                ));
            }
            Some(other) => {
                return Err(ApiError::Contract(format!(
                    "expected a list under `data`, found {}",
                    other
                )));
            }
        };
        Ok(Listing {
            records,
            message: envelope.message,
        })
    }
}

/// Client-local, unsaved values for one add or edit session.
#[derive(Debug, Clone)]
pub struct FormDraft {
    spec: &'static ResourceSpec,
    editing: bool,
    values: Vec<String>,
    focus: usize,
}

impl FormDraft {
    pub fn empty(spec: &'static ResourceSpec) -> Self {
        let mut draft = Self {
            spec,
            editing: false,
            values: vec![String::new(); spec.fields.len()],
            focus: 0,
        };
        draft.focus = draft.first_editable().unwrap_or(0);
        draft
    }

    /// Copy of a record's fields; secrets and file paths start blank.
    pub fn from_record(spec: &'static ResourceSpec, record: &Record) -> Self {
        let values = spec
            .fields
            .iter()
            .map(|f| match f.kind {
                FieldKind::Text => record.display(f.name),
                FieldKind::Secret | FieldKind::File => String::new(),
            })
            .collect();
        let mut draft = Self {
            spec,
            editing: true,
            values,
            focus: 0,
        };
        draft.focus = draft.first_editable().unwrap_or(0);
        draft
    }

    pub fn spec(&self) -> &'static ResourceSpec {
        self.spec
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn is_visible(&self, field: &FieldSpec) -> bool {
        !(self.editing && field.create_only)
    }

    pub fn is_read_only(&self, field: &FieldSpec) -> bool {
        self.editing && field.immutable
    }

    /// Visible fields paired with their index and current value.
    pub fn visible_fields(&self) -> impl Iterator<Item = (usize, &'static FieldSpec, &str)> + '_ {
        self.spec
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| self.is_visible(f))
            .map(|(i, f)| (i, f, self.values[i].as_str()))
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        let idx = self.spec.fields.iter().position(|f| f.name == name)?;
        Some(self.values[idx].as_str())
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        if let Some(idx) = self.spec.fields.iter().position(|f| f.name == name) {
            self.values[idx] = value.into();
        }
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn push_char(&mut self, c: char) {
        if self.is_editable(self.focus) {
            self.values[self.focus].push(c);
        }
    }

    pub fn pop_char(&mut self) {
        if self.is_editable(self.focus) {
            self.values[self.focus].pop();
        }
    }

    /// Move focus to a named field, if it can be edited.
    pub fn focus_field(&mut self, name: &str) {
        if let Some(idx) = self.spec.fields.iter().position(|f| f.name == name) {
            if self.is_editable(idx) {
                self.focus = idx;
            }
        }
    }

    pub fn focus_next(&mut self) {
        let n = self.values.len();
        for step in 1..=n {
            let idx = (self.focus + step) % n;
            if self.is_editable(idx) {
                self.focus = idx;
                return;
            }
        }
    }

    pub fn focus_prev(&mut self) {
        let n = self.values.len();
        for step in 1..=n {
            let idx = (self.focus + n - step) % n;
            if self.is_editable(idx) {
                self.focus = idx;
                return;
            }
        }
    }

    /// First required field left blank, as a validation error naming it.
    pub fn check_required(&self) -> Result<(), ApiError> {
        for (_, field, value) in self.visible_fields() {
            if self.is_read_only(field) {
                continue;
            }
            if field.is_required(self.editing) && value.trim().is_empty() {
                return Err(ApiError::required(field.name, field.label));
            }
        }
        Ok(())
    }

    /// Text fields to transmit: read-only ones and blank optional ones are left out,
    /// mirrored names are added.
    pub fn body_fields(&self, skip: &[&str]) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        for (_, field, value) in self.visible_fields() {
            if field.kind == FieldKind::File
                || self.is_read_only(field)
                || skip.contains(&field.name)
            {
                continue;
            }
            let value = value.trim();
            if value.is_empty() && !field.is_required(self.editing) {
                continue;
            }
            out.push((field.name, value.to_string()));
            if let Some(mirror) = field.mirror {
                out.push((mirror, value.to_string()));
            }
        }
        out
    }

    /// Non-blank file fields as `(field name, local path)`.
    pub fn file_fields(&self) -> Vec<(&'static str, String)> {
        self.visible_fields()
            .filter(|(_, f, v)| f.kind == FieldKind::File && !v.trim().is_empty())
            .map(|(_, f, v)| (f.name, v.trim().to_string()))
            .collect()
    }

    fn is_editable(&self, idx: usize) -> bool {
        self.spec
            .fields
            .get(idx)
            .map(|f| self.is_visible(f) && !self.is_read_only(f))
            .unwrap_or(false)
    }

    fn first_editable(&self) -> Option<usize> {
        (0..self.values.len()).find(|i| self.is_editable(*i))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    Delete,
    Action(&'static ActionSpec),
}

/// A staged operation waiting for an explicit second confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub id: RecordId,
    pub label: String,
    pub kind: PendingKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
    Auth,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

impl From<&ApiError> for Notice {
    fn from(err: &ApiError) -> Self {
        Notice {
            level: if err.is_auth() {
                NoticeLevel::Auth
            } else {
                NoticeLevel::Error
            },
            text: err.user_message(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    Create,
    Update,
    Remove,
    Perform(&'static ActionSpec),
    Import,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppScreen {
    Welcome,
    Menu,
    Records,
}

#[derive(Debug)]
pub enum AppEvent {
    ListLoaded {
        kind: ResourceKind,
        generation: u64,
        result: Result<Listing, ApiError>,
    },
    /// `Ok` carries the server's message, if any.
    Mutated {
        kind: ResourceKind,
        op: MutationOp,
        result: Result<Option<String>, ApiError>,
    },
}
