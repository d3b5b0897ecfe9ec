use std::path::Path;
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Url};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::auth::AuthContext;
use crate::error::{self, ApiError};
use crate::model::{Envelope, FormDraft, Listing, RecordId};
use crate::resource::{ActionSpec, ResourceSpec, UpdateTransport};

/// HTTP adapter for every resource endpoint. Shared by all controllers.
pub struct ApiClient {
    http: Client,
    base_url: String,
    auth: AuthContext,
    delete_timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, auth: AuthContext, delete_timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            delete_timeout,
        }
    }

    /// Base URL plus already-filled path segments; each segment is encoded
    /// on its own so a value can never add or climb path levels.
    fn endpoint(&self, segments: &[String]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            ApiError::Network(format!("invalid API URL '{}': {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Network(format!("API URL '{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn list(&self, spec: &ResourceSpec) -> Result<Listing, ApiError> {
        let (segments, _) = fill_path(spec.list_path, None, None)?;
        let url = self.endpoint(&segments)?;
        let envelope = self.send(self.http.get(url.clone()), "GET", &url).await?;
        Listing::from_envelope(envelope)
    }

    /// Returns the server's message, if any. Create is always multipart.
    pub async fn create(
        &self,
        spec: &ResourceSpec,
        draft: &FormDraft,
    ) -> Result<Option<String>, ApiError> {
        let (segments, consumed) = fill_path(spec.create_path, None, Some(draft))?;
        let url = self.endpoint(&segments)?;
        let form = multipart_form(draft, &consumed).await?;
        let req = self.http.post(url.clone()).multipart(form);
        Ok(self.send(req, "POST", &url).await?.message)
    }

    pub async fn update(
        &self,
        spec: &ResourceSpec,
        id: &RecordId,
        draft: &FormDraft,
    ) -> Result<Option<String>, ApiError> {
        let (segments, consumed) = fill_path(spec.item_path, Some(id), Some(draft))?;
        let url = self.endpoint(&segments)?;
        let (req, method) = match spec.update_transport {
            UpdateTransport::MethodOverride => {
                let form = multipart_form(draft, &consumed).await?.text("_method", "PUT");
                (self.http.post(url.clone()).multipart(form), "POST")
            }
            UpdateTransport::JsonPut => {
                let body: Map<String, Value> = draft
                    .body_fields(&consumed)
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), Value::String(v)))
                    .collect();
                (self.http.put(url.clone()).json(&body), "PUT")
            }
        };
        Ok(self.send(req, method, &url).await?.message)
    }

    /// Destructive: bounded by the delete timeout.
    pub async fn remove(&self, spec: &ResourceSpec, id: &RecordId) -> Result<Option<String>, ApiError> {
        let (segments, _) = fill_path(spec.item_path, Some(id), None)?;
        let url = self.endpoint(&segments)?;
        let req = self.http.delete(url.clone()).timeout(self.delete_timeout);
        Ok(self.send(req, "DELETE", &url).await?.message)
    }

    pub async fn perform(
        &self,
        action: &ActionSpec,
        id: &RecordId,
    ) -> Result<Option<String>, ApiError> {
        let (segments, _) = fill_path(action.path, Some(id), None)?;
        let url = self.endpoint(&segments)?;
        let req = self.http.post(url.clone()).timeout(self.delete_timeout);
        Ok(self.send(req, "POST", &url).await?.message)
    }

    /// Bulk upload of a spreadsheet to the resource's import endpoint.
    pub async fn import(&self, spec: &ResourceSpec, file: &str) -> Result<Option<String>, ApiError> {
        let Some(path) = spec.capabilities.import_path else {
            return Err(ApiError::Forbidden(format!(
                "{} cannot be imported",
                spec.title
            )));
        };
        let (segments, _) = fill_path(path, None, None)?;
        let url = self.endpoint(&segments)?;
        let part = file_part("file", file).await?;
        let req = self
            .http
            .post(url.clone())
            .multipart(Form::new().part("file", part));
        Ok(self.send(req, "POST", &url).await?.message)
    }

    async fn send(
        &self,
        req: RequestBuilder,
        method: &str,
        url: &Url,
    ) -> Result<Envelope, ApiError> {
        let path = url.path();
        let token = self.auth.bearer()?;
        debug!("{} {}", method, path);
        let resp = req
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!("{} {} failed: {}", method, path, e);
                ApiError::from(e)
            })?;
        let status = resp.status();
        let body = resp.bytes().await?;

        let envelope = if body.iter().all(u8::is_ascii_whitespace) {
            Envelope::default()
        } else {
            match serde_json::from_slice::<Envelope>(&body) {
                Ok(env) => env,
                Err(e) if status.is_success() => {
                    return Err(ApiError::Contract(format!("undecodable body: {}", e)));
                }
                // error pages that are not JSON still map by status
                Err(_) => Envelope::default(),
            }
        };

        let result = error::check(status, envelope);
        if let Err(e) = &result {
            warn!("{} {} -> {}: {}", method, path, status, e);
            if e.is_auth() {
                self.auth.unauthorized();
            }
        }
        result
    }
}

/// Split a path template into raw segments, substituting `{id}` and
/// `{field}` placeholders. Returns the segments and the field names
/// consumed, which are then left out of the body.
fn fill_path(
    template: &str,
    id: Option<&RecordId>,
    draft: Option<&FormDraft>,
) -> Result<(Vec<String>, Vec<&'static str>), ApiError> {
    let mut segments = Vec::new();
    let mut consumed = Vec::new();
    for segment in template.split('/').filter(|s| !s.is_empty()) {
        let Some(name) = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
        else {
            segments.push(segment.to_string());
            continue;
        };
        if name == "id" {
            let Some(id) = id else {
                return Err(ApiError::Contract(format!("no record id for '{}'", template)));
            };
            segments.push(id.as_str().to_string());
            continue;
        }
        let field = draft.and_then(|d| d.spec().fields.iter().find(|f| f.name == name));
        let (Some(draft), Some(field)) = (draft, field) else {
            return Err(ApiError::Contract(format!(
                "no value for '{{{}}}' in '{}'",
                name, template
            )));
        };
        let value = draft.value(field.name).unwrap_or_default().trim();
        if value.is_empty() {
            return Err(ApiError::required(field.name, field.label));
        }
        if value == "." || value == ".." {
            return Err(ApiError::Validation {
                field: Some(field.name.to_string()),
                message: format!("{} is not a valid value.", field.label),
                fields: Vec::new(),
            });
        }
        segments.push(value.to_string());
        consumed.push(field.name);
    }
    Ok((segments, consumed))
}

async fn multipart_form(draft: &FormDraft, skip: &[&'static str]) -> Result<Form, ApiError> {
    let mut form = Form::new();
    for (name, value) in draft.body_fields(skip) {
        form = form.text(name, value);
    }
    for (name, file) in draft.file_fields() {
        form = form.part(name, file_part(name, &file).await?);
    }
    Ok(form)
}

async fn file_part(field: &str, file: &str) -> Result<Part, ApiError> {
    let bytes = tokio::fs::read(file).await.map_err(|e| ApiError::Validation {
        field: Some(field.to_string()),
        message: format!("Cannot read '{}': {}", file, e),
        fields: Vec::new(),
    })?;
    let file_name = Path::new(file)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| field.to_string());
    Ok(Part::bytes(bytes).file_name(file_name))
}
