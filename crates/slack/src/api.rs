//! Slack Web API seam.
//!
//! Everything the bot needs from Slack goes through [`SlackApi`], so services
//! can be exercised against an in-memory fake. [`HttpSlackApi`] is the real
//! client: JSON or form POSTs with bearer auth and the `ok`/`error` envelope.

use std::time::Duration;

use async_trait::async_trait;
use ganttbot_core::config::SlackConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::blocks::MessageTemplate;

const LIST_PAGE_LIMIT: u32 = 100;
const MAX_LIST_PAGES: usize = 50;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SlackApiError {
    #[error("transport failure calling `{method}`: {message}")]
    Transport { method: String, message: String },
    #[error("`{method}` returned error `{code}`")]
    Api { method: String, code: String },
    #[error("could not decode `{method}` response: {message}")]
    Decode { method: String, message: String },
}

impl SlackApiError {
    pub fn api(method: &str, code: impl Into<String>) -> Self {
        Self::Api { method: method.to_owned(), code: code.into() }
    }

    fn transport(method: &str, error: impl std::fmt::Display) -> Self {
        Self::Transport { method: method.to_owned(), message: error.to_string() }
    }

    fn decode(method: &str, error: impl std::fmt::Display) -> Self {
        Self::Decode { method: method.to_owned(), message: error.to_string() }
    }
}

/// One row of a Slack List as returned by `slackLists.items.list`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ListItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub fields: Vec<ListField>,
}

/// A single cell. `value` keeps Slack's raw shape (string, number, option id
/// array, or rich text blocks); `text` is the rendered text when Slack sends it.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ListField {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub column_id: Option<String>,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub text: Option<String>,
}

impl ListField {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self { key: Some(key.into()), column_id: None, value, text: None }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// The column key, or the column id when Slack omits the key.
    pub fn id(&self) -> Option<&str> {
        self.key.as_deref().or(self.column_id.as_deref()).filter(|id| !id.is_empty())
    }
}

/// Column layout of a list, from the list file's `list_metadata.schema`.
/// Items key their fields by column id, so names only resolve through here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ListSchema {
    #[serde(default)]
    pub columns: Vec<ListColumn>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ListColumn {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub options: Option<ColumnOptions>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ColumnOptions {
    #[serde(default)]
    pub choices: Vec<ColumnChoice>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ColumnChoice {
    pub value: String,
    #[serde(default)]
    pub label: String,
}

impl ListColumn {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), key: None, options: None }
    }

    pub fn with_choice(mut self, value: impl Into<String>, label: impl Into<String>) -> Self {
        self.options
            .get_or_insert_with(ColumnOptions::default)
            .choices
            .push(ColumnChoice { value: value.into(), label: label.into() });
        self
    }

    /// True when a field was written under this column's id or key.
    pub fn holds(&self, field: &ListField) -> bool {
        [field.key.as_deref(), field.column_id.as_deref()]
            .into_iter()
            .flatten()
            .any(|id| id == self.id || self.key.as_deref() == Some(id))
    }

    pub fn choice_label(&self, value: &str) -> Option<&str> {
        self.options
            .as_ref()?
            .choices
            .iter()
            .find(|choice| choice.value == value)
            .map(|choice| choice.label.as_str())
            .filter(|label| !label.is_empty())
    }
}

impl ListSchema {
    pub fn new(columns: Vec<ListColumn>) -> Self {
        Self { columns }
    }

    pub fn column_of(&self, field: &ListField) -> Option<&ListColumn> {
        self.columns.iter().find(|column| column.holds(field))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileUpload {
    pub filename: String,
    pub title: String,
    pub bytes: Vec<u8>,
    /// Shares the file into this channel when set; otherwise the upload stays private.
    pub channel_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    #[serde(default)]
    pub permalink: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CanvasSection {
    pub id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CanvasOperation {
    Replace,
    InsertAtEnd,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DocumentContent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub markdown: String,
}

impl DocumentContent {
    pub fn markdown(markdown: impl Into<String>) -> Self {
        Self { kind: "markdown", markdown: markdown.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CanvasChange {
    pub operation: CanvasOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    pub document_content: DocumentContent,
}

impl CanvasChange {
    pub fn replace(section_id: impl Into<String>, markdown: impl Into<String>) -> Self {
        Self {
            operation: CanvasOperation::Replace,
            section_id: Some(section_id.into()),
            document_content: DocumentContent::markdown(markdown),
        }
    }

    pub fn insert_at_end(markdown: impl Into<String>) -> Self {
        Self {
            operation: CanvasOperation::InsertAtEnd,
            section_id: None,
            document_content: DocumentContent::markdown(markdown),
        }
    }
}

#[async_trait]
pub trait SlackApi: Send + Sync {
    /// Every item of a list, following pagination cursors.
    async fn list_items(&self, list_id: &str) -> Result<Vec<ListItem>, SlackApiError>;

    /// Column names and select choices for a list. Clients without schema
    /// access report an empty schema and rows fall back to key matching.
    async fn list_schema(&self, _list_id: &str) -> Result<ListSchema, SlackApiError> {
        Ok(ListSchema::default())
    }

    async fn upload_file(&self, upload: FileUpload) -> Result<UploadedFile, SlackApiError>;

    async fn lookup_sections(
        &self,
        canvas_id: &str,
        contains_text: &str,
    ) -> Result<Vec<CanvasSection>, SlackApiError>;

    async fn edit_canvas(
        &self,
        canvas_id: &str,
        changes: Vec<CanvasChange>,
    ) -> Result<(), SlackApiError>;

    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError>;
}

pub struct HttpSlackApi {
    client: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
    list_token: SecretString,
}

impl std::fmt::Debug for HttpSlackApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSlackApi").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

impl HttpSlackApi {
    pub fn new(config: &SlackConfig) -> Result<Self, SlackApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| SlackApiError::transport("client.build", error))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            bot_token: config.bot_token.clone(),
            list_token: config.user_token.clone().unwrap_or_else(|| config.bot_token.clone()),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn call_json<T>(&self, method: &str, token: &SecretString, body: Value) -> Result<T, SlackApiError>
    where
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(method))
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| SlackApiError::transport(method, error))?;
        decode_envelope(method, response).await
    }

    async fn call_form<T>(
        &self,
        method: &str,
        token: &SecretString,
        form: &[(&str, String)],
    ) -> Result<T, SlackApiError>
    where
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(method))
            .bearer_auth(token.expose_secret())
            .form(form)
            .send()
            .await
            .map_err(|error| SlackApiError::transport(method, error))?;
        decode_envelope(method, response).await
    }
}

async fn decode_envelope<T>(method: &str, response: reqwest::Response) -> Result<T, SlackApiError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let body: Value = response.json().await.map_err(|error| {
        SlackApiError::decode(method, format!("http {status}: {error}"))
    })?;

    if body.get("ok").and_then(Value::as_bool) != Some(true) {
        let code = body.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
        return Err(SlackApiError::api(method, code));
    }

    serde_json::from_value(body).map_err(|error| SlackApiError::decode(method, error))
}

#[derive(Deserialize)]
struct ListItemsPage {
    #[serde(default)]
    items: Vec<ListItem>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct ListFileInfo {
    file: ListFile,
}

#[derive(Deserialize)]
struct ListFile {
    #[serde(default)]
    list_metadata: Option<ListMetadata>,
}

#[derive(Deserialize)]
struct ListMetadata {
    #[serde(default)]
    schema: Vec<ListColumn>,
}

#[derive(Deserialize)]
struct UploadUrl {
    upload_url: String,
    file_id: String,
}

#[derive(Deserialize)]
struct CompletedUpload {
    #[serde(default)]
    files: Vec<UploadedFile>,
}

#[derive(Deserialize)]
struct SectionLookup {
    #[serde(default)]
    sections: Vec<CanvasSection>,
}

#[derive(Deserialize)]
struct Empty {}

#[async_trait]
impl SlackApi for HttpSlackApi {
    async fn list_items(&self, list_id: &str) -> Result<Vec<ListItem>, SlackApiError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 0..MAX_LIST_PAGES {
            let mut body = json!({ "list_id": list_id, "limit": LIST_PAGE_LIMIT });
            if let Some(cursor) = &cursor {
                body["cursor"] = Value::String(cursor.clone());
            }

            let response: ListItemsPage =
                self.call_json("slackLists.items.list", &self.list_token, body).await?;
            debug!(
                event_name = "slack.list_items.page",
                list_id,
                page,
                items = response.items.len(),
                "fetched list page"
            );
            items.extend(response.items);

            cursor = response
                .response_metadata
                .and_then(|metadata| metadata.next_cursor)
                .filter(|next| !next.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        Ok(items)
    }

    async fn list_schema(&self, list_id: &str) -> Result<ListSchema, SlackApiError> {
        let info: ListFileInfo =
            self.call_form("files.info", &self.list_token, &[("file", list_id.to_owned())]).await?;
        let columns = info.file.list_metadata.map(|metadata| metadata.schema).unwrap_or_default();
        debug!(
            event_name = "slack.list_schema.fetched",
            list_id,
            columns = columns.len(),
            "read list schema"
        );
        Ok(ListSchema::new(columns))
    }

    async fn upload_file(&self, upload: FileUpload) -> Result<UploadedFile, SlackApiError> {
        let target: UploadUrl = self
            .call_form(
                "files.getUploadURLExternal",
                &self.bot_token,
                &[("filename", upload.filename.clone()), ("length", upload.bytes.len().to_string())],
            )
            .await?;

        let method = "files.upload";
        let response = self
            .client
            .post(&target.upload_url)
            .body(upload.bytes)
            .send()
            .await
            .map_err(|error| SlackApiError::transport(method, error))?;
        if !response.status().is_success() {
            return Err(SlackApiError::transport(method, format!("http {}", response.status())));
        }

        let mut body = json!({ "files": [{ "id": target.file_id, "title": upload.title }] });
        if let Some(channel_id) = upload.channel_id {
            body["channel_id"] = Value::String(channel_id);
        }

        let completed: CompletedUpload =
            self.call_json("files.completeUploadExternal", &self.bot_token, body).await?;
        completed.files.into_iter().next().ok_or_else(|| {
            SlackApiError::decode("files.completeUploadExternal", "response listed no files")
        })
    }

    async fn lookup_sections(
        &self,
        canvas_id: &str,
        contains_text: &str,
    ) -> Result<Vec<CanvasSection>, SlackApiError> {
        let body = json!({
            "canvas_id": canvas_id,
            "criteria": { "contains_text": contains_text },
        });
        let lookup: SectionLookup =
            self.call_json("canvases.sections.lookup", &self.bot_token, body).await?;
        Ok(lookup.sections)
    }

    async fn edit_canvas(
        &self,
        canvas_id: &str,
        changes: Vec<CanvasChange>,
    ) -> Result<(), SlackApiError> {
        let body = json!({ "canvas_id": canvas_id, "changes": changes });
        let _: Empty = self.call_json("canvases.edit", &self.bot_token, body).await?;
        Ok(())
    }

    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        let body = json!({
            "channel": channel_id,
            "text": message.fallback_text,
            "blocks": message.blocks,
        });
        let _: Empty = self.call_json("chat.postMessage", &self.bot_token, body).await?;
        Ok(())
    }
}
