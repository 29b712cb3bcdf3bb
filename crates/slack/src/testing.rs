//! In-memory Slack used by the crate's tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::api::{
    CanvasChange, CanvasOperation, CanvasSection, FileUpload, ListItem, SlackApi, SlackApiError,
    UploadedFile,
};
use crate::blocks::MessageTemplate;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Call {
    ListItems { list_id: String },
    Upload { title: String, bytes: usize, channel_id: Option<String> },
    Lookup { canvas_id: String, contains_text: String },
    Edit { canvas_id: String, operation: CanvasOperation, section_id: Option<String> },
    Post { channel_id: String, fallback_text: String },
}

#[derive(Default)]
struct State {
    lists: HashMap<String, Vec<ListItem>>,
    canvases: HashMap<String, Vec<(String, String)>>,
    upload_error: Option<SlackApiError>,
    uploads: usize,
    calls: Vec<Call>,
}

#[derive(Default)]
pub(crate) struct FakeSlack {
    state: Mutex<State>,
}

impl FakeSlack {
    pub(crate) fn with_list(mut self, list_id: &str, items: Vec<ListItem>) -> Self {
        self.state.get_mut().lists.insert(list_id.to_owned(), items);
        self
    }

    pub(crate) fn with_section(mut self, canvas_id: &str, section_id: &str, markdown: &str) -> Self {
        self.state
            .get_mut()
            .canvases
            .entry(canvas_id.to_owned())
            .or_default()
            .push((section_id.to_owned(), markdown.to_owned()));
        self
    }

    pub(crate) fn with_upload_error(mut self, error: SlackApiError) -> Self {
        self.state.get_mut().upload_error = Some(error);
        self
    }

    pub(crate) async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.calls.clone()
    }

    pub(crate) async fn sections(&self, canvas_id: &str) -> Vec<(String, String)> {
        self.state.lock().await.canvases.get(canvas_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SlackApi for FakeSlack {
    async fn list_items(&self, list_id: &str) -> Result<Vec<ListItem>, SlackApiError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::ListItems { list_id: list_id.to_owned() });
        state
            .lists
            .get(list_id)
            .cloned()
            .ok_or_else(|| SlackApiError::api("slackLists.items.list", "list_not_found"))
    }

    async fn upload_file(&self, upload: FileUpload) -> Result<UploadedFile, SlackApiError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::Upload {
            title: upload.title,
            bytes: upload.bytes.len(),
            channel_id: upload.channel_id,
        });
        if let Some(error) = state.upload_error.clone() {
            return Err(error);
        }
        state.uploads += 1;
        let id = format!("F{}", state.uploads);
        Ok(UploadedFile { permalink: Some(format!("https://files.example/{id}")), id })
    }

    async fn lookup_sections(
        &self,
        canvas_id: &str,
        contains_text: &str,
    ) -> Result<Vec<CanvasSection>, SlackApiError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::Lookup {
            canvas_id: canvas_id.to_owned(),
            contains_text: contains_text.to_owned(),
        });
        Ok(state
            .canvases
            .get(canvas_id)
            .into_iter()
            .flatten()
            .filter(|(_, markdown)| markdown.contains(contains_text))
            .map(|(id, _)| CanvasSection { id: id.clone() })
            .collect())
    }

    async fn edit_canvas(
        &self,
        canvas_id: &str,
        changes: Vec<CanvasChange>,
    ) -> Result<(), SlackApiError> {
        let mut state = self.state.lock().await;
        for change in changes {
            state.calls.push(Call::Edit {
                canvas_id: canvas_id.to_owned(),
                operation: change.operation,
                section_id: change.section_id.clone(),
            });

            let sections = state.canvases.entry(canvas_id.to_owned()).or_default();
            let markdown = change.document_content.markdown;
            match (change.operation, change.section_id) {
                (CanvasOperation::Replace, Some(section_id)) => {
                    let section = sections
                        .iter_mut()
                        .find(|(id, _)| *id == section_id)
                        .ok_or_else(|| SlackApiError::api("canvases.edit", "section_not_found"))?;
                    section.1 = markdown;
                }
                (CanvasOperation::Replace, None) => {
                    return Err(SlackApiError::api("canvases.edit", "invalid_arguments"));
                }
                (CanvasOperation::InsertAtEnd, _) => {
                    let id = format!("sec-{}", sections.len() + 1);
                    sections.push((id, markdown));
                }
            }
        }
        Ok(())
    }

    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        self.state.lock().await.calls.push(Call::Post {
            channel_id: channel_id.to_owned(),
            fallback_text: message.fallback_text.clone(),
        });
        Ok(())
    }
}
