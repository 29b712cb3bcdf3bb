use async_trait::async_trait;
use ganttbot_slack::api::{
    CanvasChange, CanvasSection, FileUpload, ListItem, SlackApi, SlackApiError, UploadedFile,
};
use ganttbot_slack::blocks::MessageTemplate;
use tokio::sync::Mutex;

/// Slack stand-in serving fixed list items and an empty canvas. Records call names.
#[derive(Default)]
pub struct RecordingSlack {
    items: Vec<ListItem>,
    calls: Mutex<Vec<String>>,
}

impl RecordingSlack {
    pub fn with_items(items: Vec<ListItem>) -> Self {
        Self { items, ..Self::default() }
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: String) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl SlackApi for RecordingSlack {
    async fn list_items(&self, list_id: &str) -> Result<Vec<ListItem>, SlackApiError> {
        self.record(format!("list_items:{list_id}")).await;
        Ok(self.items.clone())
    }

    async fn upload_file(&self, _upload: FileUpload) -> Result<UploadedFile, SlackApiError> {
        self.record("upload_file".to_string()).await;
        Ok(UploadedFile { id: "F1".to_string(), permalink: Some("https://files.example/F1".to_string()) })
    }

    async fn lookup_sections(
        &self,
        canvas_id: &str,
        _contains_text: &str,
    ) -> Result<Vec<CanvasSection>, SlackApiError> {
        self.record(format!("lookup_sections:{canvas_id}")).await;
        Ok(Vec::new())
    }

    async fn edit_canvas(
        &self,
        canvas_id: &str,
        _changes: Vec<CanvasChange>,
    ) -> Result<(), SlackApiError> {
        self.record(format!("edit_canvas:{canvas_id}")).await;
        Ok(())
    }

    async fn post_message(
        &self,
        channel_id: &str,
        _message: &MessageTemplate,
    ) -> Result<(), SlackApiError> {
        self.record(format!("post_message:{channel_id}")).await;
        Ok(())
    }
}
