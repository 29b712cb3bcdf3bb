use chrono::NaiveDate;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Context { block_id: String, elements: Vec<TextObject> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

/// What a finished run reports back to the channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartUpdate<'a> {
    pub title: &'a str,
    pub list_id: &'a str,
    pub task_count: usize,
    pub span: Option<(NaiveDate, NaiveDate)>,
    pub permalink: &'a str,
    pub appended: bool,
    pub correlation_id: &'a str,
}

pub fn chart_updated_message(update: &ChartUpdate<'_>) -> MessageTemplate {
    let section_verb = if update.appended { "added to" } else { "updated in" };
    let span = match update.span {
        Some((start, end)) => format!(
            "{} to {}",
            start.format("%b %d, %Y"),
            end.format("%b %d, %Y")
        ),
        None => "no dated tasks".to_owned(),
    };

    MessageBuilder::new(format!("Gantt chart {section_verb} the canvas"))
        .section("gantt.updated.summary.v1", |section| {
            section.mrkdwn(format!(
                ":bar_chart: *{}* {section_verb} the canvas.\n{} tasks from list `{}` ({span}). <{}|View chart>",
                update.title, update.task_count, update.list_id, update.permalink
            ));
        })
        .context("gantt.updated.context.v1", |context| {
            context.plain(format!("Correlation ID: {}", update.correlation_id));
        })
        .build()
}

pub fn working_message() -> MessageTemplate {
    MessageBuilder::new("Updating the Gantt chart")
        .section("gantt.working.summary.v1", |section| {
            section.mrkdwn(":hourglass_flowing_sand: Updating the Gantt chart. I'll post here when it's done.");
        })
        .build()
}

pub fn debounced_message(retry_after_secs: u64) -> MessageTemplate {
    MessageBuilder::new("Gantt update already in progress")
        .section("gantt.debounced.summary.v1", |section| {
            section.mrkdwn(format!(
                "A chart update just started. Try again in {retry_after_secs}s if the canvas does not change."
            ));
        })
        .build()
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("gantt.error.summary.v1", |section| {
            section.mrkdwn(format!(":warning: {summary}"));
        })
        .context("gantt.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

pub fn help_message() -> MessageTemplate {
    MessageBuilder::new("Gantt command help")
        .section("gantt.help.summary.v1", |section| {
            section.mrkdwn(
                "*Available commands*\n• `/gantt` refresh the chart from the configured list\n• `/gantt <list_id>` refresh from another list\n• `/gantt help`",
            );
        })
        .build()
}
