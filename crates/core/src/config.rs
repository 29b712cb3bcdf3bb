use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chart::palette::{Color, NEUTRAL_COLOR};

pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["ganttbot.toml", "config/ganttbot.toml"];

const MAX_PIXEL_EDGE: u32 = 16_384;

/// Environment keys per setting. The first entry is the canonical name; the
/// rest are accepted fallbacks, checked in order.
pub mod env_keys {
    pub const SLACK_BOT_TOKEN: &[&str] = &["GANTTBOT_SLACK_BOT_TOKEN", "SLACK_BOT_TOKEN"];
    pub const SLACK_USER_TOKEN: &[&str] = &["GANTTBOT_SLACK_USER_TOKEN", "SLACK_USER_TOKEN"];
    pub const SLACK_API_BASE_URL: &[&str] = &["GANTTBOT_SLACK_API_BASE_URL"];
    pub const SLACK_TIMEOUT_SECS: &[&str] = &["GANTTBOT_SLACK_TIMEOUT_SECS"];

    pub const LIST_ID: &[&str] = &["GANTTBOT_LIST_ID", "SLACK_LIST_ID"];
    pub const CANVAS_ID: &[&str] = &["GANTTBOT_CANVAS_ID", "SLACK_CANVAS_ID"];
    pub const CHANNEL_ID: &[&str] = &["GANTTBOT_CHANNEL_ID", "SLACK_CHANNEL_ID"];
    pub const SHARE_UPLOADS: &[&str] = &["GANTTBOT_SHARE_UPLOADS"];

    pub const COLUMN_NAME: &[&str] = &["GANTTBOT_COLUMN_NAME", "LIST_NAME_COLUMN"];
    pub const COLUMN_START: &[&str] = &["GANTTBOT_COLUMN_START", "LIST_START_DATE_COLUMN"];
    pub const COLUMN_END: &[&str] = &["GANTTBOT_COLUMN_END", "LIST_END_DATE_COLUMN"];
    pub const COLUMN_CATEGORY: &[&str] = &["GANTTBOT_COLUMN_CATEGORY", "LIST_CATEGORY_COLUMN"];
    pub const COLUMN_GROUP: &[&str] = &["GANTTBOT_COLUMN_GROUP", "LIST_GROUP_COLUMN"];
    pub const COLUMN_NOTES: &[&str] = &["GANTTBOT_COLUMN_NOTES", "LIST_NOTES_COLUMN"];
    pub const CATEGORY_OPTIONS: &[&str] = &["GANTTBOT_CATEGORY_OPTIONS", "CATEGORY_OPTIONS"];

    pub const CHART_WIDTH: &[&str] = &["GANTTBOT_CHART_WIDTH", "CHART_WIDTH"];
    pub const CHART_HEIGHT: &[&str] = &["GANTTBOT_CHART_HEIGHT", "CHART_HEIGHT"];
    pub const CHART_DPI: &[&str] = &["GANTTBOT_CHART_DPI", "CHART_DPI"];
    pub const CHART_TITLE: &[&str] = &["GANTTBOT_CHART_TITLE", "CHART_TITLE"];
    pub const CHART_GROUP_BY: &[&str] = &["GANTTBOT_CHART_GROUP_BY", "CHART_GROUP_BY"];
    pub const CATEGORY_COLORS: &[&str] = &["GANTTBOT_CATEGORY_COLORS", "CATEGORY_COLORS"];
    pub const CHART_DEFAULT_COLOR: &[&str] =
        &["GANTTBOT_CHART_DEFAULT_COLOR", "DEFAULT_TASK_COLOR"];
    pub const CHART_FONT_PATH: &[&str] = &["GANTTBOT_CHART_FONT_PATH"];
    pub const CHART_SHOW_TODAY: &[&str] = &["GANTTBOT_CHART_SHOW_TODAY"];
    pub const CHART_HIDE_PAST_TASKS: &[&str] = &["GANTTBOT_CHART_HIDE_PAST_TASKS"];

    pub const POLL_INTERVAL_MINUTES: &[&str] =
        &["GANTTBOT_POLL_INTERVAL_MINUTES", "POLL_INTERVAL_MINUTES"];
    pub const DEBOUNCE_SECS: &[&str] = &["GANTTBOT_DEBOUNCE_SECS"];
    pub const RESPONSE_WINDOW_MS: &[&str] = &["GANTTBOT_RESPONSE_WINDOW_MS"];

    pub const SERVER_BIND_ADDRESS: &[&str] = &["GANTTBOT_SERVER_BIND_ADDRESS"];
    pub const SERVER_PORT: &[&str] = &["GANTTBOT_SERVER_PORT", "PORT"];

    pub const LOGGING_LEVEL: &[&str] = &["GANTTBOT_LOGGING_LEVEL", "GANTTBOT_LOG_LEVEL"];
    pub const LOGGING_FORMAT: &[&str] = &["GANTTBOT_LOGGING_FORMAT", "GANTTBOT_LOG_FORMAT"];
    pub const DEBUG: &[&str] = &["GANTTBOT_DEBUG", "DEBUG"];

    pub const ALL: &[&[&str]] = &[
        SLACK_BOT_TOKEN,
        SLACK_USER_TOKEN,
        SLACK_API_BASE_URL,
        SLACK_TIMEOUT_SECS,
        LIST_ID,
        CANVAS_ID,
        CHANNEL_ID,
        SHARE_UPLOADS,
        COLUMN_NAME,
        COLUMN_START,
        COLUMN_END,
        COLUMN_CATEGORY,
        COLUMN_GROUP,
        COLUMN_NOTES,
        CATEGORY_OPTIONS,
        CHART_WIDTH,
        CHART_HEIGHT,
        CHART_DPI,
        CHART_TITLE,
        CHART_GROUP_BY,
        CATEGORY_COLORS,
        CHART_DEFAULT_COLOR,
        CHART_FONT_PATH,
        CHART_SHOW_TODAY,
        CHART_HIDE_PAST_TASKS,
        POLL_INTERVAL_MINUTES,
        DEBOUNCE_SECS,
        RESPONSE_WINDOW_MS,
        SERVER_BIND_ADDRESS,
        SERVER_PORT,
        LOGGING_LEVEL,
        LOGGING_FORMAT,
        DEBUG,
    ];
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub targets: TargetConfig,
    pub columns: ColumnConfig,
    pub chart: ChartConfig,
    pub schedule: ScheduleConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: SecretString,
    /// Lists are read with the user token when one is configured.
    pub user_token: Option<SecretString>,
    pub api_base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TargetConfig {
    pub list_id: Option<String>,
    pub canvas_id: Option<String>,
    pub channel_id: Option<String>,
    pub share_uploads: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnConfig {
    pub name: String,
    pub start: String,
    pub end: String,
    pub category: String,
    pub group: String,
    pub notes: String,
    /// Select option id to label, e.g. `Opt8FN0LU45` to `Students`.
    pub category_options: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChartConfig {
    pub width_in: f32,
    pub height_in: f32,
    pub dpi: u32,
    pub title: String,
    pub group_by: Option<String>,
    pub category_colors: BTreeMap<String, Color>,
    pub default_color: Color,
    pub font_path: Option<PathBuf>,
    pub show_today: bool,
    pub hide_past_tasks: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Zero disables the poll timer.
    pub poll_interval_minutes: u64,
    pub debounce_secs: u64,
    pub response_window_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub debug: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_user_token: Option<String>,
    pub list_id: Option<String>,
    pub canvas_id: Option<String>,
    pub channel_id: Option<String>,
    pub chart_title: Option<String>,
    pub chart_group_by: Option<String>,
    pub chart_font_path: Option<PathBuf>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                bot_token: String::new().into(),
                user_token: None,
                api_base_url: "https://slack.com/api".to_string(),
                timeout_secs: 30,
            },
            targets: TargetConfig::default(),
            columns: ColumnConfig::default(),
            chart: ChartConfig::default(),
            schedule: ScheduleConfig {
                poll_interval_minutes: 0,
                debounce_secs: 5,
                response_window_ms: 2_500,
            },
            server: ServerConfig { bind_address: "0.0.0.0".to_string(), port: 3000 },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Compact,
                debug: false,
            },
        }
    }
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            name: "Name".to_string(),
            start: "Start Date".to_string(),
            end: "End Date".to_string(),
            category: "Category".to_string(),
            group: "Group".to_string(),
            notes: "Notes".to_string(),
            category_options: BTreeMap::new(),
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width_in: 14.0,
            height_in: 8.0,
            dpi: 150,
            title: "Project Timeline".to_string(),
            group_by: None,
            category_colors: BTreeMap::new(),
            default_color: NEUTRAL_COLOR,
            font_path: None,
            show_today: true,
            hide_past_tasks: false,
        }
    }
}

impl ChartConfig {
    /// Output size in pixels: `round(inches * dpi)` on each edge.
    pub fn pixel_size(&self) -> (u32, u32) {
        let edge = |inches: f32| (inches * self.dpi as f32).round().max(0.0) as u32;
        (edge(self.width_in), edge(self.height_in))
    }
}

impl LoggingConfig {
    /// `debug = true` forces the debug level regardless of `level`.
    pub fn effective_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            self.level.as_str()
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options
                .config_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATHS[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(slack) = patch.slack {
            if let Some(slack_bot_token_value) = slack.bot_token {
                self.slack.bot_token = secret_value(slack_bot_token_value);
            }
            if let Some(slack_user_token_value) = slack.user_token {
                self.slack.user_token = non_empty(slack_user_token_value).map(secret_value);
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
            if let Some(timeout_secs) = slack.timeout_secs {
                self.slack.timeout_secs = timeout_secs;
            }
        }

        if let Some(targets) = patch.targets {
            if let Some(list_id) = targets.list_id {
                self.targets.list_id = non_empty(list_id);
            }
            if let Some(canvas_id) = targets.canvas_id {
                self.targets.canvas_id = non_empty(canvas_id);
            }
            if let Some(channel_id) = targets.channel_id {
                self.targets.channel_id = non_empty(channel_id);
            }
            if let Some(share_uploads) = targets.share_uploads {
                self.targets.share_uploads = share_uploads;
            }
        }

        if let Some(columns) = patch.columns {
            if let Some(name) = columns.name {
                self.columns.name = name;
            }
            if let Some(start) = columns.start {
                self.columns.start = start;
            }
            if let Some(end) = columns.end {
                self.columns.end = end;
            }
            if let Some(category) = columns.category {
                self.columns.category = category;
            }
            if let Some(group) = columns.group {
                self.columns.group = group;
            }
            if let Some(notes) = columns.notes {
                self.columns.notes = notes;
            }
            if let Some(category_options) = columns.category_options {
                self.columns.category_options = category_options;
            }
        }

        if let Some(chart) = patch.chart {
            if let Some(width) = chart.width {
                self.chart.width_in = width;
            }
            if let Some(height) = chart.height {
                self.chart.height_in = height;
            }
            if let Some(dpi) = chart.dpi {
                self.chart.dpi = dpi;
            }
            if let Some(title) = chart.title {
                self.chart.title = title;
            }
            if let Some(group_by) = chart.group_by {
                self.chart.group_by = non_empty(group_by);
            }
            if let Some(category_colors) = chart.category_colors {
                self.chart.category_colors = category_colors
                    .into_iter()
                    .map(|(category, color)| {
                        parse_color("chart.category_colors", &color).map(|color| (category, color))
                    })
                    .collect::<Result<_, ConfigError>>()?;
            }
            if let Some(default_color) = chart.default_color {
                self.chart.default_color = parse_color("chart.default_color", &default_color)?;
            }
            if let Some(font_path) = chart.font_path {
                self.chart.font_path = Some(font_path);
            }
            if let Some(show_today) = chart.show_today {
                self.chart.show_today = show_today;
            }
            if let Some(hide_past_tasks) = chart.hide_past_tasks {
                self.chart.hide_past_tasks = hide_past_tasks;
            }
        }

        if let Some(schedule) = patch.schedule {
            if let Some(poll_interval_minutes) = schedule.poll_interval_minutes {
                self.schedule.poll_interval_minutes = poll_interval_minutes;
            }
            if let Some(debounce_secs) = schedule.debounce_secs {
                self.schedule.debounce_secs = debounce_secs;
            }
            if let Some(response_window_ms) = schedule.response_window_ms {
                self.schedule.response_window_ms = response_window_ms;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
            if let Some(debug) = logging.debug {
                self.logging.debug = debug;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some((_, value)) = read_env_any(env_keys::SLACK_BOT_TOKEN) {
            self.slack.bot_token = secret_value(value);
        }
        if let Some((_, value)) = read_env_any(env_keys::SLACK_USER_TOKEN) {
            self.slack.user_token = Some(secret_value(value));
        }
        if let Some((_, value)) = read_env_any(env_keys::SLACK_API_BASE_URL) {
            self.slack.api_base_url = value;
        }
        if let Some((key, value)) = read_env_any(env_keys::SLACK_TIMEOUT_SECS) {
            self.slack.timeout_secs = parse_u64(key, &value)?;
        }

        if let Some((_, value)) = read_env_any(env_keys::LIST_ID) {
            self.targets.list_id = Some(value);
        }
        if let Some((_, value)) = read_env_any(env_keys::CANVAS_ID) {
            self.targets.canvas_id = Some(value);
        }
        if let Some((_, value)) = read_env_any(env_keys::CHANNEL_ID) {
            self.targets.channel_id = Some(value);
        }
        if let Some((key, value)) = read_env_any(env_keys::SHARE_UPLOADS) {
            self.targets.share_uploads = parse_bool(key, &value)?;
        }

        if let Some((_, value)) = read_env_any(env_keys::COLUMN_NAME) {
            self.columns.name = value;
        }
        if let Some((_, value)) = read_env_any(env_keys::COLUMN_START) {
            self.columns.start = value;
        }
        if let Some((_, value)) = read_env_any(env_keys::COLUMN_END) {
            self.columns.end = value;
        }
        if let Some((_, value)) = read_env_any(env_keys::COLUMN_CATEGORY) {
            self.columns.category = value;
        }
        if let Some((_, value)) = read_env_any(env_keys::COLUMN_GROUP) {
            self.columns.group = value;
        }
        if let Some((_, value)) = read_env_any(env_keys::COLUMN_NOTES) {
            self.columns.notes = value;
        }
        if let Some((_, value)) = read_env_any(env_keys::CATEGORY_OPTIONS) {
            self.columns.category_options = parse_pairs(&value);
        }

        if let Some((key, value)) = read_env_any(env_keys::CHART_WIDTH) {
            self.chart.width_in = parse_f32(key, &value)?;
        }
        if let Some((key, value)) = read_env_any(env_keys::CHART_HEIGHT) {
            self.chart.height_in = parse_f32(key, &value)?;
        }
        if let Some((key, value)) = read_env_any(env_keys::CHART_DPI) {
            self.chart.dpi = parse_u32(key, &value)?;
        }
        if let Some((_, value)) = read_env_any(env_keys::CHART_TITLE) {
            self.chart.title = value;
        }
        if let Some((_, value)) = read_env_any(env_keys::CHART_GROUP_BY) {
            self.chart.group_by = Some(value);
        }
        if let Some((key, value)) = read_env_any(env_keys::CATEGORY_COLORS) {
            self.chart.category_colors = parse_pairs(&value)
                .into_iter()
                .map(|(category, color)| parse_color(key, &color).map(|color| (category, color)))
                .collect::<Result<_, ConfigError>>()?;
        }
        if let Some((key, value)) = read_env_any(env_keys::CHART_DEFAULT_COLOR) {
            self.chart.default_color = parse_color(key, &value)?;
        }
        if let Some((_, value)) = read_env_any(env_keys::CHART_FONT_PATH) {
            self.chart.font_path = Some(PathBuf::from(value));
        }
        if let Some((key, value)) = read_env_any(env_keys::CHART_SHOW_TODAY) {
            self.chart.show_today = parse_bool(key, &value)?;
        }
        if let Some((key, value)) = read_env_any(env_keys::CHART_HIDE_PAST_TASKS) {
            self.chart.hide_past_tasks = parse_bool(key, &value)?;
        }

        if let Some((key, value)) = read_env_any(env_keys::POLL_INTERVAL_MINUTES) {
            self.schedule.poll_interval_minutes = parse_u64(key, &value)?;
        }
        if let Some((key, value)) = read_env_any(env_keys::DEBOUNCE_SECS) {
            self.schedule.debounce_secs = parse_u64(key, &value)?;
        }
        if let Some((key, value)) = read_env_any(env_keys::RESPONSE_WINDOW_MS) {
            self.schedule.response_window_ms = parse_u64(key, &value)?;
        }

        if let Some((_, value)) = read_env_any(env_keys::SERVER_BIND_ADDRESS) {
            self.server.bind_address = value;
        }
        if let Some((key, value)) = read_env_any(env_keys::SERVER_PORT) {
            self.server.port = parse_u16(key, &value)?;
        }

        if let Some((_, value)) = read_env_any(env_keys::LOGGING_LEVEL) {
            self.logging.level = value;
        }
        if let Some((_, value)) = read_env_any(env_keys::LOGGING_FORMAT) {
            self.logging.format = value.parse()?;
        }
        if let Some((key, value)) = read_env_any(env_keys::DEBUG) {
            self.logging.debug = parse_bool(key, &value)?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(slack_bot_token);
        }
        if let Some(slack_user_token) = overrides.slack_user_token {
            self.slack.user_token = Some(secret_value(slack_user_token));
        }
        if let Some(list_id) = overrides.list_id {
            self.targets.list_id = Some(list_id);
        }
        if let Some(canvas_id) = overrides.canvas_id {
            self.targets.canvas_id = Some(canvas_id);
        }
        if let Some(channel_id) = overrides.channel_id {
            self.targets.channel_id = Some(channel_id);
        }
        if let Some(chart_title) = overrides.chart_title {
            self.chart.title = chart_title;
        }
        if let Some(chart_group_by) = overrides.chart_group_by {
            self.chart.group_by = Some(chart_group_by);
        }
        if let Some(chart_font_path) = overrides.chart_font_path {
            self.chart.font_path = Some(chart_font_path);
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_chart(&self.chart)?;
        validate_schedule(&self.schedule)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// Stricter checks for processes that talk to Slack. Offline rendering only
    /// needs [`AppConfig::validate`].
    pub fn validate_runtime(&self) -> Result<(), ConfigError> {
        if self.slack.bot_token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
            ));
        }
        if self.targets.canvas_id.is_none() {
            return Err(ConfigError::Validation(
                "targets.canvas_id is required to publish the chart".to_string(),
            ));
        }
        if self.schedule.poll_interval_minutes > 0 && self.targets.list_id.is_none() {
            return Err(ConfigError::Validation(
                "targets.list_id is required when schedule.poll_interval_minutes is set"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Token used for list reads: the user token when present, else the bot token.
    pub fn list_token(&self) -> &SecretString {
        self.slack.user_token.as_ref().unwrap_or(&self.slack.bot_token)
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_PATHS.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

/// Parses `key:value,key:value`. Entries without a colon are skipped; values
/// may themselves contain colons.
pub fn parse_pairs(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|entry| entry.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
        .collect()
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let bot_token = slack.bot_token.expose_secret();
    if !bot_token.is_empty() && !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xoxp-") {
            " (hint: you may have used the user token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    if let Some(user_token) = &slack.user_token {
        let user_token = user_token.expose_secret();
        if !user_token.starts_with("xoxp-") {
            let hint = if user_token.starts_with("xoxb-") {
                " (hint: you may have used the bot token instead of the user token)"
            } else {
                ""
            };
            return Err(ConfigError::Validation(format!(
                "slack.user_token must start with `xoxp-`{hint}"
            )));
        }
    }

    let base_url = slack.api_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "slack.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if slack.timeout_secs == 0 || slack.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "slack.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_chart(chart: &ChartConfig) -> Result<(), ConfigError> {
    let positive = |value: f32| value.is_finite() && value > 0.0;
    if !positive(chart.width_in) || !positive(chart.height_in) {
        return Err(ConfigError::Validation(
            "chart.width and chart.height must be positive numbers of inches".to_string(),
        ));
    }

    if chart.dpi == 0 || chart.dpi > 600 {
        return Err(ConfigError::Validation("chart.dpi must be in range 1..=600".to_string()));
    }

    let (width_px, height_px) = chart.pixel_size();
    if width_px == 0 || height_px == 0 {
        return Err(ConfigError::Validation(
            "chart size rounds to zero pixels; raise chart.width, chart.height or chart.dpi"
                .to_string(),
        ));
    }
    if width_px > MAX_PIXEL_EDGE || height_px > MAX_PIXEL_EDGE {
        return Err(ConfigError::Validation(format!(
            "chart size {width_px}x{height_px}px exceeds the {MAX_PIXEL_EDGE}px edge limit"
        )));
    }

    Ok(())
}

/// One week. Longer intervals overflow the timer's deadline arithmetic.
pub const MAX_POLL_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

fn validate_schedule(schedule: &ScheduleConfig) -> Result<(), ConfigError> {
    if schedule.poll_interval_minutes > MAX_POLL_INTERVAL_MINUTES {
        return Err(ConfigError::Validation(format!(
            "schedule.poll_interval_minutes must be 0 (disabled) or at most {MAX_POLL_INTERVAL_MINUTES}"
        )));
    }

    if !(100..=3_000).contains(&schedule.response_window_ms) {
        return Err(ConfigError::Validation(
            "schedule.response_window_ms must be in range 100..=3000 (Slack waits 3s)"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

/// Returns the first set, non-blank variable among `keys` with its name.
pub fn read_env_any(keys: &[&'static str]) -> Option<(&'static str, String)> {
    keys.iter().find_map(|key| read_env(key).map(|value| (*key, value)))
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_color(key: &str, value: &str) -> Result<Color, ConfigError> {
    value.parse::<Color>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.trim().parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    targets: Option<TargetsPatch>,
    columns: Option<ColumnsPatch>,
    chart: Option<ChartPatch>,
    schedule: Option<SchedulePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    bot_token: Option<String>,
    user_token: Option<String>,
    api_base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TargetsPatch {
    list_id: Option<String>,
    canvas_id: Option<String>,
    channel_id: Option<String>,
    share_uploads: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ColumnsPatch {
    name: Option<String>,
    start: Option<String>,
    end: Option<String>,
    category: Option<String>,
    group: Option<String>,
    notes: Option<String>,
    category_options: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartPatch {
    width: Option<f32>,
    height: Option<f32>,
    dpi: Option<u32>,
    title: Option<String>,
    group_by: Option<String>,
    category_colors: Option<BTreeMap<String, String>>,
    default_color: Option<String>,
    font_path: Option<PathBuf>,
    show_today: Option<bool>,
    hide_past_tasks: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulePatch {
    poll_interval_minutes: Option<u64>,
    debounce_secs: Option<u64>,
    response_window_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
    debug: Option<bool>,
}
