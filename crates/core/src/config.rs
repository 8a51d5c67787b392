use std::{
    collections::HashSet,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use url::Url;

use crate::models::JobDefinition;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub github: GitHubConfig,
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub subscriptions: SubscriptionsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    pub jobs: Vec<JobDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    pub token: String,
    pub api_base: Option<Url>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub api_base: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model() -> String { "deepseek-chat".to_string() }
fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 1500 }

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub dry_run: bool,
    pub dry_run_path: PathBuf,
    pub prompts: PromptsConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            dry_run_path: PathBuf::from("daily_progress/prompt.txt"),
            prompts: PromptsConfig::default(),
        }
    }
}

/// Optional prompt file overrides, one per report category.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptsConfig {
    pub repository_activity: Option<PathBuf>,
    pub news_digest: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifierConfig {
    pub webhook: Option<WebhookConfig>,
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub url: Url,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub security: SmtpSecurity,
    /// Login name, defaults to `from`.
    pub username: Option<String>,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
}

fn default_smtp_port() -> u16 { 465 }

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmtpSecurity {
    /// TLS from the first byte, usually port 465.
    #[default]
    Tls,
    /// Plain connection upgraded with STARTTLS, usually port 587.
    StartTls,
    /// Unencrypted, for local relays only.
    Plain,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubscriptionsConfig {
    pub path: PathBuf,
}

impl Default for SubscriptionsConfig {
    fn default() -> Self { Self { path: PathBuf::from("subscriptions.txt") } }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub repository_dir: PathBuf,
    pub news_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            repository_dir: PathBuf::from("daily_progress"),
            news_dir: PathBuf::from("hacknews_progress"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub base_url: Url,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self { base_url: Url::parse("https://news.ycombinator.com/").expect("valid default URL") }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_millis: u64,
    pub run_on_startup: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self { Self { tick_millis: 1000, run_on_startup: true } }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration { Duration::from_millis(self.tick_millis) }
}

/// Upper bounds on external calls made by a job run.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub fetch_secs: u64,
    pub synthesis_secs: u64,
    pub delivery_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self { Self { fetch_secs: 60, synthesis_secs: 180, delivery_secs: 30 } }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file {}", path.display()))?;
        let config: Config = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            bail!("at least one job must be configured");
        }
        let mut names = HashSet::new();
        for job in &self.jobs {
            if !names.insert(job.name.as_str()) {
                bail!("duplicate job name '{}'", job.name);
            }
        }
        if let Some(email) = &self.notifier.email
            && email.to.is_empty()
        {
            bail!("notifier.email.to must list at least one recipient");
        }
        if self.scheduler.tick_millis == 0 {
            bail!("scheduler.tick_millis must be > 0");
        }
        let timeouts = &self.timeouts;
        if timeouts.fetch_secs == 0 || timeouts.synthesis_secs == 0 || timeouts.delivery_secs == 0
        {
            bail!("timeouts must be > 0");
        }
        Ok(())
    }
}
