mod openai;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
pub use openai::OpenAi;
use sentinel_core::{
    config::LlmConfig, error::SynthesisError, models::ReportCategory, util::atomic_write,
};
use serde::Serialize;

/// Returned instead of a completion when the synthesizer runs dry.
pub const DRY_RUN_SENTINEL: &str = "DRY RUN";

/// A text-generation backend: one blocking request/response per call.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String, SynthesisError>;
}

pub fn default_prompt(category: ReportCategory) -> &'static str {
    match category {
        ReportCategory::RepositoryActivity => include_str!("../prompts/repository_activity.txt"),
        ReportCategory::NewsDigest => include_str!("../prompts/news_digest.txt"),
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Turns raw collections of one category into report text.
///
/// The system prompt is fixed at construction; a different category needs a
/// different instance.
pub struct Synthesizer {
    category: ReportCategory,
    system_prompt: String,
    backend: Arc<dyn Completion>,
    dry_run_path: Option<PathBuf>,
}

impl Synthesizer {
    pub fn new(
        category: ReportCategory,
        system_prompt: impl Into<String>,
        backend: Arc<dyn Completion>,
    ) -> Self {
        Self { category, system_prompt: system_prompt.into(), backend, dry_run_path: None }
    }

    /// Build a synthesizer from configuration, reading a prompt override if
    /// one is configured for `category`.
    pub fn from_config(
        category: ReportCategory,
        config: &LlmConfig,
        backend: Arc<dyn Completion>,
    ) -> Result<Self> {
        let override_path = match category {
            ReportCategory::RepositoryActivity => config.prompts.repository_activity.as_deref(),
            ReportCategory::NewsDigest => config.prompts.news_digest.as_deref(),
        };
        let prompt = match override_path {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read prompt file {}", path.display()))?,
            None => default_prompt(category).to_string(),
        };
        let synthesizer = Self::new(category, prompt, backend);
        Ok(if config.dry_run {
            synthesizer.with_dry_run(config.dry_run_path.clone())
        } else {
            synthesizer
        })
    }

    /// Skip the backend and write the request payload to `path` instead.
    pub fn with_dry_run(mut self, path: impl Into<PathBuf>) -> Self {
        self.dry_run_path = Some(path.into());
        self
    }

    pub fn category(&self) -> ReportCategory { self.category }

    pub fn system_prompt(&self) -> &str { &self.system_prompt }

    pub fn is_dry_run(&self) -> bool { self.dry_run_path.is_some() }

    pub async fn summarize(
        &self,
        category: ReportCategory,
        raw_text: &str,
    ) -> Result<String, SynthesisError> {
        if category != self.category {
            return Err(SynthesisError::CategoryMismatch { expected: self.category, actual: category });
        }
        if let Some(path) = &self.dry_run_path {
            self.write_payload(path, raw_text)?;
            return Ok(DRY_RUN_SENTINEL.to_string());
        }
        let report = self.backend.complete(&self.system_prompt, raw_text).await?;
        if report.trim().is_empty() {
            return Err(SynthesisError::Empty);
        }
        Ok(report)
    }

    fn write_payload(&self, path: &Path, raw_text: &str) -> Result<(), SynthesisError> {
        let messages = [
            ChatMessage { role: "system", content: &self.system_prompt },
            ChatMessage { role: "user", content: raw_text },
        ];
        // Serializing borrowed strings cannot fail
        let payload = serde_json::to_string_pretty(&messages).unwrap_or_default();
        atomic_write(path, payload.as_bytes()).map_err(SynthesisError::DryRun)?;
        tracing::info!("Dry run: {} prompt saved to {}", self.category, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingBackend {
        calls: AtomicUsize,
        reply: String,
    }

    impl CountingBackend {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), reply: reply.to_string() })
        }
    }

    #[async_trait]
    impl Completion for CountingBackend {
        async fn complete(&self, system_prompt: &str, _user_text: &str) -> Result<String, SynthesisError> {
            assert!(!system_prompt.is_empty());
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn test_summarize_uses_backend() {
        let backend = CountingBackend::new("Summary: 2 commits");
        let synthesizer = Synthesizer::new(ReportCategory::RepositoryActivity, "prompt", backend.clone());
        let report = synthesizer
            .summarize(ReportCategory::RepositoryActivity, "commit A, commit B")
            .await
            .unwrap();
        assert_eq!(report, "Summary: 2 commits");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dry_run_never_calls_backend() {
        let dir = tempfile::tempdir().unwrap();
        let payload_path = dir.path().join("daily_progress").join("prompt.txt");
        let backend = CountingBackend::new("unused");
        let synthesizer = Synthesizer::new(ReportCategory::NewsDigest, "news prompt", backend.clone())
            .with_dry_run(&payload_path);
        assert!(synthesizer.is_dry_run());

        for _ in 0..3 {
            let report =
                synthesizer.summarize(ReportCategory::NewsDigest, "# Top stories").await.unwrap();
            assert_eq!(report, DRY_RUN_SENTINEL);
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

        let payload: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&payload_path).unwrap()).unwrap();
        assert_eq!(
            payload,
            serde_json::json!([
                { "role": "system", "content": "news prompt" },
                { "role": "user", "content": "# Top stories" }
            ])
        );
    }

    #[tokio::test]
    async fn test_category_mismatch() {
        let backend = CountingBackend::new("unused");
        let synthesizer = Synthesizer::new(ReportCategory::NewsDigest, "prompt", backend.clone());
        let err = synthesizer.summarize(ReportCategory::RepositoryActivity, "text").await.unwrap_err();
        assert!(matches!(err, SynthesisError::CategoryMismatch {
            expected: ReportCategory::NewsDigest,
            actual: ReportCategory::RepositoryActivity,
        }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_completion_is_an_error() {
        let synthesizer =
            Synthesizer::new(ReportCategory::NewsDigest, "prompt", CountingBackend::new("  \n"));
        let err = synthesizer.summarize(ReportCategory::NewsDigest, "text").await.unwrap_err();
        assert!(matches!(err, SynthesisError::Empty));
    }

    #[test]
    fn test_from_config_prompts() {
        let dir = tempfile::tempdir().unwrap();
        let prompt_path = dir.path().join("news.txt");
        std::fs::write(&prompt_path, "custom news prompt").unwrap();
        let mut config = LlmConfig::default();
        config.prompts.news_digest = Some(prompt_path);

        let backend = CountingBackend::new("unused");
        let news = Synthesizer::from_config(ReportCategory::NewsDigest, &config, backend.clone()).unwrap();
        assert_eq!(news.system_prompt(), "custom news prompt");
        assert!(!news.is_dry_run());

        let repos =
            Synthesizer::from_config(ReportCategory::RepositoryActivity, &config, backend).unwrap();
        assert_eq!(repos.system_prompt(), default_prompt(ReportCategory::RepositoryActivity));
    }
}
