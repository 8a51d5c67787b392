use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use sentinel_core::{config::OpenAiConfig, error::SynthesisError};

use crate::Completion;

/// Chat-completions backend for any OpenAI-compatible API.
pub struct OpenAi {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAi {
    pub fn new(config: &OpenAiConfig) -> Self {
        let mut client_config = OpenAIConfig::new().with_api_key(config.api_key.clone());
        if let Some(api_base) = &config.api_base {
            client_config = client_config.with_api_base(api_base.clone());
        }
        Self {
            client: Client::with_config(client_config),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    #[allow(deprecated)]
    fn request(
        &self,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<CreateChatCompletionRequest, OpenAIError> {
        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default().content(user_text).build()?.into(),
            ])
            .build()
    }
}

#[async_trait]
impl Completion for OpenAi {
    async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String, SynthesisError> {
        let request = self
            .request(system_prompt, user_text)
            .map_err(|e| SynthesisError::Unreachable(Box::new(e)))?;
        tracing::info!("Requesting completion from {}", self.model);
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| SynthesisError::Unreachable(Box::new(e)))?;
        tracing::debug!(
            "Completion {} finished (usage: {:?})",
            response.id,
            response.usage.as_ref().map(|u| u.total_tokens)
        );
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(SynthesisError::Empty)
    }
}
