//! SQL generation
//!
//! Builds a single-turn, schema-constrained prompt and asks the completion
//! model for one SELECT statement. Failures come back as prefixed text, never
//! as errors, so the pipeline can route them like any other rejection.

use crate::api::retriever::INDEX_UNAVAILABLE_PREFIX;
use crate::config::ModelConfig;
use crate::error::{QueryMindError, Result};
use crate::safety::{ERROR_PREFIX, LLM_ERROR_PREFIX, SELECT_ONLY, is_dangerous};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
    CreateChatCompletionRequestArgs,
};
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Label some models put in front of their answer
const SQL_QUERY_LABEL: &str = "sql query:";

/// Source of single-turn completions
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete `prompt` in one synchronous round trip
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Name of the model
    fn model_name(&self) -> &str;
}

/// Chat completions from any OpenAI-compatible endpoint (OpenAI, Ollama `/v1`)
pub struct OpenAiCompletion {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiCompletion {
    /// Create a completion client for the configured model and endpoint
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.api_key.clone())
            .with_api_base(config.api_base.clone());

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        log::info!(
            "Completion client ready: model {} at {}",
            config.completion_model,
            config.api_base
        );

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http_client),
            model: config.completion_model.clone(),
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let messages = vec![ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
            name: None,
        })];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.0)
            .build()?;

        let response = self.client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or_else(|| {
                log::error!("No content in chat response: {:?}", response);
                QueryMindError::Completion("No content in response".to_string())
            })?;

        Ok(content.clone())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Build the generation prompt for `question` over `context`
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an expert SQL assistant for MariaDB.
Generate a valid SQL SELECT query based on the user's question and the provided database schema.

RULES:
1. Use ONLY the exact table names and column names shown in the schema
2. Output ONLY the raw SQL SELECT query - no explanations, no markdown, no code blocks
3. Use proper SQL syntax with correct quotes and operators

Database Schema:
{}

User Question: {}

SQL Query:",
        context, question
    )
}

/// Strip code fences and a leading "SQL Query:" label from raw model text
pub fn clean_completion(raw: &str) -> String {
    let text = raw.trim().replace("```sql", "").replace("```", "");
    let text = text.trim();

    match text.get(..SQL_QUERY_LABEL.len()) {
        Some(label) if label.eq_ignore_ascii_case(SQL_QUERY_LABEL) => text[SQL_QUERY_LABEL.len()..].trim().to_string(),
        _ => text.to_string(),
    }
}

/// Turns a question plus retrieved context into raw SQL text
#[derive(Clone)]
pub struct SqlGenerator {
    completion: Arc<dyn CompletionProvider>,
}

impl SqlGenerator {
    pub fn new(completion: Arc<dyn CompletionProvider>) -> Self {
        Self { completion }
    }

    /// Generate SQL text for `question`.
    ///
    /// Returns the cleaned model text, or a value prefixed `"Error:"` (denied
    /// question, unusable context) or `"LLM Error:"` (provider failure). A
    /// denied question or unusable context never reaches the model.
    pub async fn generate(&self, question: &str, context: &str) -> String {
        if is_dangerous(question) {
            log::warn!("Blocked dangerous question before generation");
            return SELECT_ONLY.to_string();
        }

        if context.trim().is_empty() {
            return format!("{} No schema context available.", ERROR_PREFIX);
        }
        if context.starts_with(INDEX_UNAVAILABLE_PREFIX) || context.starts_with("Error") {
            return format!("{} {}", ERROR_PREFIX, context);
        }

        let prompt = build_prompt(question, context);
        log::debug!("Prompt length: {} chars", prompt.len());

        match self.completion.complete(&prompt).await {
            Ok(raw) => clean_completion(&raw),
            Err(e) => {
                log::error!("Completion with {} failed: {}", self.completion.model_name(), e);
                format!("{} {}", LLM_ERROR_PREFIX, e)
            }
        }
    }
}
