mod client;
pub(crate) mod types;

use crate::error::AiError;
use crate::util::strip_code_blocks;

use client::ClaudeClient;
use types::*;

const TOOL_NAME: &str = "structured_response";

// =============================================================================
// Claude Agent
// =============================================================================

#[derive(Clone)]
pub struct Claude {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    http: reqwest::Client,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn client(&self) -> ClaudeClient {
        let client = ClaudeClient::new(&self.api_key, self.http.clone());
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }

    // =========================================================================
    // Structured output
    // =========================================================================

    /// Force a single tool call whose input must follow `schema`, returning the raw input.
    ///
    /// Falls back to parsing the text block as JSON when the model ignores the
    /// tool (older models occasionally do).
    pub async fn extract_value(
        &self,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        schema: serde_json::Value,
    ) -> Result<serde_json::Value, AiError> {
        let request = ChatRequest::new(&self.model)
            .system(system_prompt)
            .message(WireMessage::user(user_prompt))
            .max_tokens(4096)
            .temperature(0.0)
            .forced_tool(ToolDefinitionWire {
                name: TOOL_NAME.to_string(),
                description: "Return the structured result for the input.".to_string(),
                input_schema: schema,
            });

        let response = self.client().chat(&request).await?;

        if let Some(input) = response.tool_input() {
            return Ok(input.clone());
        }

        match response.text() {
            Some(text) => Ok(serde_json::from_str(strip_code_blocks(text))?),
            None => Err(AiError::MissingStructuredOutput),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claude_new() {
        let ai = Claude::new("sk-ant-test", "claude-haiku-4-5-20251001");
        assert_eq!(ai.model(), "claude-haiku-4-5-20251001");
        assert_eq!(ai.api_key, "sk-ant-test");
    }

    #[test]
    fn test_claude_with_base_url() {
        let ai = Claude::new("sk-ant-test", "claude-haiku-4-5-20251001")
            .with_base_url("https://custom.api.com");
        assert_eq!(ai.base_url, Some("https://custom.api.com".to_string()));
    }
}
