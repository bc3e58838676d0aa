use thiserror::Error;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("ANTHROPIC_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Invalid request header: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Claude API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("No structured output in Claude response")]
    MissingStructuredOutput,

    /// The model answered, but the payload does not match the requested schema.
    #[error("Failed to deserialize response: {0}")]
    Schema(#[from] serde_json::Error),
}

impl AiError {
    /// True when the call reached the model and the response itself was unusable.
    pub fn is_schema_violation(&self) -> bool {
        matches!(self, AiError::Schema(_) | AiError::MissingStructuredOutput)
    }
}
