use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stemline_core::config::LlmConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm api key is not configured")]
    MissingCredential,
    #[error("llm transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("llm response malformed: {0}")]
    Malformed(String),
    #[error("llm exchange timed out after {0:?}")]
    Timeout(Duration),
}

/// A function the model may call during a tool round.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

/// One part of a conversation turn: text, a requested function call, or a
/// function result fed back to the model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    pub fn text(value: impl Into<String>) -> Self {
        Self { text: Some(value.into()), ..Self::default() }
    }

    pub fn function_response(name: impl Into<String>, response: Value) -> Self {
        Self {
            function_response: Some(FunctionResponse { name: name.into(), response }),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self { role: "user".to_string(), parts }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self { role: "model".to_string(), parts }
    }

    /// Concatenated text parts of this turn.
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(|part| part.text.as_deref()).collect::<Vec<_>>().join("")
    }

    pub fn function_calls(&self) -> Vec<FunctionCall> {
        self.parts.iter().filter_map(|part| part.function_call.clone()).collect()
    }
}

/// One model turn: given the system prompt, tool declarations, and the
/// conversation so far, produce the next model content.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn send(
        &self,
        system: &str,
        tools: &[ToolDeclaration],
        contents: &[Content],
    ) -> Result<Content, LlmError>;
}

// ── request/response wire types ─────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: SystemInstruction<'a>,
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSet<'a>>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolSet<'a> {
    function_declarations: &'a [ToolDeclaration],
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<Content>,
}

/// `generateContent` client. Stateless: the caller owns the conversation
/// history and replays it every turn.
pub struct GeminiChatModel {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

impl GeminiChatModel {
    /// Fails immediately when no credential is configured; the runtime
    /// treats that as a non-retried adapter failure.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = match &config.api_key {
            Some(key) if !key.expose_secret().trim().is_empty() => key.clone(),
            _ => return Err(LlmError::MissingCredential),
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    async fn send(
        &self,
        system: &str,
        tools: &[ToolDeclaration],
        contents: &[Content],
    ) -> Result<Content, LlmError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateContentRequest {
            system_instruction: SystemInstruction { parts: vec![TextPart { text: system }] },
            contents,
            tools: if tools.is_empty() {
                Vec::new()
            } else {
                vec![ToolSet { function_declarations: tools }]
            },
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: GenerateContentResponse = response.json().await?;
        body.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .ok_or_else(|| LlmError::Malformed("response contained no candidates".to_string()))
    }
}

/// Declarations for the built-in tools, in the model-facing naming scheme
/// (function names cannot contain dots).
pub fn tool_declarations() -> Vec<ToolDeclaration> {
    vec![
        ToolDeclaration {
            name: "catalog_search".to_string(),
            description: "Search the music catalog for tracks matching a query. Returns track \
                          objects with id, title, genre, and explicit flag."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Genre name, mood, or keyword (e.g. 'deep house')"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of results (1-50, default 20)"
                    },
                    "allow_explicit": {
                        "type": "boolean",
                        "description": "Whether to include explicit tracks (default false)"
                    }
                },
                "required": ["query"]
            }),
        },
        ToolDeclaration {
            name: "pricing_quote".to_string(),
            description: "Get the USD price for a license type. Use this to check whether a \
                          track fits the remaining budget."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "license_type": {
                        "type": "string",
                        "description": "License type: 'personal', 'remix', or 'commercial'"
                    },
                    "volume": {
                        "type": "boolean",
                        "description": "Whether the volume discount applies (default false)"
                    }
                },
                "required": ["license_type"]
            }),
        },
        ToolDeclaration {
            name: "analytics_signal".to_string(),
            description: "Get play count and popularity score for a track.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "track_id": { "type": "string", "description": "The track to look up" }
                },
                "required": ["track_id"]
            }),
        },
        ToolDeclaration {
            name: "embeddings_similarity".to_string(),
            description: "Rank candidate tracks by similarity to a query, most similar first."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Mood/genre text to match" },
                    "candidates": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Track ids to rank"
                    }
                },
                "required": ["query", "candidates"]
            }),
        },
    ]
}

/// Map a model-facing function name back onto the registry name.
pub fn registry_tool_name(declared: &str) -> String {
    declared.replacen('_', ".", 1)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use stemline_core::config::LlmConfig;

    use super::{
        registry_tool_name, tool_declarations, Content, GeminiChatModel, LlmError, Part,
    };

    #[test]
    fn missing_credential_fails_immediately() {
        let config = LlmConfig {
            api_key: None,
            base_url: "https://example.invalid".to_string(),
            model: "gemini-2.5-flash".to_string(),
            timeout_secs: 30,
        };
        assert!(matches!(
            GeminiChatModel::from_config(&config),
            Err(LlmError::MissingCredential)
        ));

        let blank = LlmConfig { api_key: Some("   ".to_string().into()), ..config };
        assert!(matches!(GeminiChatModel::from_config(&blank), Err(LlmError::MissingCredential)));
    }

    #[test]
    fn declared_names_map_to_registry_names() {
        for declaration in tool_declarations() {
            let mapped = registry_tool_name(&declaration.name);
            assert!(
                matches!(
                    mapped.as_str(),
                    "catalog.search" | "pricing.quote" | "analytics.signal"
                        | "embeddings.similarity"
                ),
                "unexpected mapping {mapped}",
            );
        }
    }

    #[test]
    fn content_extracts_text_and_function_calls() {
        let content: Content = serde_json::from_value(json!({
            "role": "model",
            "parts": [
                { "text": "thinking... " },
                { "functionCall": { "name": "catalog_search", "args": { "query": "techno" } } },
                { "text": "done" }
            ]
        }))
        .expect("deserialize");

        assert_eq!(content.text(), "thinking... done");
        let calls = content.function_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "catalog_search");
        assert_eq!(calls[0].args["query"], "techno");
    }

    #[test]
    fn function_response_parts_serialize_camel_case() {
        let part = Part::function_response("catalog_search", json!({ "items": [] }));
        let value = serde_json::to_value(&part).expect("serialize");
        assert!(value.get("functionResponse").is_some());
        assert!(value.get("text").is_none());
    }
}
