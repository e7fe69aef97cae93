//! Provider protocol mapping.
//!
//! One request/response shape per provider family: OpenAI-compatible chat
//! completions (the default), Anthropic Messages, and Google
//! `generateContent`. The router picks the URL, headers and body here and
//! reads the assistant text back out with `parse_content`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, RouterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
}

impl ProviderConfig {
    pub fn endpoint(&self, stream: bool) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.kind {
            ProviderKind::OpenAi => format!("{base}/v1/chat/completions"),
            ProviderKind::Anthropic => format!("{base}/v1/messages"),
            ProviderKind::Gemini => {
                let verb = if stream {
                    "streamGenerateContent?alt=sse"
                } else {
                    "generateContent"
                };
                format!("{base}/v1beta/models/{}:{verb}", self.model)
            }
        }
    }

    pub fn body(&self, system: &str, prompt: &str, stream: bool) -> Value {
        match self.kind {
            ProviderKind::OpenAi => json!({
                "model": self.model,
                "stream": stream,
                "messages": [
                    {"role": "system", "content": system},
                    {"role": "user", "content": prompt},
                ],
            }),
            ProviderKind::Anthropic => json!({
                "model": self.model,
                "max_tokens": 4096,
                "stream": stream,
                "system": system,
                "messages": [{"role": "user", "content": prompt}],
            }),
            ProviderKind::Gemini => json!({
                "systemInstruction": {"parts": [{"text": system}]},
                "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            }),
        }
    }

    pub fn apply_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req.header("Content-Type", "application/json");
        match (self.kind, &self.api_key) {
            (ProviderKind::OpenAi, Some(key)) => req.header("Authorization", format!("Bearer {key}")),
            (ProviderKind::Anthropic, Some(key)) => req
                .header("x-api-key", key.clone())
                .header("anthropic-version", "2023-06-01"),
            (ProviderKind::Gemini, Some(key)) => req.header("x-goog-api-key", key.clone()),
            (_, None) => req,
        }
    }
}

/// Pulls the assistant text out of a non-streaming response body.
pub fn parse_content(kind: ProviderKind, body: &Value) -> Result<String> {
    let content = match kind {
        ProviderKind::OpenAi => body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str),
        ProviderKind::Anthropic => body.pointer("/content/0/text").and_then(Value::as_str),
        ProviderKind::Gemini => body
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str),
    };
    content
        .map(str::to_string)
        .ok_or_else(|| RouterError::Malformed(format!("no content field for {kind:?}")))
}

/// Pulls the incremental text delta out of one SSE `data:` payload.
pub fn parse_stream_delta(kind: ProviderKind, data: &str) -> Option<String> {
    if data.trim() == "[DONE]" {
        return None;
    }
    let value: Value = serde_json::from_str(data).ok()?;
    let delta = match kind {
        ProviderKind::OpenAi => value
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str),
        ProviderKind::Anthropic => value.pointer("/delta/text").and_then(Value::as_str),
        ProviderKind::Gemini => value
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str),
    };
    delta.map(str::to_string)
}

/// Finds the outermost JSON object inside free-form model text. Providers
/// wrap JSON in prose or code fences often enough that strict parsing alone
/// is not viable.
pub fn extract_json(text: &str) -> Result<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return Ok(value);
    }
    let start = text
        .find('{')
        .ok_or_else(|| RouterError::Malformed("no JSON object in response".into()))?;
    let end = text
        .rfind('}')
        .ok_or_else(|| RouterError::Malformed("unterminated JSON object".into()))?;
    if end < start {
        return Err(RouterError::Malformed("unterminated JSON object".into()));
    }
    serde_json::from_str(&text[start..=end])
        .map_err(|e| RouterError::Malformed(format!("invalid JSON payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_content() {
        let body = json!({"choices": [{"message": {"content": "hello"}}]});
        assert_eq!(parse_content(ProviderKind::OpenAi, &body).unwrap(), "hello");
    }

    #[test]
    fn test_anthropic_content() {
        let body = json!({"content": [{"type": "text", "text": "hi"}]});
        assert_eq!(parse_content(ProviderKind::Anthropic, &body).unwrap(), "hi");
    }

    #[test]
    fn test_gemini_content() {
        let body = json!({"candidates": [{"content": {"parts": [{"text": "ok"}]}}]});
        assert_eq!(parse_content(ProviderKind::Gemini, &body).unwrap(), "ok");
    }

    #[test]
    fn test_extract_json_from_fenced_text() {
        let text = "Sure! Here is the result:\n```json\n{\"a\": 1}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_extract_json_rejects_prose() {
        assert!(extract_json("no json here").is_err());
    }

    #[test]
    fn test_stream_delta_done_marker() {
        assert!(parse_stream_delta(ProviderKind::OpenAi, "[DONE]").is_none());
    }
}
