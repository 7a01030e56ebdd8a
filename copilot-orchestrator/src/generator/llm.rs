//! OpenAI-compatible chat completion generator

use std::time::Duration;

use async_trait::async_trait;
use copilot_core::domain::spec::PipelineSpec;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{CodeGenerator, GeneratedPipeline, GenerationError};

const SYSTEM_PROMPT: &str = r#"You are a data engineer who turns a request into an ETL pipeline.
Answer with a single JSON object and nothing else:

{
  "spec": {
    "name": "snake_case_name",
    "description": "one sentence",
    "source": {"kind": "file", "path": "data/x.csv", "format": "csv"}
           | {"kind": "database", "table": "x"}
           | {"kind": "api", "url": "https://..."},
    "transforms": [
      {"op": "select|filter|cast|join|aggregate|dedupe|derive",
       "description": "what the step does",
       "tables": ["extra tables read by this step, joins only"]}
    ],
    "target": {"kind": "table", "name": "x"}
           | {"kind": "file", "path": "out/x.parquet", "format": "csv|json|jsonl|parquet"},
    "schedule": "manual | @daily | five-field cron",
    "allow_destructive": false
  },
  "code": "Lua 5.4 script"
}

Rules for the Lua script:
- It receives a global `ctx` with `ctx.read(source)`, `ctx.sql(query)`, `ctx.write(target, rows)` and `ctx.input`.
- Only reference the tables and files declared in the spec.
- Never drop, truncate or delete unless the request explicitly asks for it; then set "allow_destructive": true.
- Do not use os.execute, os.remove or io.popen.
"#;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct GeneratorDocument {
    spec: serde_json::Value,
    code: String,
}

pub struct LlmCodeGenerator {
    api_base: String,
    api_key: Option<String>,
    model: String,
    client: Client,
}

impl LlmCodeGenerator {
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::NotConfigured(e.to_string()))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl CodeGenerator for LlmCodeGenerator {
    async fn generate(&self, request_text: &str) -> Result<GeneratedPipeline, GenerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GenerationError::NotConfigured("no LLM API key set".to_string()))?;

        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: request_text,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        tracing::debug!("Requesting pipeline generation from {}", self.model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidOutput(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::InvalidOutput("empty completion".to_string()))?;

        parse_completion(&content)
    }
}

/// Parse a completion body into a spec and code pair
fn parse_completion(content: &str) -> Result<GeneratedPipeline, GenerationError> {
    let document: GeneratorDocument = serde_json::from_str(strip_fences(content))
        .map_err(|e| GenerationError::InvalidOutput(format!("not a pipeline document: {e}")))?;

    let code = strip_fences(&document.code).to_string();
    if code.trim().is_empty() {
        return Err(GenerationError::InvalidOutput("empty code".to_string()));
    }

    Ok(GeneratedPipeline {
        spec: PipelineSpec::from_value(document.spec),
        code,
    })
}

/// Remove a surrounding markdown code fence, if any
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
