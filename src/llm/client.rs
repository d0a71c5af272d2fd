use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::{GenerateRequest, GenerateResponse, Provider};
use crate::error::ReportError;
use crate::telemetry::metrics::{GEN_AI_ERROR_COUNT, GEN_AI_OPERATION_DURATION, GEN_AI_TOKEN_USAGE};

/// Best-effort chat client: one attempt per call, bounded by `timeout`.
/// Provider errors come back as [`ReportError::Llm`].
pub struct LlmClient {
    provider: Arc<dyn Provider>,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, ReportError> {
        let provider_name = self.provider.name().to_string();
        let span_display_name = format!("gen_ai.chat {}", req.model);
        let start = Instant::now();

        let span = tracing::info_span!(
            "gen_ai.chat",
            otel.name = %span_display_name,
            gen_ai.operation.name = "chat",
            gen_ai.provider.name = %provider_name,
            gen_ai.request.model = %req.model,
            gen_ai.request.temperature = req.temperature,
            gen_ai.request.max_tokens = req.max_tokens as i64,
            gen_ai.response.model = tracing::field::Empty,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            gen_ai.response.finish_reasons = tracing::field::Empty,
            report.stage = %req.stage,
            otel.status_code = tracing::field::Empty,
            error.type = tracing::field::Empty,
        );

        {
            let mut user_event_attrs =
                vec![KeyValue::new("gen_ai.prompt", truncate(&req.prompt, 1000))];
            if !req.system.is_empty() {
                user_event_attrs.push(KeyValue::new(
                    "gen_ai.system_instructions",
                    truncate(&req.system, 500),
                ));
            }
            span.add_event("gen_ai.user.message", user_event_attrs);
        }

        let result = match tokio::time::timeout(
            self.timeout,
            self.provider.generate(req).instrument(span.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "LLM call timed out after {}s",
                self.timeout.as_secs()
            )),
        };

        let duration = start.elapsed().as_secs_f64();

        match result {
            Ok(resp) => {
                span.record("gen_ai.response.model", resp.model.as_str());
                span.record("gen_ai.usage.input_tokens", resp.input_tokens as i64);
                span.record("gen_ai.usage.output_tokens", resp.output_tokens as i64);
                if !resp.finish_reason.is_empty() {
                    span.record(
                        "gen_ai.response.finish_reasons",
                        resp.finish_reason.as_str(),
                    );
                }

                span.add_event(
                    "gen_ai.assistant.message",
                    vec![KeyValue::new(
                        "gen_ai.completion",
                        truncate(&resp.content, 2000),
                    )],
                );

                let op_kv = KeyValue::new("gen_ai.operation.name", "chat");
                let provider_kv = KeyValue::new("gen_ai.provider.name", provider_name);
                let model_kv = KeyValue::new("gen_ai.request.model", resp.model.clone());

                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.input_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "input"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.output_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "output"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_OPERATION_DURATION.record(duration, &[op_kv, provider_kv, model_kv]);

                Ok(resp)
            }
            Err(err) => {
                span.record("otel.status_code", "ERROR");
                span.record("error.type", classify_error(&err));

                GEN_AI_ERROR_COUNT.add(
                    1,
                    &[
                        KeyValue::new("gen_ai.provider.name", provider_name),
                        KeyValue::new("gen_ai.request.model", req.model.clone()),
                    ],
                );

                Err(ReportError::Llm(format!("{err:#}")))
            }
        }
    }
}

fn classify_error(err: &anyhow::Error) -> &'static str {
    let msg = err.to_string().to_lowercase();
    if msg.contains("rate limit") || msg.contains("429") {
        "rate_limit"
    } else if msg.contains("timeout") || msg.contains("timed out") || msg.contains("deadline") {
        "timeout"
    } else if msg.contains("401")
        || msg.contains("403")
        || msg.contains("auth")
        || msg.contains("api key")
    {
        "auth_error"
    } else if msg.contains("400") || msg.contains("422") || msg.contains("invalid") {
        "invalid_request"
    } else if msg.contains("500")
        || msg.contains("502")
        || msg.contains("503")
        || msg.contains("server")
    {
        "server_error"
    } else if msg.contains("connect")
        || msg.contains("dns")
        || msg.contains("network")
        || msg.contains("reset")
    {
        "network_error"
    } else {
        "unknown_error"
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.char_indices()
            .take_while(|&(i, _)| i < max)
            .map(|(_, c)| c)
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use std::sync::Mutex;

    use super::*;

    /// Provider returning canned replies in order, or failing when exhausted.
    pub struct ScriptedProvider {
        replies: Mutex<Vec<anyhow::Result<String>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        pub fn new(replies: Vec<anyhow::Result<String>>) -> Self {
            let mut replies = replies;
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            self.prompts.lock().unwrap().push(req.prompt.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted reply left")))?;
            Ok(GenerateResponse {
                content: reply,
                model: req.model.clone(),
                input_tokens: 10,
                output_tokens: 5,
                finish_reason: "stop".to_string(),
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Provider that never answers.
    pub struct HangingProvider;

    #[async_trait::async_trait]
    impl Provider for HangingProvider {
        async fn generate(&self, _req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            std::future::pending().await
        }

        fn name(&self) -> &str {
            "hanging"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::stub::{HangingProvider, ScriptedProvider};
    use super::*;

    fn request() -> GenerateRequest {
        GenerateRequest {
            model: "gpt-4o-mini".to_string(),
            system: "system".to_string(),
            prompt: "prompt".to_string(),
            temperature: 0.7,
            max_tokens: 64,
            stage: "summarize".to_string(),
        }
    }

    #[tokio::test]
    async fn test_generate_passes_through_reply() {
        let client = LlmClient::new(
            Arc::new(ScriptedProvider::new(vec![Ok("hello".to_string())])),
            Duration::from_secs(5),
        );
        let resp = client.generate(&request()).await.unwrap();
        assert_eq!(resp.content, "hello");
        assert_eq!(client.provider_name(), "scripted");
    }

    #[tokio::test]
    async fn test_generate_single_attempt_on_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(anyhow::anyhow!("503 service unavailable")),
            Ok("second".to_string()),
        ]));
        let client = LlmClient::new(provider.clone(), Duration::from_secs(5));
        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, ReportError::Llm(_)));
        assert_eq!(err.to_string(), "LLM error: 503 service unavailable");
        assert_eq!(provider.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_times_out() {
        let client = LlmClient::new(Arc::new(HangingProvider), Duration::from_secs(30));
        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, ReportError::Llm(_)));
        assert_eq!(err.to_string(), "LLM error: LLM call timed out after 30s");
    }

    #[test]
    fn test_classify_error_categories() {
        let cases = vec![
            ("rate limit exceeded", "rate_limit"),
            ("status 429: too many requests", "rate_limit"),
            ("context deadline exceeded: timeout", "timeout"),
            ("request timed out", "timeout"),
            ("401 unauthorized", "auth_error"),
            ("invalid api key", "auth_error"),
            ("422 unprocessable entity", "invalid_request"),
            ("502 bad gateway", "server_error"),
            ("connection refused", "network_error"),
            ("something unexpected", "unknown_error"),
        ];

        for (msg, expected) in cases {
            let err = anyhow::anyhow!("{}", msg);
            assert_eq!(
                classify_error(&err),
                expected,
                "classify_error({msg:?}) should be {expected:?}"
            );
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 5), "hello");
        let result = truncate("hé世界!", 3);
        assert!(result.len() <= 3);
        assert!(result.is_char_boundary(result.len()));
    }
}
