use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::Value;

use crate::errors::NetworkError;
use crate::providers::{Probe, ProbeMethod};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Performs validation probes. `Ok(())` means the provider accepted the
/// credential; timeout and cancellation policy belong to the implementation.
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    async fn execute(&self, probe: &Probe) -> Result<(), NetworkError>;
}

/// [`ProbeExecutor`] that sends probes over HTTPS with `reqwest`.
#[derive(Clone)]
pub struct HttpProbeExecutor {
    client: Client,
}

impl HttpProbeExecutor {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_PROBE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("TokenGate-Core/0.1")
            .build()
            .context("failed to construct HTTP client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProbeExecutor for HttpProbeExecutor {
    async fn execute(&self, probe: &Probe) -> Result<(), NetworkError> {
        let headers = header_map(probe)?;
        let method = match probe.method {
            ProbeMethod::Get => Method::GET,
            ProbeMethod::Post => Method::POST,
        };
        let mut request = self
            .client
            .request(method, probe.url.clone())
            .headers(headers);
        if let Some(body) = &probe.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body_text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body_text)
            .ok()
            .and_then(|payload| extract_error_message(&payload))
            .or_else(|| {
                let trimmed = body_text.trim();
                (!trimmed.is_empty()).then(|| trimmed.chars().take(300).collect())
            })
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request rejected")
                    .to_string()
            });

        Err(NetworkError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

fn header_map(probe: &Probe) -> Result<HeaderMap, NetworkError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &probe.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| NetworkError::InvalidRequest(format!("invalid header name {name}: {e}")))?;
        // The error must not echo the value: it carries the credential.
        let value = HeaderValue::from_str(value).map_err(|_| {
            NetworkError::InvalidRequest(format!("invalid characters in {name} header"))
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn classify_transport(err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout
    } else if err.is_builder() {
        NetworkError::InvalidRequest(err.to_string())
    } else {
        NetworkError::Transport(err.to_string())
    }
}

/// Pull a human readable message out of a provider error payload.
pub fn extract_error_message(payload: &Value) -> Option<String> {
    if let Some(error) = payload.get("error") {
        match error {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => {
                if let Some(Value::String(message)) = map.get("message") {
                    Some(message.clone())
                } else if let Some(Value::String(typ)) = map.get("type") {
                    Some(typ.clone())
                } else {
                    Some(error.to_string())
                }
            }
            other => Some(other.to_string()),
        }
    } else if let Some(Value::String(message)) = payload.get("message") {
        Some(message.clone())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{build_probe, EndpointTarget, Provider};
    use reqwest::Url;
    use serde_json::json;

    #[test]
    fn extracts_nested_and_flat_messages() {
        let openai = json!({"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}});
        assert_eq!(
            extract_error_message(&openai).as_deref(),
            Some("Incorrect API key provided")
        );
        let typed = json!({"error": {"type": "authentication_error"}});
        assert_eq!(
            extract_error_message(&typed).as_deref(),
            Some("authentication_error")
        );
        let flat = json!({"message": "Unauthorized"});
        assert_eq!(extract_error_message(&flat).as_deref(), Some("Unauthorized"));
        assert_eq!(extract_error_message(&json!({"data": []})), None);
    }

    #[test]
    fn header_map_rejects_control_characters_without_leaking() {
        let probe = build_probe(&EndpointTarget {
            provider: Provider::OpenAI,
            base_url: Url::parse("https://api.openai.com/v1").unwrap(),
            credential: "sk-bad\nkey".into(),
        });
        let err = header_map(&probe).unwrap_err();
        assert!(matches!(err, NetworkError::InvalidRequest(_)));
        assert!(!err.to_string().contains("sk-bad"));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_failure() {
        let executor = HttpProbeExecutor::with_timeout(Duration::from_secs(2)).unwrap();
        let probe = build_probe(&EndpointTarget {
            provider: Provider::Custom,
            base_url: Url::parse("http://127.0.0.1:1").unwrap(),
            credential: "tok".into(),
        });
        let err = executor.execute(&probe).await.unwrap_err();
        assert!(matches!(
            err,
            NetworkError::Transport(_) | NetworkError::Timeout
        ));
    }
}
