//! Builds the lightweight authenticated request used to check a credential.

use std::fmt;

use reqwest::Url;
use serde_json::{json, Value};

use super::catalog::{AuthScheme, EndpointTarget, Provider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMethod {
    Get,
    Post,
}

/// Description of a validation request. Building one performs no I/O.
#[derive(Clone, PartialEq)]
pub struct Probe {
    pub provider: Provider,
    pub method: ProbeMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Probe {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seed = self.provider.seed();
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(key, value)| {
                let secret = key.eq_ignore_ascii_case("authorization")
                    || matches!(seed.auth, AuthScheme::Header(name) if key.eq_ignore_ascii_case(name));
                (key.as_str(), if secret { "<redacted>" } else { value.as_str() })
            })
            .collect();
        f.debug_struct("Probe")
            .field("provider", &self.provider)
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &headers)
            .field("body", &self.body)
            .finish()
    }
}

/// Turn a resolved target into the provider's validation probe.
pub fn build_probe(target: &EndpointTarget) -> Probe {
    let seed = target.provider.seed();

    let mut url = target.base_url.clone();
    let path = format!("{}{}", url.path().trim_end_matches('/'), seed.probe_path);
    url.set_path(&path);

    let mut headers = vec![("accept".to_string(), "application/json".to_string())];
    match seed.auth {
        AuthScheme::Bearer => headers.push((
            "authorization".to_string(),
            format!("Bearer {}", target.credential),
        )),
        AuthScheme::Header(name) => headers.push((name.to_string(), target.credential.clone())),
    }
    for (name, value) in seed.extra_headers {
        headers.push((name.to_string(), value.to_string()));
    }

    let body = match target.provider {
        Provider::Perplexity => Some(json!({
            "model": "sonar",
            "max_tokens": 1,
            "messages": [{"role": "user", "content": "ping"}],
        })),
        _ => None,
    };
    if body.is_some() {
        headers.push(("content-type".to_string(), "application/json".to_string()));
    }

    Probe {
        provider: target.provider,
        method: seed.probe_method,
        url,
        headers,
        body,
    }
}
