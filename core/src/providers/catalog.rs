//! Static catalogue of the providers a credential can be validated against.
//!
//! Every provider is described by a [`ProviderSeed`] row instead of bespoke
//! code paths; the only provider whose target depends on runtime data is
//! [`Provider::Custom`], whose base URL comes from the settings store.

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::probe::ProbeMethod;
use crate::errors::ValidationError;
use crate::settings::SettingsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "xai")]
    XAI,
    #[serde(rename = "google")]
    GoogleAI,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "perplexity")]
    Perplexity,
    #[serde(rename = "custom")]
    Custom,
}

impl Provider {
    pub const COUNT: usize = 7;

    /// All providers in catalogue order.
    pub const ALL: [Provider; Provider::COUNT] = [
        Provider::OpenAI,
        Provider::Anthropic,
        Provider::XAI,
        Provider::GoogleAI,
        Provider::DeepSeek,
        Provider::Perplexity,
        Provider::Custom,
    ];

    /// Stable identifier used as the storage key.
    pub fn id(self) -> &'static str {
        self.seed().id
    }

    pub fn display_name(self) -> &'static str {
        self.seed().display
    }

    pub fn is_custom(self) -> bool {
        matches!(self, Provider::Custom)
    }

    pub fn seed(self) -> &'static ProviderSeed {
        match self {
            Provider::OpenAI => &PROVIDER_SEEDS[0],
            Provider::Anthropic => &PROVIDER_SEEDS[1],
            Provider::XAI => &PROVIDER_SEEDS[2],
            Provider::GoogleAI => &PROVIDER_SEEDS[3],
            Provider::DeepSeek => &PROVIDER_SEEDS[4],
            Provider::Perplexity => &PROVIDER_SEEDS[5],
            Provider::Custom => &PROVIDER_SEEDS[6],
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.id() == s)
            .ok_or_else(|| anyhow!("Unknown AI provider: {s}"))
    }
}

/// How the credential is attached to the probe request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <credential>`.
    Bearer,
    /// Credential sent verbatim in the named header.
    Header(&'static str),
}

/// Static description of a provider's validation probe.
#[derive(Debug)]
pub struct ProviderSeed {
    pub provider: Provider,
    pub id: &'static str,
    pub display: &'static str,
    /// Empty for [`Provider::Custom`]; resolved from settings instead.
    pub base_url: &'static str,
    pub probe_method: ProbeMethod,
    pub probe_path: &'static str,
    pub auth: AuthScheme,
    pub extra_headers: &'static [(&'static str, &'static str)],
}

pub static PROVIDER_SEEDS: [ProviderSeed; Provider::COUNT] = [
    ProviderSeed {
        provider: Provider::OpenAI,
        id: "openai",
        display: "OpenAI",
        base_url: "https://api.openai.com/v1",
        probe_method: ProbeMethod::Get,
        probe_path: "/models",
        auth: AuthScheme::Bearer,
        extra_headers: &[],
    },
    ProviderSeed {
        provider: Provider::Anthropic,
        id: "anthropic",
        display: "Anthropic",
        base_url: "https://api.anthropic.com/v1",
        probe_method: ProbeMethod::Get,
        probe_path: "/models",
        auth: AuthScheme::Header("x-api-key"),
        extra_headers: &[("anthropic-version", "2023-06-01")],
    },
    ProviderSeed {
        provider: Provider::XAI,
        id: "xai",
        display: "xAI",
        base_url: "https://api.x.ai/v1",
        probe_method: ProbeMethod::Get,
        probe_path: "/models",
        auth: AuthScheme::Bearer,
        extra_headers: &[],
    },
    ProviderSeed {
        provider: Provider::GoogleAI,
        id: "google",
        display: "Google AI",
        base_url: "https://generativelanguage.googleapis.com/v1beta",
        probe_method: ProbeMethod::Get,
        probe_path: "/models",
        auth: AuthScheme::Header("x-goog-api-key"),
        extra_headers: &[],
    },
    ProviderSeed {
        provider: Provider::DeepSeek,
        id: "deepseek",
        display: "DeepSeek",
        base_url: "https://api.deepseek.com",
        probe_method: ProbeMethod::Get,
        probe_path: "/models",
        auth: AuthScheme::Bearer,
        extra_headers: &[],
    },
    // Perplexity has no model listing endpoint; a one token completion is the
    // cheapest authenticated call.
    ProviderSeed {
        provider: Provider::Perplexity,
        id: "perplexity",
        display: "Perplexity",
        base_url: "https://api.perplexity.ai",
        probe_method: ProbeMethod::Post,
        probe_path: "/chat/completions",
        auth: AuthScheme::Bearer,
        extra_headers: &[],
    },
    ProviderSeed {
        provider: Provider::Custom,
        id: "custom",
        display: "Custom provider",
        base_url: "",
        probe_method: ProbeMethod::Get,
        probe_path: "/models",
        auth: AuthScheme::Bearer,
        extra_headers: &[],
    },
];

/// Resolved destination for a validation probe with the credential attached.
#[derive(Clone, PartialEq, Eq)]
pub struct EndpointTarget {
    pub provider: Provider,
    pub base_url: Url,
    pub credential: String,
}

impl fmt::Debug for EndpointTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointTarget")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url.as_str())
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// Resolve where the probe for `provider` should go.
///
/// `custom_provider_name` selects the [`CustomProviderConfig`] entry used when
/// `provider` is [`Provider::Custom`]; it is ignored otherwise.
///
/// [`CustomProviderConfig`]: crate::settings::CustomProviderConfig
pub async fn resolve_endpoint_target(
    provider: Provider,
    credential: &str,
    custom_provider_name: Option<&str>,
    settings: &dyn SettingsStore,
) -> Result<EndpointTarget, ValidationError> {
    let credential = credential.trim();
    if credential.is_empty() {
        return Err(ValidationError::InvalidConfiguration(format!(
            "{} API key is not configured",
            provider.display_name()
        )));
    }

    let base_url = match provider {
        Provider::Custom => {
            let name = custom_provider_name
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    ValidationError::InvalidConfiguration("no custom provider is selected".into())
                })?;
            let config = settings
                .custom_provider(name)
                .await
                .map_err(|err| ValidationError::Unknown(err.to_string()))?
                .ok_or_else(|| {
                    ValidationError::InvalidConfiguration(format!(
                        "custom provider '{name}' is not configured"
                    ))
                })?;
            parse_base_url(&config.base_url)?
        }
        builtin => Url::parse(builtin.seed().base_url)
            .map_err(|err| ValidationError::Unknown(err.to_string()))?,
    };

    Ok(EndpointTarget {
        provider,
        base_url,
        credential: credential.to_string(),
    })
}

/// Accept only absolute `http(s)` URLs with a host.
pub fn parse_base_url(raw: &str) -> Result<Url, ValidationError> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|err| {
        ValidationError::InvalidConfiguration(format!("invalid base URL '{trimmed}': {err}"))
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ValidationError::InvalidConfiguration(format!(
            "invalid base URL '{trimmed}': expected an http(s) address"
        )));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::CustomProviderConfig;
    use crate::validation::test_support::MemorySettings;

    #[test]
    fn ids_round_trip_and_seeds_line_up() {
        for provider in Provider::ALL {
            assert_eq!(provider.seed().provider, provider);
            assert_eq!(provider.id().parse::<Provider>().unwrap(), provider);
        }
        assert!("mistral".parse::<Provider>().is_err());
    }

    #[test]
    fn parse_base_url_rejects_non_http() {
        assert!(parse_base_url("https://llm.internal:8443/v1").is_ok());
        assert!(parse_base_url("  http://localhost:11434 ").is_ok());
        assert!(matches!(
            parse_base_url("not a url"),
            Err(ValidationError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            parse_base_url("file:///etc/passwd"),
            Err(ValidationError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn builtin_targets_use_catalogue_url() {
        let settings = MemorySettings::default();
        let target = resolve_endpoint_target(Provider::OpenAI, " sk-test ", None, &settings)
            .await
            .unwrap();
        assert_eq!(target.base_url.as_str(), "https://api.openai.com/v1");
        assert_eq!(target.credential, "sk-test");
    }

    #[tokio::test]
    async fn empty_credential_is_a_configuration_error() {
        let settings = MemorySettings::default();
        let err = resolve_endpoint_target(Provider::Anthropic, "   ", None, &settings)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn custom_target_requires_named_config() {
        let settings = MemorySettings::default();
        let err = resolve_endpoint_target(Provider::Custom, "tok", None, &settings)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfiguration(_)));

        let err = resolve_endpoint_target(Provider::Custom, "tok", Some("lab"), &settings)
            .await
            .unwrap_err();
        assert!(err.detail().contains("lab"));

        settings.add_custom(CustomProviderConfig {
            name: "lab".into(),
            base_url: "mailto:ops@example.com".into(),
        });
        let err = resolve_endpoint_target(Provider::Custom, "tok", Some("lab"), &settings)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfiguration(_)));

        settings.add_custom(CustomProviderConfig {
            name: "lab".into(),
            base_url: "https://llm.lab.example/v1/".into(),
        });
        let target = resolve_endpoint_target(Provider::Custom, "tok", Some("lab"), &settings)
            .await
            .unwrap();
        assert_eq!(target.base_url.host_str(), Some("llm.lab.example"));
    }
}
