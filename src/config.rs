// Gateway configuration loaded from environment variables.
// Decision: the routing surface (protected prefix, entry route, landing
// route) is a set of constants, not discovered at runtime.

use anyhow::{Context, Result};
use reqwest::Url;

/// Path prefix that requires a validated session (the member area).
pub const PROTECTED_PREFIX: &str = "/my";

/// Public entry route (login page). Matched exactly.
pub const ENTRY_PATH: &str = "/auth";

/// Where authenticated users land.
pub const LANDING_PATH: &str = "/my/lab";

/// Name of the session cookie written by the credential store adapter.
pub const SESSION_COOKIE: &str = "sp-auth-token";

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the Supabase-style auth backend.
    pub auth_url: String,
    /// Publishable (anon) API key sent with every backend call.
    pub anon_key: String,
    /// Base URL of the SPAIA device API.
    pub api_url: String,
    /// Host component of `api_url`; the outbound bearer allowlist.
    pub api_host: String,
    /// Port of `api_url` (scheme default when unspecified), matched
    /// together with the host so distinct local services are not conflated.
    pub api_port: Option<u16>,
    /// Public base URL of this gateway, used for email redirect targets.
    pub base_url: String,
    /// Socket address the server binds to.
    pub bind_addr: String,
}

impl GatewayConfig {
    pub fn new(
        auth_url: impl Into<String>,
        anon_key: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Result<Self> {
        let api_url = trim_trailing_slash(api_url.into());
        let parsed = Url::parse(&api_url).context("API URL must be absolute")?;
        let api_host = parsed
            .host_str()
            .context("API URL must have a host")?
            .to_string();

        Ok(Self {
            auth_url: trim_trailing_slash(auth_url.into()),
            anon_key: anon_key.into(),
            api_url,
            api_host,
            api_port: parsed.port_or_known_default(),
            base_url: "http://localhost:3000".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
        })
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let auth_url =
            std::env::var("SUPABASE_URL").context("SUPABASE_URL environment variable required")?;
        let anon_key = std::env::var("SUPABASE_ANON_KEY")
            .context("SUPABASE_ANON_KEY environment variable required")?;
        let api_url = std::env::var("SPAIA_API_URL")
            .unwrap_or_else(|_| "https://beta.api.spaia.earth".to_string());

        let mut config = Self::new(auth_url, anon_key, api_url)?;

        if let Ok(base_url) = std::env::var("BASE_URL") {
            config.base_url = trim_trailing_slash(base_url);
        }
        if let Ok(bind_addr) = std::env::var("BIND_ADDR") {
            config.bind_addr = bind_addr;
        }

        Ok(config)
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_host_and_port_derived() {
        let config =
            GatewayConfig::new("https://auth.example.com", "anon", "https://beta.api.spaia.earth")
                .unwrap();
        assert_eq!(config.api_host, "beta.api.spaia.earth");
        assert_eq!(config.api_port, Some(443));
    }

    #[test]
    fn test_explicit_port_kept() {
        let config =
            GatewayConfig::new("http://127.0.0.1:9999", "anon", "http://127.0.0.1:4100").unwrap();
        assert_eq!(config.api_host, "127.0.0.1");
        assert_eq!(config.api_port, Some(4100));
    }

    #[test]
    fn test_trailing_slashes_trimmed() {
        let config =
            GatewayConfig::new("https://auth.example.com/", "anon", "https://api.example.com//")
                .unwrap();
        assert_eq!(config.auth_url, "https://auth.example.com");
        assert_eq!(config.api_url, "https://api.example.com");
    }

    #[test]
    fn test_relative_api_url_rejected() {
        assert!(GatewayConfig::new("https://auth.example.com", "anon", "/devices").is_err());
    }
}
