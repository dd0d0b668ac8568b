use std::env;

use crate::constants::{AUTH_COOKIE_PREFIX, SESSION_COOKIE_SUFFIX};

/// Which Session Store implementation backs the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Supabase,
    Memory,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub site_url: String,
    pub store_backend: StoreBackend,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub oauth_provider: String,
    pub allowed_origins: Vec<String>,
    pub session_refresh_timeout_ms: u64,
    pub store_timeout_secs: u64,
    pub environment: String,
    pub log_requests: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists (development)
        dotenvy::dotenv().ok();

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| "Invalid SERVER_PORT")?;

        let site_url = env::var("SITE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "supabase".to_string())
            .to_lowercase()
            .as_str()
        {
            "supabase" => StoreBackend::Supabase,
            "memory" => StoreBackend::Memory,
            other => return Err(format!("Invalid STORE_BACKEND: {}", other)),
        };

        let (supabase_url, supabase_anon_key) = match store_backend {
            StoreBackend::Supabase => (
                env::var("SUPABASE_URL").map_err(|_| "SUPABASE_URL must be set")?,
                env::var("SUPABASE_ANON_KEY").map_err(|_| "SUPABASE_ANON_KEY must be set")?,
            ),
            StoreBackend::Memory => (
                env::var("SUPABASE_URL").unwrap_or_default(),
                env::var("SUPABASE_ANON_KEY").unwrap_or_default(),
            ),
        };

        let oauth_provider = env::var("OAUTH_PROVIDER").unwrap_or_else(|_| "google".to_string());

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| site_url.clone())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let session_refresh_timeout_ms = env::var("SESSION_REFRESH_TIMEOUT_MS")
            .unwrap_or_else(|_| "1500".to_string())
            .parse()
            .map_err(|_| "Invalid SESSION_REFRESH_TIMEOUT_MS")?;

        let store_timeout_secs = env::var("STORE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| "Invalid STORE_TIMEOUT_SECS")?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let log_requests = env::var("LOG_REQUESTS")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        Ok(Config {
            server_host,
            server_port,
            site_url,
            store_backend,
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            supabase_anon_key,
            oauth_provider,
            allowed_origins,
            session_refresh_timeout_ms,
            store_timeout_secs,
            environment,
            log_requests,
        })
    }

    /// Get server address as string
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Address the auth provider sends the browser back to
    pub fn callback_url(&self) -> String {
        format!("{}/auth/callback", self.site_url)
    }

    pub fn secure_cookies(&self) -> bool {
        self.environment == "production"
    }

    /// Project reference: first DNS label of the backend URL
    ///
    /// `https://abcd1234.supabase.co` -> `abcd1234`. Falls back to `local`
    /// when the URL is empty or has no host (memory backend).
    pub fn project_ref(&self) -> String {
        reqwest::Url::parse(&self.supabase_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .and_then(|host| host.split('.').next().map(str::to_string))
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| "local".to_string())
    }

    /// Primary session cookie name, e.g. `sb-abcd1234-auth-token`
    pub fn session_cookie_name(&self) -> String {
        format!(
            "{}{}{}",
            AUTH_COOKIE_PREFIX,
            self.project_ref(),
            SESSION_COOKIE_SUFFIX
        )
    }
}
