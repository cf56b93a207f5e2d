use anyhow::{bail, Context, Result};

const DEFAULT_NOTION_BASE_URL: &str = "https://api.notion.com";
const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub rate_limit_per_min: usize,
}

#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub token: String,
    /// Overridable so tests can point the client at a local mock server.
    pub base_url: String,
    pub db_profiles: String,
    pub db_listings: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub channel_id: String,
    pub channel_invite_link: String,
    pub webapp_url: Option<String>,
    pub telegram_api_base: String,
    pub http: HttpConfig,
    pub notion: NotionConfig,
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("missing required env var: {name}"))
}

fn parse_port(value: &str) -> Result<u16> {
    match value.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => bail!("API_PORT must be a valid port number, received {value}"),
    }
}

fn parse_cors_origins(value: Option<String>) -> Vec<String> {
    match value {
        None => vec!["*".to_string()],
        Some(raw) => raw
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect(),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let http = HttpConfig {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_port(&std::env::var("API_PORT").unwrap_or_else(|_| "8080".to_string()))?,
            cors_origins: parse_cors_origins(std::env::var("API_CORS_ORIGINS").ok()),
            rate_limit_per_min: std::env::var("RATE_LIMIT_PER_MIN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
        };

        let notion = NotionConfig {
            token: require_env("NOTION_TOKEN")?,
            base_url: std::env::var("NOTION_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_NOTION_BASE_URL.to_string()),
            db_profiles: require_env("NOTION_DB_PROFILES")?,
            db_listings: require_env("NOTION_DB_LISTINGS")?,
        };

        Ok(Self {
            bot_token: require_env("BOT_TOKEN")?,
            channel_id: require_env("CHANNEL_ID")?,
            channel_invite_link: require_env("CHANNEL_INVITE_LINK")?,
            webapp_url: std::env::var("WEBAPP_URL")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            telegram_api_base: std::env::var("TELEGRAM_API_BASE")
                .unwrap_or_else(|_| DEFAULT_TELEGRAM_API_BASE.to_string()),
            http,
            notion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_parsing_rejects_garbage() {
        assert!(parse_port("8080").is_ok());
        assert!(parse_port("0").is_err());
        assert!(parse_port("not-a-port").is_err());
        assert!(parse_port("70000").is_err());
    }

    #[test]
    fn cors_origins_default_to_wildcard() {
        assert_eq!(parse_cors_origins(None), vec!["*".to_string()]);
    }

    #[test]
    fn cors_origins_split_and_trim() {
        let origins = parse_cors_origins(Some(
            "https://a.example, https://b.example ,".to_string(),
        ));
        assert_eq!(
            origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
