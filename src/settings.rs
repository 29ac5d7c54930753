use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Runtime settings, overridable via `PIN_`-prefixed environment variables
/// (e.g. `PIN_BOARD_URL`, `PIN_TARGET_COUNT`). Every option has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Feed or board URL the session scrapes.
    pub board_url: String,
    /// Login credentials; absent means scrape without logging in.
    pub email: Option<String>,
    pub password: Option<String>,
    /// How many unique pins to collect before stopping.
    pub target_count: usize,
    pub save_dir: String,
    pub db_path: String,
    /// Settle pause after each scroll, in seconds.
    pub scroll_pause_secs: f64,
    /// Bounds for the randomized delays between page interactions.
    pub delay_min_secs: f64,
    pub delay_max_secs: f64,
    pub max_scrolls: u32,
    /// Bounded wait for pin elements to attach, in seconds.
    pub wait_timeout_secs: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: String,
    pub locale: String,
    pub timezone: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            board_url: "https://br.pinterest.com/feed/".into(),
            email: None,
            password: None,
            target_count: 100,
            save_dir: "images".into(),
            db_path: "data/pins.sqlite".into(),
            scroll_pause_secs: 2.0,
            delay_min_secs: 1.5,
            delay_max_secs: 3.5,
            max_scrolls: 200,
            wait_timeout_secs: 10,
            viewport_width: 1280,
            viewport_height: 900,
            user_agent: DEFAULT_USER_AGENT.into(),
            locale: "pt-BR".into(),
            timezone: "America/Sao_Paulo".into(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix("PIN").try_parsing(true))
            .build()
            .context("Failed to read environment settings")?;
        cfg.try_deserialize()
            .context("Invalid value in PIN_* environment settings")
    }

    pub fn has_credentials(&self) -> bool {
        self.email.is_some() && self.password.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.target_count, 100);
        assert_eq!(s.max_scrolls, 200);
        assert!(s.delay_min_secs < s.delay_max_secs);
        assert!(s.board_url.starts_with("https://"));
        assert!(!s.has_credentials());
    }

    #[test]
    fn credentials_require_both_fields() {
        let s = Settings {
            email: Some("user@example.com".into()),
            ..Settings::default()
        };
        assert!(!s.has_credentials());
    }
}
