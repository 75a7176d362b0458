use std::time::Duration;

use hirelink_api::ApiConfig;
use hirelink_sync::DEFAULT_POLL_INTERVAL;

use super::{AppConfig, load_config_text};

const MIN_POLL_MS: u64 = 100;
const DEFAULT_DB_PATH: &str = "hirelink.db";

pub(crate) fn load_app_config() -> AppConfig {
    let text = load_config_text();
    let config = parse_app_config(text.as_deref());
    apply_env_overrides(config, |key| std::env::var(key).ok())
}

pub(crate) fn default_app_config() -> AppConfig {
    AppConfig {
        api: ApiConfig::default(),
        poll_interval: DEFAULT_POLL_INTERVAL,
        db_path: DEFAULT_DB_PATH.to_string(),
        load_error: None,
    }
}

pub(crate) fn parse_app_config(content: Option<&str>) -> AppConfig {
    let mut config = default_app_config();
    let Some(content) = content else {
        return config;
    };
    let value: toml::Value = match toml::from_str(content) {
        Ok(value) => value,
        Err(err) => {
            config.load_error = Some(err.to_string());
            return config;
        }
    };

    if let Some(api) = value.get("api") {
        let string_at = |key: &str| {
            api.get(key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        if let Some(v) = string_at("base_url") {
            config.api.base_url = v;
        }
        if let Some(v) = string_at("conversations_path") {
            config.api.conversations_path = v;
        }
        if let Some(v) = string_at("reply_path") {
            config.api.reply_path = v;
        }
        if let Some(v) = string_at("mark_read_path") {
            config.api.mark_read_path = v;
        }
        if let Some(v) = string_at("login_path") {
            config.api.login_path = v;
        }
        if let Some(secs) = api
            .get("timeout_secs")
            .and_then(|v| v.as_integer())
            .filter(|v| *v > 0)
        {
            config.api.timeout = Duration::from_secs(secs as u64);
        }
    }

    if let Some(ms) = value
        .get("poll")
        .and_then(|p| p.get("interval_ms"))
        .and_then(|v| v.as_integer())
    {
        config.poll_interval = poll_interval_from_ms(ms);
    }

    if let Some(path) = value
        .get("store")
        .and_then(|s| s.get("db_path"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
    {
        config.db_path = path.to_string();
    }
    config
}

pub(crate) fn apply_env_overrides(
    mut config: AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> AppConfig {
    if let Some(url) = lookup("HIRELINK_API_URL").filter(|v| !v.trim().is_empty()) {
        config.api.base_url = url.trim().to_string();
    }
    if let Some(ms) = lookup("HIRELINK_POLL_MS").and_then(|v| v.trim().parse::<i64>().ok()) {
        config.poll_interval = poll_interval_from_ms(ms);
    }
    if let Some(path) = lookup("HIRELINK_DB").filter(|v| !v.trim().is_empty()) {
        config.db_path = path;
    }
    config
}

fn poll_interval_from_ms(ms: i64) -> Duration {
    Duration::from_millis((ms.max(0) as u64).max(MIN_POLL_MS))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::{apply_env_overrides, default_app_config, parse_app_config};

    #[test]
    fn missing_file_gives_defaults() {
        let config = parse_app_config(None);
        assert_eq!(config, default_app_config());
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.api.reply_path, "/api/trpc/messages.reply");
    }

    #[test]
    fn sections_override_defaults() {
        let config = parse_app_config(Some(
            r#"
[api]
base_url = "https://hire.example.com"
timeout_secs = 5

[poll]
interval_ms = 2500

[store]
db_path = "/tmp/hl.db"
"#,
        ));
        assert_eq!(config.api.base_url, "https://hire.example.com");
        assert_eq!(config.api.timeout, Duration::from_secs(5));
        assert_eq!(config.api.login_path, "/api/auth/login/");
        assert_eq!(config.poll_interval, Duration::from_millis(2500));
        assert_eq!(config.db_path, "/tmp/hl.db");
        assert!(config.load_error.is_none());
    }

    #[test]
    fn bad_values_fall_back() {
        let config = parse_app_config(Some(
            r#"
[api]
base_url = ""
timeout_secs = -3

[poll]
interval_ms = 5
"#,
        ));
        assert_eq!(config.api.base_url, "http://localhost:3000");
        assert_eq!(config.api.timeout, Duration::from_secs(15));
        assert_eq!(config.poll_interval, Duration::from_millis(100));

        let broken = parse_app_config(Some("[api"));
        assert!(broken.load_error.is_some());
        assert_eq!(broken.db_path, "hirelink.db");
    }

    #[test]
    fn env_wins_over_file() {
        let env: HashMap<&str, &str> = [
            ("HIRELINK_API_URL", "http://staging:8000"),
            ("HIRELINK_POLL_MS", "750"),
            ("HIRELINK_DB", "other.db"),
        ]
        .into_iter()
        .collect();
        let config = apply_env_overrides(default_app_config(), |key| {
            env.get(key).map(|v| v.to_string())
        });
        assert_eq!(config.api.base_url, "http://staging:8000");
        assert_eq!(config.poll_interval, Duration::from_millis(750));
        assert_eq!(config.db_path, "other.db");

        let untouched = apply_env_overrides(default_app_config(), |_| None);
        assert_eq!(untouched, default_app_config());
    }
}
