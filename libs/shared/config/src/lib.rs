use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub auto_reschedule_enabled: bool,
    pub auto_reschedule_max_attempts: u32,
    pub auto_reschedule_window_hours: i64,
    pub notification_advance_notice_hours: i64,
    pub notification_max_attempts: u32,
    pub notification_retry_backoff_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind_address: env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            auto_reschedule_enabled: parse_env("AUTO_RESCHEDULE_ENABLED", true),
            auto_reschedule_max_attempts: parse_env("AUTO_RESCHEDULE_MAX_ATTEMPTS", 48),
            auto_reschedule_window_hours: parse_env("AUTO_RESCHEDULE_WINDOW_HOURS", 72),
            notification_advance_notice_hours: parse_env("NOTIFICATION_ADVANCE_NOTICE_HOURS", 24),
            notification_max_attempts: parse_env("NOTIFICATION_MAX_ATTEMPTS", 5),
            notification_retry_backoff_ms: parse_env("NOTIFICATION_RETRY_BACKOFF_MS", 500),
        }
    }
}

fn parse_env<T: std::str::FromStr + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("{} has invalid value '{}', using default {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}
