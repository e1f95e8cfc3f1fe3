use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Logging settings: ENVIRONMENT, LOG_LEVEL and LOG_DIR.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub environment: String,
    pub level: LogLevel,
    pub dir: PathBuf,
}

impl LogConfig {
    pub fn from_env() -> Self {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let default_level = if environment == "production" {
            LogLevel::Info
        } else {
            LogLevel::Debug
        };

        Self {
            level: std::env::var("LOG_LEVEL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default_level),
            dir: std::env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("logs")),
            environment,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Directive used when RUST_LOG is not set.
    pub fn filter_directive(&self) -> String {
        format!("blog_backend={},tower_http=debug,axum=debug,sqlx=warn", self.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_round_trip_through_display() {
        for level in [LogLevel::Trace, LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
            assert_eq!(level.to_string().parse::<LogLevel>().unwrap(), level);
        }
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_filter_directive_targets_crate() {
        let config = LogConfig {
            environment: "production".to_string(),
            level: LogLevel::Info,
            dir: PathBuf::from("logs"),
        };
        assert!(config.is_production());
        assert!(config.filter_directive().starts_with("blog_backend=info"));
    }
}
