use serde::{Deserialize, Serialize};
use std::env;
use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Log output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    /// Human-readable format (default for development)
    #[default]
    Pretty,
    /// Compact text format
    Compact,
    /// JSON format for log aggregation systems
    Json,
}

impl LogFormat {
    /// Parse a format name, falling back to the default
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            "pretty" => Self::Pretty,
            _ => Self::default(),
        }
    }

    /// Parse log format from the `LOG_FORMAT` environment variable
    pub fn from_env() -> Self {
        Self::parse(&env::var("LOG_FORMAT").unwrap_or_default())
    }
}

/// Configuration for structured logging
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Service name (e.g., "density-service")
    pub service_name: String,
    pub service_version: String,
    /// Environment (dev/staging/production)
    pub environment: String,
    /// Enable span events (new/close)
    pub enable_span_events: bool,
    /// Directory for the daily rolling JSON log file, if file logging is on
    pub log_dir: Option<String>,
}

impl LogConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        let log_to_file = env::var("LOG_TO_FILE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false);

        Self {
            format: LogFormat::from_env(),
            service_name: service_name.into(),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            enable_span_events: env::var("LOG_SPAN_EVENTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            log_dir: if log_to_file {
                env::var("LOG_DIR").ok()
            } else {
                None
            },
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_span_events(mut self, enable: bool) -> Self {
        self.enable_span_events = enable;
        self
    }

    /// Also write JSON logs to a daily rolling file in `log_dir`
    pub fn with_file_logging(mut self, log_dir: impl Into<String>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    fn span_events(&self) -> FmtSpan {
        if self.enable_span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Keeps the file writer alive; dropping it flushes and stops file logging.
#[must_use = "dropping the guard stops file logging"]
#[derive(Default)]
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize structured logging with the given configuration
pub fn init_structured_logging(config: LogConfig) -> LogGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("hyper=warn".parse().expect("valid directive"))
        .add_directive("tokio=warn".parse().expect("valid directive"))
        .add_directive("ort=warn".parse().expect("valid directive"));

    let span_events = config.span_events();
    let mut guard = LogGuard::default();

    // Optional file layer; `Option<Layer>` is itself a layer
    let file_layer = config.log_dir.as_ref().map(|log_dir| {
        let file_appender =
            tracing_appender::rolling::daily(log_dir, format!("{}.log", config.service_name));
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        guard._file_guard = Some(file_guard);
        fmt::layer()
            .json()
            .with_span_events(config.span_events())
            .with_writer(non_blocking)
    });

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    match config.format {
        LogFormat::Json => {
            let json_layer = fmt::layer()
                .json()
                .with_span_events(span_events)
                .with_current_span(true)
                .with_span_list(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(io::stdout);

            registry.with(json_layer).init();
        }
        LogFormat::Compact => {
            let compact_layer = fmt::layer()
                .compact()
                .with_span_events(span_events)
                .with_target(true)
                .with_thread_ids(false);

            registry.with(compact_layer).init();
        }
        LogFormat::Pretty => {
            let pretty_layer = fmt::layer()
                .pretty()
                .with_span_events(span_events)
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true);

            registry.with(pretty_layer).init();
        }
    }

    tracing::info!(
        service.name = %config.service_name,
        service.version = %config.service_version,
        environment = %config.environment,
        format = ?config.format,
        file_logging = config.log_dir.is_some(),
        "structured logging initialized"
    );

    guard
}

/// Initialize logging with service name
pub fn init_with_service(service_name: impl Into<String>) -> LogGuard {
    init_structured_logging(LogConfig::new(service_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" Compact "), LogFormat::Compact);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("xml"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(""), LogFormat::Pretty);
    }

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new("test-service")
            .with_version("1.0.0")
            .with_environment("production")
            .with_format(LogFormat::Json)
            .with_span_events(true)
            .with_file_logging("/tmp/density-logs");

        assert_eq!(config.service_name, "test-service");
        assert_eq!(config.service_version, "1.0.0");
        assert_eq!(config.environment, "production");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.log_dir.as_deref(), Some("/tmp/density-logs"));
        assert_eq!(config.span_events(), FmtSpan::NEW | FmtSpan::CLOSE);
    }

    #[test]
    fn test_log_config_from_env() {
        std::env::set_var("SERVICE_VERSION", "2.0.0");
        std::env::set_var("ENVIRONMENT", "staging");
        std::env::set_var("LOG_TO_FILE", "false");
        std::env::set_var("LOG_DIR", "/var/log/density");

        let config = LogConfig::new("test-service");

        assert_eq!(config.service_version, "2.0.0");
        assert_eq!(config.environment, "staging");
        // LOG_DIR only counts when LOG_TO_FILE is on
        assert_eq!(config.log_dir, None);

        std::env::remove_var("SERVICE_VERSION");
        std::env::remove_var("ENVIRONMENT");
        std::env::remove_var("LOG_TO_FILE");
        std::env::remove_var("LOG_DIR");
    }
}
