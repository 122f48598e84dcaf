pub mod config;
pub mod structured_logging;

pub use config::{
    ConfigLoader, ConfigSource, ConfigValidator, EmailSettings, LoggingSettings, MonitoringConfig,
    NotificationConfig, OracleConfig, ServiceCheck, ServiceTarget, SlackSettings, SniffConfig,
    WebhookSettings,
};

pub use structured_logging::{
    init_structured_logging, ExecutionContext, LoggingConfig, OperationTimer, StructuredLogEntry,
};
