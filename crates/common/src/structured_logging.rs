//! Logging setup: human-readable lines on stderr or one JSON object per
//! event on stdout, plus [`OperationTimer`] for timing named operations.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::io::Write;
use std::time::Instant;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// One JSON log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredLogEntry {
    /// RFC 3339
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ExecutionContext>,
}

/// Process identity attached to JSON lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub app_version: String,
    pub hostname: String,
    pub pid: u32,
}

impl ExecutionContext {
    pub fn current() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            hostname,
            pid: std::process::id(),
        }
    }
}

/// Collects event fields; `message` is split out when the entry is built
#[derive(Default)]
struct FieldCollector(BTreeMap<String, Value>);

impl FieldCollector {
    fn put(&mut self, field: &Field, value: impl Into<Value>) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn into_entry(
        mut self,
        event: &Event<'_>,
        context: Option<ExecutionContext>,
    ) -> StructuredLogEntry {
        let message = match self.0.remove("message") {
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let meta = event.metadata();
        StructuredLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            level: meta.level().as_str().to_string(),
            target: meta.target().to_string(),
            message,
            fields: self.0,
            context,
        }
    }
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.put(field, format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // NaN and infinities have no JSON form
        let value = Number::from_f64(value).map_or(Value::Null, Value::Number);
        self.put(field, value);
    }
}

/// Layer printing each event as a [`StructuredLogEntry`] on stdout
pub struct JsonFormatter {
    context: Option<ExecutionContext>,
}

impl JsonFormatter {
    pub fn new(include_context: bool) -> Self {
        Self {
            context: include_context.then(ExecutionContext::current),
        }
    }
}

impl<S> Layer<S> for JsonFormatter
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        event.record(&mut collector);
        let entry = collector.into_entry(event, self.context.clone());

        let Ok(line) = serde_json::to_string(&entry) else {
            return;
        };
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", line);
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Used when RUST_LOG is unset
    pub level: Level,
    pub json_output: bool,
    pub color_output: bool,
    pub include_context: bool,
    pub include_line_numbers: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_output: false,
            color_output: true,
            include_context: true,
            include_line_numbers: cfg!(debug_assertions),
        }
    }
}

impl LoggingConfig {
    /// From the `[logging]` config section; an unknown level falls back to info
    pub fn from_settings(settings: &crate::config::LoggingSettings) -> Self {
        Self {
            level: settings.level.parse().unwrap_or(Level::INFO),
            json_output: settings.json,
            ..Self::default()
        }
    }
}

/// Installs the global subscriber. Fails if one is already set.
pub fn init_structured_logging(config: LoggingConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(config.level.as_str()),
    };

    let output: Box<dyn Layer<Registry> + Send + Sync> = if config.json_output {
        JsonFormatter::new(config.include_context).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(config.color_output)
            .with_target(true)
            .with_thread_names(true)
            .with_line_number(config.include_line_numbers)
            .with_span_events(FmtSpan::CLOSE)
            .boxed()
    };

    let subscriber = Registry::default().with(output).with(filter);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Logs how long a named operation took, with any extra fields attached
pub struct OperationTimer {
    name: String,
    started: Instant,
    fields: Map<String, Value>,
}

impl OperationTimer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: Instant::now(),
            fields: Map::new(),
        }
    }

    /// Values that fail to serialize are skipped
    pub fn add_field(&mut self, key: impl Into<String>, value: impl Serialize) {
        if let Ok(value) = serde_json::to_value(value) {
            self.fields.insert(key.into(), value);
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn finish(self) -> u64 {
        let elapsed = self.elapsed_ms();
        let fields = serde_json::Value::Object(self.fields);
        tracing::info!(
            operation = %self.name,
            duration_ms = elapsed,
            success = true,
            fields = %fields,
            "Operation completed"
        );
        elapsed
    }

    pub fn finish_with_result<T, E: std::fmt::Display>(self, result: &Result<T, E>) -> u64 {
        let Err(error) = result else {
            return self.finish();
        };
        let elapsed = self.elapsed_ms();
        let fields = serde_json::Value::Object(self.fields);
        tracing::error!(
            operation = %self.name,
            duration_ms = elapsed,
            success = false,
            error = %error,
            fields = %fields,
            "Operation failed"
        );
        elapsed
    }
}
