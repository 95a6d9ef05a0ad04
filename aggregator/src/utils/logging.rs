use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Span field shown in its own column by the pretty formatter.
const STAGE_FIELD: &str = "stage";

/// Fields recorded on a span, kept in its extensions so formatters can read them.
#[derive(Debug, Clone, Default)]
pub struct SpanFields(BTreeMap<String, String>);

impl Visit for SpanFields {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}").trim_matches('"').to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
}

pub struct SpanFieldLayer;

impl<S> Layer<S> for SpanFieldLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &tracing::span::Attributes<'_>, id: &tracing::span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut fields = SpanFields::default();
        attrs.record(&mut fields);
        span.extensions_mut().insert(fields);
    }

    fn on_record(&self, id: &tracing::span::Id, values: &tracing::span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        let mut fields = extensions.remove::<SpanFields>().unwrap_or_default();
        values.record(&mut fields);
        extensions.insert(fields);
    }
}

/// Collects the message and the remaining fields of an event.
#[derive(Default)]
struct EventFields {
    message: String,
    fields: Map<String, Value>,
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let value = format!("{value:?}").trim_matches('"').to_string();
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.insert(field.name().to_string(), Value::String(value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }
}

fn current_span_fields<S, N>(ctx: &FmtContext<'_, S, N>) -> Option<(String, SpanFields)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    let span = ctx.lookup_current()?;
    let fields = span.extensions().get::<SpanFields>().cloned().unwrap_or_default();
    Some((span.metadata().name().to_string(), fields))
}

// Console output: timestamp | level | stage | component | message (fields)
pub struct PrettyFormatter;

impl<S, N> FormatEvent<S, N> for PrettyFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> std::fmt::Result {
        let meta = event.metadata();
        let level_color = match *meta.level() {
            Level::TRACE => "\x1b[90m",
            Level::DEBUG => "\x1b[34m",
            Level::INFO => "\x1b[32m",
            Level::WARN => "\x1b[33m",
            Level::ERROR => "\x1b[31m",
        };
        let dim = "\x1b[90m";
        let accent = "\x1b[92m";
        let reset = "\x1b[0m";

        let stage = current_span_fields(ctx)
            .and_then(|(_, fields)| fields.0.get(STAGE_FIELD).cloned())
            .unwrap_or_else(|| "-".to_string());

        let mut visitor = EventFields::default();
        event.record(&mut visitor);

        write!(writer, "\x1b[96m{}{reset} {dim}|{reset} ", Utc::now().format("%y-%m-%d %H:%M:%S"))?;
        write!(writer, "{level_color}{:<5}{reset} {dim}|{reset} ", meta.level())?;
        write!(writer, "{accent}{:<12}{reset} {dim}|{reset} ", stage.to_uppercase())?;
        write!(writer, "{accent}{:<10}{reset} {dim}|{reset} ", component_name(meta.target()))?;
        write!(writer, "\x1b[97m{}{reset}", visitor.message)?;

        if !visitor.fields.is_empty() {
            let mut rendered = String::new();
            for (name, value) in &visitor.fields {
                if !rendered.is_empty() {
                    rendered.push_str(", ");
                }
                match value {
                    Value::String(s) => write!(rendered, "{name}={s}")?,
                    other => write!(rendered, "{name}={other}")?,
                }
            }
            write!(writer, " {dim}({rendered}){reset}")?;
        }

        writeln!(writer)
    }
}

// One JSON object per line, for log shippers
pub struct JsonEventFormatter;

impl<S, N> FormatEvent<S, N> for JsonEventFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> std::fmt::Result {
        let meta = event.metadata();
        let mut visitor = EventFields::default();
        event.record(&mut visitor);

        let mut root = Map::new();
        root.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
        root.insert("level".to_string(), Value::String(meta.level().to_string()));
        root.insert("target".to_string(), Value::String(meta.target().to_string()));
        root.insert("component".to_string(), Value::String(component_name(meta.target()).to_string()));
        if let Some(file) = meta.file() {
            root.insert("filename".to_string(), Value::String(file.to_string()));
        }
        if let Some(line) = meta.line() {
            root.insert("line_number".to_string(), Value::from(line));
        }
        root.insert("message".to_string(), Value::String(visitor.message));

        let mut fields = visitor.fields;
        if let Some((span_name, span_fields)) = current_span_fields(ctx) {
            fields.insert("span_name".to_string(), Value::String(span_name));
            for (key, value) in span_fields.0 {
                fields.entry(key).or_insert(Value::String(value));
            }
        }
        if !fields.is_empty() {
            root.insert("fields".to_string(), Value::Object(fields));
        }

        let line = serde_json::to_string(&Value::Object(root)).map_err(|_| std::fmt::Error)?;
        writeln!(writer, "{line}")
    }
}

/// Initialize the tracing subscriber with
/// - PrettyFormatter for console readability (when LOG_FORMAT != "json")
/// - JsonEventFormatter for json logging (when LOG_FORMAT = "json")
///
/// This will also install color_eyre to handle the panic in the application
pub fn init_logging() {
    color_eyre::install().expect("Unable to install color_eyre");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(Level::INFO.into())
            .parse("aggregator=info")
            .expect("Invalid filter directive and Logger control")
    });

    let json = std::env::var("LOG_FORMAT").map(|format| format == "json").unwrap_or(false);
    let base = fmt::layer().with_target(true).with_file(true).with_line_number(true);
    let fmt_layer = if json { base.event_format(JsonEventFormatter).boxed() } else { base.event_format(PrettyFormatter).boxed() };

    let subscriber = Registry::default().with(env_filter).with(SpanFieldLayer).with(fmt_layer).with(ErrorLayer::default());
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global default subscriber");
}

/// Short display name of the crate an event comes from.
fn component_name(target: &str) -> &'static str {
    if target.starts_with("aggregator_ethereum_execution_client") {
        "ETHEREUM"
    } else if target.starts_with("aggregator_http_signer") {
        "SIGNER"
    } else if target.starts_with("aggregator::queue") {
        "QUEUE"
    } else if target.starts_with("aggregator::strategy") {
        "STRATEGY"
    } else if target.starts_with("aggregator::submitter") {
        "SUBMITTER"
    } else if target.starts_with("aggregator") {
        "-"
    } else {
        "EXTERNAL"
    }
}
