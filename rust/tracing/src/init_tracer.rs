use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt;
use tracing_subscriber::Registry;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for FilterLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterLevel::Trace => f.write_str("trace"),
            FilterLevel::Debug => f.write_str("debug"),
            FilterLevel::Info => f.write_str("info"),
            FilterLevel::Warn => f.write_str("warn"),
            FilterLevel::Error => f.write_str("error"),
        }
    }
}

/// Per-crate level override, appended after the default directives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFilter {
    pub crate_name: String,
    pub filter_level: FilterLevel,
}

// Crate names use underscores: the compiler rewrites hyphens in crate names
// to form valid identifiers, and the filter matches on those.
const DEFAULT_CRATE_NAMES: &[&str] = &[
    "nes_config",
    "nes_distance",
    "nes_error",
    "nes_index",
    "nes_tracing",
    "nes_worker",
    "encoder_service",
];

pub fn global_filter_directives(custom_filters: &[LogFilter]) -> String {
    let defaults = DEFAULT_CRATE_NAMES
        .iter()
        .map(|s| format!("{s}=trace"))
        .collect::<Vec<_>>()
        .join(",");
    let custom = custom_filters
        .iter()
        .map(|filter| format!("{}={}", filter.crate_name, filter.filter_level))
        .collect::<Vec<_>>();
    if custom.is_empty() {
        format!("error,{defaults}")
    } else {
        format!("error,{defaults},{}", custom.join(","))
    }
}

pub fn init_global_filter_layer(
    custom_filters: &[LogFilter],
) -> Box<dyn Layer<Registry> + Send + Sync> {
    EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| global_filter_directives(custom_filters)),
    )
    .boxed()
}

pub fn init_stdout_layer() -> Box<dyn Layer<Registry> + Send + Sync> {
    fmt::layer().pretty().with_target(false).boxed()
}

/// Installs the layers as the global subscriber. Does nothing if a global
/// subscriber was already set (e.g. by a test harness).
pub fn init_tracing(layers: Vec<Box<dyn Layer<Registry> + Send + Sync>>) {
    let Some(layers) = layers.into_iter().reduce(|a, b| Box::new(a.and_then(b))) else {
        return;
    };
    let subscriber = tracing_subscriber::registry().with(layers);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Global tracing subscriber already set");
        return;
    }
    tracing::info!("Global tracing subscriber set");
}

pub fn init_panic_tracing_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();

        let payload = if let Some(s) = payload.downcast_ref::<&str>() {
            Some(&**s)
        } else {
            payload.downcast_ref::<String>().map(|s| s.as_str())
        };

        tracing::error!(
            panic.payload = payload,
            panic.location = panic_info.location().map(|l| l.to_string()),
            panic.backtrace = tracing::field::display(std::backtrace::Backtrace::capture()),
            "A panic occurred"
        );

        prev_hook(panic_info);
    }));
}

pub fn init_stdout_tracing(custom_filters: &[LogFilter]) {
    let layers = vec![
        // The global filter applies to all subsequent layers
        init_global_filter_layer(custom_filters),
        init_stdout_layer(),
    ];
    init_tracing(layers);
    init_panic_tracing_hook();
}
