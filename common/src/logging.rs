//! Structured logging setup shared by every binary in the workspace.
//!
//! Sets up `tracing-subscriber` with an `EnvFilter` (driven by `RUST_LOG`, falling back to
//! `info`) and a compact formatter on stderr, plus an optional hourly rolling file
//! appender for on-device diagnostics. The `telemetry` feature additionally installs an
//! OpenTelemetry OTLP layer, so field devices can ship traces to a collector without the
//! default build paying for the dependency.

use std::path::PathBuf;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Options controlling [`init_logging`].
#[derive(Clone, Debug, Default)]
pub struct LoggingOptions {
    /// Directory to write rolling log files into. `None` disables file logging.
    pub log_dir: Option<PathBuf>,
    /// Filename prefix for rolled log files.
    pub log_file_prefix: String,
    /// OTLP collector endpoint, used only when built with the `telemetry` feature.
    pub otlp_endpoint: Option<String>,
}

/// Holds the guards that must stay alive for the lifetime of the process for buffered
/// writers (the rolling file appender) to flush on drop. Call [`close_logging`] to drop
/// it explicitly during graceful shutdown rather than relying on process exit.
pub struct LoggingHandle {
    _file_guard: Option<WorkerGuard>,
}

/// Initialises the global `tracing` subscriber. Must be called at most once per process;
/// a second call is a programming error in the caller, not something this function
/// guards against, mirroring how the rest of the workspace treats `tracing`'s global
/// dispatcher.
pub fn init_logging(opts: &LoggingOptions) -> LoggingHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer().compact().with_target(false).with_writer(std::io::stderr);

    let (file_layer, file_guard) = match &opts.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::hourly(dir, &opts.log_file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().compact().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer);

    init_with_telemetry(registry, opts);

    info!("logging initialised");
    LoggingHandle { _file_guard: file_guard }
}

#[cfg(not(feature = "telemetry"))]
fn init_with_telemetry<S>(registry: S, _opts: &LoggingOptions)
where
    S: SubscriberExt + Send + Sync + 'static,
    S: tracing::Subscriber,
{
    registry.init();
}

#[cfg(feature = "telemetry")]
fn init_with_telemetry<S>(registry: S, opts: &LoggingOptions)
where
    S: SubscriberExt + Send + Sync + 'static,
    S: tracing::Subscriber,
{
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;

    match &opts.otlp_endpoint {
        Some(endpoint) => {
            let provider_result = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint))
                .install_batch(opentelemetry_sdk::runtime::Tokio);

            match provider_result {
                Ok(provider) => {
                    let tracer = provider.tracer("tracekit");
                    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                    registry.with(otel_layer).init();
                }
                Err(_) => registry.init(),
            }
        }
        None => registry.init(),
    }
}

/// Flushes and drops logging resources. Prefer calling this explicitly on graceful
/// shutdown over letting the handle drop at `main`'s end, since `main`'s own scope may
/// outlive the moment logging is actually done being useful (e.g. during signal
/// handling).
pub fn close_logging(handle: LoggingHandle) {
    drop(handle);
}
