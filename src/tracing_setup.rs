use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::core::bean::BeanKey;

fn env_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}"))
}

/// Initialize structured logging with JSON output, one object per line
pub fn init_tracing(level: &str) -> Result<()> {
    Registry::default()
        .with(env_filter(level)?)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .wrap_err("Failed to install JSON subscriber")?;

    tracing::debug!("Astrix structured logging initialized with level: {}", level);
    Ok(())
}

/// Initialize multi-line, human-friendly logging for development
pub fn init_console_tracing(level: &str) -> Result<()> {
    Registry::default()
        .with(env_filter(level)?)
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(true),
        )
        .try_init()
        .wrap_err("Failed to install console subscriber")?;

    tracing::debug!("Astrix console logging initialized with level: {}", level);
    Ok(())
}

/// Initialize tracing with an explicit filter and output format.
///
/// `level` accepts any `EnvFilter` directive, e.g. `"info"` or
/// `"warn,astrix::core::stateful=debug"`.
pub fn init_tracing_with_config(level: &str, json_format: bool, include_spans: bool) -> Result<()> {
    let env_filter = env_filter(level)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true);

    if json_format {
        Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(include_spans)
                    .with_span_list(include_spans),
            )
            .try_init()
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.compact().with_ansi(true))
            .try_init()
    }
    .wrap_err("Failed to install tracing subscriber")?;

    tracing::debug!(
        "Astrix logging initialized with level: {}, json: {}, spans: {}",
        level,
        json_format,
        include_spans
    );
    Ok(())
}

/// Log the end of the process. The fmt writers are unbuffered, so there is
/// nothing left to flush.
pub fn shutdown_tracing() {
    tracing::debug!("Astrix tracing shutdown complete");
}

/// Span for work done on behalf of one component (a worker, a manager)
pub fn configure_component_tracing(component: &str) -> tracing::Span {
    tracing::info_span!("component", name = component)
}

/// Span covering the creation of one bean. `duration_ms` is recorded by the
/// caller once the factory returns.
pub fn create_bean_span(bean_key: &BeanKey) -> tracing::Span {
    tracing::info_span!(
        "bean_create",
        bean = %bean_key,
        duration_ms = tracing::field::Empty,
    )
}

/// Span covering one bind attempt of a stateful bean.
pub fn create_bind_span(bean_key: &BeanKey, bean_id: u64) -> tracing::Span {
    tracing::info_span!(
        "bean_bind",
        bean = %bean_key,
        bean.id = bean_id,
    )
}
