//! ---
//! aso_section: "01-core-functionality"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Tracing setup: console output plus the operator audit log."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
//! Two outputs are installed. The console layer follows the `ASO_LOG` filter
//! and the configured format. The audit layer writes only operator command
//! events (target [`OPERATOR_AUDIT_TARGET`]) to a daily rolling JSON file,
//! whatever the console filter says, so estops and overrides are always on
//! disk.

use std::path::Path;

use anyhow::Result;
use aso_logging::OPERATOR_AUDIT_TARGET;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::{EnvFilter, Targets};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "ASO_LOG";

static AUDIT_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Available console log formats for the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// File name (before the date suffix) of the operator audit log for
/// `service_name`. `file_prefix` from the configuration wins when set.
pub fn audit_file_name(service_name: &str, config: &LoggingConfig) -> String {
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
    format!("{}-operator.log", prefix)
}

/// JSON layer that keeps only operator command events.
pub fn audit_layer<S, W>(writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(writer)
        .with_filter(Targets::new().with_target(OPERATOR_AUDIT_TARGET, Level::INFO))
        .boxed()
}

fn console_filter() -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("invalid {} directive '{}' ({}); using info", LOG_ENV, directive, err);
            EnvFilter::new("info")
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Install the console and audit layers for `service_name`.
///
/// Calling this more than once is harmless; only the first subscriber is
/// installed.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let audit_dir: &Path = &config.directory;
    std::fs::create_dir_all(audit_dir)?;
    let audit_name = audit_file_name(service_name, config);
    let (audit_writer, audit_guard) = tracing_appender::non_blocking(daily(audit_dir, &audit_name));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = AUDIT_GUARD.set(audit_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);

    let console = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(stdout_writer)
            .with_filter(console_filter())
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .with_filter(console_filter())
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(audit_layer(audit_writer))
        .try_init()
        .ok();

    info!(
        service = %service_name,
        audit_log = %audit_dir.join(&audit_name).display(),
        format = ?config.format,
        "tracing initialised"
    );
    Ok(())
}
