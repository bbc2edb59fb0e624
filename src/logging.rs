//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to both console and files
//! for debugging scheduled sync jobs and cache/backend degradation.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
/// Returns true when this call performed the initialization; later calls are
/// no-ops returning false.
pub fn init_structured_logging() -> bool {
    let mut initialized = false;
    LOGGER_INITIALIZED.get_or_init(|| {
        initialized = true;
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        // Create log directory if it doesn't exist
        let log_dir = PathBuf::from("log");
        if !log_dir.exists() {
            fs::create_dir_all(&log_dir).expect("Failed to create log directory");
        }

        // Generate log file name with environment, PID, and timestamp
        let pid = process::id();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_filename = format!("{environment}.{pid}.{timestamp}.log");
        let log_path = log_dir.join(&log_filename);

        let file_appender = tracing_appender::rolling::never(&log_dir, log_filename);
        let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

        // Try to initialize tracing subscriber, but don't panic if one already exists
        let subscriber = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(true)
                    .with_filter(EnvFilter::new(log_level.clone())),
            )
            .with(
                fmt::layer()
                    .with_writer(file_writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(EnvFilter::new(log_level)),
            );

        if subscriber.try_init().is_err() {
            // A global subscriber is already set (likely from an embedding test
            // harness). This is not an error - continue normally.
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = %log_path.display(),
            "🔧 STRUCTURED LOGGING: Initialized with file output"
        );

        // Store the guard to prevent it from being dropped
        std::mem::forget(_guard);
    });
    initialized
}

/// True once [`init_structured_logging`] has run in this process.
pub fn logging_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("MARKETSYNC_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for scheduled job operations
pub fn log_job_operation(
    operation: &str,
    job_id: &str,
    execution_id: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        job_id = %job_id,
        execution_id = execution_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 JOB_OPERATION"
    );
}

/// Log structured data for cache operations
pub fn log_cache_operation(
    operation: &str,
    backend: &str,
    key: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        backend = %backend,
        key = key,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "💾 CACHE_OPERATION"
    );
}

/// Log structured data for provider rate-limit operations
pub fn log_provider_operation(
    operation: &str,
    provider: &str,
    status: &str,
    wait_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        provider = %provider,
        status = %status,
        wait_ms = wait_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "⏳ PROVIDER_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_detection() {
        std::env::set_var("MARKETSYNC_ENV", "test_override");
        let env = get_environment();
        assert_eq!(env, "test_override");
        std::env::remove_var("MARKETSYNC_ENV");
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn initialization_runs_at_most_once() {
        init_structured_logging();
        assert!(logging_initialized());
        // The OnceLock already holds the guard, so a repeat call is a no-op.
        assert!(!init_structured_logging());
    }
}
