//! Per-execution diagnostics.
//!
//! When enabled on an [`Endpoint`](crate::Endpoint), every stream, update and batch
//! flush produces a [`StatementLog`]: elapsed time, original and rendered SQL, a preview
//! of the bound values and, optionally, the call-site frames matching a pattern. The
//! log goes to [`Executor::log_statement`](crate::Executor::log_statement), which emits
//! a `tracing` event on target `pgfrag.sql` unless the executor overrides it.
//!
//! # Example
//!
//! ```ignore
//! use pgfrag::DiagnosticsConfig;
//! use std::time::Duration;
//!
//! let diagnostics = DiagnosticsConfig::new()
//!     .enable()
//!     .with_slow_query_threshold(Duration::from_millis(200))
//!     .with_call_site_filter(regex::Regex::new("^my_app::")?);
//! ```

use crate::executor::{Executor, StatementKind, StatementLog};
use crate::fragment::SqlFragment;
use regex::Regex;
use std::backtrace::Backtrace;
use std::time::{Duration, Instant};
use tracing::Level;

/// Shown instead of values that must not be logged.
pub const REDACTED: &str = "***";

/// Diagnostics configuration for one endpoint.
///
/// Disabled by default.
#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    /// Executions slower than this are logged at `WARN`.
    pub slow_query_threshold: Option<Duration>,
    /// Truncate SQL in logs (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
    /// Capture a backtrace per execution and keep frames matching this pattern.
    pub call_site_filter: Option<Regex>,
    /// Values shown in a preview before the rest is elided.
    pub max_preview_values: usize,
    /// Level for ordinary executions.
    pub level: Level,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            slow_query_threshold: None,
            max_sql_length: Some(500),
            call_site_filter: None,
            max_preview_values: 20,
            level: Level::DEBUG,
        }
    }
}

impl DiagnosticsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(mut self) -> Self {
        self.enabled = true;
        self
    }

    pub fn disable(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = Some(threshold);
        self
    }

    pub fn with_max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    /// Keep call-site frames whose symbol or location matches `filter`.
    ///
    /// Capturing a backtrace is expensive; leave this unset in hot paths.
    pub fn with_call_site_filter(mut self, filter: Regex) -> Self {
        self.call_site_filter = Some(filter);
        self
    }

    pub fn with_max_preview_values(mut self, max: usize) -> Self {
        self.max_preview_values = max;
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    fn truncate(&self, sql: &str) -> String {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_bytes(sql, max)),
            _ => sql.to_string(),
        }
    }
}

/// Human-readable preview of a fragment's bound values.
///
/// Redacted when the fragment is confidential or carries a value that cannot be read
/// without consuming it.
pub fn preview(fragment: &SqlFragment, max_values: usize) -> String {
    if fragment.is_confidential() || fragment.contains_non_thread_safe_value() {
        return REDACTED.to_string();
    }
    let mut parts = Vec::new();
    let mut total = 0;
    for p in fragment.placeholders() {
        total += 1;
        if parts.len() < max_values {
            parts.push(format!("{}={}", p.name(), p.value()));
        }
    }
    if total > parts.len() {
        parts.push(format!("... (+{} more)", total - parts.len()));
    }
    format!("[{}]", parts.join(", "))
}

/// Backtrace frames of the current thread whose symbol or location matches `filter`,
/// joined with ` < `.
pub fn call_site(filter: &Regex) -> Option<String> {
    let trace = Backtrace::force_capture().to_string();
    let mut frames: Vec<String> = Vec::new();
    let mut symbol: Option<&str> = None;
    for line in trace.lines() {
        let line = line.trim();
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(sym) = symbol.take() {
                if filter.is_match(sym) || filter.is_match(location) {
                    frames.push(format!("{sym} ({location})"));
                }
            }
        } else if let Some((index, sym)) = line.split_once(": ") {
            if index.chars().all(|c| c.is_ascii_digit()) {
                if let Some(prev) = symbol.replace(sym) {
                    if filter.is_match(prev) {
                        frames.push(prev.to_string());
                    }
                }
            }
        }
    }
    if let Some(sym) = symbol {
        if filter.is_match(sym) {
            frames.push(sym.to_string());
        }
    }
    (!frames.is_empty()).then(|| frames.join(" < "))
}

/// Timing and context for one execution, finished with [`Probe::finish`].
pub(crate) struct Probe {
    started: Instant,
    call_site: Option<String>,
}

impl Probe {
    pub(crate) fn start(config: &DiagnosticsConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        Some(Self {
            started: Instant::now(),
            call_site: config.call_site_filter.as_ref().and_then(call_site),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn finish(
        self,
        config: &DiagnosticsConfig,
        executor: &dyn Executor,
        endpoint: &str,
        kind: StatementKind,
        original_sql: &str,
        rendered_sql: &str,
        confidential: bool,
        preview: &str,
        rows: Option<u64>,
        error: Option<&crate::FragError>,
    ) {
        let elapsed = self.started.elapsed();
        let slow = config
            .slow_query_threshold
            .is_some_and(|threshold| elapsed > threshold);
        let level = if error.is_some() || slow {
            Level::WARN
        } else {
            config.level
        };
        let error = error.map(ToString::to_string);
        let original_sql = config.truncate(original_sql);
        let rendered_sql = config.truncate(rendered_sql);
        executor.log_statement(&StatementLog {
            kind,
            endpoint,
            original_sql: &original_sql,
            rendered_sql: &rendered_sql,
            confidential,
            preview,
            call_site: self.call_site.as_deref(),
            elapsed,
            rows,
            slow,
            error: error.as_deref(),
            level,
        });
    }
}

/// Emit `log` as a `tracing` event on target `pgfrag.sql`.
pub fn emit(log: &StatementLog<'_>) {
    macro_rules! emit_at_level {
        ($level:expr, $($field:tt)*) => {
            match $level {
                Level::ERROR => tracing::error!($($field)*),
                Level::WARN => tracing::warn!($($field)*),
                Level::INFO => tracing::info!($($field)*),
                Level::DEBUG => tracing::debug!($($field)*),
                Level::TRACE => tracing::trace!($($field)*),
            }
        };
    }

    let elapsed_ms = log.elapsed.as_secs_f64() * 1000.0;
    let call_site = log.call_site.unwrap_or("-");
    match log.error {
        Some(error) => emit_at_level!(
            log.level,
            target: "pgfrag.sql",
            kind = log.kind.as_str(),
            endpoint = log.endpoint,
            elapsed_ms,
            sql = %log.rendered_sql,
            original_sql = %log.original_sql,
            values = %log.preview,
            call_site,
            error,
            "statement failed"
        ),
        None => emit_at_level!(
            log.level,
            target: "pgfrag.sql",
            kind = log.kind.as_str(),
            endpoint = log.endpoint,
            elapsed_ms,
            rows = log.rows,
            slow = log.slow,
            sql = %log.rendered_sql,
            original_sql = %log.original_sql,
            values = %log.preview,
            call_site,
            "statement executed"
        ),
    }
}

fn truncate_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}
