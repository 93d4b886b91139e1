//! Observability infrastructure.
//!
//! Structured logging with consistent spans. This module provides the
//! initialization helper and span constructor used across the backend.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

static INIT: Once = Once::new();

/// Fallback filter when `RUST_LOG` is unset: the skein crates at debug,
/// everything else at info. Storage-operation traces sit below this at
/// `trace`, so they stay opt-in.
pub const DEFAULT_DIRECTIVES: &str = "info,skein_core=debug,skein_log=debug";

/// Installs the global tracing subscriber for the backend.
///
/// Levels come from `RUST_LOG` when set and fall back to
/// [`DEFAULT_DIRECTIVES`] otherwise. `json` selects line-delimited JSON
/// output for production; the default is human-readable output for
/// development. Safe to call multiple times; only the first call installs.
pub fn init_logging(json: bool) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
        let builder = fmt().with_env_filter(filter).with_target(true);
        if json {
            builder.json().init();
        } else {
            builder.init();
        }
    });
}

/// Creates a span for storage operations with standard fields.
#[must_use]
pub fn storage_span(operation: &str, tenancy: &str) -> Span {
    tracing::info_span!("storage", op = operation, tenancy = tenancy)
}
