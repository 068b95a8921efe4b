//! Diagnostics tracing, plus the tap that captures server notices.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Dev diagnostics via `RUST_LOG`, output to
//!   stderr. Not persisted, not part of the run log.
//!
//! - **Run log (`io/run_log`)**: Product artifact at the configured
//!   `log_file`. Always written, unaffected by `RUST_LOG`.
//!
//! The PostgreSQL driver reports server notices as tracing events on
//! [`NOTICE_TARGET`]. [`NoticeLayer`] copies those into a [`NoticeTap`] so the
//! executor can forward them to the run log, independent of `RUST_LOG`.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Target the driver uses for server notices.
pub const NOTICE_TARGET: &str = "sqlx::postgres::notice";

/// Shared buffer of server notices not yet forwarded.
#[derive(Debug, Clone, Default)]
pub struct NoticeTap {
    pending: Arc<Mutex<Vec<String>>>,
}

impl NoticeTap {
    pub fn push(&self, notice: String) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice);
    }

    /// Take every captured notice, oldest first.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Layer that copies the `message` of notice events into a [`NoticeTap`].
pub struct NoticeLayer {
    tap: NoticeTap,
}

impl NoticeLayer {
    pub fn new(tap: NoticeTap) -> Self {
        Self { tap }
    }
}

impl<S: Subscriber> Layer<S> for NoticeLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != NOTICE_TARGET {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        if let Some(message) = visitor.message {
            self.tap.push(message);
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        }
    }
}

/// Initialize tracing for the process and return the notice tap.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset.
/// Output: stderr, compact format. Server notices are always captured.
///
/// # Example
/// ```bash
/// RUST_LOG=release_runner=debug release-runner run
/// ```
pub fn init() -> NoticeTap {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let tap = NoticeTap::default();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_filter(filter),
        )
        .with(
            NoticeLayer::new(tap.clone())
                .with_filter(Targets::new().with_target(NOTICE_TARGET, Level::TRACE)),
        )
        .init();

    tap
}
