use std::fmt::{self, Write as _};
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;
use transport::LogRing;

/// Crate whose events never reach the ring. The ring logs its own
/// evictions and truncations; recording those would feed back into it.
const IGNORED_CRATE: &str = "transport";

/// True for `transport` and its modules, not for crates that merely share
/// the prefix such as `transport_fabric`.
fn is_ignored(target: &str) -> bool {
    target
        .strip_prefix(IGNORED_CRATE)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

/// Appends one record per tracing event to a byte ring, typically the
/// kernel log.
///
/// Records look like `INFO services_kerncfg: message key=value` and end in a
/// newline, so the concatenated output of a bulk read splits back into lines.
pub struct KernelLogLayer {
    ring: Arc<LogRing>,
    max_level: Level,
}

impl KernelLogLayer {
    /// Records events at `INFO` and above.
    pub fn new(ring: Arc<LogRing>) -> Self {
        Self {
            ring,
            max_level: Level::INFO,
        }
    }

    pub fn with_max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }
}

impl<S: Subscriber> Layer<S> for KernelLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > self.max_level || is_ignored(meta.target()) {
            return;
        }

        let mut record = format!("{} {}:", meta.level(), meta.target());
        event.record(&mut RecordVisitor(&mut record));
        record.push('\n');
        self.ring.append(record.as_bytes());
    }
}

struct RecordVisitor<'a>(&'a mut String);

impl Visit for RecordVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            let _ = write!(self.0, " {value}");
        } else {
            let _ = write!(self.0, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.0, " {value:?}");
        } else {
            let _ = write!(self.0, " {}={value:?}", field.name());
        }
    }
}
