mod inspector;

pub use inspector::{Inspector, InspectorConfig, Metrics, Record, RecordKind};

use bitflags::bitflags;
use restore_core::{Middleware, Transition};

bitflags! {
    /// Which transitions [`LoggingMiddleware`] writes out.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct LogFilter: u8 {
        /// Successful transitions, with their domain event.
        const DOMAIN = 1 << 0;
        /// Failed mutations, with the error chain.
        const ERRORS = 1 << 1;
        /// Append the payload marker to domain lines.
        const PAYLOAD = 1 << 2;
    }
}

impl Default for LogFilter {
    fn default() -> Self {
        LogFilter::DOMAIN | LogFilter::ERRORS
    }
}

/// Writes one `log` line per completed dispatch.
pub struct LoggingMiddleware {
    filter: LogFilter,
    level: log::Level,
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new(LogFilter::default())
    }
}

impl LoggingMiddleware {
    pub fn new(filter: LogFilter) -> Self {
        Self {
            filter,
            level: log::Level::Debug,
        }
    }

    /// Level for domain lines. Errors always log at `warn`.
    pub fn with_level(mut self, level: log::Level) -> Self {
        self.level = level;
        self
    }

    fn line(&self, t: &Transition<'_>) -> Option<(log::Level, String)> {
        let label = t.view.label();
        if let Some(err) = t.event.error() {
            if !self.filter.contains(LogFilter::ERRORS) {
                return None;
            }
            return Some((
                log::Level::Warn,
                format!("{label}: {} failed: {err:#}", t.kind.name()),
            ));
        }
        if !self.filter.contains(LogFilter::DOMAIN) {
            return None;
        }
        let event = t.event.domain()?;
        let mut line = format!("{label}: {} -> {event:?}", t.kind.name());
        if self.filter.contains(LogFilter::PAYLOAD) {
            line.push_str(&format!(" {:?}", t.event.payload()));
        }
        Some((self.level, line))
    }
}

impl Middleware for LoggingMiddleware {
    fn on_transition(&self, transition: &Transition<'_>) {
        if let Some((level, line)) = self.line(transition) {
            log::log!(level, "{line}");
        }
    }
}
