//! Log subscriber setup and runtime filter changes.

use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter, Registry};

use crate::common::error::LogFilterError;

pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// `RUST_LOG` directives with INFO as the fallback level.
pub fn default_filter() -> EnvFilter {
    EnvFilter::from_default_env().add_directive(Level::INFO.into())
}

/// Handle on the installed log filter.
#[derive(Clone)]
pub struct LogControl {
    handle: FilterHandle,
}

impl LogControl {
    /// Install the global fmt subscriber behind a reloadable filter.
    pub fn init() -> Self {
        let (filter, handle) = reload::Layer::new(default_filter());
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        Self { handle }
    }

    pub fn new(handle: FilterHandle) -> Self {
        Self { handle }
    }

    /// The active directives, e.g. `info,wordchain::chain=debug`.
    pub fn current(&self) -> Result<String, LogFilterError> {
        self.handle
            .with_current(|filter| filter.to_string())
            .map_err(|e| LogFilterError::Unavailable { message: e.to_string() })
    }

    /// Replace the filter with `directives` and return the new filter text.
    ///
    /// `off` silences everything; `warn,wordchain::discord=debug` raises a
    /// single module.
    pub fn set(&self, directives: &str) -> Result<String, LogFilterError> {
        let filter = EnvFilter::try_new(directives).map_err(|e| LogFilterError::InvalidDirective {
            directives: directives.to_string(),
            message: e.to_string(),
        })?;
        self.handle
            .reload(filter)
            .map_err(|e| LogFilterError::Unavailable { message: e.to_string() })?;
        self.current()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A control whose filter layer lives as long as the returned layer.
    pub(crate) fn detached_control() -> (reload::Layer<EnvFilter, Registry>, LogControl) {
        let (layer, handle) = reload::Layer::new(EnvFilter::new("info"));
        (layer, LogControl::new(handle))
    }

    #[test]
    fn test_set_and_read_filter() {
        let (_layer, control) = detached_control();
        assert_eq!(control.current().unwrap(), "info");

        let current = control.set("warn,wordchain::chain=debug").unwrap();
        assert!(current.contains("wordchain::chain=debug"));
        assert!(current.contains("warn"));
    }

    #[test]
    fn test_invalid_directive_keeps_filter() {
        let (_layer, control) = detached_control();
        let result = control.set("wordchain=loud");
        assert!(matches!(result, Err(LogFilterError::InvalidDirective { .. })));
        assert_eq!(control.current().unwrap(), "info");
    }

    #[test]
    fn test_dropped_layer_is_reported() {
        let (layer, control) = detached_control();
        drop(layer);
        assert!(matches!(control.set("debug"), Err(LogFilterError::Unavailable { .. })));
    }
}
