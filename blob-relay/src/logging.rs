//! Injected logging
//!
//! Handlers and drivers never log through a process-global logger of their
//! own. They receive an `Arc<dyn Logger>` at construction. The binary wires
//! in [`TracingLogger`]; embedders and tests default to [`NoopLogger`].

use std::sync::Arc;
use tracing::Span;

/// Logging interface used by the relay
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards to `tracing`, inside a span naming the component
#[derive(Debug, Clone)]
pub struct TracingLogger {
    span: Span,
}

impl TracingLogger {
    pub fn new(component: &'static str) -> Self {
        Self {
            span: tracing::info_span!("blob_relay", component),
        }
    }

    /// Convenience for wiring
    pub fn shared(component: &'static str) -> Arc<dyn Logger> {
        Arc::new(Self::new(component))
    }
}

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        let _entered = self.span.enter();
        tracing::debug!("{}", message);
    }

    fn info(&self, message: &str) {
        let _entered = self.span.enter();
        tracing::info!("{}", message);
    }

    fn error(&self, message: &str) {
        let _entered = self.span.enter();
        tracing::error!("{}", message);
    }
}

/// Emits nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl NoopLogger {
    pub fn shared() -> Arc<dyn Logger> {
        Arc::new(NoopLogger)
    }
}

impl Logger for NoopLogger {
    fn debug(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Logger;
    use std::sync::Mutex;

    /// Captures messages so tests can assert on what was logged
    #[derive(Default)]
    pub struct RecordingLogger {
        pub lines: Mutex<Vec<(&'static str, String)>>,
    }

    impl RecordingLogger {
        pub fn errors(&self) -> Vec<String> {
            self.lines
                .lock()
                .unwrap()
                .iter()
                .filter(|(level, _)| *level == "error")
                .map(|(_, line)| line.clone())
                .collect()
        }
    }

    impl Logger for RecordingLogger {
        fn debug(&self, message: &str) {
            self.lines.lock().unwrap().push(("debug", message.to_string()));
        }

        fn info(&self, message: &str) {
            self.lines.lock().unwrap().push(("info", message.to_string()));
        }

        fn error(&self, message: &str) {
            self.lines.lock().unwrap().push(("error", message.to_string()));
        }
    }
}
