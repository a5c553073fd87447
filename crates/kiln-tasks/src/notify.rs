//! Non-fatal error notifications for transform failures.

/// Receives transform errors that must not stop the pipeline.
pub trait Notifier: Send + Sync {
    /// Report a failure. `title` names the transform (e.g. "Sass", "Pug").
    fn notify(&self, title: &str, message: &str);
}

/// Notifier that logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        tracing::error!(transform = title, "{}", message);
    }
}
