use crate::types::Entry;

/// Receives every successful append, in append order per log.
///
/// Called while the log's append lock is held, so implementations must be
/// quick and must not call back into the engine. Delivery is best-effort: there
/// is no way to report failure back to the appender.
pub trait AppendHook: Send + Sync {
    fn on_append(&self, log: &str, entry: &Entry);
}

impl<F> AppendHook for F
where
    F: Fn(&str, &Entry) + Send + Sync,
{
    fn on_append(&self, log: &str, entry: &Entry) {
        self(log, entry)
    }
}
