use std::error::Error as StdError;

/// Fire-and-forget error reporting. Implementations must not fail; they are
/// called from the hot processing loop and from librdkafka's own error
/// callback.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &(dyn StdError + 'static), context: Option<&str>);
}

/// Default reporter: logs at error level via `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &(dyn StdError + 'static), context: Option<&str>) {
        match context {
            Some(context) => tracing::error!("Error processing message ({context}): {error}"),
            None => tracing::error!("Error processing message: {error}"),
        }
    }
}
