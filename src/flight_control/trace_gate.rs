use tokio::time::{Duration, Instant};

/// A cancellable one-shot delay on tokio's monotonic clock.
///
/// The gate only stores its deadline and compares it against [`Instant::now`] when asked, so
/// it works with or without a running runtime and a cancelled delay leaves nothing behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceGate {
    deadline: Option<Instant>,
}

impl TraceGate {
    pub fn new() -> Self { Self::default() }

    /// Cancels any pending delay and starts a new one.
    ///
    /// # Arguments
    /// * `delay` – Time until the gate opens.
    pub fn arm(&mut self, delay: Duration) { self.deadline = Some(Instant::now() + delay); }

    /// Cancels a pending delay and closes the gate.
    pub fn cancel(&mut self) { self.deadline = None; }

    pub fn is_open(&self) -> bool { self.deadline.is_some_and(|deadline| Instant::now() >= deadline) }

    /// Armed, but the delay has not elapsed yet.
    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() < deadline)
    }
}
