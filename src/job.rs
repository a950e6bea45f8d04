use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation handle for one deployment job.
///
/// Every loop and recursion step in the core polls the flag; a cancelled job
/// finishes the frame it is in and unwinds without starting further work.
/// Cancellation is never reported as an error.
#[derive(Clone, Default)]
pub struct Job {
    cancelled: Arc<AtomicBool>,
}

impl Job {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: Arc<AtomicBool>) -> Self {
        Self { cancelled: token }
    }

    pub fn token(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let job = Job::new();
        let other = job.clone();
        assert!(!other.is_cancelled());
        job.cancel();
        assert!(other.is_cancelled());
    }
}
