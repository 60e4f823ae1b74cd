//! Cooperative cancellation.
//!
//! One token is created per run and handed to every stage. The Ctrl-C
//! handler flips it; stages poll it at their suspension points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Install the process-wide Ctrl-C handler for this token. Safe to call
    /// once per process.
    pub fn install_signal_handler(&self) {
        let flag = self.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            tracing::warn!("interrupt received, cancelling run");
            flag.cancel();
        }) {
            tracing::warn!(error = %e, "could not install interrupt handler");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_flips_once_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        // clones observe the same flag
        let clone = token.clone();
        assert!(clone.is_cancelled());
    }
}
