//! Cooperative stop signal for a matching pass.

use crate::error::MatchError;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Shared stop flag; clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Fail with [`MatchError::Cancelled`] carrying how many segments the
    /// pass got through.
    pub fn check(&self, processed: usize) -> Result<(), MatchError> {
        if self.is_cancelled() {
            return Err(MatchError::Cancelled { processed });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn check_reports_progress_once_cancelled() {
        let token = CancellationToken::new();
        assert!(token.check(4).is_ok());
        token.clone().cancel();
        assert!(matches!(
            token.check(4),
            Err(MatchError::Cancelled { processed: 4 })
        ));
    }
}
