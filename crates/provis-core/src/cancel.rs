use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ProvisionError, Result};

/// Cooperative cancellation signal shared between a caller and a running
/// resolution or apply. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    canceled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Return `Err(Canceled)` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(ProvisionError::Canceled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());

        other.cancel();
        assert!(token.is_canceled());
        assert!(matches!(token.check(), Err(ProvisionError::Canceled)));
    }
}
