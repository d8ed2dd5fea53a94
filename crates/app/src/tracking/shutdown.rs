use std::sync::{
    Arc, Once,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};

/// Cloneable cancellation flag shared by every pipeline stage.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Cancel this token on Ctrl+C. Only the first call in a process installs
    /// a handler.
    pub fn cancel_on_ctrlc(&self) -> Result<()> {
        static CTRL_HANDLER: Once = Once::new();

        let mut result = Ok(());
        CTRL_HANDLER.call_once(|| {
            let token = self.clone();
            result = ctrlc::set_handler(move || {
                tracing::info!("interrupt received, shutting down");
                token.cancel();
            })
            .context("failed to install Ctrl+C handler");
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let token = ShutdownToken::new();
        let stage = token.clone();
        assert!(!stage.is_cancelled());
        token.cancel();
        assert!(stage.is_cancelled());
    }
}
