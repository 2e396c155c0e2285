use std::sync::Arc;
use tokio::sync::watch;

use homematch_core::error::{Error, Result};
use homematch_core::Stage;

/// Cooperative cancellation shared between a run and whoever may stop it.
/// Clones observe the same signal.
#[derive(Debug, Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Cancellation {
    fn default() -> Self { Self::new() }
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn cancel(&self) { self.tx.send_replace(true); }

    pub fn is_cancelled(&self) -> bool { *self.rx.borrow() }

    /// `Err(Cancelled { stage })` once cancellation was requested.
    pub fn check(&self, stage: Stage) -> Result<()> {
        if self.is_cancelled() { Err(Error::Cancelled { stage }) } else { Ok(()) }
    }
}
