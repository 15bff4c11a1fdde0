//! Single-slot notification channel between pipeline stages.
//!
//! A notification carries no payload: it only says "upstream state changed".
//! While one is pending, further notifications are dropped.

use tokio::sync::mpsc::{self, error::TrySendError};

/// Create a coalescing sender/receiver pair.
pub fn signal_channel(name: &'static str) -> (SignalSender, SignalReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (SignalSender { name, tx }, SignalReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct SignalSender {
    name: &'static str,
    tx: mpsc::Sender<()>,
}

impl SignalSender {
    /// Post a notification without blocking.
    ///
    /// Returns `false` when it was coalesced into the pending one or the
    /// receiver is gone.
    pub fn notify(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                tracing::trace!(signal = self.name, "Signal coalesced");
                false
            }
            Err(TrySendError::Closed(())) => {
                tracing::debug!(signal = self.name, "Signal receiver closed");
                false
            }
        }
    }
}

#[derive(Debug)]
pub struct SignalReceiver {
    rx: mpsc::Receiver<()>,
}

impl SignalReceiver {
    /// Wait for the next notification. `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }

    /// Take a pending notification if there is one.
    pub fn try_recv(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }
}
