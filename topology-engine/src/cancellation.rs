use futures::FutureExt;
use futures::future::Shared;

/// Cooperative cancellation for the optimization stage
///
/// The pipeline is synchronous, so the token is only ever polled, never awaited.
#[derive(Clone)]
pub struct CancellationToken {
    rx: Shared<futures::channel::oneshot::Receiver<()>>,
}

impl CancellationToken {
    pub fn new() -> (Self, CancellationSignal) {
        let (tx, rx) = futures::channel::oneshot::channel();
        let token = Self { rx: rx.shared() };
        let signal = CancellationSignal { tx };

        (token, signal)
    }

    pub fn is_cancelled(&self) -> bool {
        match self.rx.clone().now_or_never() {
            // Future is not ready
            None => false,
            // Sender sent a cancel signal
            Some(Ok(())) => true,
            // Sender dropped
            Some(Err(_)) => false,
        }
    }
}

pub struct CancellationSignal {
    tx: futures::channel::oneshot::Sender<()>,
}

impl CancellationSignal {
    pub fn cancel(self) {
        self.tx.send(()).ok();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cancel() {
        let (token, signal) = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());

        signal.cancel();
        assert!(token.is_cancelled());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_cancel_drop() {
        let (token, signal) = CancellationToken::new();
        drop(signal);
        assert!(!token.is_cancelled());
    }
}
