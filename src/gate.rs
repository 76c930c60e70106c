use std::sync::Arc;
use tokio::sync::watch;

/// One-shot readiness signal.
///
/// Opens at most once; every waiter (past or future) observes the open
/// state. Clones share the same gate.
#[derive(Debug, Clone)]
pub struct ReadyGate {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadyGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Open the gate. Returns `true` only for the call that actually opened it.
    pub fn open(&self) -> bool {
        self.tx.send_if_modified(|open| {
            if *open {
                false
            } else {
                *open = true;
                true
            }
        })
    }

    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn opens_exactly_once() {
        let gate = ReadyGate::new();
        assert!(!gate.is_open());
        assert!(gate.open());
        assert!(!gate.open());
        assert!(gate.is_open());
    }

    #[tokio::test]
    async fn waiters_are_released_on_open() {
        let gate = ReadyGate::new();
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        gate.open();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();

        // Late waiters return immediately.
        tokio::time::timeout(Duration::from_millis(10), gate.wait())
            .await
            .expect("open gate must not block");
    }
}
