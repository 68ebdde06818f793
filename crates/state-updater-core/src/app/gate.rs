//! ShutdownGate - worker の終了通知（一度だけ開くラッチ）

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::handoff::lock;

/// One-shot latch opened by the worker thread when it has fully shut down.
#[derive(Debug, Default)]
pub(crate) struct ShutdownGate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl ShutdownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate. Returns false if it was already open.
    pub fn open(&self) -> bool {
        let mut open = lock(&self.open);
        if *open {
            return false;
        }
        *open = true;
        self.cond.notify_all();
        true
    }

    pub fn is_open(&self) -> bool {
        *lock(&self.open)
    }

    /// Wait until the gate opens or `timeout` elapses; returns whether it is
    /// open.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut open = lock(&self.open);
        while !*open {
            open = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.cond
                        .wait_timeout(open, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.cond.wait(open).unwrap_or_else(PoisonError::into_inner),
            };
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_times_out_while_closed() {
        let gate = ShutdownGate::new();
        let start = Instant::now();
        assert!(!gate.wait(Duration::from_millis(100)));
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_opens_exactly_once() {
        let gate = ShutdownGate::new();
        assert!(gate.open());
        assert!(!gate.open());
        assert!(gate.is_open());
        assert!(gate.wait(Duration::ZERO));
    }

    #[test]
    fn test_open_wakes_waiter() {
        let gate = Arc::new(ShutdownGate::new());
        let waiter = thread::spawn({
            let gate = Arc::clone(&gate);
            move || gate.wait(Duration::from_secs(5))
        });
        thread::sleep(Duration::from_millis(100));
        gate.open();
        assert!(waiter.join().unwrap());
    }
}
