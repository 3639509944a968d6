use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

/// Creates a connected trigger/wait pair.
///
/// The channel holds at most one pending wake, so any number of triggers
/// before the next wait collapse into one.
pub fn wake_pair() -> (WakeHandle, WakeSignal) {
    let (tx, rx) = bounded(1);
    (WakeHandle { tx }, WakeSignal { rx })
}

/// Sending side of a wake signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WakeHandle {
    tx: Sender<()>,
}

impl WakeHandle {
    /// Wakes the waiting loop. Returns false once the loop has exited.
    pub fn trigger(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Disconnected(())) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Woken {
    Signal,
    Timeout,
    /// Every handle was dropped.
    Closed,
}

/// Receiving side of a wake signal.
#[derive(Debug)]
pub struct WakeSignal {
    rx: Receiver<()>,
}

impl WakeSignal {
    /// Blocks until triggered or `timeout` elapses. Consumes the pending
    /// wake, if any.
    pub fn wait(&self, timeout: Duration) -> Woken {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => Woken::Signal,
            Err(RecvTimeoutError::Timeout) => Woken::Timeout,
            Err(RecvTimeoutError::Disconnected) => Woken::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triggers_collapse() {
        let (handle, signal) = wake_pair();
        assert!(handle.trigger());
        assert!(handle.trigger());
        assert!(handle.clone().trigger());

        assert_eq!(signal.wait(Duration::from_millis(10)), Woken::Signal);
        assert_eq!(signal.wait(Duration::from_millis(10)), Woken::Timeout);
    }

    #[test]
    fn test_wakes_blocked_waiter() {
        let (handle, signal) = wake_pair();
        let waiter = std::thread::spawn(move || signal.wait(Duration::from_secs(10)));
        std::thread::sleep(Duration::from_millis(20));
        handle.trigger();
        assert_eq!(waiter.join().unwrap(), Woken::Signal);
    }

    #[test]
    fn test_closed() {
        let (handle, signal) = wake_pair();
        drop(handle);
        assert_eq!(signal.wait(Duration::from_millis(10)), Woken::Closed);

        let (handle, signal) = wake_pair();
        drop(signal);
        assert!(!handle.trigger());
    }
}
