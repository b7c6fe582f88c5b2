use crossbeam_channel::{after, bounded, select, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SolverError};

type Listener = Box<dyn Fn(&str) + Send + Sync>;

/// Handle of a registered listener, used to remove it again.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ListenerId(u64);

#[derive(Default)]
struct ShutdownState {
    requested: AtomicBool,
    reason: Mutex<Option<String>>,
    next_listener: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
}

/// Cooperative cancellation signal shared between a solver context and the
/// threads that may want to stop it.
#[derive(Clone, Default)]
pub struct ShutdownNotifier {
    state: Arc<ShutdownState>,
}

impl ShutdownNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self, reason: &str) {
        if self.state.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut slot) = self.state.reason.lock() {
            *slot = Some(reason.to_string());
        }
        debug!(reason, "shutdown requested");
        if let Ok(listeners) = self.state.listeners.lock() {
            for (_, listener) in listeners.iter() {
                listener(reason);
            }
        }
    }

    pub fn should_shutdown(&self) -> bool {
        self.state.requested.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.state.reason.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn shutdown_if_necessary(&self) -> Result<()> {
        if self.should_shutdown() {
            Err(SolverError::Interrupted(
                self.reason().unwrap_or_else(|| "shutdown requested".to_string()),
            ))
        } else {
            Ok(())
        }
    }

    /// Runs `listener` once a shutdown is requested, immediately if it already was.
    /// A listener that already ran is not kept, so unregistering its id is a no-op.
    pub fn register<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = ListenerId(self.state.next_listener.fetch_add(1, Ordering::Relaxed));
        if self.should_shutdown() {
            listener(&self.reason().unwrap_or_default());
            return id;
        }
        if let Ok(mut listeners) = self.state.listeners.lock() {
            listeners.push((id, Box::new(listener)));
        }
        id
    }

    /// Removes a listener; returns whether it was still registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        match self.state.listeners.lock() {
            Ok(mut listeners) => {
                let before = listeners.len();
                listeners.retain(|(registered, _)| *registered != id);
                listeners.len() != before
            }
            Err(_) => false,
        }
    }

    pub fn registered_listeners(&self) -> usize {
        self.state
            .listeners
            .lock()
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }

    /// Requests a shutdown once `timeout` has passed, unless the returned
    /// watchdog is dropped first.
    pub fn request_shutdown_after(&self, timeout: Duration) -> Watchdog {
        let (cancel_sender, cancel_receiver) = bounded::<()>(1);
        let notifier = self.clone();
        let handle = thread::spawn(move || {
            select! {
                recv(cancel_receiver) -> _ => {}
                recv(after(timeout)) -> _ => notifier.request_shutdown("timeout"),
            }
        });
        Watchdog {
            cancel: Some(cancel_sender),
            handle: Some(handle),
        }
    }
}

pub struct Watchdog {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        // Dropping the sender disconnects the channel and wakes the thread.
        self.cancel.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn request_is_sticky_and_reported() {
        let notifier = ShutdownNotifier::new();
        assert!(notifier.shutdown_if_necessary().is_ok());
        notifier.request_shutdown("user abort");
        notifier.request_shutdown("second request");
        assert!(notifier.should_shutdown());
        assert_eq!(notifier.reason().as_deref(), Some("user abort"));
        assert!(matches!(
            notifier.shutdown_if_necessary(),
            Err(SolverError::Interrupted(reason)) if reason == "user abort"
        ));
    }

    #[test]
    fn listeners_run_once() {
        let notifier = ShutdownNotifier::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        notifier.register(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        notifier.request_shutdown("stop");
        notifier.request_shutdown("stop again");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let late = calls.clone();
        notifier.register(move |_| {
            late.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unregistered_listener_is_not_called() {
        let notifier = ShutdownNotifier::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let id = notifier.register(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let kept = notifier.register(|_| {});
        assert_ne!(id, kept);
        assert_eq!(notifier.registered_listeners(), 2);
        assert!(notifier.unregister(id));
        assert!(!notifier.unregister(id));
        assert_eq!(notifier.registered_listeners(), 1);
        notifier.request_shutdown("stop");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let late = notifier.register(|_| {});
        assert_eq!(notifier.registered_listeners(), 1);
        assert!(!notifier.unregister(late));
    }

    #[test]
    fn watchdog_fires_after_timeout() {
        let notifier = ShutdownNotifier::new();
        let watchdog = notifier.request_shutdown_after(Duration::from_millis(10));
        thread::sleep(Duration::from_millis(200));
        assert!(notifier.should_shutdown());
        assert_eq!(notifier.reason().as_deref(), Some("timeout"));
        drop(watchdog);
    }

    #[test]
    fn dropped_watchdog_never_fires() {
        let notifier = ShutdownNotifier::new();
        drop(notifier.request_shutdown_after(Duration::from_millis(50)));
        thread::sleep(Duration::from_millis(150));
        assert!(!notifier.should_shutdown());
    }
}
