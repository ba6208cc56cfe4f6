//! Listener lifecycle registry.
//!
//! Listeners are registered once fully built and are then driven by the
//! server: started when the server starts, destroyed when it shuts down.
//! The lifecycle phase lives under the same lock as the listener list, so a
//! registration racing `start_all` is either started by it or started on
//! registration, never neither.

use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use thiserror::Error;
use tokio::runtime::Handle;

/// A listener the server owns and drives.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Begin accepting connections on `runtime`. Must not block.
    fn start(&mut self, runtime: &Handle);

    /// Stop accepting and release the listener's resources.
    ///
    /// No accept callback may run once this returns.
    async fn destroy(self: Box<Self>);

    /// Addresses the listener is bound to.
    fn local_addrs(&self) -> Vec<SocketAddr>;
}

/// The registry no longer takes listeners.
#[derive(Debug, Error)]
#[error("server is shut down")]
pub struct RegistryClosed;

/// Outcome of [`ListenerRegistry::start_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started(usize),
    AlreadyRunning,
    Closed,
}

#[derive(Default)]
enum Phase {
    #[default]
    Idle,
    Running(Handle),
    Closed,
}

#[derive(Default)]
struct Inner {
    phase: Phase,
    listeners: Vec<Box<dyn Listener>>,
}

/// Holds registered listeners until shutdown.
#[derive(Default)]
pub struct ListenerRegistry {
    inner: Mutex<Inner>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `listener`, starting it right away if the registry
    /// is running.
    ///
    /// After [`destroy_all`](Self::destroy_all) the listener is dropped
    /// unstarted and `RegistryClosed` is returned.
    pub fn register(&self, mut listener: Box<dyn Listener>) -> Result<(), RegistryClosed> {
        let mut inner = self.lock();
        match &inner.phase {
            Phase::Closed => return Err(RegistryClosed),
            Phase::Running(runtime) => listener.start(runtime),
            Phase::Idle => {}
        }
        inner.listeners.push(listener);
        Ok(())
    }

    /// Start every registered listener and every one registered later.
    pub fn start_all(&self, runtime: &Handle) -> StartOutcome {
        let mut inner = self.lock();
        match inner.phase {
            Phase::Closed => return StartOutcome::Closed,
            Phase::Running(_) => return StartOutcome::AlreadyRunning,
            Phase::Idle => {}
        }
        for listener in inner.listeners.iter_mut() {
            listener.start(runtime);
        }
        inner.phase = Phase::Running(runtime.clone());
        StartOutcome::Started(inner.listeners.len())
    }

    /// Close the registry, then remove and destroy every listener in
    /// registration order.
    pub async fn destroy_all(&self) {
        let listeners = {
            let mut inner = self.lock();
            inner.phase = Phase::Closed;
            std::mem::take(&mut inner.listeners)
        };
        for listener in listeners {
            listener.destroy().await;
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.lock().phase, Phase::Running(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.lock().phase, Phase::Closed)
    }

    pub fn len(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().listeners.is_empty()
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.lock().listeners.iter().flat_map(|l| l.local_addrs()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        let phase = match inner.phase {
            Phase::Idle => "idle",
            Phase::Running(_) => "running",
            Phase::Closed => "closed",
        };
        f.debug_struct("ListenerRegistry")
            .field("phase", &phase)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingListener {
        starts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Listener for CountingListener {
        fn start(&mut self, _runtime: &Handle) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        async fn destroy(self: Box<Self>) {}

        fn local_addrs(&self) -> Vec<SocketAddr> {
            Vec::new()
        }
    }

    fn listener(starts: &Arc<AtomicUsize>) -> Box<dyn Listener> {
        Box::new(CountingListener {
            starts: Arc::clone(starts),
        })
    }

    #[tokio::test]
    async fn lifecycle_phases() {
        let registry = ListenerRegistry::new();
        let starts = Arc::new(AtomicUsize::new(0));

        registry.register(listener(&starts)).unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 0);

        assert_eq!(registry.start_all(&Handle::current()), StartOutcome::Started(1));
        assert_eq!(registry.start_all(&Handle::current()), StartOutcome::AlreadyRunning);
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        registry.register(listener(&starts)).unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 2);

        registry.destroy_all().await;
        assert!(registry.is_closed());
        assert!(registry.is_empty());
        assert!(registry.register(listener(&starts)).is_err());
        assert_eq!(registry.start_all(&Handle::current()), StartOutcome::Closed);
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn registration_racing_start_is_always_started() {
        for _ in 0..50 {
            let registry = Arc::new(ListenerRegistry::new());
            let starts = Arc::new(AtomicUsize::new(0));
            let runtime = Handle::current();

            let registrars: Vec<_> = (0..4)
                .map(|_| {
                    let registry = Arc::clone(&registry);
                    let starts = Arc::clone(&starts);
                    std::thread::spawn(move || {
                        for _ in 0..8 {
                            registry.register(listener(&starts)).unwrap();
                        }
                    })
                })
                .collect();
            let starter = {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.start_all(&runtime))
            };

            for registrar in registrars {
                registrar.join().unwrap();
            }
            starter.join().unwrap();

            assert_eq!(registry.len(), 32);
            assert_eq!(starts.load(Ordering::SeqCst), 32);
        }
    }
}
