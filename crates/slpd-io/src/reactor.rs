//! Single-threaded event reactor.
//!
//! The reactor owns a current-thread tokio runtime and a [`LocalSet`]. Every
//! registered descriptor, timer and deferred callback runs on the thread that
//! calls [`Reactor::run`], so handlers may hold `Rc`/`RefCell` state and
//! never need locks. The only cross-thread entry point is
//! [`ShutdownHandle::terminate`].

use crate::clock::Clock;
use crate::descriptor::{Descriptor, DescriptorId, Ownership, TimeoutId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tokio::runtime::{EnterGuard, Runtime};
use tokio::task::{AbortHandle, LocalEnterGuard, LocalSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Thread-safe handle that stops a running reactor.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    /// Requests termination. Idempotent; safe from any thread.
    pub fn terminate(&self) {
        self.token.cancel();
    }

    /// Returns true once termination was requested.
    pub fn is_terminated(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once termination was requested.
    pub async fn terminated(&self) {
        self.token.cancelled().await
    }
}

struct Registration {
    descriptor: Rc<dyn Descriptor>,
    ownership: Ownership,
    task: AbortHandle,
}

struct Shared {
    runtime: tokio::runtime::Handle,
    descriptors: RefCell<HashMap<DescriptorId, Registration>>,
    timeouts: RefCell<HashMap<TimeoutId, AbortHandle>>,
    next_id: Cell<u64>,
    shutdown: ShutdownHandle,
    clock: Clock,
}

impl Shared {
    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }
}

/// Event reactor driving descriptors, timers and deferred callbacks.
pub struct Reactor {
    local: LocalSet,
    runtime: Option<Runtime>,
    handle: ReactorHandle,
    running: Cell<bool>,
}

/// Guard returned by [`Reactor::enter`]; registrations are only accepted
/// while one is alive or while the reactor runs.
pub struct ReactorContext<'a> {
    _runtime: EnterGuard<'a>,
    _local: LocalEnterGuard,
}

impl Reactor {
    /// Creates a reactor with its own current-thread runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be built.
    pub fn new() -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let shared = Rc::new(Shared {
            runtime: runtime.handle().clone(),
            descriptors: RefCell::new(HashMap::new()),
            timeouts: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
            shutdown: ShutdownHandle::default(),
            clock: Clock::new(),
        });

        Ok(Self {
            local: LocalSet::new(),
            runtime: Some(runtime),
            handle: ReactorHandle { shared },
            running: Cell::new(false),
        })
    }

    /// Returns a handle for registering descriptors and timers.
    pub fn handle(&self) -> ReactorHandle {
        self.handle.clone()
    }

    /// Enters the reactor context outside of [`Reactor::run`].
    ///
    /// Needed to register descriptors or create tokio sockets before the
    /// loop starts.
    pub fn enter(&self) -> ReactorContext<'_> {
        ReactorContext {
            _runtime: self.handle.shared.runtime.enter(),
            _local: self.local.enter(),
        }
    }

    /// Runs the dispatch loop until termination is requested.
    ///
    /// Returns immediately if termination was already requested.
    pub fn run(&self) {
        let Some(runtime) = self.runtime.as_ref() else {
            return;
        };
        let shutdown = self.handle.shutdown_handle();
        if shutdown.is_terminated() {
            debug!("Reactor already terminated, not running");
            return;
        }
        if self.running.replace(true) {
            warn!("Reactor is already running");
            return;
        }

        info!(
            descriptors = self.handle.descriptor_count(),
            "Reactor running"
        );
        self.local.block_on(runtime, shutdown.terminated());
        self.running.set(false);

        info!(
            uptime_ms = self.handle.clock().uptime().as_millis() as u64,
            "Reactor stopped"
        );
    }

    /// Requests termination of the dispatch loop.
    pub fn terminate(&self) {
        self.handle.terminate();
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.handle.release_all();
        if let Some(runtime) = self.runtime.take() {
            // A console read may still be parked on the blocking pool.
            runtime.shutdown_background();
        }
    }
}

/// Cloneable, single-threaded handle to a [`Reactor`].
#[derive(Clone)]
pub struct ReactorHandle {
    shared: Rc<Shared>,
}

impl ReactorHandle {
    /// Registers a descriptor; its `serve` future starts on the next cycle.
    ///
    /// When `serve` completes the descriptor is removed, and closed if its
    /// ownership was transferred.
    pub fn register(&self, descriptor: Rc<dyn Descriptor>, ownership: Ownership) -> DescriptorId {
        let id = DescriptorId(self.shared.next_id());
        let label = descriptor.describe();
        let weak = Rc::downgrade(&self.shared);
        let serve = descriptor.clone().serve();

        let task = tokio::task::spawn_local(async move {
            serve.await;
            if let Some(shared) = weak.upgrade() {
                ReactorHandle { shared }.remove(id, false);
            }
        });

        self.shared.descriptors.borrow_mut().insert(
            id,
            Registration {
                descriptor,
                ownership,
                task: task.abort_handle(),
            },
        );

        debug!(%id, descriptor = %label, ?ownership, "Descriptor registered");
        id
    }

    /// Stops servicing a descriptor. Returns false if it was not registered.
    pub fn deregister(&self, id: DescriptorId) -> bool {
        self.remove(id, true)
    }

    /// Returns true while the descriptor is registered.
    pub fn is_registered(&self, id: DescriptorId) -> bool {
        self.shared.descriptors.borrow().contains_key(&id)
    }

    /// Number of registered descriptors.
    pub fn descriptor_count(&self) -> usize {
        self.shared.descriptors.borrow().len()
    }

    /// Runs `callback` once after `delay`.
    pub fn register_timeout<F>(&self, delay: Duration, callback: F) -> TimeoutId
    where
        F: FnOnce() + 'static,
    {
        let id = TimeoutId(self.shared.next_id());
        let weak = Rc::downgrade(&self.shared);

        let task = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                shared.timeouts.borrow_mut().remove(&id);
            }
            callback();
        });

        self.shared
            .timeouts
            .borrow_mut()
            .insert(id, task.abort_handle());
        id
    }

    /// Runs `callback` every `interval` until it returns false or the
    /// timeout is removed.
    pub fn register_repeating_timeout<F>(&self, interval: Duration, mut callback: F) -> TimeoutId
    where
        F: FnMut() -> bool + 'static,
    {
        let id = TimeoutId(self.shared.next_id());
        let weak = Rc::downgrade(&self.shared);

        let task = tokio::task::spawn_local(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !callback() {
                    break;
                }
            }
            if let Some(shared) = weak.upgrade() {
                shared.timeouts.borrow_mut().remove(&id);
            }
        });

        self.shared
            .timeouts
            .borrow_mut()
            .insert(id, task.abort_handle());
        id
    }

    /// Cancels a pending timeout. Returns false if it already fired or was
    /// never registered.
    pub fn remove_timeout(&self, id: TimeoutId) -> bool {
        match self.shared.timeouts.borrow_mut().remove(&id) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Defers `callback` to a later dispatch cycle.
    pub fn execute<F>(&self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        tokio::task::spawn_local(async move { callback() });
    }

    /// Spawns a future onto the reactor thread.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + 'static,
    {
        tokio::task::spawn_local(future);
    }

    /// Requests termination of the dispatch loop.
    pub fn terminate(&self) {
        self.shared.shutdown.terminate();
    }

    /// Returns true once termination was requested.
    pub fn is_terminated(&self) -> bool {
        self.shared.shutdown.is_terminated()
    }

    /// Returns a `Send` handle that terminates the reactor.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shared.shutdown.clone()
    }

    /// Returns the reactor clock.
    pub fn clock(&self) -> Clock {
        self.shared.clock
    }

    /// Returns the tokio runtime handle backing the reactor.
    pub fn runtime(&self) -> &tokio::runtime::Handle {
        &self.shared.runtime
    }

    fn remove(&self, id: DescriptorId, abort: bool) -> bool {
        let removed = self.shared.descriptors.borrow_mut().remove(&id);
        let Some(registration) = removed else {
            return false;
        };

        if abort {
            registration.task.abort();
        }
        if registration.ownership == Ownership::Transferred {
            registration.descriptor.close();
        }

        debug!(
            %id,
            descriptor = %registration.descriptor.describe(),
            "Descriptor removed"
        );
        true
    }

    fn release_all(&self) {
        let registrations: Vec<_> = self.shared.descriptors.borrow_mut().drain().collect();
        for (id, registration) in registrations {
            registration.task.abort();
            if registration.ownership == Ownership::Transferred {
                debug!(%id, descriptor = %registration.descriptor.describe(), "Releasing descriptor");
                registration.descriptor.close();
            }
        }

        let timeouts: Vec<_> = self.shared.timeouts.borrow_mut().drain().collect();
        for (_, task) in timeouts {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorFuture;

    struct Probe {
        closes: Cell<u32>,
        finishes: bool,
    }

    impl Probe {
        fn new(finishes: bool) -> Rc<Self> {
            Rc::new(Self {
                closes: Cell::new(0),
                finishes,
            })
        }
    }

    impl Descriptor for Probe {
        fn describe(&self) -> String {
            "probe".to_string()
        }

        fn serve(self: Rc<Self>) -> DescriptorFuture {
            if self.finishes {
                Box::pin(async {})
            } else {
                Box::pin(futures::future::pending())
            }
        }

        fn close(&self) {
            self.closes.set(self.closes.get() + 1);
        }
    }

    fn stop_after(handle: &ReactorHandle, delay: Duration) {
        let stopper = handle.clone();
        handle.register_timeout(delay, move || stopper.terminate());
    }

    #[test]
    fn test_timeout_terminates_run() {
        let reactor = Reactor::new().unwrap();
        let handle = reactor.handle();
        {
            let _context = reactor.enter();
            stop_after(&handle, Duration::from_millis(10));
        }
        reactor.run();
        assert!(handle.is_terminated());
    }

    #[test]
    fn test_run_after_terminate_returns_immediately() {
        let reactor = Reactor::new().unwrap();
        reactor.terminate();
        reactor.terminate();
        reactor.run();
        assert!(reactor.handle().is_terminated());
    }

    #[test]
    fn test_terminate_from_other_thread() {
        let reactor = Reactor::new().unwrap();
        let shutdown = reactor.handle().shutdown_handle();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            shutdown.terminate();
        });
        reactor.run();
        stopper.join().unwrap();
    }

    #[test]
    fn test_transferred_descriptor_closed_once_when_serve_completes() {
        let reactor = Reactor::new().unwrap();
        let handle = reactor.handle();
        let probe = Probe::new(true);
        {
            let _context = reactor.enter();
            handle.register(probe.clone(), Ownership::Transferred);
            stop_after(&handle, Duration::from_millis(20));
        }
        reactor.run();
        assert_eq!(probe.closes.get(), 1);
        assert_eq!(handle.descriptor_count(), 0);

        drop(reactor);
        assert_eq!(probe.closes.get(), 1);
    }

    #[test]
    fn test_borrowed_descriptor_is_not_closed() {
        let reactor = Reactor::new().unwrap();
        let handle = reactor.handle();
        let probe = Probe::new(true);
        {
            let _context = reactor.enter();
            handle.register(probe.clone(), Ownership::Borrowed);
            stop_after(&handle, Duration::from_millis(20));
        }
        reactor.run();
        assert_eq!(probe.closes.get(), 0);
        assert_eq!(handle.descriptor_count(), 0);
    }

    #[test]
    fn test_deregister_releases_transferred_descriptor() {
        let reactor = Reactor::new().unwrap();
        let handle = reactor.handle();
        let probe = Probe::new(false);
        let _context = reactor.enter();

        let id = handle.register(probe.clone(), Ownership::Transferred);
        assert!(handle.is_registered(id));
        assert!(handle.deregister(id));
        assert!(!handle.deregister(id));
        assert_eq!(probe.closes.get(), 1);
        assert!(!handle.is_registered(id));
    }

    #[test]
    fn test_drop_releases_transferred_descriptors() {
        let reactor = Reactor::new().unwrap();
        let handle = reactor.handle();
        let owned = Probe::new(false);
        let borrowed = Probe::new(false);
        {
            let _context = reactor.enter();
            handle.register(owned.clone(), Ownership::Transferred);
            handle.register(borrowed.clone(), Ownership::Borrowed);
        }
        drop(reactor);
        assert_eq!(owned.closes.get(), 1);
        assert_eq!(borrowed.closes.get(), 0);
    }

    #[test]
    fn test_execute_is_deferred() {
        let reactor = Reactor::new().unwrap();
        let handle = reactor.handle();
        let ran = Rc::new(Cell::new(false));
        {
            let _context = reactor.enter();
            let flag = ran.clone();
            handle.execute(move || flag.set(true));
            assert!(!ran.get());
            stop_after(&handle, Duration::from_millis(10));
        }
        reactor.run();
        assert!(ran.get());
    }

    #[test]
    fn test_repeating_timeout_stops_when_callback_declines() {
        let reactor = Reactor::new().unwrap();
        let handle = reactor.handle();
        let ticks = Rc::new(Cell::new(0u32));
        {
            let _context = reactor.enter();
            let counter = ticks.clone();
            handle.register_repeating_timeout(Duration::from_millis(2), move || {
                counter.set(counter.get() + 1);
                counter.get() < 3
            });
            stop_after(&handle, Duration::from_millis(100));
        }
        reactor.run();
        assert_eq!(ticks.get(), 3);
    }

    #[test]
    fn test_removed_timeout_never_fires() {
        let reactor = Reactor::new().unwrap();
        let handle = reactor.handle();
        let fired = Rc::new(Cell::new(false));
        {
            let _context = reactor.enter();
            let flag = fired.clone();
            let id = handle.register_timeout(Duration::from_millis(5), move || flag.set(true));
            assert!(handle.remove_timeout(id));
            assert!(!handle.remove_timeout(id));
            stop_after(&handle, Duration::from_millis(30));
        }
        reactor.run();
        assert!(!fired.get());
    }
}
