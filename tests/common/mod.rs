//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use slpd::{SlpClient, SlpDaemon};
use slpd_core::{DaemonConfig, ExportMap, ScopeSet, UrlEntry};
use slpd_engine::{DiscoveryEngine, FindServiceCallback, SlpServer};
use slpd_io::{ReactorHandle, ShutdownHandle};
use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How long a test waits for the daemon thread to report or stop.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for an isolated daemon: ephemeral RPC port, no console,
/// no HTTP diagnostics.
pub fn test_config() -> DaemonConfig {
    let mut config = DaemonConfig::default();
    config.rpc.port = 0;
    config.console.enabled = false;
    config.http.enabled = false;
    config
}

/// A daemon running on its own thread.
pub struct TestDaemon {
    pub rpc: SocketAddr,
    pub http: Option<SocketAddr>,
    shutdown: ShutdownHandle,
    stopped: mpsc::Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

impl TestDaemon {
    /// Starts a daemon with the in-memory engine.
    pub fn start(config: DaemonConfig) -> Self {
        Self::start_with(move || SlpDaemon::new(config).expect("Failed to create daemon"), |_| {})
    }

    /// Builds a daemon on the daemon thread, runs `setup` after `init`, then
    /// runs the loop until the daemon is stopped.
    pub fn start_with<B, S>(build: B, setup: S) -> Self
    where
        B: FnOnce() -> SlpDaemon + Send + 'static,
        S: FnOnce(&SlpDaemon) + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (stopped_tx, stopped_rx) = mpsc::channel();

        let thread = std::thread::spawn(move || {
            let daemon = build();
            if let Err(e) = daemon.init() {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
            setup(&daemon);

            let rpc = daemon.rpc_address().expect("RPC address after init");
            let _ = ready_tx.send(Ok((rpc, daemon.http_address(), daemon.shutdown_handle())));

            daemon.run();
            let _ = stopped_tx.send(());
        });

        let (rpc, http, shutdown) = ready_rx
            .recv_timeout(STARTUP_TIMEOUT)
            .expect("Daemon thread did not report")
            .expect("Daemon failed to initialize");

        Self {
            rpc,
            http,
            shutdown,
            stopped: stopped_rx,
            thread: Some(thread),
        }
    }

    /// Connects a blocking client with a short reply timeout.
    pub fn client(&self) -> SlpClient {
        let client = SlpClient::connect(self.rpc).expect("Failed to connect");
        client
            .set_timeout(Some(Duration::from_secs(5)))
            .expect("Failed to set timeout");
        client
    }

    /// Handle that terminates the daemon.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Waits for `run` to return on its own.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        self.stopped.recv_timeout(timeout).is_ok()
    }

    /// Terminates the daemon and joins its thread.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        self.shutdown.terminate();
        if let Some(thread) = self.thread.take() {
            thread.join().expect("Daemon thread panicked");
        }
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.shutdown.terminate();
            return;
        }
        self.shutdown_and_join();
    }
}

/// Engine that answers lookups only after a delay.
pub struct SlowEngine {
    inner: SlpServer,
    reactor: ReactorHandle,
    delay: Duration,
}

impl DiscoveryEngine for SlowEngine {
    fn init(&self) -> slpd_engine::Result<()> {
        self.inner.init()
    }

    fn find_service(&self, scopes: &ScopeSet, service_type: &str, callback: FindServiceCallback) {
        let found: Rc<RefCell<Option<Vec<UrlEntry>>>> = Rc::default();
        let sink = found.clone();
        self.inner.find_service(
            scopes,
            service_type,
            Box::new(move |entries| *sink.borrow_mut() = Some(entries)),
        );
        self.reactor.register_timeout(self.delay, move || {
            callback(found.borrow_mut().take().unwrap_or_default());
        });
    }

    fn register_service(
        &self,
        scopes: &ScopeSet,
        service_type: &str,
        entry: UrlEntry,
    ) -> slpd_engine::Result<()> {
        self.inner.register_service(scopes, service_type, entry)
    }

    fn deregister_service(&self, scopes: &ScopeSet, url: &str) -> slpd_engine::Result<()> {
        self.inner.deregister_service(scopes, url)
    }

    fn bulk_load(&self, scope: &str, service_type: &str, entries: &[UrlEntry]) {
        self.inner.bulk_load(scope, service_type, entries)
    }

    fn dump_store(&self) {
        self.inner.dump_store()
    }

    fn entry_count(&self) -> usize {
        self.inner.entry_count()
    }
}

/// A daemon whose lookups complete `delay` after they are made.
pub fn slow_daemon(delay: Duration) -> SlpDaemon {
    let config = test_config();
    let engine_config = config.engine.clone();
    SlpDaemon::with_engine(
        config,
        move |reactor: ReactorHandle, export_map: ExportMap| -> Rc<dyn DiscoveryEngine> {
            Rc::new(SlowEngine {
                inner: SlpServer::new(engine_config, reactor.clone(), export_map),
                reactor,
                delay,
            })
        },
    )
    .unwrap()
}
