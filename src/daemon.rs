//! Daemon controller: composition root and lifecycle sequencing.

use crate::acceptor::RpcAcceptor;
use crate::console::{ConsoleCommand, ConsoleReader};
use crate::error::{DaemonError, Result};
use crate::http::DiagnosticsServer;
use crate::service::{SlpService, SlpServiceImpl};
use slpd_core::config::PreloadBlock;
use slpd_core::{DaemonConfig, ExportMap, UrlEntry};
use slpd_engine::{DiscoveryEngine, SlpServer};
use slpd_io::{DescriptorId, Ownership, Reactor, ReactorHandle, ShutdownHandle};
use std::cell::{Cell, RefCell};
use std::net::SocketAddr;
use std::rc::Rc;
use tokio::io::AsyncRead;
use tracing::{error, info, warn};

/// Export variable holding the daemon version.
pub const VERSION_VAR: &str = "slpd-version";

/// Export variable holding the RPC port.
pub const RPC_PORT_VAR: &str = "rpc-port";

/// The Service Location daemon.
///
/// Owns the reactor, the discovery engine, the RPC façade and acceptor, and
/// the optional console and HTTP diagnostics. Everything runs on the thread
/// that calls [`SlpDaemon::run`].
pub struct SlpDaemon {
    config: DaemonConfig,
    export_map: ExportMap,
    engine: Rc<dyn DiscoveryEngine>,
    acceptor: RpcAcceptor,
    http: RefCell<Option<DiagnosticsServer>>,
    console: Cell<Option<DescriptorId>>,
    rpc_address: Cell<Option<SocketAddr>>,
    // Dropped last: releases every descriptor still registered.
    reactor: Reactor,
}

impl SlpDaemon {
    /// Creates a daemon backed by the in-memory [`SlpServer`].
    pub fn new(config: DaemonConfig) -> Result<Self> {
        let engine_config = config.engine.clone();
        Self::with_engine(config, move |reactor, export_map| -> Rc<dyn DiscoveryEngine> {
            Rc::new(SlpServer::new(engine_config, reactor, export_map))
        })
    }

    /// Creates a daemon around an engine built by `factory`.
    pub fn with_engine<F>(config: DaemonConfig, factory: F) -> Result<Self>
    where
        F: FnOnce(ReactorHandle, ExportMap) -> Rc<dyn DiscoveryEngine>,
    {
        let reactor = Reactor::new()?;
        let export_map = ExportMap::new();
        export_map.set_string(VERSION_VAR, env!("CARGO_PKG_VERSION"));

        let engine = factory(reactor.handle(), export_map.clone());
        let service: Rc<dyn SlpService> =
            Rc::new(SlpServiceImpl::new(engine.clone(), export_map.clone()));
        let acceptor = RpcAcceptor::new(reactor.handle(), service, export_map.clone());

        Ok(Self {
            config,
            export_map,
            engine,
            acceptor,
            http: RefCell::new(None),
            console: Cell::new(None),
            rpc_address: Cell::new(None),
            reactor,
        })
    }

    /// Brings the daemon up without running the loop.
    ///
    /// Order: engine, preload, control listener, acceptor registration,
    /// HTTP diagnostics. The first failure aborts startup.
    pub fn init(&self) -> Result<()> {
        let _context = self.reactor.enter();

        self.engine.init()?;
        self.preload(&self.config.preload);

        let address = self.acceptor.listen(self.config.rpc.bind_address())?;
        self.acceptor.start()?;
        self.rpc_address.set(Some(address));
        self.export_map.set_int(RPC_PORT_VAR, i64::from(address.port()));

        if self.config.http.enabled {
            let http_address = self.config.http.bind_address();
            let server = DiagnosticsServer::init(http_address, self.export_map.clone())
                .map_err(|source| DaemonError::Http {
                    address: http_address,
                    source,
                })?;
            *self.http.borrow_mut() = Some(server);
        }

        info!(
            rpc = %address,
            http = ?self.http_address(),
            entries = self.engine.entry_count(),
            "SLP daemon initialized"
        );
        Ok(())
    }

    /// Runs until terminated by `q`, [`SlpDaemon::stop`] or a
    /// [`ShutdownHandle`].
    pub fn run(&self) {
        {
            let _context = self.reactor.enter();
            if let Some(http) = self.http.borrow_mut().as_mut() {
                if let Err(e) = http.start() {
                    error!(error = %e, "Failed to start HTTP diagnostics");
                }
            }
            if self.config.console.enabled && self.console.get().is_none() {
                self.register_console(tokio::io::stdin());
            }
        }

        self.reactor.run();

        if let Some(http) = self.http.borrow_mut().as_mut() {
            http.stop();
        }
        info!("SLP daemon stopped");
    }

    /// Stops HTTP diagnostics and requests loop termination. Open
    /// connections are left to the reactor.
    pub fn stop(&self) {
        if let Some(http) = self.http.borrow_mut().as_mut() {
            http.stop();
        }
        self.reactor.terminate();
    }

    /// Seeds the engine directly.
    pub fn bulk_load(&self, scope: &str, service_type: &str, entries: &[UrlEntry]) {
        self.engine.bulk_load(scope, service_type, entries);
    }

    /// Bulk loads every preload block.
    pub fn preload(&self, blocks: &[PreloadBlock]) {
        for block in blocks {
            self.engine
                .bulk_load(&block.scope, &block.service_type, &block.entries);
        }
    }

    /// Logs the engine's store.
    pub fn dump_store(&self) {
        self.engine.dump_store();
    }

    /// Reads console commands from `input` instead of stdin.
    ///
    /// Must be called before [`SlpDaemon::run`]; stdin is then left alone.
    pub fn attach_console<R>(&self, input: R)
    where
        R: AsyncRead + Unpin + 'static,
    {
        let _context = self.reactor.enter();
        self.register_console(input);
    }

    /// Terminates the loop on SIGINT/SIGTERM.
    pub fn watch_shutdown_signals(&self) {
        let _context = self.reactor.enter();
        let shutdown = self.shutdown_handle();
        self.reactor.handle().spawn(async move {
            shutdown_signal().await;
            shutdown.terminate();
        });
    }

    /// Returns a `Send` handle that terminates the daemon from any thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.reactor.handle().shutdown_handle()
    }

    /// Bound control address, once initialized.
    pub fn rpc_address(&self) -> Option<SocketAddr> {
        self.rpc_address.get()
    }

    /// Bound HTTP diagnostics address, if enabled.
    pub fn http_address(&self) -> Option<SocketAddr> {
        self.http.borrow().as_ref().map(DiagnosticsServer::local_addr)
    }

    /// Number of open control connections.
    pub fn connection_count(&self) -> usize {
        self.acceptor.connection_count()
    }

    /// Diagnostic variables.
    pub fn export_map(&self) -> &ExportMap {
        &self.export_map
    }

    /// The discovery engine.
    pub fn engine(&self) -> &Rc<dyn DiscoveryEngine> {
        &self.engine
    }

    fn register_console<R>(&self, input: R)
    where
        R: AsyncRead + Unpin + 'static,
    {
        if let Some(previous) = self.console.take() {
            self.reactor.handle().deregister(previous);
        }

        let engine = self.engine.clone();
        let reactor = self.reactor.handle();
        let reader = ConsoleReader::new(
            input,
            Box::new(move |command| match command {
                ConsoleCommand::Dump => engine.dump_store(),
                ConsoleCommand::Quit => reactor.terminate(),
            }),
        );
        let id = self
            .reactor
            .handle()
            .register(Rc::new(reader), Ownership::Borrowed);
        self.console.set(Some(id));
    }
}

impl Drop for SlpDaemon {
    fn drop(&mut self) {
        self.acceptor.close();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl-C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
