//! Control-port connection acceptor.
//!
//! The acceptor binds a loopback listener, registers itself with the
//! reactor (borrowed: the acceptor keeps its socket) and, for every inbound
//! connection, builds an [`RpcConnection`] bound to the service façade and
//! hands it to the reactor with transferred ownership. A connection table
//! keyed by [`ConnectionId`] is kept in step through each connection's close
//! handler.

use crate::channel::RpcConnection;
use crate::error::AcceptorError;
use crate::service::SlpService;
use chrono::{DateTime, Utc};
use slpd_core::{ConnectionId, ExportMap};
use slpd_io::{Descriptor, DescriptorFuture, DescriptorId, Ownership, ReactorHandle};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Export variable counting accepted connections.
pub const CONNECTIONS_ACCEPTED_VAR: &str = "rpc-connections-accepted";

/// Export variable holding the number of open connections.
pub const CONNECTIONS_ACTIVE_VAR: &str = "rpc-connections-active";

/// Bookkeeping for one accepted connection.
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    /// Remote address of the caller.
    pub peer: SocketAddr,
    /// Reactor registration serving the connection.
    pub descriptor: DescriptorId,
    /// When the connection was accepted.
    pub accepted_at: DateTime<Utc>,
}

struct AcceptorInner {
    reactor: ReactorHandle,
    service: Rc<dyn SlpService>,
    export_map: ExportMap,
    listener: RefCell<Option<TcpListener>>,
    local_addr: Cell<Option<SocketAddr>>,
    registration: Cell<Option<DescriptorId>>,
    connections: RefCell<HashMap<ConnectionId, ConnectionRecord>>,
}

impl AcceptorInner {
    fn new_connection(self: &Rc<Self>, stream: TcpStream, peer: SocketAddr) {
        let id = ConnectionId::new();
        let connection = Rc::new(RpcConnection::new(id, peer, stream, self.service.clone()));

        let acceptor = Rc::downgrade(self);
        connection.set_on_close(Box::new(move |id| {
            if let Some(acceptor) = acceptor.upgrade() {
                acceptor.connection_closed(id);
            }
        }));

        let descriptor = self.reactor.register(connection, Ownership::Transferred);
        let active = {
            let mut connections = self.connections.borrow_mut();
            connections.insert(
                id,
                ConnectionRecord {
                    peer,
                    descriptor,
                    accepted_at: Utc::now(),
                },
            );
            connections.len()
        };

        self.export_map.add_int(CONNECTIONS_ACCEPTED_VAR, 1);
        self.export_map.set_int(CONNECTIONS_ACTIVE_VAR, active as i64);
        info!(connection_id = %id, peer = %peer, active, "Accepted RPC connection");
    }

    fn connection_closed(&self, id: ConnectionId) {
        let (record, active) = {
            let mut connections = self.connections.borrow_mut();
            let record = connections.remove(&id);
            (record, connections.len())
        };

        self.export_map.set_int(CONNECTIONS_ACTIVE_VAR, active as i64);
        match record {
            Some(record) => {
                let open_for = Utc::now() - record.accepted_at;
                info!(
                    connection_id = %id,
                    peer = %record.peer,
                    open_ms = open_for.num_milliseconds(),
                    active,
                    "RPC connection removed"
                );
            }
            None => debug!(connection_id = %id, "Close for unknown connection"),
        }
    }
}

impl Descriptor for AcceptorInner {
    fn describe(&self) -> String {
        match self.local_addr.get() {
            Some(address) => format!("rpc-acceptor {}", address),
            None => "rpc-acceptor".to_string(),
        }
    }

    fn serve(self: Rc<Self>) -> DescriptorFuture {
        Box::pin(async move {
            let Some(listener) = self.listener.borrow_mut().take() else {
                return;
            };

            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => self.new_connection(stream, peer),
                    Err(e) => {
                        warn!(error = %e, "Accept error");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        })
    }

    fn close(&self) {
        self.listener.borrow_mut().take();
    }
}

/// Accepts control connections and tracks them until they close.
pub struct RpcAcceptor {
    inner: Rc<AcceptorInner>,
}

impl RpcAcceptor {
    /// Creates an idle acceptor; call [`RpcAcceptor::listen`] and
    /// [`RpcAcceptor::start`] to serve connections through `service`.
    pub fn new(reactor: ReactorHandle, service: Rc<dyn SlpService>, export_map: ExportMap) -> Self {
        export_map.set_int(CONNECTIONS_ACCEPTED_VAR, 0);
        export_map.set_int(CONNECTIONS_ACTIVE_VAR, 0);
        Self {
            inner: Rc::new(AcceptorInner {
                reactor,
                service,
                export_map,
                listener: RefCell::new(None),
                local_addr: Cell::new(None),
                registration: Cell::new(None),
                connections: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Binds and listens on `address`, returning the bound address.
    ///
    /// # Errors
    ///
    /// Returns [`AcceptorError::Bind`] if the port is in use or cannot be
    /// bound, and [`AcceptorError::AlreadyListening`] on a second call.
    pub fn listen(&self, address: SocketAddr) -> Result<SocketAddr, AcceptorError> {
        if let Some(bound) = self.inner.local_addr.get() {
            return Err(AcceptorError::AlreadyListening(bound));
        }

        let listener = std::net::TcpListener::bind(address)
            .map_err(|source| AcceptorError::Bind { address, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| AcceptorError::Bind { address, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| AcceptorError::Bind { address, source })?;

        let listener = {
            let _runtime = self.inner.reactor.runtime().enter();
            TcpListener::from_std(listener)
                .map_err(|source| AcceptorError::Bind { address, source })?
        };

        *self.inner.listener.borrow_mut() = Some(listener);
        self.inner.local_addr.set(Some(local_addr));
        info!(address = %local_addr, "RPC listener bound");
        Ok(local_addr)
    }

    /// Registers the listener with the reactor so connections are accepted.
    pub fn start(&self) -> Result<DescriptorId, AcceptorError> {
        if let Some(id) = self.inner.registration.get() {
            return Ok(id);
        }
        if self.inner.listener.borrow().is_none() {
            return Err(AcceptorError::NotListening);
        }

        let id = self
            .inner
            .reactor
            .register(self.inner.clone(), Ownership::Borrowed);
        self.inner.registration.set(Some(id));
        Ok(id)
    }

    /// Stops listening. Accepted connections keep running.
    pub fn close(&self) {
        if let Some(id) = self.inner.registration.take() {
            self.inner.reactor.deregister(id);
        }
        self.inner.close();
        if let Some(address) = self.inner.local_addr.take() {
            info!(address = %address, "RPC listener closed");
        }
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr.get()
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.inner.connections.borrow().len()
    }

    /// Peer addresses of the open connections.
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.inner
            .connections
            .borrow()
            .values()
            .map(|record| record.peer)
            .collect()
    }

    /// Closes one accepted connection through the reactor.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let descriptor = self
            .inner
            .connections
            .borrow()
            .get(&id)
            .map(|record| record.descriptor);
        match descriptor {
            Some(descriptor) => self.inner.reactor.deregister(descriptor),
            None => false,
        }
    }

    /// Identities of the open connections.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.inner.connections.borrow().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RpcCompletion;
    use slpd_io::Reactor;
    use slpd_proto::{
        read_message, write_message, RpcMessage, ServiceAck, ServiceDeRegistration,
        ServiceRegistration, ServiceReply, ServiceRequest, SlpMethod,
    };

    struct EchoService;

    impl SlpService for EchoService {
        fn find_service(&self, _request: ServiceRequest, done: RpcCompletion<ServiceReply>) {
            done.complete(ServiceReply::default());
        }

        fn register_service(&self, request: ServiceRegistration, done: RpcCompletion<ServiceAck>) {
            done.complete(ServiceAck {
                error_code: request.lifetime,
            });
        }

        fn deregister_service(&self, _request: ServiceDeRegistration, done: RpcCompletion<ServiceAck>) {
            done.complete(ServiceAck { error_code: 0 });
        }
    }

    fn acceptor(reactor: &Reactor, export_map: &ExportMap) -> RpcAcceptor {
        RpcAcceptor::new(reactor.handle(), Rc::new(EchoService), export_map.clone())
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn test_second_bind_fails() {
        let reactor = Reactor::new().unwrap();
        let export_map = ExportMap::new();
        let first = acceptor(&reactor, &export_map);
        let address = first.listen(loopback()).unwrap();

        let second = acceptor(&reactor, &export_map);
        assert!(matches!(
            second.listen(address),
            Err(AcceptorError::Bind { .. })
        ));
        assert!(matches!(
            first.listen(loopback()),
            Err(AcceptorError::AlreadyListening(_))
        ));
    }

    #[test]
    fn test_start_requires_listen() {
        let reactor = Reactor::new().unwrap();
        let _context = reactor.enter();
        let acceptor = acceptor(&reactor, &ExportMap::new());
        assert!(matches!(acceptor.start(), Err(AcceptorError::NotListening)));
    }

    #[test]
    fn test_connection_is_served_and_removed_on_close() {
        let reactor = Reactor::new().unwrap();
        let handle = reactor.handle();
        let export_map = ExportMap::new();
        let acceptor = acceptor(&reactor, &export_map);
        let address = acceptor.listen(loopback()).unwrap();
        {
            let _context = reactor.enter();
            acceptor.start().unwrap();
        }

        let client = std::thread::spawn(move || {
            let mut stream = std::net::TcpStream::connect(address).unwrap();
            let request = ServiceRegistration {
                lifetime: 42,
                ..ServiceRegistration::default()
            };
            write_message(
                &mut stream,
                &RpcMessage::request(1, SlpMethod::RegisterService, &request),
            )
            .unwrap();
            let reply = read_message(&mut stream).unwrap();
            reply.payload::<ServiceAck>().unwrap().error_code
        });

        let stopper = handle.clone();
        let peer_count = Rc::new(Cell::new(0usize));
        {
            let _context = reactor.enter();
            let observed = peer_count.clone();
            let inner = acceptor.inner.clone();
            handle.register_repeating_timeout(Duration::from_millis(5), move || {
                let open = inner.connections.borrow().len();
                observed.set(observed.get().max(open));
                true
            });
            handle.register_timeout(Duration::from_millis(300), move || stopper.terminate());
        }
        reactor.run();

        assert_eq!(client.join().unwrap(), 42);
        assert_eq!(export_map.get_int(CONNECTIONS_ACCEPTED_VAR), Some(1));
        assert_eq!(peer_count.get(), 1);
        assert_eq!(acceptor.connection_count(), 0);
        assert_eq!(export_map.get_int(CONNECTIONS_ACTIVE_VAR), Some(0));
    }
}
