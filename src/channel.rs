//! Per-connection RPC channel.
//!
//! An [`RpcConnection`] is the reactor descriptor for one accepted control
//! connection. Its serve loop decodes frames into [`RpcMessage`]s, hands
//! requests to an [`RpcChannel`] for dispatch into the [`SlpService`], and
//! writes replies queued by [`RpcCompletion`]s back in the order they
//! complete. Once the peer stops sending, the connection stays open until
//! every request it already made has been answered.

use crate::service::SlpService;
use futures::{SinkExt, StreamExt};
use prost::Message;
use slpd_core::ConnectionId;
use slpd_io::{Descriptor, DescriptorFuture};
use slpd_proto::{
    RpcCodec, RpcMessage, RpcType, ServiceDeRegistration, ServiceRegistration, ServiceRequest,
    SlpMethod, MAX_FRAME_LENGTH,
};
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::rc::Rc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

/// Callback fired once when a connection closes.
pub type CloseHandler = Box<dyn FnOnce(ConnectionId)>;

/// One-shot completion of a pending request.
///
/// `complete` consumes the value, so a request is answered at most once.
/// Completing after the connection closed is a logged no-op.
#[must_use = "a pending request is only answered by calling `complete`"]
pub struct RpcCompletion<T> {
    id: u32,
    method: SlpMethod,
    outbound: mpsc::UnboundedSender<RpcMessage>,
    _reply: PhantomData<fn(T)>,
}

impl<T: Message> RpcCompletion<T> {
    pub(crate) fn new(
        id: u32,
        method: SlpMethod,
        outbound: mpsc::UnboundedSender<RpcMessage>,
    ) -> Self {
        Self {
            id,
            method,
            outbound,
            _reply: PhantomData,
        }
    }

    /// Request id this completion answers.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Sends `reply` to the caller.
    ///
    /// A reply too large for one frame is replaced by a failure response.
    pub fn complete(self, reply: T) {
        let message = frame_limited(RpcMessage::response(self.id, &reply), self.method);
        if self.outbound.send(message).is_err() {
            debug!(
                id = self.id,
                method = %self.method,
                "Connection closed before reply, dropping it"
            );
        }
    }
}

fn frame_limited(reply: RpcMessage, method: SlpMethod) -> RpcMessage {
    let length = reply.encoded_len();
    if length <= MAX_FRAME_LENGTH {
        return reply;
    }

    warn!(id = reply.id, %method, length, "Reply exceeds frame limit, failing request");
    RpcMessage::failed(
        reply.id,
        format!(
            "{} reply of {} bytes exceeds the {} byte frame limit",
            method, length, MAX_FRAME_LENGTH
        ),
    )
}

/// Decodes request envelopes and dispatches them to an [`SlpService`].
pub struct RpcChannel {
    service: Rc<dyn SlpService>,
    outbound: mpsc::UnboundedSender<RpcMessage>,
}

impl RpcChannel {
    /// Creates a channel whose replies go to `outbound`.
    pub fn new(service: Rc<dyn SlpService>, outbound: mpsc::UnboundedSender<RpcMessage>) -> Self {
        Self { service, outbound }
    }

    /// Handles one inbound message.
    pub fn dispatch(&self, message: RpcMessage) {
        match message.rpc_type() {
            Ok(RpcType::Request) => {}
            Ok(kind) => {
                warn!(id = message.id, ?kind, "Ignoring non-request message");
                return;
            }
            Err(e) => {
                warn!(id = message.id, error = %e, "Ignoring message");
                return;
            }
        }

        let method = match message.name.parse::<SlpMethod>() {
            Ok(method) => method,
            Err(_) => {
                debug!(id = message.id, method = %message.name, "Method not implemented");
                self.send(RpcMessage::not_implemented(message.id, message.name));
                return;
            }
        };

        let id = message.id;
        match method {
            SlpMethod::FindService => {
                if let Some(request) = self.decode::<ServiceRequest>(&message, method) {
                    self.service
                        .find_service(request, RpcCompletion::new(id, method, self.outbound.clone()));
                }
            }
            SlpMethod::RegisterService => {
                if let Some(request) = self.decode::<ServiceRegistration>(&message, method) {
                    self.service.register_service(
                        request,
                        RpcCompletion::new(id, method, self.outbound.clone()),
                    );
                }
            }
            SlpMethod::DeRegisterService => {
                if let Some(request) = self.decode::<ServiceDeRegistration>(&message, method) {
                    self.service.deregister_service(
                        request,
                        RpcCompletion::new(id, method, self.outbound.clone()),
                    );
                }
            }
        }
    }

    fn decode<M: Message + Default>(&self, message: &RpcMessage, method: SlpMethod) -> Option<M> {
        match message.payload::<M>() {
            Ok(request) => Some(request),
            Err(e) => {
                warn!(id = message.id, %method, error = %e, "Undecodable request");
                self.send(RpcMessage::failed(
                    message.id,
                    format!("invalid {} request: {}", method, e),
                ));
                None
            }
        }
    }

    fn send(&self, message: RpcMessage) {
        // The receiver lives as long as the serve loop.
        let _ = self.outbound.send(message);
    }
}

/// Reactor descriptor for one accepted control connection.
pub struct RpcConnection {
    id: ConnectionId,
    peer: SocketAddr,
    stream: RefCell<Option<TcpStream>>,
    service: Rc<dyn SlpService>,
    shutdown: Notify,
    closed: Cell<bool>,
    on_close: RefCell<Option<CloseHandler>>,
}

impl RpcConnection {
    /// Wraps an accepted stream.
    pub fn new(
        id: ConnectionId,
        peer: SocketAddr,
        stream: TcpStream,
        service: Rc<dyn SlpService>,
    ) -> Self {
        Self {
            id,
            peer,
            stream: RefCell::new(Some(stream)),
            service,
            shutdown: Notify::new(),
            closed: Cell::new(false),
            on_close: RefCell::new(None),
        }
    }

    /// Sets the handler informed when the connection closes.
    pub fn set_on_close(&self, handler: CloseHandler) {
        *self.on_close.borrow_mut() = Some(handler);
    }

    /// Connection identity.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Returns true once the connection was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

impl Descriptor for RpcConnection {
    fn describe(&self) -> String {
        format!("rpc-connection {}", self.peer)
    }

    fn serve(self: Rc<Self>) -> DescriptorFuture {
        Box::pin(async move {
            let Some(stream) = self.stream.borrow_mut().take() else {
                return;
            };

            let (read_half, write_half) = stream.into_split();
            let mut frames = FramedRead::new(read_half, RpcCodec::new());
            let mut sink = FramedWrite::new(write_half, RpcCodec::new());
            let (outbound, mut replies) = mpsc::unbounded_channel();
            // Dropped when the peer stops sending; `replies` then ends once
            // the last outstanding completion has answered or been dropped.
            let mut channel = Some(RpcChannel::new(self.service.clone(), outbound));

            loop {
                tokio::select! {
                    biased;
                    _ = self.shutdown.notified() => break,
                    reply = replies.recv() => {
                        let Some(reply) = reply else {
                            debug!(connection_id = %self.id, peer = %self.peer, "All replies sent");
                            break;
                        };
                        if let Err(e) = sink.send(reply).await {
                            warn!(
                                connection_id = %self.id,
                                peer = %self.peer,
                                error = %e,
                                "Failed to write reply"
                            );
                            break;
                        }
                    }
                    frame = frames.next(), if channel.is_some() => match frame {
                        Some(Ok(message)) => {
                            if let Some(channel) = &channel {
                                channel.dispatch(message);
                            }
                        }
                        Some(Err(e)) => {
                            warn!(
                                connection_id = %self.id,
                                peer = %self.peer,
                                error = %e,
                                "Dropping connection after bad frame"
                            );
                            break;
                        }
                        None => {
                            debug!(
                                connection_id = %self.id,
                                peer = %self.peer,
                                "Peer finished sending, draining pending replies"
                            );
                            channel = None;
                        }
                    },
                }
            }
        })
    }

    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }

        self.stream.borrow_mut().take();
        self.shutdown.notify_one();
        info!(connection_id = %self.id, peer = %self.peer, "RPC connection closed");

        let handler = self.on_close.borrow_mut().take();
        if let Some(handler) = handler {
            handler(self.id);
        }
    }
}
