//! Blocking client for the SLP control port.
//!
//! One request is in flight at a time; every call writes a request frame
//! and waits for the reply carrying the same id.

use prost::Message;
use slpd_core::{ErrorCode, UrlEntry};
use slpd_proto::{
    read_message, write_message, ProtoError, RpcMessage, RpcType, ServiceAck,
    ServiceDeRegistration, ServiceRegistration, ServiceReply, ServiceRequest, SlpMethod,
};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`SlpClient`]
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connecting to the daemon failed
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Framing or decoding failed
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtoError),

    /// The daemon answered with a different request id
    #[error("Reply id {actual} does not match request id {expected}")]
    IdMismatch { expected: u32, actual: u32 },

    /// The daemon rejected the request
    #[error("Request failed: {0}")]
    Failed(String),

    /// The daemon does not implement the method
    #[error("Method '{0}' is not implemented")]
    NotImplemented(String),

    /// The daemon replied with an unexpected message type
    #[error("Unexpected reply type {0:?}")]
    UnexpectedReply(RpcType),
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Blocking connection to a daemon's control port.
pub struct SlpClient {
    stream: TcpStream,
    next_id: u32,
}

impl SlpClient {
    /// Connects to the daemon at `address`.
    pub fn connect(address: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(address)
            .map_err(|source| ClientError::Connect { address, source })?;
        Ok(Self { stream, next_id: 1 })
    }

    /// Bounds how long a call waits for its reply.
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream
            .set_read_timeout(timeout)
            .map_err(ProtoError::from)?;
        Ok(())
    }

    /// Finds the URL entries of `service_type` in `scopes`.
    pub fn find_service(&mut self, scopes: &[&str], service_type: &str) -> Result<Vec<UrlEntry>> {
        let request = ServiceRequest {
            scope: scopes.iter().map(|scope| scope.to_string()).collect(),
            service: service_type.to_string(),
        };
        let reply: ServiceReply = self.call(SlpMethod::FindService, &request)?;
        Ok(reply
            .service
            .into_iter()
            .map(|service| {
                let lifetime = u16::try_from(service.lifetime).unwrap_or(u16::MAX);
                UrlEntry::new(service.name, lifetime)
            })
            .collect())
    }

    /// Registers `url` as a `service_type` in `scopes`; returns the SLP
    /// error code reported by the daemon.
    pub fn register_service(
        &mut self,
        scopes: &[&str],
        service_type: &str,
        url: &str,
        lifetime: u32,
    ) -> Result<u32> {
        let request = ServiceRegistration {
            scope: scopes.iter().map(|scope| scope.to_string()).collect(),
            service_type: service_type.to_string(),
            url: url.to_string(),
            lifetime,
        };
        let ack: ServiceAck = self.call(SlpMethod::RegisterService, &request)?;
        Ok(ack.error_code)
    }

    /// Deregisters `url` from `scopes`; returns the SLP error code.
    pub fn deregister_service(&mut self, scopes: &[&str], url: &str) -> Result<u32> {
        let request = ServiceDeRegistration {
            scope: scopes.iter().map(|scope| scope.to_string()).collect(),
            url: url.to_string(),
        };
        let ack: ServiceAck = self.call(SlpMethod::DeRegisterService, &request)?;
        Ok(ack.error_code)
    }

    /// Sends a raw envelope and returns the reply as received.
    pub fn call_raw(&mut self, mut message: RpcMessage) -> Result<RpcMessage> {
        message.id = self.next_id();
        write_message(&mut self.stream, &message)?;

        let reply = read_message(&mut self.stream)?;
        if reply.id != message.id {
            return Err(ClientError::IdMismatch {
                expected: message.id,
                actual: reply.id,
            });
        }
        Ok(reply)
    }

    fn call<Req: Message, Resp: Message + Default>(
        &mut self,
        method: SlpMethod,
        request: &Req,
    ) -> Result<Resp> {
        let reply = self.call_raw(RpcMessage::request(0, method, request))?;
        match reply.rpc_type()? {
            RpcType::Response => Ok(reply.payload()?),
            RpcType::ResponseFailed => Err(ClientError::Failed(reply.failure_reason())),
            RpcType::ResponseNotImplemented => Err(ClientError::NotImplemented(reply.name)),
            other => Err(ClientError::UnexpectedReply(other)),
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }
}

/// Describes an SLP error code for display.
pub fn describe_error_code(code: u32) -> String {
    match ErrorCode::from_u32(code) {
        Some(code) => code.to_string(),
        None => format!("UNKNOWN ({})", code),
    }
}
