//! RPC envelope carried in every control-channel frame.

use crate::codec::ProtoError;
use crate::messages::SlpMethod;
use bytes::Bytes;
use prost::Message;

/// Envelope type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RpcType {
    Request = 0,
    Response = 1,
    ResponseCancel = 2,
    ResponseFailed = 3,
    ResponseNotImplemented = 4,
}

/// A request or response frame.
///
/// Responses echo the `id` of the request they answer. For
/// `ResponseFailed` the buffer holds a UTF-8 reason.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcMessage {
    #[prost(enumeration = "RpcType", tag = "1")]
    pub kind: i32,
    #[prost(uint32, tag = "2")]
    pub id: u32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(bytes = "bytes", tag = "4")]
    pub buffer: Bytes,
}

impl RpcMessage {
    /// Builds a request for `method`.
    pub fn request<M: Message>(id: u32, method: SlpMethod, payload: &M) -> Self {
        Self {
            kind: RpcType::Request as i32,
            id,
            name: method.as_str().to_string(),
            buffer: Bytes::from(payload.encode_to_vec()),
        }
    }

    /// Builds a successful response.
    pub fn response<M: Message>(id: u32, payload: &M) -> Self {
        Self {
            kind: RpcType::Response as i32,
            id,
            name: String::new(),
            buffer: Bytes::from(payload.encode_to_vec()),
        }
    }

    /// Builds a failure response carrying `reason`.
    pub fn failed(id: u32, reason: impl Into<String>) -> Self {
        Self {
            kind: RpcType::ResponseFailed as i32,
            id,
            name: String::new(),
            buffer: Bytes::from(reason.into()),
        }
    }

    /// Builds a response for a method the service does not implement.
    pub fn not_implemented(id: u32, method: impl Into<String>) -> Self {
        Self {
            kind: RpcType::ResponseNotImplemented as i32,
            id,
            name: method.into(),
            buffer: Bytes::new(),
        }
    }

    /// Returns the envelope type, rejecting values outside `RpcType`.
    pub fn rpc_type(&self) -> Result<RpcType, ProtoError> {
        RpcType::try_from(self.kind).map_err(|_| ProtoError::UnknownType(self.kind))
    }

    /// Decodes the payload as `M`.
    pub fn payload<M: Message + Default>(&self) -> Result<M, ProtoError> {
        Ok(M::decode(self.buffer.clone())?)
    }

    /// Returns the failure reason of a `ResponseFailed` message.
    pub fn failure_reason(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ServiceAck, ServiceRequest};

    #[test]
    fn test_request_carries_method_and_payload() {
        let request = ServiceRequest {
            scope: vec!["default".to_string()],
            service: "service:printer".to_string(),
        };
        let message = RpcMessage::request(7, SlpMethod::FindService, &request);
        assert_eq!(message.rpc_type().unwrap(), RpcType::Request);
        assert_eq!(message.name, "FindService");
        assert_eq!(message.payload::<ServiceRequest>().unwrap(), request);
    }

    #[test]
    fn test_response_echoes_id() {
        let message = RpcMessage::response(42, &ServiceAck { error_code: 3 });
        assert_eq!(message.id, 42);
        assert_eq!(message.rpc_type().unwrap(), RpcType::Response);
        assert_eq!(message.payload::<ServiceAck>().unwrap().error_code, 3);
    }

    #[test]
    fn test_failed_response_reason() {
        let message = RpcMessage::failed(1, "bad payload");
        assert_eq!(message.rpc_type().unwrap(), RpcType::ResponseFailed);
        assert_eq!(message.failure_reason(), "bad payload");
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let message = RpcMessage {
            kind: 17,
            id: 1,
            name: String::new(),
            buffer: Bytes::new(),
        };
        assert!(matches!(message.rpc_type(), Err(ProtoError::UnknownType(17))));
    }
}
