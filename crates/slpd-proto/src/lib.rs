//! Wire protocol of the slpd control channel.
//!
//! Every frame on the control port is a 4-byte big-endian length followed by
//! a protobuf-encoded [`RpcMessage`]. The envelope names the method and
//! carries the request or response message in its `buffer` field.
//!
//! # Example
//!
//! ```
//! use slpd_proto::{read_message, write_message, RpcMessage, ServiceRequest, SlpMethod};
//!
//! let request = ServiceRequest {
//!     scope: vec!["default".to_string()],
//!     service: "service:printer".to_string(),
//! };
//! let message = RpcMessage::request(1, SlpMethod::FindService, &request);
//!
//! let mut wire = Vec::new();
//! write_message(&mut wire, &message).unwrap();
//! let decoded = read_message(&mut wire.as_slice()).unwrap();
//! assert_eq!(decoded.name, "FindService");
//! ```

pub mod codec;
pub mod messages;
pub mod rpc;

pub use codec::{read_message, write_message, ProtoError, RpcCodec, MAX_FRAME_LENGTH};
pub use messages::{
    Service, ServiceAck, ServiceDeRegistration, ServiceRegistration, ServiceReply,
    ServiceRequest, SlpMethod,
};
pub use rpc::{RpcMessage, RpcType};
