//! Request and response messages of the SLP control service.

use std::fmt;
use std::str::FromStr;

/// FindService request: the scopes to search and the service type.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceRequest {
    #[prost(string, repeated, tag = "1")]
    pub scope: Vec<String>,
    #[prost(string, tag = "2")]
    pub service: String,
}

/// One URL entry in a FindService reply.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Service {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(uint32, tag = "2")]
    pub lifetime: u32,
}

/// FindService reply.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceReply {
    #[prost(message, repeated, tag = "1")]
    pub service: Vec<Service>,
}

/// RegisterService request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceRegistration {
    #[prost(string, repeated, tag = "1")]
    pub scope: Vec<String>,
    #[prost(string, tag = "2")]
    pub service_type: String,
    #[prost(string, tag = "3")]
    pub url: String,
    #[prost(uint32, tag = "4")]
    pub lifetime: u32,
}

/// DeRegisterService request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceDeRegistration {
    #[prost(string, repeated, tag = "1")]
    pub scope: Vec<String>,
    #[prost(string, tag = "2")]
    pub url: String,
}

/// Acknowledgement for (de)registration; `error_code` 0 means success.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceAck {
    #[prost(uint32, tag = "1")]
    pub error_code: u32,
}

/// Methods exposed by the SLP control service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlpMethod {
    FindService,
    RegisterService,
    DeRegisterService,
}

impl SlpMethod {
    /// Returns the method name used in the RPC envelope.
    pub fn as_str(&self) -> &'static str {
        match self {
            SlpMethod::FindService => "FindService",
            SlpMethod::RegisterService => "RegisterService",
            SlpMethod::DeRegisterService => "DeRegisterService",
        }
    }
}

impl fmt::Display for SlpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FindService" => Ok(SlpMethod::FindService),
            "RegisterService" => Ok(SlpMethod::RegisterService),
            "DeRegisterService" => Ok(SlpMethod::DeRegisterService),
            other => Err(format!("unknown method: {}", other)),
        }
    }
}
