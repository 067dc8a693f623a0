//! RPC service façade over the discovery engine.

use crate::channel::RpcCompletion;
use slpd_core::{ErrorCode, ExportMap, ScopeSet, UrlEntry};
use slpd_engine::{DiscoveryEngine, EngineError};
use slpd_proto::{
    Service, ServiceAck, ServiceDeRegistration, ServiceRegistration, ServiceReply, ServiceRequest,
};
use std::rc::Rc;
use tracing::{debug, warn};

/// Export variable counting FindService calls.
pub const FIND_CALLS_VAR: &str = "rpc-find-service";

/// Export variable counting RegisterService calls.
pub const REGISTER_CALLS_VAR: &str = "rpc-register-service";

/// Export variable counting DeRegisterService calls.
pub const DEREGISTER_CALLS_VAR: &str = "rpc-deregister-service";

/// Handlers of the SLP control service.
///
/// Every handler receives the decoded request and a completion that must be
/// invoked once to answer it.
pub trait SlpService {
    fn find_service(&self, request: ServiceRequest, done: RpcCompletion<ServiceReply>);

    fn register_service(&self, request: ServiceRegistration, done: RpcCompletion<ServiceAck>);

    fn deregister_service(&self, request: ServiceDeRegistration, done: RpcCompletion<ServiceAck>);
}

/// [`SlpService`] routing every call into a [`DiscoveryEngine`].
pub struct SlpServiceImpl {
    engine: Rc<dyn DiscoveryEngine>,
    export_map: ExportMap,
}

impl SlpServiceImpl {
    pub fn new(engine: Rc<dyn DiscoveryEngine>, export_map: ExportMap) -> Self {
        Self { engine, export_map }
    }
}

impl SlpService for SlpServiceImpl {
    fn find_service(&self, request: ServiceRequest, done: RpcCompletion<ServiceReply>) {
        self.export_map.add_int(FIND_CALLS_VAR, 1);
        let scopes: ScopeSet = request.scope.iter().collect();
        let id = done.id();

        self.engine.find_service(
            &scopes,
            &request.service,
            Box::new(move |entries: Vec<UrlEntry>| {
                debug!(id, matches = entries.len(), "FindService complete");
                let reply = ServiceReply {
                    service: entries
                        .iter()
                        .map(|entry| Service {
                            name: entry.url().to_string(),
                            lifetime: u32::from(entry.lifetime()),
                        })
                        .collect(),
                };
                done.complete(reply);
            }),
        );
    }

    fn register_service(&self, request: ServiceRegistration, done: RpcCompletion<ServiceAck>) {
        self.export_map.add_int(REGISTER_CALLS_VAR, 1);
        let scopes: ScopeSet = request.scope.iter().collect();

        let result = match u16::try_from(request.lifetime) {
            Ok(lifetime) => self.engine.register_service(
                &scopes,
                &request.service_type,
                UrlEntry::new(request.url.as_str(), lifetime),
            ),
            Err(_) => Err(EngineError::InvalidRegistration {
                url: request.url.clone(),
                reason: format!("lifetime {} exceeds {}", request.lifetime, u16::MAX),
            }),
        };

        done.complete(ack("RegisterService", &request.url, result));
    }

    fn deregister_service(&self, request: ServiceDeRegistration, done: RpcCompletion<ServiceAck>) {
        self.export_map.add_int(DEREGISTER_CALLS_VAR, 1);
        let scopes: ScopeSet = request.scope.iter().collect();
        let result = self.engine.deregister_service(&scopes, &request.url);
        done.complete(ack("DeRegisterService", &request.url, result));
    }
}

fn ack(method: &str, url: &str, result: Result<(), EngineError>) -> ServiceAck {
    let code = match result {
        Ok(()) => ErrorCode::Ok,
        Err(e) => {
            warn!(method, url, error = %e, "Request rejected");
            e.code()
        }
    };
    ServiceAck {
        error_code: code.as_u32(),
    }
}
