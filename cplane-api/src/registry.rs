//! API Handler Registration (§6, §9): installs typed request handlers with
//! the external request transport. The transport itself — how
//! `request_bytes` actually arrives and `response_bytes` is actually sent —
//! is outside this crate's scope (§1); this is only the registration
//! contract a transport calls into.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use tracing::{instrument, warn};

use crate::handlers::ControlPlane;
use crate::wire::{NhAddReq, NhDelReq, PortAddReq, PortDelReq, PortGetReq};

/// Small integer tag identifying a request type on the wire (§6).
pub type RequestType = u16;

pub const PORT_ADD: RequestType = 1;
pub const PORT_DEL: RequestType = 2;
pub const PORT_GET: RequestType = 3;
pub const PORT_LIST: RequestType = 4;
pub const NH_ADD: RequestType = 5;
pub const NH_DEL: RequestType = 6;
pub const NH_LIST: RequestType = 7;

type Callback = Box<dyn Fn(&[u8]) -> (i32, Vec<u8>) + Send + Sync>;

/// `{name, request_type, callback}` (§6) — exactly the handler shape the
/// request-transport layer (out of scope, §1) expects to receive at
/// registration time.
pub struct Handler {
    pub name: &'static str,
    pub request_type: RequestType,
    callback: Callback,
}

/// Process-wide set of registered handlers, keyed by request type.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<RequestType, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry::default()
    }

    pub fn register(
        &mut self,
        name: &'static str,
        request_type: RequestType,
        callback: impl Fn(&[u8]) -> (i32, Vec<u8>) + Send + Sync + 'static,
    ) {
        self.handlers.insert(
            request_type,
            Handler {
                name,
                request_type,
                callback: Box::new(callback),
            },
        );
    }

    pub fn get(&self, request_type: RequestType) -> Option<&Handler> {
        self.handlers.get(&request_type)
    }

    /// Looks up and invokes the handler for `request_type`. Returns
    /// `None` if nothing is registered for that tag — the transport's
    /// concern to turn into its own "unknown request" error.
    pub fn dispatch(&self, request_type: RequestType, request_bytes: &[u8]) -> Option<(i32, Vec<u8>)> {
        self.handlers.get(&request_type).map(|h| (h.callback)(request_bytes))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Handler> {
        self.handlers.values()
    }
}

/// Deserializes `bytes` as JSON, runs `f`, and serializes the result back
/// to `(errno_status, response_bytes)` — the shape every callback in
/// `Handler` has (§6 "Errno conventions ... are transmitted as the
/// response header's status").
fn wrap<Req, Resp>(f: impl Fn(Req) -> cplane_abi::CoreResult<Resp>) -> impl Fn(&[u8]) -> (i32, Vec<u8>)
where
    Req: DeserializeOwned,
    Resp: Serialize,
{
    move |bytes| {
        let req: Req = match serde_json::from_slice(bytes) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "malformed request body");
                return (-(nix::errno::Errno::EINVAL as i32), Vec::new());
            }
        };
        match f(req) {
            Ok(resp) => {
                let body = serde_json::to_vec(&resp).unwrap_or_default();
                (0, body)
            }
            Err(e) => (e.wire_status(), Vec::new()),
        }
    }
}

/// Registers every handler this core provides (§6), in the order §12's
/// module-init sequencing expects: after interface types and modules are
/// registered and constructed, before the transport starts accepting
/// requests.
#[instrument(skip(registry, cp))]
pub fn register_core_handlers(registry: &mut HandlerRegistry, cp: Arc<ControlPlane>) {
    let cp1 = cp.clone();
    registry.register("PORT_ADD", PORT_ADD, wrap(move |req: PortAddReq| crate::handlers::port_add(&cp1, req)));

    let cp2 = cp.clone();
    registry.register("PORT_DEL", PORT_DEL, wrap(move |req: PortDelReq| crate::handlers::port_del(&cp2, req)));

    let cp3 = cp.clone();
    registry.register("PORT_GET", PORT_GET, wrap(move |req: PortGetReq| crate::handlers::port_get(&cp3, req)));

    let cp4 = cp.clone();
    registry.register("PORT_LIST", PORT_LIST, wrap(move |_req: crate::wire::PortListReq| crate::handlers::port_list(&cp4)));

    let cp5 = cp.clone();
    registry.register("NH_ADD", NH_ADD, wrap(move |req: NhAddReq| crate::handlers::nh_add(&cp5, req)));

    let cp6 = cp.clone();
    registry.register("NH_DEL", NH_DEL, wrap(move |req: NhDelReq| crate::handlers::nh_del(&cp6, req)));

    let cp7 = cp;
    registry.register("NH_LIST", NH_LIST, wrap(move |_req: crate::wire::NhListReq| crate::handlers::nh_list(&cp7)));
}
