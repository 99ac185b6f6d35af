//! Points de trace du protocole
//!
//! Le cœur du protocole n'écrit rien lui-même : il notifie un
//! [`TraceObserver`] aux moments clés. [`TracingObserver`] relaie ces
//! événements vers `tracing`.

use tracing::{debug, info, trace};

use crate::auth::AuthPhase;

/// A request envelope ready to be sent.
#[derive(Debug, Clone, Copy)]
pub struct RequestTrace<'a> {
    pub service: &'a str,
    pub action: &'a str,
    pub control_url: &'a str,
    pub authenticated: bool,
    pub envelope: &'a str,
}

/// A response received from the transport.
#[derive(Debug, Clone, Copy)]
pub struct ResponseTrace<'a> {
    pub service: &'a str,
    pub action: &'a str,
    pub status: u16,
    pub body: &'a str,
}

/// Callbacks invoked at the protocol trace points. All methods default to
/// doing nothing.
pub trait TraceObserver: Send + Sync {
    fn request_built(&self, _request: &RequestTrace<'_>) {}

    fn response_received(&self, _response: &ResponseTrace<'_>) {}

    fn auth_state_changed(&self, _from: AuthPhase, _to: AuthPhase) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TraceObserver for NoopObserver {}

/// Forwards trace points to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl TraceObserver for TracingObserver {
    fn request_built(&self, request: &RequestTrace<'_>) {
        debug!(
            service = request.service,
            action = request.action,
            url = request.control_url,
            authenticated = request.authenticated,
            "SOAP request built"
        );
        trace!("{}", request.envelope);
    }

    fn response_received(&self, response: &ResponseTrace<'_>) {
        debug!(
            service = response.service,
            action = response.action,
            status = response.status,
            bytes = response.body.len(),
            "SOAP response received"
        );
        trace!("{}", response.body);
    }

    fn auth_state_changed(&self, from: AuthPhase, to: AuthPhase) {
        info!("TR-064 authentication state: {} -> {}", from, to);
    }
}
