//! Invocation d'actions TR-064
//!
//! [`ActionInvoker`] emprunte l'état du client (annuaire des services,
//! authentificateur) le temps d'un appel : il construit l'enveloppe SOAP,
//! l'envoie par le [`Transport`], met à jour le nonce depuis la réponse et
//! extrait les valeurs de retour demandées.

use quick_xml::escape::unescape;
use tracing::{debug, warn};

use crate::auth::{AuthObservation, AuthPhase, DigestAuthenticator};
use crate::errors::Tr064Error;
use crate::model::{ParamList, Parameter};
use crate::observer::{NoopObserver, RequestTrace, ResponseTrace, TraceObserver};
use crate::services::ServiceDirectory;
use crate::soap::{build_action_envelope, soap_action_header};
use crate::tags::take_tag;
use crate::transport::{Transport, TransportRequest, TransportResponse};

static NOOP_OBSERVER: NoopObserver = NoopObserver;

pub const WLAN_CONFIGURATION_SERVICE: &str = "urn:dslforum-org:service:WLANConfiguration:1";

/// Result of a completed action call.
#[derive(Debug, Clone)]
pub struct ActionResponse {
    /// HTTP status of the final exchange.
    pub status: u16,
    /// Raw XML returned by the router.
    pub raw: String,
    /// Requested result bindings, in request order, with their values filled.
    /// XML entities (`&amp;`, `&lt;`...) are decoded; [`raw`](Self::raw)
    /// keeps them.
    pub bindings: ParamList,
    /// Non-fatal problems: missing result fields, missing `s:Body`.
    pub issues: Vec<Tr064Error>,
}

impl ActionResponse {
    /// Value of a filled binding.
    pub fn value(&self, name: &str) -> Option<&str> {
        if name.is_empty() {
            return None;
        }
        self.bindings
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.value.as_str())
    }

    /// First non-fatal problem, if any.
    pub fn error(&self) -> Option<&Tr064Error> {
        self.issues.first()
    }

    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Action sent to obtain a fresh nonce and realm from the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceProbe {
    pub service: String,
    pub action: String,
    pub params: ParamList,
}

impl Default for NonceProbe {
    fn default() -> Self {
        Self {
            service: WLAN_CONFIGURATION_SERVICE.to_string(),
            action: "GetGenericAssociatedDeviceInfo".to_string(),
            params: vec![Parameter::new("NewAssociatedDeviceIndex", "1")],
        }
    }
}

/// Runs one action against borrowed client state.
pub struct ActionInvoker<'a> {
    transport: &'a dyn Transport,
    directory: &'a ServiceDirectory,
    auth: &'a mut DigestAuthenticator,
    observer: &'a dyn TraceObserver,
    nonce_probe: Option<&'a NonceProbe>,
}

impl<'a> ActionInvoker<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        directory: &'a ServiceDirectory,
        auth: &'a mut DigestAuthenticator,
    ) -> Self {
        Self {
            transport,
            directory,
            auth,
            observer: &NOOP_OBSERVER,
            nonce_probe: None,
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn TraceObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Action used to re-acquire a nonce after a transport failure.
    pub fn with_nonce_probe(mut self, probe: Option<&'a NonceProbe>) -> Self {
        self.nonce_probe = probe;
        self
    }

    /// Invokes `service#action` with `params` and fills `bindings` from the
    /// response body.
    ///
    /// Unknown services and transport failures are returned as errors. A
    /// transport failure also resets the authenticator and attempts one
    /// nonce re-acquisition. Missing result fields are non-fatal and listed
    /// in [`ActionResponse::issues`].
    pub fn invoke(
        &mut self,
        service: &str,
        action: &str,
        params: &[Parameter],
        bindings: &[Parameter],
    ) -> Result<ActionResponse, Tr064Error> {
        let response = match self.exchange(service, action, params) {
            Ok(response) => response,
            Err(err @ Tr064Error::TransportFailure(_)) => {
                warn!("{}", err);
                self.fail_and_reacquire(service, action);
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let (bindings, issues) = fill_bindings(&response.body, bindings);
        for issue in &issues {
            warn!("{}#{}: {}", service, action, issue);
        }

        Ok(ActionResponse {
            status: response.status,
            raw: response.body,
            bindings,
            issues,
        })
    }

    /// Sends the request, answering at most one authentication challenge.
    fn exchange(
        &mut self,
        service: &str,
        action: &str,
        params: &[Parameter],
    ) -> Result<TransportResponse, Tr064Error> {
        let directory = self.directory;
        let control_url = directory
            .resolve(service)
            .ok_or_else(|| Tr064Error::unknown_service(service))?;
        let soap_action = soap_action_header(service, action);
        let mut retried = false;

        loop {
            let authenticated = !self.auth.needs_challenge();
            let envelope = build_action_envelope(&self.auth.build_header(), service, action, params);

            self.observer.request_built(&RequestTrace {
                service,
                action,
                control_url,
                authenticated,
                envelope: &envelope,
            });

            let response = self
                .transport
                .send(&TransportRequest::soap(control_url, &envelope, &soap_action))
                .map_err(|e| Tr064Error::TransportFailure(format!("{}: {}", soap_action, e)))?;

            self.observer.response_received(&ResponseTrace {
                service,
                action,
                status: response.status,
                body: &response.body,
            });

            let observation = if response.body.is_empty() {
                None
            } else {
                self.observe(&response.body)
            };

            if response.is_success() {
                if authenticated {
                    self.with_phase_tracking(DigestAuthenticator::confirm);
                }
                return Ok(response);
            }

            let challenged = observation.as_ref().is_some_and(AuthObservation::is_challenge);
            if challenged && !retried && !self.auth.needs_challenge() {
                debug!("{}: router sent a challenge, resending with credentials", soap_action);
                retried = true;
                continue;
            }

            return Err(Tr064Error::TransportFailure(format!(
                "{} failed with HTTP status {}",
                soap_action, response.status
            )));
        }
    }

    fn observe(&mut self, body: &str) -> Option<AuthObservation> {
        let before = self.auth.phase();
        let result = self.auth.observe(body);
        self.notify_phase(before);

        match result {
            Ok(observation) => Some(observation),
            Err(err) => {
                warn!("Could not refresh authentication state: {}", err);
                None
            }
        }
    }

    fn fail_and_reacquire(&mut self, service: &str, action: &str) {
        self.with_phase_tracking(DigestAuthenticator::reset);

        let Some(probe) = self.nonce_probe else {
            return;
        };
        if probe.service == service && probe.action == action {
            debug!("{}#{} failed itself, not resending it", service, action);
            return;
        }

        debug!("Re-acquiring nonce with {}#{}", probe.service, probe.action);
        match self.exchange(&probe.service, &probe.action, &probe.params) {
            Ok(_) => debug!(
                "Got a new nonce: {}",
                self.auth.state().nonce.as_deref().unwrap_or("")
            ),
            Err(err) => {
                warn!("Nonce re-acquisition failed: {}", err);
                self.with_phase_tracking(DigestAuthenticator::reset);
            }
        }
    }

    fn with_phase_tracking(&mut self, change: fn(&mut DigestAuthenticator)) {
        let before = self.auth.phase();
        change(&mut *self.auth);
        self.notify_phase(before);
    }

    fn notify_phase(&self, before: AuthPhase) {
        let after = self.auth.phase();
        if before != after {
            self.observer.auth_state_changed(before, after);
        }
    }
}

/// Copies `bindings` and fills every named one from the `s:Body` of `raw`.
fn fill_bindings(raw: &str, bindings: &[Parameter]) -> (ParamList, Vec<Tr064Error>) {
    let mut filled = bindings.to_vec();
    let mut issues = Vec::new();

    if filled.iter().all(Parameter::is_sentinel) {
        return (filled, issues);
    }

    let body = take_tag(raw, "s:Body");
    if body.is_none() {
        issues.push(Tr064Error::malformed_response("no s:Body in response"));
    }

    for binding in filled.iter_mut().filter(|b| !b.is_sentinel()) {
        match body.and_then(|b| take_tag(b, &binding.name)) {
            Some(value) => binding.value = decode_value(&binding.name, value),
            None => {
                binding.value.clear();
                issues.push(Tr064Error::missing_result_field(&binding.name));
            }
        }
    }

    (filled, issues)
}

/// Decodes the XML entities of a result value, keeping the raw text when an
/// entity is not recognised.
fn decode_value(name: &str, value: &str) -> String {
    match unescape(value) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            warn!("{}: keeping undecoded value: {}", name, e);
            value.to_string()
        }
    }
}
