//! Client TR-064 complet
//!
//! [`Tr064Client`] possède l'annuaire des services et l'authentificateur
//! d'un routeur, protégés par un mutex : une invocation garde le verrou
//! pendant tout l'aller-retour, les appels concurrents sont donc
//! sérialisés et le nonce n'est jamais lu pendant sa mise à jour.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::auth::{AuthPhase, AuthState, DigestAuthenticator};
use crate::config::Tr064Config;
use crate::errors::Tr064Error;
use crate::invoker::{ActionInvoker, ActionResponse, NonceProbe};
use crate::model::Parameter;
use crate::observer::{TraceObserver, TracingObserver};
use crate::services::ServiceDirectory;
use crate::transport::{Transport, TransportRequest, UreqTransport};

pub const DEFAULT_DISCOVERY_PATH: &str = "/tr64desc.xml";

/// Protocol options of a [`Tr064Client`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Location of the discovery document, relative to the router.
    pub discovery_path: String,
    /// Action used to obtain a nonce at `init()` and after transport failures.
    /// `None` disables re-acquisition.
    pub nonce_probe: Option<NonceProbe>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            discovery_path: DEFAULT_DISCOVERY_PATH.to_string(),
            nonce_probe: Some(NonceProbe::default()),
        }
    }
}

struct ClientState {
    directory: ServiceDirectory,
    auth: DigestAuthenticator,
}

/// TR-064 client bound to one router.
pub struct Tr064Client<T: Transport> {
    transport: T,
    options: ClientOptions,
    observer: Arc<dyn TraceObserver>,
    state: Mutex<ClientState>,
}

impl Tr064Client<UreqTransport> {
    /// Builds an HTTP client from the `router` and `tr064` configuration sections.
    pub fn from_config(config: &Tr064Config) -> Result<Self> {
        let router = &config.router;
        let transport = UreqTransport::new(
            &router.host,
            router.port,
            Duration::from_secs(router.timeout_secs),
        );
        info!(
            "TR-064 client for {} as user '{}'",
            transport.base_url(),
            router.user
        );

        Ok(Self::with_options(
            transport,
            &router.user,
            &config.password()?,
            config.client_options(),
        ))
    }
}

impl<T: Transport> Tr064Client<T> {
    pub fn new(transport: T, user: &str, password: &str) -> Self {
        Self::with_options(transport, user, password, ClientOptions::default())
    }

    pub fn with_options(transport: T, user: &str, password: &str, options: ClientOptions) -> Self {
        Self {
            transport,
            options,
            observer: Arc::new(TracingObserver),
            state: Mutex::new(ClientState {
                directory: ServiceDirectory::new(),
                auth: DigestAuthenticator::new(user, password),
            }),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TraceObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetches the service list, then an initial nonce and realm.
    pub fn init(&self) -> Result<(), Tr064Error> {
        let mut state = self.state.lock();
        self.discover_locked(&mut state)?;

        let Some(probe) = &self.options.nonce_probe else {
            return Ok(());
        };

        info!("Getting the initial nonce and realm");
        match self.invoke_locked(&mut state, &probe.service, &probe.action, &probe.params, &[]) {
            Ok(_) => {
                let auth = state.auth.state();
                info!(
                    "Got the initial nonce: {} and the realm: {}",
                    auth.nonce.as_deref().unwrap_or(""),
                    auth.realm.as_deref().unwrap_or("")
                );
                Ok(())
            }
            // The router may simply not expose the probe service
            Err(Tr064Error::UnknownService(service)) => {
                warn!("Nonce probe service {} not available, skipping", service);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Fetches the discovery document and rebuilds the service directory.
    pub fn discover(&self) -> Result<usize, Tr064Error> {
        let mut state = self.state.lock();
        self.discover_locked(&mut state)
    }

    /// Calls `service#action` and fills the requested result bindings.
    ///
    /// Discovery happens on the first call if `init()` was not used.
    pub fn invoke(
        &self,
        service: &str,
        action: &str,
        params: &[Parameter],
        bindings: &[Parameter],
    ) -> Result<ActionResponse, Tr064Error> {
        let mut state = self.state.lock();
        if !state.directory.is_discovered() {
            self.discover_locked(&mut state)?;
        }
        self.invoke_locked(&mut state, service, action, params, bindings)
    }

    /// Calls an action without arguments and returns the raw response.
    pub fn action(&self, service: &str, action: &str) -> Result<String, Tr064Error> {
        self.action_with_params(service, action, &[])
    }

    /// Calls an action and returns the raw response.
    pub fn action_with_params(
        &self,
        service: &str,
        action: &str,
        params: &[Parameter],
    ) -> Result<String, Tr064Error> {
        self.invoke(service, action, params, &[])
            .map(|response| response.raw)
    }

    /// Control URL of a discovered service.
    pub fn resolve(&self, service: &str) -> Option<String> {
        self.state.lock().directory.resolve(service).map(str::to_string)
    }

    /// Discovered `(service_type, control_url)` pairs.
    pub fn services(&self) -> Vec<(String, String)> {
        self.state.lock().directory.entries()
    }

    pub fn auth_phase(&self) -> AuthPhase {
        self.state.lock().auth.phase()
    }

    /// Snapshot of the authentication state.
    pub fn auth_state(&self) -> AuthState {
        self.state.lock().auth.state().clone()
    }

    fn discover_locked(&self, state: &mut ClientState) -> Result<usize, Tr064Error> {
        let path = self.options.discovery_path.as_str();
        debug!("Fetching service list from {}", path);

        let response = self
            .transport
            .send(&TransportRequest::get(path))
            .map_err(|e| Tr064Error::TransportFailure(format!("{}: {}", path, e)))?;

        if !response.is_success() {
            return Err(Tr064Error::TransportFailure(format!(
                "{} failed with HTTP status {}",
                path, response.status
            )));
        }

        let count = state.directory.discover(&response.body);
        if count == 0 {
            warn!("No service found in {}", path);
            return Err(Tr064Error::malformed_response(
                "discovery document lists no service",
            ));
        }

        info!("{} TR-064 services discovered", count);
        Ok(count)
    }

    fn invoke_locked(
        &self,
        state: &mut ClientState,
        service: &str,
        action: &str,
        params: &[Parameter],
        bindings: &[Parameter],
    ) -> Result<ActionResponse, Tr064Error> {
        let ClientState { directory, auth } = state;

        ActionInvoker::new(&self.transport, directory, auth)
            .with_observer(self.observer.as_ref())
            .with_nonce_probe(self.options.nonce_probe.as_ref())
            .invoke(service, action, params, bindings)
    }
}
