//! Transport HTTP des requêtes TR-064
//!
//! Le protocole ne dépend que du trait [`Transport`] ; [`UreqTransport`] en
//! est l'implémentation HTTP synchrone.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use ureq::Agent;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("{0}")]
    Other(String),
}

/// One HTTP exchange. Without a body it is a GET, otherwise a SOAP POST.
#[derive(Debug, Clone, Copy)]
pub struct TransportRequest<'a> {
    /// Path relative to the router address, or an absolute URL.
    pub path: &'a str,
    pub body: Option<&'a str>,
    pub soap_action: Option<&'a str>,
}

impl<'a> TransportRequest<'a> {
    pub fn get(path: &'a str) -> Self {
        Self {
            path,
            body: None,
            soap_action: None,
        }
    }

    pub fn soap(path: &'a str, body: &'a str, soap_action: &'a str) -> Self {
        Self {
            path,
            body: Some(body),
            soap_action: Some(soap_action),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs the HTTP requests of the protocol.
///
/// Network-level errors are returned as `Err`; HTTP error statuses are
/// returned as responses so SOAP faults (which carry fresh nonces) can
/// still be read.
pub trait Transport: Send + Sync {
    fn send(&self, request: &TransportRequest<'_>) -> Result<TransportResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: &TransportRequest<'_>) -> Result<TransportResponse, TransportError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, request: &TransportRequest<'_>) -> Result<TransportResponse, TransportError> {
        (**self).send(request)
    }
}

/// [`Transport`] over plain HTTP with ureq.
#[derive(Clone)]
pub struct UreqTransport {
    base_url: String,
    agent: Agent,
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UreqTransport {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        // 4xx/5xx ne sont pas des erreurs : on veut lire le corps des SOAP Faults
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();

        Self {
            base_url: format!("http://{}:{}", host, port),
            agent: config.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, path: &str) -> String {
        resolve_url(&self.base_url, path)
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &TransportRequest<'_>) -> Result<TransportResponse, TransportError> {
        let url = self.url_for(request.path);

        let mut response = match request.body {
            Some(body) if !body.is_empty() => {
                debug!(
                    "[HTTP] POST {} SOAPACTION: {}",
                    url,
                    request.soap_action.unwrap_or("")
                );
                let mut builder = self.agent.post(&url).header("Content-Type", "text/xml");
                if let Some(action) = request.soap_action.filter(|a| !a.is_empty()) {
                    builder = builder.header("SOAPACTION", action);
                }
                builder.send(body)?
            }
            _ => {
                debug!("[HTTP] GET {}", url);
                self.agent.get(&url).call()?
            }
        };

        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string()?;
        debug!("[HTTP] {} -> {} ({} bytes)", url, status, body.len());

        Ok(TransportResponse { status, body })
    }
}

/// Resolves a possibly relative control URL against `http://host:port`.
///
/// Absolute URLs (http:// or https://) are returned unchanged.
fn resolve_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }

    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
