//! # pmotr064 - Client TR-064
//!
//! Client du protocole TR-064 (SOAP sur HTTP avec authentification digest
//! par nonce) exposé par les routeurs grand public comme la Fritz!Box.
//!
//! ## Fonctionnalités
//!
//! - Découverte des services via `/tr64desc.xml`
//! - Authentification `InitChallenge` / `ClientAuth` et suivi du nonce
//! - Invocation d'actions avec paramètres nommés
//! - Extraction des valeurs de retour depuis le `s:Body`
//!
//! ## Example
//!
//! ```no_run
//! use pmotr064::{Parameter, Tr064Client, Tr064Config};
//!
//! let config = Tr064Config::load("")?;
//! let client = Tr064Client::from_config(&config)?;
//! client.init()?;
//!
//! let response = client.invoke(
//!     "urn:dslforum-org:service:WLANConfiguration:1",
//!     "GetSSID",
//!     &[],
//!     &[Parameter::binding("NewSSID")],
//! )?;
//! println!("SSID: {}", response.value("NewSSID").unwrap_or(""));
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod encryption;
pub mod errors;
pub mod invoker;
pub mod logging;
pub mod model;
pub mod observer;
pub mod services;
pub mod soap;
pub mod tags;
pub mod transport;

pub use auth::{AuthPhase, AuthState, DigestAuthenticator, md5_hex};
pub use client::{ClientOptions, DEFAULT_DISCOVERY_PATH, Tr064Client};
pub use config::Tr064Config;
pub use errors::{ErrorKind, Tr064Error};
pub use invoker::{ActionInvoker, ActionResponse, NonceProbe};
pub use logging::init_logging;
pub use model::{ParamList, Parameter, bindings, params};
pub use observer::{NoopObserver, TraceObserver, TracingObserver};
pub use services::ServiceDirectory;
pub use transport::{Transport, TransportError, TransportRequest, TransportResponse, UreqTransport};
