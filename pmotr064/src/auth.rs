//! Authentification digest TR-064
//!
//! Le routeur fournit un `Realm` et un `Nonce` ; le client prouve la
//! possession des identifiants en envoyant
//! `md5(md5(user:realm:password) + ":" + nonce)` dans un en-tête SOAP
//! `ClientAuth`. Chaque réponse apporte un nouveau nonce.
//!
//! Cycle de vie :
//!
//! - [`AuthPhase::Unauthenticated`] : pas de nonce, on envoie `InitChallenge`
//! - [`AuthPhase::Challenged`] : nonce et realm reçus, secret calculé
//! - [`AuthPhase::Authenticated`] : une requête authentifiée a abouti
//!
//! Un échec de transport ramène à `Unauthenticated`.

use std::fmt;

use md5::{Digest, Md5};
use tracing::{debug, warn};

use crate::errors::Tr064Error;
use crate::soap::{challenge_header, client_auth_header};
use crate::tags::take_tag;

/// Hashes `text` with MD5 and renders the 16 bytes as 32 lowercase hex digits.
pub fn md5_hex(text: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Shared secret: `md5(user:realm:password)`.
pub fn derive_secret(user: &str, realm: &str, password: &str) -> String {
    md5_hex(&format!("{}:{}:{}", user, realm, password))
}

/// Digest token sent in `<Auth>`: `md5(secret:nonce)`.
pub fn digest_token(secret: &str, nonce: &str) -> String {
    md5_hex(&format!("{}:{}", secret, nonce))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthPhase {
    Unauthenticated,
    Challenged,
    Authenticated,
}

impl fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthPhase::Unauthenticated => "unauthenticated",
            AuthPhase::Challenged => "challenged",
            AuthPhase::Authenticated => "authenticated",
        };
        f.write_str(name)
    }
}

/// Authentication state learned from the router.
#[derive(Debug, Clone)]
pub struct AuthState {
    pub realm: Option<String>,
    /// `md5(user:realm:password)`, available once the realm is known.
    pub secret: Option<String>,
    /// Last nonce seen from the router. Never rolled back.
    pub nonce: Option<String>,
    pub has_nonce: bool,
    pub auth_failed: bool,
    pub phase: AuthPhase,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            realm: None,
            secret: None,
            nonce: None,
            has_nonce: false,
            auth_failed: false,
            phase: AuthPhase::Unauthenticated,
        }
    }
}

/// What a single [`DigestAuthenticator::observe`] call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthObservation {
    pub nonce_updated: bool,
    pub realm_updated: bool,
    pub secret_recomputed: bool,
    /// Content of the `<Status>` element of the auth header, if any.
    pub status: Option<String>,
}

impl AuthObservation {
    /// The router rejected the request but handed out a fresh nonce.
    pub fn is_challenge(&self) -> bool {
        self.nonce_updated
            && self
                .status
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("Unauthenticated"))
    }
}

/// Owns the credentials and the [`AuthState`] of one router.
pub struct DigestAuthenticator {
    user: String,
    password: String,
    state: AuthState,
}

impl fmt::Debug for DigestAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestAuthenticator")
            .field("user", &self.user)
            .field("password", &"***")
            .field("state", &self.state)
            .finish()
    }
}

impl DigestAuthenticator {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            state: AuthState::default(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn phase(&self) -> AuthPhase {
        self.state.phase
    }

    /// True when the next header will be an `InitChallenge`.
    pub fn needs_challenge(&self) -> bool {
        !self.state.has_nonce || self.state.auth_failed || self.state.secret.is_none()
    }

    /// SOAP `<s:Header>` for the next request.
    pub fn build_header(&self) -> String {
        if self.needs_challenge() {
            return challenge_header(&self.user);
        }

        match (self.compute_token(), &self.state.nonce, &self.state.realm) {
            (Some(token), Some(nonce), Some(realm)) => {
                debug!("The auth token is {}", token);
                client_auth_header(nonce, &token, &self.user, realm)
            }
            _ => challenge_header(&self.user),
        }
    }

    /// `md5(secret:nonce)`, or `None` while the secret or nonce is unknown.
    pub fn compute_token(&self) -> Option<String> {
        let secret = self.state.secret.as_deref()?;
        let nonce = self.state.nonce.as_deref()?;
        Some(digest_token(secret, nonce))
    }

    /// Updates nonce and realm from a router response.
    ///
    /// A missing nonce, or a missing realm while none is known yet, is
    /// reported as [`Tr064Error::MalformedResponse`]; whatever was found is
    /// still applied and previously known values are kept.
    pub fn observe(&mut self, response: &str) -> Result<AuthObservation, Tr064Error> {
        let mut observation = AuthObservation {
            status: take_tag(response, "Status").map(|s| s.trim().to_string()),
            ..Default::default()
        };

        if let Some(realm) = take_tag(response, "Realm").map(str::trim) {
            if !realm.is_empty() && self.state.realm.as_deref() != Some(realm) {
                if let Some(previous) = &self.state.realm {
                    warn!(previous = %previous, realm, "Router realm changed, recomputing secret");
                }
                self.state.realm = Some(realm.to_string());
                self.state.secret = Some(derive_secret(&self.user, realm, &self.password));
                observation.realm_updated = true;
                observation.secret_recomputed = true;
            }
        }

        if let Some(nonce) = take_tag(response, "Nonce").map(str::trim) {
            if !nonce.is_empty() {
                self.state.nonce = Some(nonce.to_string());
                self.state.has_nonce = true;
                self.state.auth_failed = false;
                observation.nonce_updated = true;
                if self.state.phase == AuthPhase::Unauthenticated && self.state.secret.is_some() {
                    self.state.phase = AuthPhase::Challenged;
                }
            }
        }

        if self.state.realm.is_none() {
            return Err(Tr064Error::malformed_response("no Realm in router response"));
        }
        if !observation.nonce_updated {
            return Err(Tr064Error::malformed_response("no Nonce in router response"));
        }

        Ok(observation)
    }

    /// An authenticated request was answered successfully.
    pub fn confirm(&mut self) {
        if self.state.has_nonce && !self.state.auth_failed && self.state.secret.is_some() {
            self.state.phase = AuthPhase::Authenticated;
        }
    }

    /// Forgets the validity of the current nonce after a transport failure.
    ///
    /// The nonce value itself is kept; only a newer one can replace it.
    pub fn reset(&mut self) {
        self.state.has_nonce = false;
        self.state.auth_failed = true;
        self.state.phase = AuthPhase::Unauthenticated;
    }
}
