//! Construction des enveloppes SOAP TR-064
//!
//! Le format doit correspondre octet pour octet à ce qu'attendent les
//! routeurs : pas d'indentation, pas de déclaration d'encodage.

use quick_xml::escape::partial_escape;

use crate::model::Parameter;

pub const ENVELOPE_PROLOG: &str = r#"<?xml version="1.0"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">"#;

pub const ENVELOPE_EPILOG: &str = "</s:Body></s:Envelope>";

/// Namespace of the TR-064 digest authentication headers.
pub const AUTH_NAMESPACE: &str = "http://soap-authentication.org/digest/2001/10/";

/// `<s:Header>` asking the router for a nonce and a realm.
pub fn challenge_header(user: &str) -> String {
    format!(
        r#"<s:Header><h:InitChallenge xmlns:h="{AUTH_NAMESPACE}" s:mustUnderstand="1"><UserID>{}</UserID></h:InitChallenge></s:Header>"#,
        partial_escape(user)
    )
}

/// `<s:Header>` proving possession of the credentials for `nonce`.
pub fn client_auth_header(nonce: &str, token: &str, user: &str, realm: &str) -> String {
    format!(
        r#"<s:Header><h:ClientAuth xmlns:h="{AUTH_NAMESPACE}" s:mustUnderstand="1"><Nonce>{nonce}</Nonce><Auth>{token}</Auth><UserID>{}</UserID><Realm>{realm}</Realm></h:ClientAuth></s:Header>"#,
        partial_escape(user)
    )
}

/// Builds the complete request envelope for `service#action`.
///
/// Parameters are written in order; those with an empty name are dropped.
pub fn build_action_envelope(
    header: &str,
    service: &str,
    action: &str,
    params: &[Parameter],
) -> String {
    let mut xml = String::with_capacity(ENVELOPE_PROLOG.len() + header.len() + 256);
    xml.push_str(ENVELOPE_PROLOG);
    xml.push_str(header);
    xml.push_str(&format!("<s:Body><u:{action} xmlns:u='{service}'>"));

    for param in params.iter().filter(|p| !p.is_sentinel()) {
        xml.push_str(&format!(
            "<{name}>{value}</{name}>",
            name = param.name,
            value = partial_escape(param.value.as_str())
        ));
    }

    xml.push_str(&format!("</u:{action}>"));
    xml.push_str(ENVELOPE_EPILOG);
    xml
}

/// Value of the `SOAPACTION` HTTP header: `service#action`.
pub fn soap_action_header(service: &str, action: &str) -> String {
    format!("{}#{}", service, action)
}
