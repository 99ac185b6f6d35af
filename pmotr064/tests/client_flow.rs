use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;

use pmotr064::{
    AuthPhase, ClientOptions, ErrorKind, Parameter, Tr064Client, Transport, TransportError,
    TransportRequest, TransportResponse,
};

const WLAN: &str = "urn:dslforum-org:service:WLANConfiguration:1";
const DEVICE_INFO: &str = "urn:dslforum-org:service:DeviceInfo:1";

const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:dslforum-org:device-1-0">
<device>
<serviceList>
<service>
<serviceType>urn:dslforum-org:service:DeviceInfo:1</serviceType>
<controlURL>/upnp/control/deviceinfo</controlURL>
</service>
<service>
<serviceType>urn:dslforum-org:service:WLANConfiguration:1</serviceType>
<controlURL>/upnp/control/wlanconfig1</controlURL>
</service>
</serviceList>
</device>
</root>"#;

#[derive(Debug, Clone)]
struct Recorded {
    path: String,
    body: Option<String>,
    soap_action: Option<String>,
}

/// Routeur simulé : sert la description et rejoue des réponses SOAP.
#[derive(Default)]
struct MockRouter {
    soap_replies: Mutex<VecDeque<Result<TransportResponse, String>>>,
    /// Pages served for the description before the real one.
    description_pages: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Recorded>>,
}

impl MockRouter {
    fn with_replies(replies: Vec<Result<TransportResponse, String>>) -> Self {
        Self {
            soap_replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    fn push_description_page(&self, page: &str) {
        self.description_pages
            .lock()
            .unwrap()
            .push_back(page.to_string());
    }

    fn push_reply(&self, reply: Result<TransportResponse, String>) {
        self.soap_replies.lock().unwrap().push_back(reply);
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn soap_requests(&self) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.body.is_some())
            .collect()
    }
}

impl Transport for MockRouter {
    fn send(&self, request: &TransportRequest<'_>) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(Recorded {
            path: request.path.to_string(),
            body: request.body.map(str::to_string),
            soap_action: request.soap_action.map(str::to_string),
        });

        if request.body.is_none() {
            return match request.path {
                "/tr64desc.xml" => {
                    let page = self.description_pages.lock().unwrap().pop_front();
                    Ok(TransportResponse::ok(page.unwrap_or_else(|| DESCRIPTION.to_string())))
                }
                _ => Ok(TransportResponse::new(404, "")),
            };
        }

        match self.soap_replies.lock().unwrap().pop_front() {
            Some(reply) => reply.map_err(TransportError::Other),
            None => Err(TransportError::Other("connection reset".into())),
        }
    }
}

fn envelope(nonce: &str, status: &str, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\
         <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\
         <s:Header><h:NextChallenge xmlns:h=\"http://soap-authentication.org/digest/2001/10/\" \
         s:mustUnderstand=\"1\"><Status>{status}</Status><Nonce>{nonce}</Nonce>\
         <Realm>F!Box SOAP-Auth</Realm></h:NextChallenge></s:Header>\
         <s:Body>{body}</s:Body></s:Envelope>"
    )
}

fn ssid_reply(nonce: &str, ssid: &str) -> TransportResponse {
    TransportResponse::ok(envelope(
        nonce,
        "Authenticated",
        &format!(
            "<u:GetSSIDResponse xmlns:u=\"{WLAN}\"><NewSSID>{ssid}</NewSSID></u:GetSSIDResponse>"
        ),
    ))
}

fn no_probe() -> ClientOptions {
    ClientOptions {
        nonce_probe: None,
        ..ClientOptions::default()
    }
}

#[test]
fn test_wlan_ssid_end_to_end() {
    let router = MockRouter::with_replies(vec![Ok(ssid_reply("A1", "MyNetwork"))]);
    let client = Tr064Client::new(router, "admin", "secret");

    let response = client
        .invoke(WLAN, "GetSSID", &[], &[Parameter::binding("NewSSID")])
        .unwrap();

    assert_eq!(response.bindings, vec![Parameter::new("NewSSID", "MyNetwork")]);
    assert!(response.error().is_none());

    // Discovery happened lazily, before the action
    let requests = client.transport().requests();
    assert_eq!(requests[0].path, "/tr64desc.xml");
    assert!(requests[0].body.is_none());
    assert_eq!(requests[1].path, "/upnp/control/wlanconfig1");
    assert_eq!(requests[1].soap_action.as_deref(), Some(&*format!("{WLAN}#GetSSID")));
    assert_eq!(
        client.resolve(WLAN).as_deref(),
        Some("/upnp/control/wlanconfig1")
    );
}

#[test]
fn test_init_then_authenticated_calls() {
    let router = MockRouter::with_replies(vec![
        Ok(TransportResponse::ok(envelope(
            "N1",
            "Unauthenticated",
            "<u:GetGenericAssociatedDeviceInfoResponse/>",
        ))),
        Ok(ssid_reply("N2", "Home")),
        Ok(ssid_reply("N3", "Home")),
    ]);
    let client = Tr064Client::new(router, "admin", "secret");

    client.init().unwrap();
    assert_eq!(client.services().len(), 2);
    assert_eq!(client.auth_phase(), AuthPhase::Challenged);
    assert_eq!(client.auth_state().nonce.as_deref(), Some("N1"));
    assert_eq!(client.auth_state().realm.as_deref(), Some("F!Box SOAP-Auth"));

    client.action(WLAN, "GetSSID").unwrap();
    assert_eq!(client.auth_phase(), AuthPhase::Authenticated);

    client.action(WLAN, "GetSSID").unwrap();

    let soap = client.transport().soap_requests();
    assert_eq!(soap.len(), 3);
    let probe = soap[0].body.as_deref().unwrap();
    assert!(probe.contains("InitChallenge"));
    assert!(probe.contains("<NewAssociatedDeviceIndex>1</NewAssociatedDeviceIndex>"));

    let expected_token = pmotr064::auth::digest_token(
        &pmotr064::auth::derive_secret("admin", "F!Box SOAP-Auth", "secret"),
        "N1",
    );
    let first = soap[1].body.as_deref().unwrap();
    assert!(first.contains("ClientAuth"));
    assert!(first.contains("<Nonce>N1</Nonce>"));
    assert!(first.contains(&format!("<Auth>{expected_token}</Auth>")));

    // Every response refreshes the nonce
    let second = soap[2].body.as_deref().unwrap();
    assert!(second.contains("<Nonce>N2</Nonce>"));
    assert_eq!(client.auth_state().nonce.as_deref(), Some("N3"));
}

#[test]
fn test_init_sends_failing_nonce_request_once() {
    let client = Tr064Client::new(MockRouter::default(), "admin", "secret");

    let err = client.init().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportFailure);
    assert_eq!(client.transport().soap_requests().len(), 1);
    assert_eq!(client.services().len(), 2);
    assert_eq!(client.auth_phase(), AuthPhase::Unauthenticated);
}

#[test]
fn test_transport_failure_forces_challenge() {
    let router = MockRouter::with_replies(vec![
        Ok(ssid_reply("N1", "Home")),
        Ok(ssid_reply("N2", "Home")),
        Ok(TransportResponse::new(500, "")),
    ]);
    let client = Tr064Client::with_options(router, "admin", "secret", no_probe());

    client.action(WLAN, "GetSSID").unwrap();
    client.action(WLAN, "GetSSID").unwrap();
    assert_eq!(client.auth_phase(), AuthPhase::Authenticated);

    let err = client.action(WLAN, "GetSSID").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportFailure);
    assert_eq!(client.auth_phase(), AuthPhase::Unauthenticated);
    assert!(client.auth_state().auth_failed);

    // Next call starts over with a challenge
    client.transport().push_reply(Ok(ssid_reply("N4", "Home")));
    client.action(WLAN, "GetSSID").unwrap();
    let soap = client.transport().soap_requests();
    assert!(soap.last().unwrap().body.as_deref().unwrap().contains("InitChallenge"));
}

#[test]
fn test_transport_failure_reacquires_nonce() {
    let router = MockRouter::with_replies(vec![
        Err("timeout".into()),
        Ok(TransportResponse::ok(envelope(
            "FRESH",
            "Unauthenticated",
            "<u:GetGenericAssociatedDeviceInfoResponse/>",
        ))),
    ]);
    let client = Tr064Client::new(router, "admin", "secret");

    let err = client.action(WLAN, "GetSSID").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportFailure);

    let soap = client.transport().soap_requests();
    assert_eq!(soap.len(), 2);
    assert_eq!(
        soap[1].soap_action.as_deref(),
        Some(&*format!("{WLAN}#GetGenericAssociatedDeviceInfo"))
    );
    assert_eq!(client.auth_state().nonce.as_deref(), Some("FRESH"));
    assert_eq!(client.auth_phase(), AuthPhase::Challenged);
}

#[test]
fn test_unknown_service_is_not_fatal_for_client() {
    let router = MockRouter::with_replies(vec![Ok(ssid_reply("N1", "Home"))]);
    let client = Tr064Client::new(router, "admin", "secret");

    let err = client
        .action("urn:dslforum-org:service:X_AVM-DE_Unknown:1", "GetInfo")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownService);
    assert!(client.transport().soap_requests().is_empty());
    assert!(!client.auth_state().auth_failed);

    let response = client
        .invoke(WLAN, "GetSSID", &[], &[Parameter::binding("NewSSID")])
        .unwrap();
    assert_eq!(response.value("NewSSID"), Some("Home"));
}

#[test]
fn test_discovery_failure() {
    let router = MockRouter::default();
    let client = Tr064Client::with_options(
        router,
        "admin",
        "secret",
        ClientOptions {
            discovery_path: "/missing.xml".to_string(),
            nonce_probe: None,
        },
    );

    let err = client.discover().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportFailure);
    let err = client.action(DEVICE_INFO, "GetInfo").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportFailure);
    assert!(client.services().is_empty());
}

#[test]
fn test_lazy_discovery_retried_after_empty_description() {
    let router = MockRouter::with_replies(vec![Ok(ssid_reply("N1", "Home"))]);
    router.push_description_page("<html>busy</html>");
    let client = Tr064Client::with_options(router, "admin", "secret", no_probe());

    let err = client.action(WLAN, "GetSSID").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    assert!(client.services().is_empty());

    let response = client
        .invoke(WLAN, "GetSSID", &[], &[Parameter::binding("NewSSID")])
        .unwrap();
    assert_eq!(response.value("NewSSID"), Some("Home"));

    let gets = client
        .transport()
        .requests()
        .iter()
        .filter(|r| r.body.is_none())
        .count();
    assert_eq!(gets, 2);
    assert_eq!(client.services().len(), 2);
}

#[test]
fn test_parameters_and_partial_results() {
    let router = MockRouter::with_replies(vec![Ok(TransportResponse::ok(envelope(
        "N1",
        "Authenticated",
        "<u:GetInfoResponse><NewManufacturerName>AVM</NewManufacturerName>\
         <newmodelname>FRITZ!Box 7590</newmodelname></u:GetInfoResponse>",
    )))]);
    let client = Tr064Client::new(router, "admin", "secret");

    let response = client
        .invoke(
            DEVICE_INFO,
            "GetInfo",
            &[Parameter::new("", "dropped"), Parameter::new("NewIndex", "3")],
            &pmotr064::bindings(["NewManufacturerName", "NewModelName", "NewSerialNumber"]),
        )
        .unwrap();

    assert_eq!(response.value("NewManufacturerName"), Some("AVM"));
    // Found through the case-insensitive fallback
    assert_eq!(response.value("NewModelName"), Some("FRITZ!Box 7590"));
    assert_eq!(response.value("NewSerialNumber"), Some(""));
    assert_eq!(response.error().map(|e| e.kind()), Some(ErrorKind::MissingResultField));

    let body = client.transport().soap_requests()[0].body.clone().unwrap();
    assert!(body.contains("<NewIndex>3</NewIndex>"));
    assert!(!body.contains("dropped"));
}

#[test]
fn test_concurrent_invocations_are_serialized() {
    let router = MockRouter::default();
    for i in 0..8 {
        router.push_reply(Ok(ssid_reply(&format!("N{i}"), "Home")));
    }
    let client = Arc::new(Tr064Client::with_options(router, "admin", "secret", no_probe()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = Arc::clone(&client);
            thread::spawn(move || client.action(WLAN, "GetSSID").is_ok())
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }

    // Discovery ran once; every authenticated request used the previous nonce
    let requests = client.transport().requests();
    assert_eq!(requests.iter().filter(|r| r.body.is_none()).count(), 1);

    let soap = client.transport().soap_requests();
    for (i, request) in soap.iter().enumerate().skip(1) {
        let expected = format!("<Nonce>N{}</Nonce>", i - 1);
        assert!(request.body.as_deref().unwrap().contains(&expected));
    }
    assert_eq!(client.auth_state().nonce.as_deref(), Some("N7"));
}
