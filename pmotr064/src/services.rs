//! Annuaire des services exposés par le routeur
//!
//! Le document de découverte (`/tr64desc.xml`) liste des blocs
//! `<service>...</service>` contenant chacun un `serviceType` et un
//! `controlURL`. On les parcourt par simple recherche de bornes.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::tags::take_tag;

const SERVICE_OPEN: &str = "<service>";
const SERVICE_CLOSE: &str = "</service>";

/// Maps a service type (`urn:dslforum-org:service:...`) to its control URL.
#[derive(Debug, Clone, Default)]
pub struct ServiceDirectory {
    services: HashMap<String, String>,
    discovered: bool,
}

impl ServiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the directory from a discovery document.
    ///
    /// Blocks lacking a `serviceType` or a `controlURL` are skipped. When the
    /// same service type appears twice, the last block wins. Returns the
    /// number of services registered.
    ///
    /// A document without any usable block leaves the directory untouched:
    /// the previous services stay resolvable and, before the first
    /// successful discovery, [`is_discovered`](Self::is_discovered) stays
    /// false.
    pub fn discover(&mut self, document: &str) -> usize {
        let mut services = HashMap::new();
        let mut rest = document;
        let mut skipped = 0usize;

        while let Some(open) = rest.find(SERVICE_OPEN) {
            let inner_start = open + SERVICE_OPEN.len();
            let Some(close) = rest[inner_start..].find(SERVICE_CLOSE) else {
                warn!("Unterminated <service> block in discovery document");
                break;
            };
            let block = &rest[inner_start..inner_start + close];

            match (take_tag(block, "serviceType"), take_tag(block, "controlURL")) {
                (Some(service_type), Some(control_url)) => {
                    let service_type = service_type.trim();
                    let control_url = control_url.trim();
                    debug!(
                        "Service no {}: {} @ {}",
                        services.len() + 1,
                        service_type,
                        control_url
                    );
                    services.insert(service_type.to_string(), control_url.to_string());
                }
                _ => {
                    skipped += 1;
                    warn!("Skipping <service> block without serviceType/controlURL");
                }
            }

            rest = &rest[inner_start + close + SERVICE_CLOSE.len()..];
        }

        if services.is_empty() {
            warn!(
                skipped,
                kept = self.services.len(),
                "No service in discovery document, keeping the current directory"
            );
            return 0;
        }

        self.services = services;
        self.discovered = true;
        debug!(
            registered = self.services.len(),
            skipped, "Service discovery finished"
        );
        self.services.len()
    }

    pub fn resolve(&self, service_type: &str) -> Option<&str> {
        self.services.get(service_type).map(String::as_str)
    }

    pub fn is_discovered(&self) -> bool {
        self.discovered
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Registered `(service_type, control_url)` pairs, sorted by service type.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut entries: Vec<_> = self
            .services
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:dslforum-org:device-1-0">
<device>
<deviceType>urn:dslforum-org:device:InternetGatewayDevice:1</deviceType>
<serviceList>
<service>
<serviceType>urn:dslforum-org:service:DeviceInfo:1</serviceType>
<serviceId>urn:DeviceInfo-com:serviceId:DeviceInfo1</serviceId>
<controlURL>/upnp/control/deviceinfo</controlURL>
<eventSubURL>/upnp/control/deviceinfo</eventSubURL>
<SCPDURL>/deviceinfoSCPD.xml</SCPDURL>
</service>
<service>
<serviceType>urn:dslforum-org:service:WLANConfiguration:1</serviceType>
<controlURL>/upnp/control/wlanconfig1</controlURL>
</service>
</serviceList>
<deviceList><device><serviceList>
<service>
<serviceType>urn:dslforum-org:service:WANIPConnection:1</serviceType>
<controlURL>/upnp/control/wanipconnection1</controlURL>
</service>
</serviceList></device></deviceList>
</device>
</root>"#;

    #[test]
    fn test_discover_then_resolve() {
        let mut directory = ServiceDirectory::new();
        assert!(!directory.is_discovered());

        assert_eq!(directory.discover(DESCRIPTION), 3);
        assert!(directory.is_discovered());
        assert_eq!(
            directory.resolve("urn:dslforum-org:service:DeviceInfo:1"),
            Some("/upnp/control/deviceinfo")
        );
        assert_eq!(
            directory.resolve("urn:dslforum-org:service:WLANConfiguration:1"),
            Some("/upnp/control/wlanconfig1")
        );
        // Services of embedded devices are found too
        assert_eq!(
            directory.resolve("urn:dslforum-org:service:WANIPConnection:1"),
            Some("/upnp/control/wanipconnection1")
        );
        assert_eq!(directory.resolve("urn:dslforum-org:service:Unknown:1"), None);
    }

    #[test]
    fn test_generated_blocks() {
        let mut document = String::from("<serviceList>");
        for i in 0..20 {
            document.push_str(&format!(
                "<service><serviceType>urn:test:service:S{i}:1</serviceType>\
                 <controlURL>/ctl/{i}</controlURL></service>"
            ));
        }
        document.push_str("</serviceList>");

        let mut directory = ServiceDirectory::new();
        assert_eq!(directory.discover(&document), 20);
        for i in 0..20 {
            let service = format!("urn:test:service:S{i}:1");
            let expected = format!("/ctl/{i}");
            assert_eq!(directory.resolve(&service), Some(expected.as_str()));
        }
    }

    #[test]
    fn test_last_duplicate_wins() {
        let document = "<service><serviceType>urn:a</serviceType><controlURL>/one</controlURL></service>\
                        <service><serviceType>urn:a</serviceType><controlURL>/two</controlURL></service>";
        let mut directory = ServiceDirectory::new();
        assert_eq!(directory.discover(document), 1);
        assert_eq!(directory.resolve("urn:a"), Some("/two"));
    }

    #[test]
    fn test_incomplete_blocks_are_skipped() {
        let document = "<service><serviceType>urn:a</serviceType></service>\
                        <service><serviceType>urn:b</serviceType><controlURL>/b</controlURL></service>\
                        <service><serviceType>urn:c</serviceType><controlURL>/c</controlURL>";
        let mut directory = ServiceDirectory::new();
        assert_eq!(directory.discover(document), 1);
        assert_eq!(directory.resolve("urn:a"), None);
        assert_eq!(directory.resolve("urn:b"), Some("/b"));
        assert_eq!(directory.resolve("urn:c"), None);
    }

    #[test]
    fn test_rediscovery_replaces_content() {
        let mut directory = ServiceDirectory::new();
        directory.discover(DESCRIPTION);
        let count = directory.discover(
            "<service><serviceType>urn:only</serviceType><controlURL>/only</controlURL></service>",
        );
        assert_eq!(count, 1);
        assert_eq!(directory.entries(), vec![("urn:only".to_string(), "/only".to_string())]);
        assert_eq!(directory.resolve("urn:dslforum-org:service:DeviceInfo:1"), None);
    }

    #[test]
    fn test_empty_document() {
        let mut directory = ServiceDirectory::new();
        assert_eq!(directory.discover("<root></root>"), 0);
        assert!(directory.is_empty());
        assert!(!directory.is_discovered());
    }

    #[test]
    fn test_empty_document_keeps_previous_services() {
        let mut directory = ServiceDirectory::new();
        directory.discover(DESCRIPTION);

        assert_eq!(directory.discover("<html>busy</html>"), 0);
        assert!(directory.is_discovered());
        assert_eq!(directory.len(), 3);
        assert_eq!(
            directory.resolve("urn:dslforum-org:service:WLANConfiguration:1"),
            Some("/upnp/control/wlanconfig1")
        );
    }
}
