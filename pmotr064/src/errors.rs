use thiserror::Error;

/// Catégorie d'erreur du protocole, indépendante du message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownService,
    TransportFailure,
    MissingResultField,
    MalformedResponse,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Tr064Error {
    // Fatal pour l'action appelée, pas pour le client
    #[error("Service {0} is not exposed by the router")]
    UnknownService(String),
    #[error("Transport failure: {0}")]
    TransportFailure(String),
    #[error("Missing {0} element in SOAP body")]
    MissingResultField(String),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl Tr064Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Tr064Error::UnknownService(_) => ErrorKind::UnknownService,
            Tr064Error::TransportFailure(_) => ErrorKind::TransportFailure,
            Tr064Error::MissingResultField(_) => ErrorKind::MissingResultField,
            Tr064Error::MalformedResponse(_) => ErrorKind::MalformedResponse,
        }
    }

    /// Only unknown services and transport failures abort an invocation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnknownService | ErrorKind::TransportFailure
        )
    }

    pub fn unknown_service(service: &str) -> Self {
        Tr064Error::UnknownService(service.to_string())
    }

    pub fn missing_result_field(name: &str) -> Self {
        Tr064Error::MissingResultField(name.to_string())
    }

    pub fn malformed_response(message: &str) -> Self {
        Tr064Error::MalformedResponse(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_fatality() {
        let err = Tr064Error::unknown_service("urn:x");
        assert_eq!(err.kind(), ErrorKind::UnknownService);
        assert!(err.is_fatal());

        let err = Tr064Error::missing_result_field("NewSSID");
        assert_eq!(err.kind(), ErrorKind::MissingResultField);
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "Missing NewSSID element in SOAP body");

        assert!(Tr064Error::TransportFailure("timeout".into()).is_fatal());
        assert!(!Tr064Error::malformed_response("no nonce").is_fatal());
    }
}
