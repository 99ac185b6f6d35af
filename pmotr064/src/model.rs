/// Argument nommé d'une action TR-064, ou valeur de retour à extraire.
///
/// Un nom vide est la sentinelle « pas de paramètre » : il n'est jamais
/// envoyé au routeur et jamais recherché dans une réponse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// A result binding: a name whose value is filled from the response.
    pub fn binding(name: impl Into<String>) -> Self {
        Self::new(name, "")
    }

    pub fn is_sentinel(&self) -> bool {
        self.name.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> From<(N, V)> for Parameter {
    fn from((name, value): (N, V)) -> Self {
        Parameter::new(name, value)
    }
}

pub type ParamList = Vec<Parameter>;

/// Builds a [`ParamList`] from `(name, value)` pairs, keeping their order.
pub fn params<N, V>(pairs: impl IntoIterator<Item = (N, V)>) -> ParamList
where
    N: Into<String>,
    V: Into<String>,
{
    pairs.into_iter().map(Parameter::from).collect()
}

/// Builds a list of result bindings from names.
pub fn bindings<N: Into<String>>(names: impl IntoIterator<Item = N>) -> ParamList {
    names.into_iter().map(Parameter::binding).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_keep_order() {
        let list = params([("NewEnable", "1"), ("NewSSID", "Home")]);
        assert_eq!(list[0], Parameter::new("NewEnable", "1"));
        assert_eq!(list[1], Parameter::new("NewSSID", "Home"));
    }

    #[test]
    fn test_sentinel() {
        assert!(Parameter::new("", "x").is_sentinel());
        assert!(!Parameter::binding("NewSSID").is_sentinel());
        assert!(bindings(["A", "B"]).iter().all(|p| p.value.is_empty()));
    }
}
