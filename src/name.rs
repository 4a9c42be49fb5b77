use std::fmt;

/// Namespace URIs the parser needs to know about.
pub mod ns {
    /// GML 3.1 (also used by GML 2 documents).
    pub const GML: &str = "http://www.opengis.net/gml";
    /// GML 3.2.
    pub const GML32: &str = "http://www.opengis.net/gml/3.2";
    pub const XLINK: &str = "http://www.w3.org/1999/xlink";

    pub fn is_gml(namespace: Option<&str>) -> bool {
        matches!(namespace, Some(GML) | Some(GML32))
    }
}

/// Namespace-qualified XML name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    namespace: Option<String>,
    local_name: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            namespace: (!namespace.is_empty()).then_some(namespace),
            local_name: local_name.into(),
        }
    }

    pub fn unqualified(local_name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local_name: local_name.into(),
        }
    }

    pub(crate) fn from_parts(namespace: Option<String>, local_name: String) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()),
            local_name,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn matches(&self, namespace: Option<&str>, local_name: &str) -> bool {
        self.namespace.as_deref() == namespace && self.local_name == local_name
    }
}

/// Clark notation: `{namespace}local`.
impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local_name),
            None => f.write_str(&self.local_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_namespace_is_unqualified() {
        let name = QName::new("", "fid");
        assert_eq!(name, QName::unqualified("fid"));
        assert_eq!(name.namespace(), None);
    }

    #[test]
    fn test_display_uses_clark_notation() {
        let name = QName::new(ns::GML, "Point");
        assert_eq!(name.to_string(), "{http://www.opengis.net/gml}Point");
        assert_eq!(QName::unqualified("uom").to_string(), "uom");
    }
}
