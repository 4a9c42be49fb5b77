use thiserror::Error;

use crate::cursor::Position;
use crate::name::QName;
use crate::reference::DanglingReference;
use crate::schema::MaxOccurs;

pub type Result<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unknown feature type '{name}' at {position}")]
    UnknownFeatureType { name: QName, position: Position },

    #[error("feature type '{name}' is abstract and cannot be instantiated at {position}")]
    AbstractFeatureType { name: QName, position: Position },

    #[error("unexpected property '{name}' in feature of type '{feature_type}' at {position}")]
    UnexpectedProperty {
        name: QName,
        feature_type: QName,
        position: Position,
    },

    #[error("{} at {position}", under_occurrence_message(.property, .min_occurs, .found, .feature_type))]
    PropertyUnderOccurrence {
        property: QName,
        feature_type: QName,
        min_occurs: u32,
        found: u32,
        position: Position,
    },

    #[error("property '{property}' of feature type '{feature_type}' occurs more than {max_occurs} time(s) at {position}")]
    PropertyOverOccurrence {
        property: QName,
        feature_type: QName,
        max_occurs: MaxOccurs,
        position: Position,
    },

    #[error("invalid feature id '{id}' at {position}: must not start with a digit or contain a colon")]
    InvalidFeatureId { id: String, position: Position },

    #[error("feature id '{id}' is not unique at {position}")]
    DuplicateFeatureId { id: String, position: Position },

    #[error("external xlink reference '{href}' is not supported at {position}")]
    ExternalReferenceUnsupported { href: String, position: Position },

    #[error("property '{property}' expects a feature of type '{}', found '{}' at {position}",
        display_or(.expected, "any"), display_or(.found, "no feature"))]
    WrongFeatureType {
        property: QName,
        expected: Option<QName>,
        found: Option<QName>,
        position: Position,
    },

    #[error("malformed number '{text}' at {position}")]
    MalformedNumber { text: String, position: Position },

    #[error("unresolved local reference(s): {}", format_dangling(.0))]
    DanglingReferences(Vec<DanglingReference>),

    #[error("XML error at {position}: {message}")]
    Xml { message: String, position: Position },

    #[error("invalid content at {position}: {message}")]
    InvalidContent { message: String, position: Position },

    #[error("invalid geometry at {position}: {message}")]
    InvalidGeometry { message: String, position: Position },

    #[error("unsupported geometry element '{name}' at {position}")]
    UnsupportedGeometry { name: QName, position: Position },

    #[error("failed to parse property '{property}' at {position}")]
    Property {
        property: QName,
        position: Position,
        #[source]
        source: Box<ParseError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl ParseError {
    pub fn xml(message: impl Into<String>, position: Position) -> Self {
        Self::Xml {
            message: message.into(),
            position,
        }
    }

    pub fn invalid_content(message: impl Into<String>, position: Position) -> Self {
        Self::InvalidContent {
            message: message.into(),
            position,
        }
    }

    pub fn invalid_geometry(message: impl Into<String>, position: Position) -> Self {
        Self::InvalidGeometry {
            message: message.into(),
            position,
        }
    }

    pub fn malformed_number(text: impl Into<String>, position: Position) -> Self {
        Self::MalformedNumber {
            text: text.into(),
            position,
        }
    }

    /// Wraps a leaf parser failure with the property that triggered it.
    pub fn in_property(self, property: &QName, position: Position) -> Self {
        Self::Property {
            property: property.clone(),
            position,
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through `Property` wrappers.
    pub fn root_cause(&self) -> &ParseError {
        match self {
            Self::Property { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn position(&self) -> Option<&Position> {
        match self {
            Self::UnknownFeatureType { position, .. }
            | Self::AbstractFeatureType { position, .. }
            | Self::UnexpectedProperty { position, .. }
            | Self::PropertyUnderOccurrence { position, .. }
            | Self::PropertyOverOccurrence { position, .. }
            | Self::InvalidFeatureId { position, .. }
            | Self::DuplicateFeatureId { position, .. }
            | Self::ExternalReferenceUnsupported { position, .. }
            | Self::WrongFeatureType { position, .. }
            | Self::MalformedNumber { position, .. }
            | Self::Xml { position, .. }
            | Self::InvalidContent { position, .. }
            | Self::InvalidGeometry { position, .. }
            | Self::UnsupportedGeometry { position, .. }
            | Self::Property { position, .. } => Some(position),
            Self::DanglingReferences(_) | Self::Io(_) | Self::Archive(_) => None,
        }
    }
}

fn under_occurrence_message(property: &QName, min_occurs: &u32, found: &u32, feature_type: &QName) -> String {
    if *min_occurs == 1 {
        format!("mandatory property '{property}' of feature type '{feature_type}' is missing")
    } else {
        format!(
            "property '{property}' of feature type '{feature_type}' occurs {found} time(s), at least {min_occurs} required"
        )
    }
}

fn display_or(name: &Option<QName>, fallback: &str) -> String {
    name.as_ref().map_or_else(|| fallback.to_string(), QName::to_string)
}

fn format_dangling(references: &[DanglingReference]) -> String {
    references
        .iter()
        .map(|r| format!("#{}", r.target_id))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_occurrence_messages() {
        let property = QName::new("urn:app", "name");
        let feature_type = QName::new("urn:app", "Road");

        let mandatory = ParseError::PropertyUnderOccurrence {
            property: property.clone(),
            feature_type: feature_type.clone(),
            min_occurs: 1,
            found: 0,
            position: Position::default(),
        };
        assert!(mandatory.to_string().starts_with("mandatory property"));

        let too_few = ParseError::PropertyUnderOccurrence {
            property,
            feature_type,
            min_occurs: 3,
            found: 1,
            position: Position::default(),
        };
        assert!(too_few.to_string().contains("occurs 1 time(s), at least 3 required"));
    }

    #[test]
    fn test_root_cause_unwraps_property_errors() {
        let leaf = ParseError::malformed_number("x", Position::default());
        let wrapped = leaf.in_property(&QName::unqualified("geom"), Position::default());
        assert!(matches!(wrapped.root_cause(), ParseError::MalformedNumber { .. }));
        assert!(std::error::Error::source(&wrapped).is_some());
    }
}
