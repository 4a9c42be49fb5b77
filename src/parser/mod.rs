//! Schema-driven feature parser.
//!
//! [`GmlFeatureParser::parse_feature`] turns one feature element into a
//! [`Feature`], validating each child against the feature type's ordered
//! property declarations and recursing into nested features. Identified
//! features and local xlink references are tracked in a caller-supplied
//! [`ReferenceContext`]; [`GmlFeatureParser::parse_document`] wraps the whole
//! cycle for a single document.

pub mod occurrence;
pub mod substitution;
mod value;

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::Arc;

use tracing::debug;

use crate::cursor::{EventKind, Position, XmlCursor, XmlStreamCursor};
use crate::error::{ParseError, Result};
use crate::geometry::{GeometryParser, Gml3GeometryParser};
use crate::model::{CustomValue, Feature, Property};
use crate::name::{ns, QName};
use crate::reference::{DanglingReference, DuplicateId, ReferenceContext};
use crate::schema::{ApplicationSchema, FeatureType};

pub use occurrence::{OccurrenceValidator, Violation};
pub use substitution::SubstitutionResolver;
pub use value::parse_generic_element;

/// Parser settings.
#[derive(Debug, Clone, Default)]
pub struct ParserConfig {
    /// Check `min_occurs` of the active and all remaining declarations once a
    /// feature has no more children. Off by default: only declarations that
    /// are skipped mid-stream are checked.
    pub check_trailing_min_occurs: bool,
}

/// Replaces the category dispatch for one property of one feature type.
///
/// Called with the cursor on the property start element; must leave it on the
/// property end element.
pub trait CustomPropertyParser: Send + Sync {
    fn parse(&self, cursor: &mut dyn XmlCursor) -> Result<CustomValue>;
}

impl<F> CustomPropertyParser for F
where
    F: Fn(&mut dyn XmlCursor) -> Result<CustomValue> + Send + Sync,
{
    fn parse(&self, cursor: &mut dyn XmlCursor) -> Result<CustomValue> {
        self(cursor)
    }
}

/// Streaming parser for feature documents of one application schema.
///
/// The parser only borrows the schema and holds no per-document state, so a
/// single instance can be shared between threads.
pub struct GmlFeatureParser<'s> {
    schema: &'s ApplicationSchema,
    substitution: SubstitutionResolver<'s>,
    geometry_parser: Box<dyn GeometryParser>,
    custom_parsers: HashMap<(QName, QName), Box<dyn CustomPropertyParser>>,
    config: ParserConfig,
}

impl<'s> GmlFeatureParser<'s> {
    /// Creates a parser with the default geometry parser and configuration.
    ///
    /// # Arguments
    /// * `schema` - Application schema that feature elements are validated against
    pub fn new(schema: &'s ApplicationSchema) -> Self {
        Self {
            schema,
            substitution: SubstitutionResolver::new(schema),
            geometry_parser: Box::new(Gml3GeometryParser),
            custom_parsers: HashMap::new(),
            config: ParserConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_geometry_parser(mut self, parser: impl GeometryParser + 'static) -> Self {
        self.geometry_parser = Box::new(parser);
        self
    }

    /// Installs `parser` for `property` of `feature_type`, overriding the
    /// declaration's value category.
    pub fn register_custom_parser(
        &mut self,
        feature_type: QName,
        property: QName,
        parser: impl CustomPropertyParser + 'static,
    ) {
        self.custom_parsers
            .insert((feature_type, property), Box::new(parser));
    }

    pub fn schema(&self) -> &'s ApplicationSchema {
        self.schema
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parses the feature whose start element the cursor is on. The cursor is
    /// left on the feature's end element.
    ///
    /// # Arguments
    /// * `cursor` - Cursor positioned on the feature start element
    /// * `default_srs` - SRS name for geometries that carry no `srsName`
    /// * `ctx` - Reference context of the document being parsed
    ///
    /// # Returns
    /// * The completed feature, already registered in `ctx` if it has an id
    pub fn parse_feature(
        &self,
        cursor: &mut dyn XmlCursor,
        default_srs: Option<&str>,
        ctx: &mut ReferenceContext,
    ) -> Result<Arc<Feature>> {
        let name = match (cursor.event(), cursor.name()) {
            (EventKind::StartElement, Some(name)) => name.clone(),
            _ => {
                return Err(ParseError::xml(
                    "expected a feature start element",
                    cursor.position(),
                ))
            }
        };

        let id = feature_id(cursor);
        if !is_valid_feature_id(&id) {
            return Err(ParseError::InvalidFeatureId {
                id,
                position: cursor.position(),
            });
        }

        let feature_type = self
            .schema
            .feature_type(&name)
            .ok_or_else(|| ParseError::UnknownFeatureType {
                name: name.clone(),
                position: cursor.position(),
            })?;

        if feature_type.is_abstract() {
            return Err(ParseError::AbstractFeatureType {
                name,
                position: cursor.position(),
            });
        }

        debug!("Begin feature {} '{}' at {}", name, id, cursor.position());

        let mut validator = OccurrenceValidator::new(feature_type.properties());
        let mut properties = Vec::new();
        loop {
            match cursor.next_tag()? {
                EventKind::StartElement => {}
                EventKind::EndElement => break,
                _ => {
                    return Err(ParseError::xml(
                        format!("unexpected end of document inside feature '{name}'"),
                        cursor.position(),
                    ))
                }
            }
            let Some(element) = cursor.name().cloned() else {
                return Err(ParseError::xml("start element without a name", cursor.position()));
            };

            let declaration = validator
                .accept(&element, |e, d| self.substitution.matches(e, d))
                .map_err(|v| occurrence_error(v, Some(&element), feature_type, cursor.position()))?;

            // zero-based index of this element among the declaration's occurrences
            let occurrence = validator.state().1 as usize - 1;
            debug!(
                "Property {} (declared as {}, occurrence {})",
                element,
                declaration.name(),
                occurrence
            );

            let value = self.parse_value(
                cursor,
                feature_type,
                declaration,
                &id,
                occurrence,
                default_srs,
                ctx,
            )?;
            properties.push(Property::new(Arc::clone(declaration), element, value));
        }

        validator
            .finish(self.config.check_trailing_min_occurs)
            .map_err(|v| occurrence_error(v, None, feature_type, cursor.position()))?;

        let feature = Arc::new(feature_type.new_feature(id, properties));
        feature.bind_xlinks();

        if let Err(DuplicateId(id)) = ctx.register_feature(Arc::clone(&feature)) {
            return Err(ParseError::DuplicateFeatureId {
                id,
                position: cursor.position(),
            });
        }

        debug!(
            "End feature {} '{}' at {}",
            name,
            feature.id().unwrap_or_default(),
            cursor.position()
        );
        Ok(feature)
    }

    /// Parses a complete document whose root element is a feature and
    /// resolves its local references.
    ///
    /// # Arguments
    /// * `reader` - Buffered source of the XML document
    /// * `default_srs` - SRS name for geometries that carry no `srsName`
    ///
    /// # Returns
    /// * The root feature together with the document's reference context
    pub fn parse_document<R: BufRead>(&self, reader: R, default_srs: Option<&str>) -> Result<GmlDocument> {
        let mut cursor = XmlStreamCursor::new(reader);
        self.parse_root(&mut cursor, default_srs)
    }

    pub fn parse_str(&self, xml: &str, default_srs: Option<&str>) -> Result<GmlDocument> {
        self.parse_document(xml.as_bytes(), default_srs)
    }

    fn parse_root(&self, cursor: &mut dyn XmlCursor, default_srs: Option<&str>) -> Result<GmlDocument> {
        if cursor.next_tag()? != EventKind::StartElement {
            return Err(ParseError::xml("document has no root element", cursor.position()));
        }
        let mut context = ReferenceContext::new();
        let root = self.parse_feature(cursor, default_srs, &mut context)?;
        let dangling = context.finalize();
        Ok(GmlDocument {
            root,
            context,
            dangling,
        })
    }
}

impl std::fmt::Debug for GmlFeatureParser<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmlFeatureParser")
            .field("custom_parsers", &self.custom_parsers.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A parsed document: its root feature and every identified feature in it.
#[derive(Debug)]
pub struct GmlDocument {
    root: Arc<Feature>,
    context: ReferenceContext,
    dangling: Vec<DanglingReference>,
}

impl GmlDocument {
    /// The feature at the document root.
    pub fn root(&self) -> &Arc<Feature> {
        &self.root
    }

    pub fn context(&self) -> &ReferenceContext {
        &self.context
    }

    /// Looks up any identified feature of the document, nested or not.
    pub fn feature(&self, id: &str) -> Option<&Arc<Feature>> {
        self.context.feature(id)
    }

    pub fn dangling_references(&self) -> &[DanglingReference] {
        &self.dangling
    }

    /// Fails with [`ParseError::DanglingReferences`] if any local reference
    /// stayed unresolved.
    pub fn into_resolved(self) -> Result<Self> {
        if self.dangling.is_empty() {
            Ok(self)
        } else {
            Err(ParseError::DanglingReferences(self.dangling))
        }
    }
}

/// Feature identity: `gml:id` (3.2, then 3.1), then the GML 2 `fid`.
fn feature_id(cursor: &dyn XmlCursor) -> String {
    cursor
        .attribute(Some(ns::GML32), "id")
        .or_else(|| cursor.attribute(Some(ns::GML), "id"))
        .or_else(|| cursor.attribute(None, "fid"))
        .unwrap_or_default()
        .to_string()
}

/// A non-empty identity must not start with a digit and must not contain a
/// colon after its first character.
pub fn is_valid_feature_id(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        None => true,
        Some(first) => !first.is_ascii_digit() && !chars.any(|c| c == ':'),
    }
}

fn occurrence_error(
    violation: Violation<'_>,
    element: Option<&QName>,
    feature_type: &FeatureType,
    position: Position,
) -> ParseError {
    match violation {
        Violation::Unexpected => ParseError::UnexpectedProperty {
            name: element.unwrap_or(feature_type.name()).clone(),
            feature_type: feature_type.name().clone(),
            position,
        },
        Violation::Under { declaration, found } => ParseError::PropertyUnderOccurrence {
            property: declaration.name().clone(),
            feature_type: feature_type.name().clone(),
            min_occurs: declaration.min_occurs(),
            found,
            position,
        },
        Violation::Over { declaration } => ParseError::PropertyOverOccurrence {
            property: declaration.name().clone(),
            feature_type: feature_type.name().clone(),
            max_occurs: declaration.max_occurs(),
            position,
        },
    }
}
