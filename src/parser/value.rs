//! Property value dispatch by declaration category.

use tracing::{debug, trace, warn};

use super::GmlFeatureParser;
use crate::cursor::{EventKind, Position, XmlCursor};
use crate::error::{ParseError, Result};
use crate::model::{CodeType, GenericElement, GenericNode, Measure, PropertyValue};
use crate::name::{ns, QName};
use crate::reference::ReferenceContext;
use crate::schema::{FeatureType, PropertyDeclaration, ValueCategory};

impl GmlFeatureParser<'_> {
    /// Parses the value of the property element the cursor is on and leaves
    /// the cursor on the property end element.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn parse_value(
        &self,
        cursor: &mut dyn XmlCursor,
        feature_type: &FeatureType,
        declaration: &PropertyDeclaration,
        owner_id: &str,
        occurrence: usize,
        default_srs: Option<&str>,
        ctx: &mut ReferenceContext,
    ) -> Result<PropertyValue> {
        let key = (feature_type.name().clone(), declaration.name().clone());
        if let Some(custom) = self.custom_parsers.get(&key) {
            trace!("Custom parser for {} of {}", declaration.name(), feature_type.name());
            let position = cursor.position();
            return custom
                .parse(cursor)
                .map(PropertyValue::Custom)
                .map_err(|e| e.in_property(declaration.name(), position));
        }

        match declaration.category() {
            ValueCategory::Simple => Ok(PropertyValue::Text(cursor.element_text()?.trim().to_string())),
            ValueCategory::Code => {
                let code_space = cursor.attribute(None, "codeSpace").map(str::to_owned);
                let code = cursor.element_text()?.trim().to_string();
                Ok(PropertyValue::Code(CodeType { code, code_space }))
            }
            ValueCategory::Measure => {
                let uom = cursor.attribute(None, "uom").map(str::to_owned);
                let position = cursor.position();
                let value = cursor
                    .element_text_as_f64()
                    .map_err(|e| e.in_property(declaration.name(), position))?;
                Ok(PropertyValue::Measure(Measure { value, uom }))
            }
            ValueCategory::Geometry => {
                let position = enter_value_element(cursor, declaration.name())?;
                let geometry = self
                    .geometry_parser
                    .parse_geometry(cursor, default_srs)
                    .map_err(|e| e.in_property(declaration.name(), position))?;
                leave_value_element(cursor, declaration.name())?;
                Ok(PropertyValue::Geometry(geometry))
            }
            ValueCategory::Envelope => {
                let position = enter_value_element(cursor, declaration.name())?;
                let envelope = self
                    .geometry_parser
                    .parse_envelope(cursor, default_srs)
                    .map_err(|e| e.in_property(declaration.name(), position))?;
                leave_value_element(cursor, declaration.name())?;
                Ok(PropertyValue::Envelope(envelope))
            }
            ValueCategory::ComplexCustom => Ok(PropertyValue::Generic(parse_generic_element(cursor)?)),
            ValueCategory::Feature { value_type } => self.parse_feature_value(
                cursor,
                declaration.name(),
                value_type.as_ref(),
                owner_id,
                occurrence,
                default_srs,
                ctx,
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn parse_feature_value(
        &self,
        cursor: &mut dyn XmlCursor,
        property: &QName,
        value_type: Option<&QName>,
        owner_id: &str,
        occurrence: usize,
        default_srs: Option<&str>,
        ctx: &mut ReferenceContext,
    ) -> Result<PropertyValue> {
        if let Some(href) = cursor.attribute(Some(ns::XLINK), "href").map(str::to_owned) {
            let Some(target_id) = href.strip_prefix('#') else {
                return Err(ParseError::ExternalReferenceUnsupported {
                    href,
                    position: cursor.position(),
                });
            };
            let target_id = target_id.to_string();
            cursor.skip_element()?;
            debug!("Reference {} -> #{}", property, target_id);
            let link = ctx.add_pending_reference(owner_id, property.clone(), occurrence, target_id);
            return Ok(PropertyValue::XLink(link));
        }

        let position = cursor.position();
        if cursor.next_tag()? != EventKind::StartElement {
            return Err(ParseError::WrongFeatureType {
                property: property.clone(),
                expected: value_type.cloned(),
                found: None,
                position,
            });
        }
        let Some(found) = cursor.name().cloned() else {
            return Err(ParseError::xml("start element without a name", cursor.position()));
        };
        if self.schema.feature_type(&found).is_none() {
            return Err(ParseError::UnknownFeatureType {
                name: found,
                position: cursor.position(),
            });
        }
        if let Some(expected) = value_type {
            if !self.schema.is_valid_feature_type_substitution(expected, &found) {
                return Err(ParseError::WrongFeatureType {
                    property: property.clone(),
                    expected: Some(expected.clone()),
                    found: Some(found),
                    position: cursor.position(),
                });
            }
        }

        let feature = self.parse_feature(cursor, default_srs, ctx)?;
        skip_to_property_end(cursor, property)?;
        Ok(PropertyValue::Feature(feature))
    }
}

/// Captures the current element with all nested markup, leaving the cursor on
/// its end element.
pub fn parse_generic_element(cursor: &mut dyn XmlCursor) -> Result<GenericElement> {
    let Some(name) = cursor.name().cloned().filter(|_| cursor.is_start_element()) else {
        return Err(ParseError::xml("expected a start element", cursor.position()));
    };
    let attributes = cursor
        .attributes()
        .iter()
        .map(|a| (a.name.clone(), a.value.clone()))
        .collect();

    let mut children = Vec::new();
    loop {
        match cursor.advance()? {
            EventKind::StartElement => children.push(GenericNode::Element(parse_generic_element(cursor)?)),
            EventKind::Characters => {
                if !cursor.text().trim().is_empty() {
                    children.push(GenericNode::Text(cursor.text().to_string()));
                }
            }
            EventKind::EndElement => break,
            EventKind::EndDocument | EventKind::StartDocument => {
                return Err(ParseError::xml("unexpected end of document", cursor.position()))
            }
        }
    }

    Ok(GenericElement {
        name,
        attributes,
        children,
    })
}

/// Moves from a property start element to the single value element inside it.
fn enter_value_element(cursor: &mut dyn XmlCursor, property: &QName) -> Result<Position> {
    if cursor.next_tag()? != EventKind::StartElement {
        return Err(ParseError::invalid_content(
            format!("property '{property}' has no value element"),
            cursor.position(),
        ));
    }
    Ok(cursor.position())
}

fn leave_value_element(cursor: &mut dyn XmlCursor, property: &QName) -> Result<()> {
    if cursor.next_tag()? != EventKind::EndElement {
        return Err(ParseError::invalid_content(
            format!("property '{property}' must contain a single value element"),
            cursor.position(),
        ));
    }
    Ok(())
}

fn skip_to_property_end(cursor: &mut dyn XmlCursor, property: &QName) -> Result<()> {
    loop {
        match cursor.next_tag()? {
            EventKind::EndElement => return Ok(()),
            EventKind::StartElement => {
                warn!(
                    "Ignoring trailing element '{}' in property '{}'",
                    cursor.name().map(ToString::to_string).unwrap_or_default(),
                    property
                );
                cursor.skip_element()?;
            }
            _ => return Err(ParseError::xml("unexpected end of document", cursor.position())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::XmlStreamCursor;

    #[test]
    fn test_generic_element_capture() {
        let mut cursor = XmlStreamCursor::from_str(
            r#"<app:address xmlns:app="urn:app" kind="postal"><app:street>Main</app:street><app:no>12</app:no>tail</app:address>"#,
        );
        cursor.next_tag().unwrap();
        let element = parse_generic_element(&mut cursor).unwrap();

        assert_eq!(element.name, QName::new("urn:app", "address"));
        assert_eq!(element.attribute(&QName::unqualified("kind")), Some("postal"));
        let children: Vec<_> = element.child_elements().map(|c| c.name.local_name().to_string()).collect();
        assert_eq!(children, ["street", "no"]);
        assert_eq!(element.text(), "Main12tail");
        assert_eq!(cursor.event(), EventKind::EndElement);
    }
}
