//! Application schema: feature types, their ordered property declarations and
//! the two substitution tables the parser consults.
//!
//! Element substitution groups are flattened when the schema is built, so a
//! head element's member set contains direct and indirect substitutes.
//! Feature-type substitution is tracked separately through each feature
//! type's super type.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::model::{Feature, Property};
use crate::name::QName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxOccurs {
    Bounded(u32),
    Unbounded,
}

impl MaxOccurs {
    pub fn allows(&self, occurrences: u32) -> bool {
        match self {
            MaxOccurs::Bounded(max) => occurrences <= *max,
            MaxOccurs::Unbounded => true,
        }
    }
}

impl fmt::Display for MaxOccurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxOccurs::Bounded(max) => write!(f, "{max}"),
            MaxOccurs::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Determines how the value of a property element is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueCategory {
    Simple,
    Code,
    Measure,
    Envelope,
    Geometry,
    ComplexCustom,
    /// Inline or xlinked feature; `None` accepts any feature type.
    Feature { value_type: Option<QName> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDeclaration {
    name: QName,
    min_occurs: u32,
    max_occurs: MaxOccurs,
    category: ValueCategory,
}

impl PropertyDeclaration {
    /// A declaration that occurs exactly once.
    pub fn new(name: QName, category: ValueCategory) -> Self {
        Self {
            name,
            min_occurs: 1,
            max_occurs: MaxOccurs::Bounded(1),
            category,
        }
    }

    /// Sets the cardinality. A bounded maximum below `min_occurs` is raised to
    /// `min_occurs`.
    pub fn occurs(mut self, min_occurs: u32, max_occurs: MaxOccurs) -> Self {
        self.min_occurs = min_occurs;
        self.max_occurs = match max_occurs {
            MaxOccurs::Bounded(max) if max < min_occurs => MaxOccurs::Bounded(min_occurs),
            other => other,
        };
        self
    }

    pub fn optional(self) -> Self {
        self.occurs(0, MaxOccurs::Bounded(1))
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn min_occurs(&self) -> u32 {
        self.min_occurs
    }

    pub fn max_occurs(&self) -> MaxOccurs {
        self.max_occurs
    }

    pub fn category(&self) -> &ValueCategory {
        &self.category
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureType {
    name: QName,
    properties: Vec<Arc<PropertyDeclaration>>,
    super_type: Option<QName>,
    is_abstract: bool,
}

impl FeatureType {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            properties: Vec::new(),
            super_type: None,
            is_abstract: false,
        }
    }

    pub fn with_property(mut self, declaration: PropertyDeclaration) -> Self {
        self.properties.push(Arc::new(declaration));
        self
    }

    pub fn with_super_type(mut self, super_type: QName) -> Self {
        self.super_type = Some(super_type);
        self
    }

    pub fn with_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    /// Property declarations in schema order.
    pub fn properties(&self) -> &[Arc<PropertyDeclaration>] {
        &self.properties
    }

    pub fn property(&self, name: &QName) -> Option<&Arc<PropertyDeclaration>> {
        self.properties.iter().find(|p| p.name() == name)
    }

    pub fn super_type(&self) -> Option<&QName> {
        self.super_type.as_ref()
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn new_feature(self: &Arc<Self>, id: impl Into<String>, properties: Vec<Property>) -> Feature {
        Feature::new(id.into(), Arc::clone(self), properties)
    }
}

/// Read-only schema model shared by every parse.
#[derive(Debug, Default)]
pub struct ApplicationSchema {
    feature_types: HashMap<QName, Arc<FeatureType>>,
    elements: HashSet<QName>,
    substitution_groups: HashMap<QName, HashSet<QName>>,
}

impl ApplicationSchema {
    pub fn builder() -> ApplicationSchemaBuilder {
        ApplicationSchemaBuilder::default()
    }

    pub fn feature_type(&self, name: &QName) -> Option<&Arc<FeatureType>> {
        self.feature_types.get(name)
    }

    pub fn feature_types(&self) -> impl Iterator<Item = &Arc<FeatureType>> {
        self.feature_types.values()
    }

    /// Whether `name` is a top-level element declaration.
    pub fn element_declaration_exists(&self, name: &QName) -> bool {
        self.elements.contains(name)
    }

    /// All elements that may substitute `head`, directly or transitively.
    pub fn substitution_group_members(&self, head: &QName) -> Option<&HashSet<QName>> {
        self.substitution_groups.get(head)
    }

    /// Whether a feature of type `actual` may appear where `expected` is
    /// declared, i.e. `actual` is `expected` or derives from it.
    pub fn is_valid_feature_type_substitution(&self, expected: &QName, actual: &QName) -> bool {
        let mut current = Some(actual);
        let mut visited = HashSet::new();
        while let Some(name) = current {
            if name == expected {
                return true;
            }
            if !visited.insert(name) {
                break;
            }
            current = self.feature_types.get(name).and_then(|ft| ft.super_type());
        }
        false
    }
}

#[derive(Debug, Default)]
pub struct ApplicationSchemaBuilder {
    feature_types: Vec<FeatureType>,
    elements: Vec<(QName, Option<QName>)>,
}

impl ApplicationSchemaBuilder {
    /// Adds a feature type. Its name also becomes a top-level element.
    pub fn feature_type(mut self, feature_type: FeatureType) -> Self {
        self.feature_types.push(feature_type);
        self
    }

    /// Declares a top-level element, optionally as a member of the
    /// substitution group headed by `substitution_group`.
    pub fn element(mut self, name: QName, substitution_group: Option<QName>) -> Self {
        self.elements.push((name, substitution_group));
        self
    }

    pub fn build(self) -> ApplicationSchema {
        let mut heads: HashMap<QName, QName> = HashMap::new();
        let mut elements = HashSet::new();

        for ft in &self.feature_types {
            elements.insert(ft.name().clone());
        }
        for (name, head) in self.elements {
            if let Some(head) = head {
                heads.insert(name.clone(), head);
            }
            elements.insert(name);
        }

        let mut substitution_groups: HashMap<QName, HashSet<QName>> = HashMap::new();
        for member in heads.keys() {
            let mut visited = HashSet::new();
            let mut head = heads.get(member);
            while let Some(h) = head {
                if !visited.insert(h) {
                    warn!("Substitution group cycle detected at '{}'", h);
                    break;
                }
                if h != member {
                    substitution_groups
                        .entry(h.clone())
                        .or_default()
                        .insert(member.clone());
                }
                head = heads.get(h);
            }
        }

        let feature_types = self
            .feature_types
            .into_iter()
            .map(|ft| (ft.name().clone(), Arc::new(ft)))
            .collect();

        ApplicationSchema {
            feature_types,
            elements,
            substitution_groups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(local: &str) -> QName {
        QName::new("urn:app", local)
    }

    #[test]
    fn test_substitution_groups_are_flattened() {
        let schema = ApplicationSchema::builder()
            .element(app("description"), None)
            .element(app("remark"), Some(app("description")))
            .element(app("footnote"), Some(app("remark")))
            .build();

        let members = schema.substitution_group_members(&app("description")).unwrap();
        assert!(members.contains(&app("remark")));
        assert!(members.contains(&app("footnote")));
        assert!(!members.contains(&app("description")));
        assert_eq!(schema.substitution_group_members(&app("remark")).unwrap().len(), 1);
    }

    #[test]
    fn test_feature_types_are_top_level_elements() {
        let schema = ApplicationSchema::builder()
            .feature_type(FeatureType::new(app("Road")))
            .build();
        assert!(schema.element_declaration_exists(&app("Road")));
        assert!(!schema.element_declaration_exists(&app("name")));
    }

    #[test]
    fn test_feature_type_substitution_follows_super_types() {
        let schema = ApplicationSchema::builder()
            .feature_type(FeatureType::new(app("Transport")).with_abstract(true))
            .feature_type(FeatureType::new(app("Road")).with_super_type(app("Transport")))
            .feature_type(FeatureType::new(app("Highway")).with_super_type(app("Road")))
            .feature_type(FeatureType::new(app("River")))
            .build();

        assert!(schema.is_valid_feature_type_substitution(&app("Road"), &app("Road")));
        assert!(schema.is_valid_feature_type_substitution(&app("Transport"), &app("Highway")));
        assert!(!schema.is_valid_feature_type_substitution(&app("Road"), &app("Transport")));
        assert!(!schema.is_valid_feature_type_substitution(&app("Road"), &app("River")));
    }

    #[test]
    fn test_cardinality_is_normalized() {
        let decl = PropertyDeclaration::new(app("lane"), ValueCategory::Simple)
            .occurs(2, MaxOccurs::Bounded(1));
        assert_eq!(decl.max_occurs(), MaxOccurs::Bounded(2));
        assert!(decl.max_occurs().allows(2));
        assert!(!decl.max_occurs().allows(3));
        assert!(MaxOccurs::Unbounded.allows(u32::MAX));
    }
}
