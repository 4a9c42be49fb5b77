use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use crate::geometry::{Envelope, Geometry};
use crate::name::QName;
use crate::schema::{FeatureType, PropertyDeclaration};

/// A parsed feature instance.
///
/// Features are shared as `Arc<Feature>`; once built they are never mutated,
/// except through the xlink slots of their properties.
#[derive(Debug)]
pub struct Feature {
    id: String,
    feature_type: Arc<FeatureType>,
    properties: Vec<Property>,
}

impl Feature {
    pub(crate) fn new(id: String, feature_type: Arc<FeatureType>, properties: Vec<Property>) -> Self {
        Self {
            id,
            feature_type,
            properties,
        }
    }

    /// The feature identity, `None` if the feature has none.
    pub fn id(&self) -> Option<&str> {
        (!self.id.is_empty()).then_some(self.id.as_str())
    }

    pub fn feature_type(&self) -> &Arc<FeatureType> {
        &self.feature_type
    }

    pub fn name(&self) -> &QName {
        self.feature_type.name()
    }

    /// Properties in document order.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Properties whose declaration is `name`, including substitutes.
    pub fn properties_of<'a>(&'a self, name: &'a QName) -> impl Iterator<Item = &'a Property> + 'a {
        self.properties
            .iter()
            .filter(move |p| p.declaration.name() == name)
    }

    /// First property whose declaration is `name`.
    ///
    /// # Arguments
    /// * `name` - Qualified name of the property declaration
    ///
    /// # Returns
    /// * `None` if the feature has no such property
    pub fn property(&self, name: &QName) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.declaration.name() == name)
    }

    pub(crate) fn bind_xlinks(self: &Arc<Self>) {
        for property in &self.properties {
            if let PropertyValue::XLink(link) = &property.value {
                link.bind_owner(self);
            }
        }
    }
}

/// One property occurrence of a feature, in document order.
#[derive(Debug, Clone)]
pub struct Property {
    declaration: Arc<PropertyDeclaration>,
    name: QName,
    value: PropertyValue,
}

impl Property {
    pub fn new(declaration: Arc<PropertyDeclaration>, name: QName, value: PropertyValue) -> Self {
        Self {
            declaration,
            name,
            value,
        }
    }

    pub fn declaration(&self) -> &Arc<PropertyDeclaration> {
        &self.declaration
    }

    /// Element name as it appeared in the document; differs from the
    /// declaration name when a substitute was used.
    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn value(&self) -> &PropertyValue {
        &self.value
    }
}

/// Value of a property, one variant per value category.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    Text(String),
    Code(CodeType),
    Measure(Measure),
    Geometry(Geometry),
    Envelope(Envelope),
    Feature(Arc<Feature>),
    XLink(Arc<XLink>),
    Generic(GenericElement),
    Custom(CustomValue),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The feature this value stands for: the inline feature or the resolved
    /// xlink target.
    pub fn feature(&self) -> Option<Arc<Feature>> {
        match self {
            PropertyValue::Feature(feature) => Some(Arc::clone(feature)),
            PropertyValue::XLink(link) => link.target(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeType {
    pub code: String,
    pub code_space: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measure {
    pub value: f64,
    pub uom: Option<String>,
}

/// Placeholder for a local `xlink:href="#id"` reference.
///
/// Both slots are write-once and weak: the owner is bound right after the
/// owning feature is built, the target when the reference is resolved.
#[derive(Debug)]
pub struct XLink {
    target_id: String,
    owner: OnceLock<Weak<Feature>>,
    target: OnceLock<Weak<Feature>>,
}

impl XLink {
    pub(crate) fn new(target_id: String) -> Self {
        Self {
            target_id,
            owner: OnceLock::new(),
            target: OnceLock::new(),
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn href(&self) -> String {
        format!("#{}", self.target_id)
    }

    pub fn owner(&self) -> Option<Arc<Feature>> {
        self.owner.get().and_then(Weak::upgrade)
    }

    pub fn target(&self) -> Option<Arc<Feature>> {
        self.target.get().and_then(Weak::upgrade)
    }

    pub fn is_resolved(&self) -> bool {
        self.target.get().is_some()
    }

    pub(crate) fn bind_owner(&self, owner: &Arc<Feature>) {
        let _ = self.owner.set(Arc::downgrade(owner));
    }

    pub(crate) fn resolve(&self, target: &Arc<Feature>) {
        let _ = self.target.set(Arc::downgrade(target));
    }
}

/// Arbitrary nested markup captured without schema knowledge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericElement {
    pub name: QName,
    pub attributes: Vec<(QName, String)>,
    pub children: Vec<GenericNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenericNode {
    Element(GenericElement),
    Text(String),
}

impl GenericElement {
    pub fn attribute(&self, name: &QName) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &GenericElement> {
        self.children.iter().filter_map(|c| match c {
            GenericNode::Element(e) => Some(e),
            GenericNode::Text(_) => None,
        })
    }

    /// Concatenated text of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                GenericNode::Text(t) => out.push_str(t),
                GenericNode::Element(e) => out.push_str(&e.text()),
            }
        }
        out
    }
}

/// Value produced by a registered custom property parser.
#[derive(Clone)]
pub struct CustomValue(Arc<dyn Any + Send + Sync>);

impl CustomValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomValue(..)")
    }
}
