//! Per-document registry of identified features and local xlink references.
//!
//! Features are registered in document order once fully built. A reference
//! to a feature that is already registered resolves immediately; anything
//! else waits in the pending list until [`ReferenceContext::finalize`] runs
//! after the last feature of the document.

use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{Feature, XLink};
use crate::name::QName;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("feature id '{0}' is already registered")]
pub struct DuplicateId(pub String);

/// A local reference whose target never appeared in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub target_id: String,
    /// Id of the feature holding the reference; empty if it has none.
    pub owner_id: String,
    pub property: QName,
    /// Zero-based index of the reference among the occurrences of its
    /// property declaration in the owner.
    pub occurrence: usize,
}

#[derive(Debug)]
struct PendingReference {
    link: Arc<XLink>,
    owner_id: String,
    property: QName,
    occurrence: usize,
}

/// Identified features of one document and the xlink references still
/// waiting for their target.
///
/// Create one context per document and pass it to every
/// [`GmlFeatureParser::parse_feature`](crate::GmlFeatureParser::parse_feature)
/// call for that document; call [`finalize`](Self::finalize) once the last
/// feature has been parsed.
#[derive(Debug, Default)]
pub struct ReferenceContext {
    features: IndexMap<String, Arc<Feature>>,
    pending: Vec<PendingReference>,
}

impl ReferenceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a feature under its id. Features without an id are ignored.
    pub fn register_feature(&mut self, feature: Arc<Feature>) -> Result<(), DuplicateId> {
        let Some(id) = feature.id() else {
            return Ok(());
        };
        if self.features.contains_key(id) {
            return Err(DuplicateId(id.to_string()));
        }
        debug!("Registered feature '{}'", id);
        self.features.insert(id.to_string(), feature);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.features.contains_key(id)
    }

    pub fn feature(&self, id: &str) -> Option<&Arc<Feature>> {
        self.features.get(id)
    }

    /// Registered features in document order.
    pub fn features(&self) -> impl Iterator<Item = &Arc<Feature>> {
        self.features.values()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Creates the placeholder for `#target_id`, resolving it right away when
    /// the target is already registered.
    ///
    /// # Arguments
    /// * `owner_id` - Id of the feature holding the reference, empty if none
    /// * `property` - Declared name of the referencing property
    /// * `occurrence` - Zero-based occurrence of that property in the owner
    /// * `target_id` - Id of the referenced feature, without the leading `#`
    pub fn add_pending_reference(
        &mut self,
        owner_id: &str,
        property: QName,
        occurrence: usize,
        target_id: String,
    ) -> Arc<XLink> {
        let link = Arc::new(XLink::new(target_id));
        if let Some(target) = self.features.get(link.target_id()) {
            link.resolve(target);
        } else {
            self.pending.push(PendingReference {
                link: Arc::clone(&link),
                owner_id: owner_id.to_string(),
                property,
                occurrence,
            });
        }
        link
    }

    /// Resolves every pending reference against the registered features and
    /// returns those whose target is unknown.
    pub fn finalize(&mut self) -> Vec<DanglingReference> {
        let mut dangling = Vec::new();
        for pending in self.pending.drain(..) {
            match self.features.get(pending.link.target_id()) {
                Some(target) => pending.link.resolve(target),
                None => {
                    warn!(
                        "Unresolved reference '#{}' in property '{}' of feature '{}'",
                        pending.link.target_id(),
                        pending.property,
                        pending.owner_id
                    );
                    dangling.push(DanglingReference {
                        target_id: pending.link.target_id().to_string(),
                        owner_id: pending.owner_id,
                        property: pending.property,
                        occurrence: pending.occurrence,
                    });
                }
            }
        }
        dangling
    }
}
