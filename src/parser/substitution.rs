use tracing::debug;

use crate::name::QName;
use crate::schema::{ApplicationSchema, PropertyDeclaration};

/// Decides whether an element may stand in for a property declaration.
///
/// Only exact names and members of the declaration's (already flattened)
/// substitution group match. Both names must be top-level element
/// declarations for substitution to apply.
#[derive(Debug, Clone, Copy)]
pub struct SubstitutionResolver<'s> {
    schema: &'s ApplicationSchema,
}

impl<'s> SubstitutionResolver<'s> {
    pub fn new(schema: &'s ApplicationSchema) -> Self {
        Self { schema }
    }

    pub fn matches(&self, element: &QName, declaration: &PropertyDeclaration) -> bool {
        let head = declaration.name();
        if element == head {
            return true;
        }
        if !self.schema.element_declaration_exists(element) || !self.schema.element_declaration_exists(head) {
            debug!(
                "'{}' cannot substitute '{}': not a top-level element declaration",
                element, head
            );
            return false;
        }
        let is_member = self
            .schema
            .substitution_group_members(head)
            .is_some_and(|members| members.contains(element));
        if is_member {
            debug!("'{}' substitutes '{}'", element, head);
        }
        is_member
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ValueCategory;

    fn app(local: &str) -> QName {
        QName::new("urn:app", local)
    }

    fn schema() -> ApplicationSchema {
        ApplicationSchema::builder()
            .element(app("description"), None)
            .element(app("remark"), Some(app("description")))
            .element(app("footnote"), Some(app("remark")))
            .element(app("comment"), None)
            .build()
    }

    #[test]
    fn test_exact_name_always_matches() {
        let schema = ApplicationSchema::default();
        let resolver = SubstitutionResolver::new(&schema);
        let decl = PropertyDeclaration::new(app("local"), ValueCategory::Simple);
        assert!(resolver.matches(&app("local"), &decl));
    }

    #[test]
    fn test_direct_and_transitive_members_match() {
        let schema = schema();
        let resolver = SubstitutionResolver::new(&schema);
        let decl = PropertyDeclaration::new(app("description"), ValueCategory::Simple);
        assert!(resolver.matches(&app("remark"), &decl));
        assert!(resolver.matches(&app("footnote"), &decl));
        assert!(!resolver.matches(&app("comment"), &decl));
    }

    #[test]
    fn test_substitution_is_not_symmetric() {
        let schema = schema();
        let resolver = SubstitutionResolver::new(&schema);
        let decl = PropertyDeclaration::new(app("remark"), ValueCategory::Simple);
        assert!(!resolver.matches(&app("description"), &decl));
    }

    #[test]
    fn test_local_declarations_never_substitute() {
        let schema = schema();
        let resolver = SubstitutionResolver::new(&schema);
        let local = PropertyDeclaration::new(app("note"), ValueCategory::Simple);
        assert!(!resolver.matches(&app("remark"), &local));
        let decl = PropertyDeclaration::new(app("description"), ValueCategory::Simple);
        assert!(!resolver.matches(&app("undeclared"), &decl));
    }
}
