//! Ordered occurrence grammar of a feature type.
//!
//! The validator walks the property declarations strictly forward: a child
//! either counts towards the active declaration or moves the validator to the
//! first later declaration it satisfies. Declarations left behind are never
//! revisited.

use std::sync::Arc;

use crate::name::QName;
use crate::schema::PropertyDeclaration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation<'a> {
    /// No remaining declaration accepts the element.
    Unexpected,
    /// `declaration` was left behind with fewer than `min_occurs` occurrences.
    Under {
        declaration: &'a Arc<PropertyDeclaration>,
        found: u32,
    },
    /// `declaration` already reached `max_occurs`.
    Over {
        declaration: &'a Arc<PropertyDeclaration>,
    },
}

#[derive(Debug)]
pub struct OccurrenceValidator<'a> {
    declarations: &'a [Arc<PropertyDeclaration>],
    active: usize,
    occurrences: u32,
}

impl<'a> OccurrenceValidator<'a> {
    pub fn new(declarations: &'a [Arc<PropertyDeclaration>]) -> Self {
        Self {
            declarations,
            active: 0,
            occurrences: 0,
        }
    }

    /// Index of the active declaration and its occurrence count so far.
    pub fn state(&self) -> (usize, u32) {
        (self.active, self.occurrences)
    }

    /// Accepts `element` and returns the declaration it counts towards.
    pub fn accept<F>(&mut self, element: &QName, mut matches: F) -> Result<&'a Arc<PropertyDeclaration>, Violation<'a>>
    where
        F: FnMut(&QName, &PropertyDeclaration) -> bool,
    {
        let Some(current) = self.declarations.get(self.active) else {
            return Err(Violation::Unexpected);
        };

        if matches(element, current.as_ref()) {
            if !current.max_occurs().allows(self.occurrences + 1) {
                return Err(Violation::Over { declaration: current });
            }
            self.occurrences += 1;
            return Ok(current);
        }

        loop {
            let left = &self.declarations[self.active];
            if self.occurrences < left.min_occurs() {
                return Err(Violation::Under {
                    declaration: left,
                    found: self.occurrences,
                });
            }
            self.active += 1;
            self.occurrences = 0;

            let Some(next) = self.declarations.get(self.active) else {
                return Err(Violation::Unexpected);
            };
            if matches(element, next.as_ref()) {
                self.occurrences = 1;
                return Ok(next);
            }
        }
    }

    /// End of the child elements. With `check_remaining`, the active
    /// declaration and every declaration after it must have met `min_occurs`.
    pub fn finish(&self, check_remaining: bool) -> Result<(), Violation<'a>> {
        if !check_remaining {
            return Ok(());
        }
        for (index, declaration) in self.declarations.iter().enumerate().skip(self.active) {
            let found = if index == self.active { self.occurrences } else { 0 };
            if found < declaration.min_occurs() {
                return Err(Violation::Under { declaration, found });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{MaxOccurs, ValueCategory};

    fn app(local: &str) -> QName {
        QName::new("urn:app", local)
    }

    fn decl(local: &str, min: u32, max: MaxOccurs) -> Arc<PropertyDeclaration> {
        Arc::new(PropertyDeclaration::new(app(local), ValueCategory::Simple).occurs(min, max))
    }

    fn by_name(element: &QName, declaration: &PropertyDeclaration) -> bool {
        element == declaration.name()
    }

    fn declarations() -> Vec<Arc<PropertyDeclaration>> {
        vec![
            decl("name", 1, MaxOccurs::Bounded(1)),
            decl("alias", 0, MaxOccurs::Unbounded),
            decl("lane", 2, MaxOccurs::Bounded(3)),
            decl("remark", 0, MaxOccurs::Bounded(1)),
        ]
    }

    #[test]
    fn test_accepts_declaration_order() {
        let decls = declarations();
        let mut validator = OccurrenceValidator::new(&decls);
        for local in ["name", "alias", "alias", "lane", "lane", "remark"] {
            let accepted = validator.accept(&app(local), by_name).unwrap();
            assert_eq!(accepted.name(), &app(local));
        }
        assert_eq!(validator.state(), (3, 1));
        assert!(validator.finish(true).is_ok());
    }

    #[test]
    fn test_optional_declarations_can_be_skipped() {
        let decls = declarations();
        let mut validator = OccurrenceValidator::new(&decls);
        validator.accept(&app("name"), by_name).unwrap();
        validator.accept(&app("lane"), by_name).unwrap();
        validator.accept(&app("lane"), by_name).unwrap();
        assert_eq!(validator.state(), (2, 2));
    }

    #[test]
    fn test_skipping_mandatory_declaration_is_under_occurrence() {
        let decls = declarations();
        let mut validator = OccurrenceValidator::new(&decls);
        let violation = validator.accept(&app("alias"), by_name).unwrap_err();
        assert_eq!(
            violation,
            Violation::Under {
                declaration: &decls[0],
                found: 0
            }
        );

        let mut validator = OccurrenceValidator::new(&decls);
        validator.accept(&app("name"), by_name).unwrap();
        validator.accept(&app("lane"), by_name).unwrap();
        let violation = validator.accept(&app("remark"), by_name).unwrap_err();
        assert_eq!(
            violation,
            Violation::Under {
                declaration: &decls[2],
                found: 1
            }
        );
    }

    #[test]
    fn test_exceeding_max_is_over_occurrence() {
        let decls = declarations();
        let mut validator = OccurrenceValidator::new(&decls);
        validator.accept(&app("name"), by_name).unwrap();
        let violation = validator.accept(&app("name"), by_name).unwrap_err();
        assert_eq!(violation, Violation::Over { declaration: &decls[0] });
    }

    #[test]
    fn test_earlier_declarations_are_never_revisited() {
        let decls = declarations();
        let mut validator = OccurrenceValidator::new(&decls);
        validator.accept(&app("name"), by_name).unwrap();
        validator.accept(&app("alias"), by_name).unwrap();
        validator.accept(&app("lane"), by_name).unwrap();
        validator.accept(&app("lane"), by_name).unwrap();
        let violation = validator.accept(&app("alias"), by_name).unwrap_err();
        assert_eq!(violation, Violation::Unexpected);
    }

    #[test]
    fn test_unknown_element_and_empty_grammar() {
        let decls = declarations();
        let mut validator = OccurrenceValidator::new(&decls);
        validator.accept(&app("name"), by_name).unwrap();
        validator.accept(&app("lane"), by_name).unwrap();
        validator.accept(&app("lane"), by_name).unwrap();
        assert_eq!(validator.accept(&app("colour"), by_name).unwrap_err(), Violation::Unexpected);

        let mut empty = OccurrenceValidator::new(&[]);
        assert_eq!(empty.accept(&app("name"), by_name).unwrap_err(), Violation::Unexpected);
        assert!(empty.finish(true).is_ok());
    }

    #[test]
    fn test_trailing_min_occurs_is_only_checked_on_request() {
        let decls = declarations();
        let mut validator = OccurrenceValidator::new(&decls);
        validator.accept(&app("name"), by_name).unwrap();
        validator.accept(&app("lane"), by_name).unwrap();

        assert!(validator.finish(false).is_ok());
        assert_eq!(
            validator.finish(true).unwrap_err(),
            Violation::Under {
                declaration: &decls[2],
                found: 1
            }
        );

        let fresh = OccurrenceValidator::new(&decls);
        assert_eq!(
            fresh.finish(true).unwrap_err(),
            Violation::Under {
                declaration: &decls[0],
                found: 0
            }
        );
    }
}
