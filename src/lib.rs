pub mod batch;
pub mod cursor;
pub mod error;
pub mod geometry;
pub mod model;
pub mod name;
pub mod parser;
pub mod reference;
pub mod schema;
pub mod zip_handler;

pub use cursor::{EventKind, Position, XmlCursor, XmlStreamCursor};
pub use error::{ParseError, Result};
pub use model::{CodeType, CustomValue, Feature, GenericElement, Measure, Property, PropertyValue, XLink};
pub use name::QName;
pub use parser::{CustomPropertyParser, GmlDocument, GmlFeatureParser, ParserConfig};
pub use reference::{DanglingReference, ReferenceContext};
pub use schema::{ApplicationSchema, FeatureType, MaxOccurs, PropertyDeclaration, ValueCategory};
pub use zip_handler::ZipHandler;
