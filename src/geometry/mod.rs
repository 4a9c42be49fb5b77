pub mod parser;

pub use parser::{GeometryParser, Gml3GeometryParser};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    pub(crate) fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [x, y] => Some(Self::new(*x, *y)),
            [x, y, z] => Some(Self::with_z(*x, *y, *z)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Vec<Coordinate>,
    pub interiors: Vec<Vec<Coordinate>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeometryKind {
    Point(Coordinate),
    LineString(Vec<Coordinate>),
    Polygon(Polygon),
    MultiPoint(Vec<Coordinate>),
    MultiLineString(Vec<Vec<Coordinate>>),
    MultiPolygon(Vec<Polygon>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub id: Option<String>,
    pub srs: Option<String>,
    pub kind: GeometryKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub lower: Coordinate,
    pub upper: Coordinate,
    pub srs: Option<String>,
}
