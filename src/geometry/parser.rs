//! Leaf parser for GML geometry and envelope markup.
//!
//! Handles the simple-feature subset of GML 3.1/3.2 plus the GML 2 spellings
//! (`coordinates`, `outerBoundaryIs`, `Box`, ...). Coordinates are read from
//! `pos`, `posList` and `coordinates`.

use tracing::debug;

use super::{Coordinate, Envelope, Geometry, GeometryKind, Polygon};
use crate::cursor::{EventKind, XmlCursor};
use crate::error::{ParseError, Result};
use crate::name::{ns, QName};

/// Parses the geometry or envelope element the cursor points at.
///
/// Implementations start on the geometry start element and must leave the
/// cursor on its end element.
pub trait GeometryParser: Send + Sync {
    fn parse_geometry(&self, cursor: &mut dyn XmlCursor, default_srs: Option<&str>) -> Result<Geometry>;

    fn parse_envelope(&self, cursor: &mut dyn XmlCursor, default_srs: Option<&str>) -> Result<Envelope>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Gml3GeometryParser;

impl GeometryParser for Gml3GeometryParser {
    fn parse_geometry(&self, cursor: &mut dyn XmlCursor, default_srs: Option<&str>) -> Result<Geometry> {
        self.read_geometry(cursor, default_srs, None)
    }

    fn parse_envelope(&self, cursor: &mut dyn XmlCursor, default_srs: Option<&str>) -> Result<Envelope> {
        let name = gml_start(cursor)?;
        if !matches!(name.local_name(), "Envelope" | "Box") {
            return Err(ParseError::UnsupportedGeometry {
                name,
                position: cursor.position(),
            });
        }
        let srs = cursor
            .attribute(None, "srsName")
            .or(default_srs)
            .map(str::to_owned);

        let mut corners: Vec<Coordinate> = Vec::with_capacity(2);
        let mut lower = None;
        let mut upper = None;
        while cursor.next_tag()? == EventKind::StartElement {
            let child = current_local_name(cursor);
            match child.as_str() {
                "lowerCorner" => lower = Some(parse_single(cursor)?),
                "upperCorner" => upper = Some(parse_single(cursor)?),
                "pos" => corners.push(parse_single(cursor)?),
                "coordinates" => corners.extend(parse_coordinates(cursor)?),
                _ => return Err(unexpected_child(cursor, &child)),
            }
        }

        let mut corners = corners.into_iter();
        let lower = lower.or_else(|| corners.next());
        let upper = upper.or_else(|| corners.next());
        match (lower, upper) {
            (Some(lower), Some(upper)) => Ok(Envelope { lower, upper, srs }),
            _ => Err(ParseError::invalid_geometry(
                "envelope requires a lower and an upper corner",
                cursor.position(),
            )),
        }
    }
}

impl Gml3GeometryParser {
    /// Geometry element whose `srsName` and `srsDimension` fall back to the
    /// values of an enclosing multi geometry.
    fn read_geometry(
        &self,
        cursor: &mut dyn XmlCursor,
        default_srs: Option<&str>,
        inherited_dimension: Option<usize>,
    ) -> Result<Geometry> {
        let name = gml_start(cursor)?;
        let srs = cursor
            .attribute(None, "srsName")
            .or(default_srs)
            .map(str::to_owned);
        let id = cursor
            .attribute(Some(ns::GML32), "id")
            .or_else(|| cursor.attribute(Some(ns::GML), "id"))
            .map(str::to_owned);
        let dimension = srs_dimension(cursor)?.or(inherited_dimension);

        debug!("Parsing geometry {} (srs: {:?})", name, srs);

        let kind = match name.local_name() {
            "Point" => GeometryKind::Point(parse_point(cursor)?),
            "LineString" | "LinearRing" => GeometryKind::LineString(parse_positions(cursor, dimension)?),
            "Polygon" => GeometryKind::Polygon(parse_polygon(cursor, dimension)?),
            "MultiPoint" => {
                let members = self.parse_members(cursor, srs.as_deref(), dimension)?;
                let mut points = Vec::with_capacity(members.len());
                for member in members {
                    match member.kind {
                        GeometryKind::Point(c) => points.push(c),
                        _ => return Err(wrong_member(cursor, "MultiPoint")),
                    }
                }
                GeometryKind::MultiPoint(points)
            }
            "MultiCurve" | "MultiLineString" => {
                let members = self.parse_members(cursor, srs.as_deref(), dimension)?;
                let mut lines = Vec::with_capacity(members.len());
                for member in members {
                    match member.kind {
                        GeometryKind::LineString(line) => lines.push(line),
                        _ => return Err(wrong_member(cursor, name.local_name())),
                    }
                }
                GeometryKind::MultiLineString(lines)
            }
            "MultiSurface" | "MultiPolygon" => {
                let members = self.parse_members(cursor, srs.as_deref(), dimension)?;
                let mut polygons = Vec::with_capacity(members.len());
                for member in members {
                    match member.kind {
                        GeometryKind::Polygon(polygon) => polygons.push(polygon),
                        _ => return Err(wrong_member(cursor, name.local_name())),
                    }
                }
                GeometryKind::MultiPolygon(polygons)
            }
            _ => {
                return Err(ParseError::UnsupportedGeometry {
                    name,
                    position: cursor.position(),
                })
            }
        };

        Ok(Geometry { id, srs, kind })
    }

    /// Reads `*Member` / `*Members` children of a multi geometry. Members
    /// inherit the parent's SRS and dimension.
    fn parse_members(
        &self,
        cursor: &mut dyn XmlCursor,
        srs: Option<&str>,
        dimension: Option<usize>,
    ) -> Result<Vec<Geometry>> {
        let mut members = Vec::new();
        while cursor.next_tag()? == EventKind::StartElement {
            while cursor.next_tag()? == EventKind::StartElement {
                members.push(self.read_geometry(cursor, srs, dimension)?);
            }
        }
        Ok(members)
    }
}

fn gml_start(cursor: &dyn XmlCursor) -> Result<QName> {
    let name = match (cursor.event(), cursor.name()) {
        (EventKind::StartElement, Some(name)) => name.clone(),
        _ => {
            return Err(ParseError::xml(
                "expected a geometry start element",
                cursor.position(),
            ))
        }
    };
    if !ns::is_gml(name.namespace()) {
        return Err(ParseError::UnsupportedGeometry {
            name,
            position: cursor.position(),
        });
    }
    Ok(name)
}

fn current_local_name(cursor: &dyn XmlCursor) -> String {
    cursor
        .name()
        .map(|n| n.local_name().to_string())
        .unwrap_or_default()
}

fn srs_dimension(cursor: &dyn XmlCursor) -> Result<Option<usize>> {
    cursor
        .attribute(None, "srsDimension")
        .map(|d| {
            d.trim()
                .parse::<usize>()
                .map_err(|_| ParseError::malformed_number(d, cursor.position()))
        })
        .transpose()
}

fn parse_point(cursor: &mut dyn XmlCursor) -> Result<Coordinate> {
    let mut coordinate = None;
    while cursor.next_tag()? == EventKind::StartElement {
        let child = current_local_name(cursor);
        match child.as_str() {
            "pos" => coordinate = Some(parse_single(cursor)?),
            "coordinates" => coordinate = parse_coordinates(cursor)?.into_iter().next(),
            _ => return Err(unexpected_child(cursor, &child)),
        }
    }
    coordinate.ok_or_else(|| ParseError::invalid_geometry("point without position", cursor.position()))
}

/// Positions of a `LineString` or `LinearRing`.
fn parse_positions(cursor: &mut dyn XmlCursor, dimension: Option<usize>) -> Result<Vec<Coordinate>> {
    let mut coordinates = Vec::new();
    while cursor.next_tag()? == EventKind::StartElement {
        let child = current_local_name(cursor);
        match child.as_str() {
            "posList" => {
                let dimension = srs_dimension(cursor)?.or(dimension).unwrap_or(2);
                let text = cursor.element_text()?;
                coordinates.extend(parse_pos_list(&text, dimension, cursor)?);
            }
            "pos" => coordinates.push(parse_single(cursor)?),
            "coordinates" => coordinates.extend(parse_coordinates(cursor)?),
            _ => return Err(unexpected_child(cursor, &child)),
        }
    }
    if coordinates.len() < 2 {
        return Err(ParseError::invalid_geometry(
            "a curve needs at least two positions",
            cursor.position(),
        ));
    }
    Ok(coordinates)
}

fn parse_polygon(cursor: &mut dyn XmlCursor, dimension: Option<usize>) -> Result<Polygon> {
    let mut exterior = None;
    let mut interiors = Vec::new();
    while cursor.next_tag()? == EventKind::StartElement {
        let child = current_local_name(cursor);
        match child.as_str() {
            "exterior" | "outerBoundaryIs" => exterior = Some(parse_ring(cursor, dimension)?),
            "interior" | "innerBoundaryIs" => interiors.push(parse_ring(cursor, dimension)?),
            _ => return Err(unexpected_child(cursor, &child)),
        }
    }
    let exterior = exterior
        .ok_or_else(|| ParseError::invalid_geometry("polygon without exterior ring", cursor.position()))?;
    Ok(Polygon { exterior, interiors })
}

/// Boundary property wrapping a single `LinearRing`.
fn parse_ring(cursor: &mut dyn XmlCursor, dimension: Option<usize>) -> Result<Vec<Coordinate>> {
    if cursor.next_tag()? != EventKind::StartElement || current_local_name(cursor) != "LinearRing" {
        return Err(ParseError::invalid_geometry("expected a LinearRing", cursor.position()));
    }
    let dimension = srs_dimension(cursor)?.or(dimension);
    let ring = parse_positions(cursor, dimension)?;
    if cursor.next_tag()? != EventKind::EndElement {
        return Err(ParseError::invalid_geometry(
            "boundary must contain exactly one LinearRing",
            cursor.position(),
        ));
    }
    Ok(ring)
}

/// Text content of a single-position element such as `pos` or `lowerCorner`.
fn parse_single(cursor: &mut dyn XmlCursor) -> Result<Coordinate> {
    let text = cursor.element_text()?;
    let values = parse_numbers(text.split_whitespace(), cursor)?;
    Coordinate::from_slice(&values).ok_or_else(|| {
        ParseError::invalid_geometry(
            format!("expected 2 or 3 ordinates, found {}", values.len()),
            cursor.position(),
        )
    })
}

/// GML 2 `coordinates`: tuples separated by whitespace, ordinates by `cs`.
fn parse_coordinates(cursor: &mut dyn XmlCursor) -> Result<Vec<Coordinate>> {
    let cs = cursor.attribute(None, "cs").unwrap_or(",").to_string();
    let text = cursor.element_text()?;
    let mut coordinates = Vec::new();
    for tuple in text.split_whitespace() {
        let values = parse_numbers(tuple.split(cs.as_str()), cursor)?;
        let coordinate = Coordinate::from_slice(&values).ok_or_else(|| {
            ParseError::invalid_geometry(format!("invalid coordinate tuple '{tuple}'"), cursor.position())
        })?;
        coordinates.push(coordinate);
    }
    Ok(coordinates)
}

fn parse_pos_list(text: &str, dimension: usize, cursor: &dyn XmlCursor) -> Result<Vec<Coordinate>> {
    if !(2..=3).contains(&dimension) {
        return Err(ParseError::invalid_geometry(
            format!("unsupported dimension {dimension}"),
            cursor.position(),
        ));
    }
    let values = parse_numbers(text.split_whitespace(), cursor)?;
    if values.len() % dimension != 0 {
        return Err(ParseError::invalid_geometry(
            format!(
                "position list of {} values does not match dimension {}",
                values.len(),
                dimension
            ),
            cursor.position(),
        ));
    }
    Ok(values
        .chunks_exact(dimension)
        .filter_map(Coordinate::from_slice)
        .collect())
}

fn parse_numbers<'a>(tokens: impl Iterator<Item = &'a str>, cursor: &dyn XmlCursor) -> Result<Vec<f64>> {
    tokens
        .map(|token| {
            token
                .trim()
                .parse::<f64>()
                .map_err(|_| ParseError::malformed_number(token, cursor.position()))
        })
        .collect()
}

fn unexpected_child(cursor: &dyn XmlCursor, child: &str) -> ParseError {
    ParseError::invalid_geometry(format!("unexpected element '{child}'"), cursor.position())
}

fn wrong_member(cursor: &dyn XmlCursor, container: &str) -> ParseError {
    ParseError::invalid_geometry(format!("invalid member geometry in {container}"), cursor.position())
}
