//! Minimal WKT reader/writer for the shapes the allocator understands
//!
//! Z/M ordinates are accepted and ignored; vertical extent travels separately.

use crate::core_types::geometry::{Coord, GeometryError, Polygon, Shape};
use std::fmt::Write;

/// Render a shape as WKT
pub(crate) fn format(shape: &Shape) -> String {
    let mut out = String::new();
    match shape {
        Shape::Point(c) => {
            out.push_str("POINT (");
            write_coord(&mut out, c);
            out.push(')');
        }
        Shape::LineString(line) => {
            out.push_str("LINESTRING ");
            write_ring(&mut out, line);
        }
        Shape::Polygon(polygon) => {
            out.push_str("POLYGON ");
            write_polygon(&mut out, polygon);
        }
        Shape::MultiLineString(lines) => {
            out.push_str("MULTILINESTRING (");
            for (i, line) in lines.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_ring(&mut out, line);
            }
            out.push(')');
        }
        Shape::MultiPolygon(polygons) => {
            out.push_str("MULTIPOLYGON (");
            for (i, polygon) in polygons.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_polygon(&mut out, polygon);
            }
            out.push(')');
        }
    }
    out
}

fn write_coord(out: &mut String, c: &Coord) {
    // Writing to a String never fails
    let _ = write!(out, "{} {}", c.x, c.y);
}

fn write_ring(out: &mut String, coords: &[Coord]) {
    out.push('(');
    for (i, c) in coords.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_coord(out, c);
    }
    out.push(')');
}

fn write_polygon(out: &mut String, polygon: &Polygon) {
    out.push('(');
    for (i, ring) in polygon.rings().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_ring(out, ring);
    }
    out.push(')');
}

/// Parse WKT into a shape
pub(crate) fn parse(text: &str) -> Result<Shape, GeometryError> {
    let mut parser = Parser {
        src: text.as_bytes(),
        pos: 0,
    };
    let shape = parser.shape()?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(shape)
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> GeometryError {
        GeometryError::Wkt {
            position: self.pos,
            message: message.to_string(),
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.src.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<(), GeometryError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn word(&mut self) -> String {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_alphabetic() {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).to_ascii_uppercase()
    }

    fn shape(&mut self) -> Result<Shape, GeometryError> {
        let tag = self.word();
        if tag.is_empty() {
            return Err(self.error("expected geometry type"));
        }

        // Optional dimension tag (Z, M, ZM)
        let save = self.pos;
        let dim = self.word();
        match dim.as_str() {
            "Z" | "M" | "ZM" => {}
            "EMPTY" => return Err(GeometryError::Empty),
            _ => self.pos = save,
        }
        if self.word() == "EMPTY" {
            return Err(GeometryError::Empty);
        }

        match tag.as_str() {
            "POINT" => {
                self.expect(b'(')?;
                let c = self.coord()?;
                self.expect(b')')?;
                Ok(Shape::Point(c))
            }
            "LINESTRING" => Ok(Shape::LineString(self.coord_list()?)),
            "POLYGON" => Ok(Shape::Polygon(self.polygon()?)),
            "MULTILINESTRING" => Ok(Shape::MultiLineString(
                self.list(|p| p.coord_list())?,
            )),
            "MULTIPOLYGON" => Ok(Shape::MultiPolygon(self.list(|p| p.polygon())?)),
            _ => Err(self.error(&format!("unsupported geometry type '{tag}'"))),
        }
    }

    fn list<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> Result<T, GeometryError>,
    ) -> Result<Vec<T>, GeometryError> {
        self.expect(b'(')?;
        let mut items = vec![item(self)?];
        while self.peek() == Some(b',') {
            self.pos += 1;
            items.push(item(self)?);
        }
        self.expect(b')')?;
        Ok(items)
    }

    fn polygon(&mut self) -> Result<Polygon, GeometryError> {
        let mut rings = self.list(|p| p.coord_list())?.into_iter();
        let exterior = rings.next().ok_or(GeometryError::Empty)?;
        Ok(Polygon {
            exterior,
            interiors: rings.collect(),
        })
    }

    fn coord_list(&mut self) -> Result<Vec<Coord>, GeometryError> {
        self.list(|p| p.coord())
    }

    fn coord(&mut self) -> Result<Coord, GeometryError> {
        let x = self.number()?;
        let y = self.number()?;
        // Drop any Z/M ordinates
        while matches!(
            self.peek(),
            Some(b) if b == b'-' || b == b'+' || b == b'.' || b.is_ascii_digit()
        ) {
            self.number()?;
        }
        Ok(Coord::new(x, y))
    }

    fn number(&mut self) -> Result<f64, GeometryError> {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.src.len() {
            let b = self.src[self.pos];
            if b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let token = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
        token.parse::<f64>().map_err(|_| {
            let mut err = self.error("expected number");
            if let GeometryError::Wkt { position, .. } = &mut err {
                *position = start;
            }
            err
        })
    }
}
