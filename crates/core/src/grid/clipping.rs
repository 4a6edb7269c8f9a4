//! Planar clipping against axis-aligned cell footprints
//!
//! Cell footprints are rectangles, so polygons are clipped with
//! Sutherland-Hodgman against the four half-planes and segments with
//! Liang-Barsky. Both are exact for convex clip regions, which is all we need.

use crate::core_types::{Coord, Polygon};

/// Axis-aligned rectangle in the projected XY frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: Coord,
    pub max: Coord,
}

impl Rect {
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            min: Coord::new(x_min, y_min),
            max: Coord::new(x_max, y_max),
        }
    }

    pub fn area(&self) -> f64 {
        (self.max.x - self.min.x) * (self.max.y - self.min.y)
    }

    /// Half-open containment `[min, max)` so a point on a shared edge
    /// belongs to exactly one cell
    pub fn contains_half_open(&self, p: &Coord) -> bool {
        p.x >= self.min.x && p.x < self.max.x && p.y >= self.min.y && p.y < self.max.y
    }
}

/// Drop the repeated closing vertex, if present
fn open_ring(ring: &[Coord]) -> &[Coord] {
    if ring.len() > 1 && ring.first() == ring.last() {
        &ring[..ring.len() - 1]
    } else {
        ring
    }
}

/// Unsigned shoelace area of a ring (open or closed)
pub fn ring_area(ring: &[Coord]) -> f64 {
    let ring = open_ring(ring);
    if ring.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        twice += a.x * b.y - b.x * a.y;
    }
    (twice * 0.5).abs()
}

/// Exterior area minus holes
pub fn polygon_area(polygon: &Polygon) -> f64 {
    let holes: f64 = polygon.interiors.iter().map(|r| ring_area(r)).sum();
    (ring_area(&polygon.exterior) - holes).max(0.0)
}

/// Total length of a polyline
pub fn line_length(line: &[Coord]) -> f64 {
    line.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
}

#[derive(Clone, Copy)]
enum Edge {
    Left,
    Right,
    Bottom,
    Top,
}

impl Edge {
    fn inside(self, p: &Coord, rect: &Rect) -> bool {
        match self {
            Edge::Left => p.x >= rect.min.x,
            Edge::Right => p.x <= rect.max.x,
            Edge::Bottom => p.y >= rect.min.y,
            Edge::Top => p.y <= rect.max.y,
        }
    }

    fn intersect(self, a: &Coord, b: &Coord, rect: &Rect) -> Coord {
        match self {
            Edge::Left | Edge::Right => {
                let x = if matches!(self, Edge::Left) { rect.min.x } else { rect.max.x };
                let t = (x - a.x) / (b.x - a.x);
                Coord::new(x, a.y + t * (b.y - a.y))
            }
            Edge::Bottom | Edge::Top => {
                let y = if matches!(self, Edge::Bottom) { rect.min.y } else { rect.max.y };
                let t = (y - a.y) / (b.y - a.y);
                Coord::new(a.x + t * (b.x - a.x), y)
            }
        }
    }
}

/// Clip a ring to a rectangle (Sutherland-Hodgman)
///
/// Returns the clipped ring, open, possibly empty.
pub fn clip_ring(ring: &[Coord], rect: &Rect) -> Vec<Coord> {
    let mut output: Vec<Coord> = open_ring(ring).to_vec();
    for edge in [Edge::Left, Edge::Right, Edge::Bottom, Edge::Top] {
        if output.is_empty() {
            break;
        }
        let input = std::mem::take(&mut output);
        let mut prev = input[input.len() - 1];
        for current in input {
            let cur_in = edge.inside(&current, rect);
            let prev_in = edge.inside(&prev, rect);
            if cur_in {
                if !prev_in {
                    output.push(edge.intersect(&prev, &current, rect));
                }
                output.push(current);
            } else if prev_in {
                output.push(edge.intersect(&prev, &current, rect));
            }
            prev = current;
        }
    }
    output
}

/// Area of `polygon ∩ rect`, holes subtracted
pub fn polygon_overlap_area(polygon: &Polygon, rect: &Rect) -> f64 {
    let exterior = ring_area(&clip_ring(&polygon.exterior, rect));
    if exterior == 0.0 {
        return 0.0;
    }
    let holes: f64 = polygon
        .interiors
        .iter()
        .map(|hole| ring_area(&clip_ring(hole, rect)))
        .sum();
    (exterior - holes).max(0.0)
}

/// Clip segment `a-b` to a rectangle (Liang-Barsky)
pub fn clip_segment(a: &Coord, b: &Coord, rect: &Rect) -> Option<(Coord, Coord)> {
    let d = *b - *a;
    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;
    let checks = [
        (-d.x, a.x - rect.min.x),
        (d.x, rect.max.x - a.x),
        (-d.y, a.y - rect.min.y),
        (d.y, rect.max.y - a.y),
    ];
    for (p, q) in checks {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((*a + d * t0, *a + d * t1))
}

/// Length of the polyline lying inside `rect`
pub fn line_overlap_length(line: &[Coord], rect: &Rect) -> f64 {
    line.windows(2)
        .filter_map(|w| clip_segment(&w[0], &w[1], rect))
        .map(|(a, b)| (b - a).norm())
        .sum()
}

/// Length of `[a_min, a_max] ∩ [b_min, b_max]`
pub fn interval_overlap(a_min: f64, a_max: f64, b_min: f64, b_max: f64) -> f64 {
    (a_max.min(b_max) - a_min.max(b_min)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(x0: f64, y0: f64, size: f64) -> Vec<Coord> {
        vec![
            Coord::new(x0, y0),
            Coord::new(x0 + size, y0),
            Coord::new(x0 + size, y0 + size),
            Coord::new(x0, y0 + size),
        ]
    }

    #[test]
    fn test_ring_area_open_and_closed() {
        let mut ring = square(0.0, 0.0, 2.0);
        assert_relative_eq!(ring_area(&ring), 4.0);
        let first = ring[0];
        ring.push(first);
        assert_relative_eq!(ring_area(&ring), 4.0);
        ring.reverse();
        assert_relative_eq!(ring_area(&ring), 4.0);
    }

    #[test]
    fn test_polygon_area_with_hole() {
        let polygon = Polygon {
            exterior: square(0.0, 0.0, 10.0),
            interiors: vec![square(2.0, 2.0, 2.0)],
        };
        assert_relative_eq!(polygon_area(&polygon), 96.0);
    }

    #[test]
    fn test_clip_partial_overlap() {
        let polygon = Polygon::new(square(0.0, 0.0, 10.0));
        let rect = Rect::new(5.0, 5.0, 15.0, 15.0);
        assert_relative_eq!(polygon_overlap_area(&polygon, &rect), 25.0);
    }

    #[test]
    fn test_clip_triangle() {
        let triangle = Polygon::new(vec![
            Coord::new(0.0, 0.0),
            Coord::new(4.0, 0.0),
            Coord::new(0.0, 4.0),
        ]);
        // Left half of the triangle: x in [0, 2]
        let rect = Rect::new(0.0, 0.0, 2.0, 4.0);
        assert_relative_eq!(polygon_overlap_area(&triangle, &rect), 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_clip_disjoint() {
        let polygon = Polygon::new(square(0.0, 0.0, 1.0));
        assert_eq!(polygon_overlap_area(&polygon, &Rect::new(5.0, 5.0, 6.0, 6.0)), 0.0);
    }

    #[test]
    fn test_hole_overlap_subtracted() {
        let polygon = Polygon {
            exterior: square(0.0, 0.0, 10.0),
            interiors: vec![square(0.0, 0.0, 5.0)],
        };
        let rect = Rect::new(0.0, 0.0, 5.0, 10.0);
        assert_relative_eq!(polygon_overlap_area(&polygon, &rect), 25.0);
    }

    #[test]
    fn test_segment_clip() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        let (a, b) = clip_segment(&Coord::new(-5.0, 5.0), &Coord::new(15.0, 5.0), &rect).unwrap();
        assert_relative_eq!(a.x, 0.0);
        assert_relative_eq!(b.x, 10.0);
        assert!(clip_segment(&Coord::new(-5.0, 20.0), &Coord::new(15.0, 20.0), &rect).is_none());
    }

    #[test]
    fn test_line_overlap_diagonal() {
        let rect = Rect::new(0.0, 0.0, 1.0, 1.0);
        let line = vec![Coord::new(-1.0, -1.0), Coord::new(2.0, 2.0)];
        assert_relative_eq!(line_overlap_length(&line, &rect), 2f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(line_length(&line), 3.0 * 2f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_interval_overlap() {
        assert_eq!(interval_overlap(0.0, 10.0, 5.0, 20.0), 5.0);
        assert_eq!(interval_overlap(0.0, 1.0, 2.0, 3.0), 0.0);
    }

    #[test]
    fn test_half_open_contains() {
        let rect = Rect::new(0.0, 0.0, 1.0, 1.0);
        assert!(rect.contains_half_open(&Coord::new(0.0, 0.0)));
        assert!(!rect.contains_half_open(&Coord::new(1.0, 0.5)));
    }
}
