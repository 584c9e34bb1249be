//! Freehand stroke simplification (Ramer–Douglas–Peucker)

use crate::annotation::PathSegment;
use crate::geometry::Point;

/// Distance from `p` to the segment `a`-`b`
fn segment_distance(p: Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f32::EPSILON {
        return p.distance_to(&a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance_to(&Point::new(a.x + t * dx, a.y + t * dy))
}

/// Simplify a polyline, keeping both endpoints
///
/// Points closer than `tolerance` to the chord of their span are dropped.
/// A non-positive tolerance returns the input unchanged.
pub fn simplify_polyline(points: &[Point], tolerance: f32) -> Vec<Point> {
    if tolerance <= 0.0 || points.len() < 3 {
        return points.to_vec();
    }

    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    // Spans still to examine, as (first, last) point indices
    let mut spans = vec![(0usize, points.len() - 1)];
    while let Some((start, end)) = spans.pop() {
        if end <= start + 1 {
            continue;
        }
        let (mut farthest, mut max_distance) = (start, 0.0f32);
        for i in start + 1..end {
            let d = segment_distance(points[i], points[start], points[end]);
            if d > max_distance {
                farthest = i;
                max_distance = d;
            }
        }
        if max_distance > tolerance {
            keep[farthest] = true;
            spans.push((start, farthest));
            spans.push((farthest, end));
        }
    }

    points.iter().zip(keep).filter_map(|(p, k)| k.then_some(*p)).collect()
}

/// Simplify a freehand path made of one move followed by line segments
///
/// Paths containing curves or several sub-paths are returned unchanged.
pub fn simplify_path(path: &[PathSegment], tolerance: f32) -> Vec<PathSegment> {
    let mut points = Vec::with_capacity(path.len());
    for (i, segment) in path.iter().enumerate() {
        match (i, segment) {
            (0, PathSegment::MoveTo { to }) => points.push(*to),
            (i, PathSegment::LineTo { to }) if i > 0 => points.push(*to),
            _ => return path.to_vec(),
        }
    }
    let simplified = simplify_polyline(&points, tolerance);
    simplified
        .iter()
        .enumerate()
        .map(|(i, &to)| if i == 0 { PathSegment::MoveTo { to } } else { PathSegment::LineTo { to } })
        .collect()
}
