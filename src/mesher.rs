use std::collections::{HashMap, HashSet, VecDeque};

use indicatif::ProgressBar;
use log::{debug, info};

use crate::{
    datatypes::{BoundaryEdge, Element, Mesh, Vertex},
    error::{PappusError, Result},
    geometry::BoundaryCurve,
};

/// Allowed gap between consecutive curves, relative to the contour length
pub const CONTOUR_TOLERANCE: f64 = 1e-9;

/// Interior points keep this fraction of the lattice spacing away from the
/// boundary
const BOUNDARY_CLEARANCE: f64 = 0.5;

/// Relative band around a circumcircle treated as outside it
const CIRCUMCIRCLE_MARGIN: f64 = 1e-10;

/// Twice the signed area of the triangle `abc`; positive when counter-clockwise
fn orient(a: Vertex, b: Vertex, c: Vertex) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn on_segment(a: Vertex, b: Vertex, p: Vertex) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// True when the closed segments `ab` and `cd` share at least one point
fn segments_touch(a: Vertex, b: Vertex, c: Vertex, d: Vertex) -> bool {
    let o1 = orient(a, b, c);
    let o2 = orient(a, b, d);
    let o3 = orient(c, d, a);
    let o4 = orient(c, d, b);

    if o1 * o2 < 0.0 && o3 * o4 < 0.0 {
        return true;
    }

    (o1 == 0.0 && on_segment(a, b, c))
        || (o2 == 0.0 && on_segment(a, b, d))
        || (o3 == 0.0 && on_segment(c, d, a))
        || (o4 == 0.0 && on_segment(c, d, b))
}

/// True when the open segments `ab` and `cd` cross at a single interior point
fn segments_cross(a: Vertex, b: Vertex, c: Vertex, d: Vertex) -> bool {
    orient(a, b, c) * orient(a, b, d) < 0.0 && orient(c, d, a) * orient(c, d, b) < 0.0
}

fn distance_to_segment(a: Vertex, b: Vertex, p: Vertex) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return a.distance(&p);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / length_sq).clamp(0.0, 1.0);
    Vertex::new(a.x + t * dx, a.y + t * dy).distance(&p)
}

fn polygon_area(points: &[Vertex]) -> f64 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
        / 2.0
}

/// Even-odd ray casting test
fn polygon_contains(points: &[Vertex], p: Vertex) -> bool {
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let (a, b) = (points[i], points[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Number of segments a curve is cut into
///
/// # Arguments
/// * `curve` - The boundary curve
/// * `density` - Segments per unit of characteristic length
pub fn segment_count(curve: &BoundaryCurve, density: f64) -> usize {
    ((density * curve.characteristic_length).round() as usize).max(1)
}

/// Samples the closed contour into a polygon. Returns the polygon vertices in
/// order and, for each segment `i -> i + 1`, the label of its curve.
///
/// # Arguments
/// * `curves` - The ordered boundary curves
/// * `density` - Segments per unit of characteristic length
fn discretize_boundary(curves: &[BoundaryCurve], density: f64) -> Result<(Vec<Vertex>, Vec<u32>)> {
    if curves.len() < 2 {
        return Err(PappusError::Mesher(
            "a closed contour needs at least two curves".to_owned(),
        ));
    }

    let perimeter: f64 = curves.iter().map(|c| c.length()).sum();
    let tolerance = CONTOUR_TOLERANCE * perimeter.max(1.0);

    let mut points: Vec<Vertex> = Vec::new();
    let mut labels: Vec<u32> = Vec::new();

    for (i, curve) in curves.iter().enumerate() {
        let length = curve.length();
        if !(length > 0.0) {
            return Err(PappusError::Mesher(format!(
                "boundary curve {} has no length",
                curve.label
            )));
        }

        let next = &curves[(i + 1) % curves.len()];
        let gap = curve.end().distance(&next.start());
        if gap > tolerance {
            return Err(PappusError::Mesher(format!(
                "gap of {gap:.3e} between boundary curves {} and {}",
                curve.label, next.label
            )));
        }

        let segments = segment_count(curve, density);
        for k in 0..segments {
            points.push(curve.point(k as f64 / segments as f64));
            labels.push(curve.label);
        }
    }

    Ok((points, labels))
}

/// Rejects contours that are clockwise or self-intersecting
fn check_contour(points: &[Vertex]) -> Result<()> {
    let n = points.len();
    if n < 3 {
        return Err(PappusError::Mesher(format!(
            "contour has only {n} vertices"
        )));
    }
    if polygon_area(points) <= 0.0 {
        return Err(PappusError::Mesher(
            "contour is not counter-clockwise".to_owned(),
        ));
    }

    for i in 0..n {
        let (a, b) = (points[i], points[(i + 1) % n]);
        if a == b {
            return Err(PappusError::Mesher(format!(
                "repeated contour vertex at ({}, {})",
                a.x, a.y
            )));
        }
        for j in (i + 2)..n {
            // the last segment closes onto the first
            if i == 0 && j == n - 1 {
                continue;
            }
            let (c, d) = (points[j], points[(j + 1) % n]);
            if segments_touch(a, b, c, d) {
                return Err(PappusError::Mesher(format!(
                    "contour intersects itself near ({:.4}, {:.4})",
                    a.x, a.y
                )));
            }
        }
    }

    Ok(())
}

/// Equilateral lattice clipped to the interior of the contour
///
/// # Arguments
/// * `boundary` - The contour polygon
/// * `spacing` - Lattice spacing
fn interior_points(boundary: &[Vertex], spacing: f64) -> Vec<Vertex> {
    let x_min = boundary.iter().map(|v| v.x).fold(f64::INFINITY, f64::min);
    let x_max = boundary.iter().map(|v| v.x).fold(f64::NEG_INFINITY, f64::max);
    let y_min = boundary.iter().map(|v| v.y).fold(f64::INFINITY, f64::min);
    let y_max = boundary.iter().map(|v| v.y).fold(f64::NEG_INFINITY, f64::max);

    let row_height = spacing * f64::sqrt(3.0) / 2.0;
    let rows = ((y_max - y_min) / row_height).ceil() as usize;
    let cols = ((x_max - x_min) / spacing).ceil() as usize;
    let clearance = BOUNDARY_CLEARANCE * spacing;

    // small deterministic offsets break the exact cocircularity of the lattice
    let jitter = |k: usize| ((k.wrapping_mul(2654435761) % 1000) as f64 / 1000.0 - 0.5) * 1e-3 * spacing;

    let mut points: Vec<Vertex> = Vec::new();
    for j in 0..=rows {
        let shift = if j % 2 == 1 { 0.5 * spacing } else { 0.0 };
        for i in 0..=cols {
            let k = j * (cols + 1) + i;
            let p = Vertex::new(
                x_min + shift + i as f64 * spacing + jitter(2 * k),
                y_min + j as f64 * row_height + jitter(2 * k + 1),
            );

            if !polygon_contains(boundary, p) {
                continue;
            }
            let n = boundary.len();
            let near_boundary = (0..n)
                .any(|s| distance_to_segment(boundary[s], boundary[(s + 1) % n], p) < clearance);
            if !near_boundary {
                points.push(p);
            }
        }
    }

    points
}

#[derive(Debug, Clone, Copy)]
struct Circumscribed {
    nodes: [usize; 3],
    center: Vertex,
    radius_sq: f64,
}

impl Circumscribed {
    fn new(points: &[Vertex], nodes: [usize; 3]) -> Circumscribed {
        let [a, b, c] = nodes.map(|i| points[i]);
        let (bx, by) = (b.x - a.x, b.y - a.y);
        let (cx, cy) = (c.x - a.x, c.y - a.y);
        let b_sq = bx * bx + by * by;
        let c_sq = cx * cx + cy * cy;
        let d = 2.0 * (bx * cy - by * cx);

        let ux = (cy * b_sq - by * c_sq) / d;
        let uy = (bx * c_sq - cx * b_sq) / d;

        Circumscribed {
            nodes,
            center: Vertex::new(a.x + ux, a.y + uy),
            radius_sq: ux * ux + uy * uy,
        }
    }

    /// Strictly inside the circumcircle. Points within a relative margin of
    /// the circle count as outside, so cocircular samples of an arc never
    /// pull a triangle into the cavity on rounding noise.
    fn contains(&self, p: Vertex) -> bool {
        let (dx, dy) = (p.x - self.center.x, p.y - self.center.y);
        dx * dx + dy * dy < self.radius_sq * (1.0 - CIRCUMCIRCLE_MARGIN)
    }
}

/// Shrinks the cavity of an insertion until it is connected to `seed` and
/// every edge on its rim sees `p` on the inner side, so the new fan never
/// overlaps the triangles left in place.
///
/// # Arguments
/// * `points` - All points, including the enclosing triangle
/// * `triangles` - The current triangulation
/// * `bad` - Triangles whose circumcircle contains `p`; updated in place
/// * `seed` - The triangle holding `p`
/// * `p` - The vertex being inserted
fn repair_cavity(
    points: &[Vertex],
    triangles: &[Circumscribed],
    bad: &mut [bool],
    seed: usize,
    p: Vertex,
) -> Result<()> {
    let max_passes = triangles.len() + 4;

    for _ in 0..max_passes {
        let owners: HashMap<(usize, usize), usize> = triangles
            .iter()
            .enumerate()
            .filter(|(t, _)| bad[*t])
            .flat_map(|(t, tri)| (0..3).map(move |k| ((tri.nodes[k], tri.nodes[(k + 1) % 3]), t)))
            .collect();

        let mut reached = vec![false; triangles.len()];
        let mut component = vec![seed];
        reached[seed] = true;
        let mut next = 0;
        while next < component.len() {
            let nodes = triangles[component[next]].nodes;
            next += 1;
            for k in 0..3 {
                if let Some(&neighbor) = owners.get(&(nodes[(k + 1) % 3], nodes[k])) {
                    if !reached[neighbor] {
                        reached[neighbor] = true;
                        component.push(neighbor);
                    }
                }
            }
        }
        for (t, flag) in bad.iter_mut().enumerate() {
            *flag = *flag && reached[t];
        }

        let mut changed = false;
        for &t in &component {
            let nodes = triangles[t].nodes;
            for k in 0..3 {
                let (u, v) = (nodes[k], nodes[(k + 1) % 3]);
                let interior = owners.get(&(v, u)).is_some_and(|n| reached[*n] && bad[*n]);
                if interior || orient(points[u], points[v], p) > 0.0 {
                    continue;
                }

                if t == seed {
                    // the vertex sits on this edge; the triangle across joins
                    let across = triangles.iter().position(|tri| {
                        (0..3).any(|j| tri.nodes[j] == v && tri.nodes[(j + 1) % 3] == u)
                    });
                    match across {
                        Some(n) if !bad[n] => bad[n] = true,
                        _ => {
                            return Err(PappusError::Mesher(format!(
                                "degenerate triangle while inserting vertex ({}, {})",
                                p.x, p.y
                            )))
                        }
                    }
                } else {
                    bad[t] = false;
                }
                changed = true;
                break;
            }
        }

        if !changed {
            return Ok(());
        }
    }

    Err(PappusError::Mesher(format!(
        "cavity of vertex ({}, {}) did not settle",
        p.x, p.y
    )))
}

/// Bowyer-Watson Delaunay triangulation. The three vertices of the
/// enclosing triangle are appended after `points` and stay in the result.
///
/// # Returns
/// The extended point list and counter-clockwise triangles
fn delaunay(points: &[Vertex]) -> Result<(Vec<Vertex>, Vec<[usize; 3]>)> {
    let n = points.len();
    let x_min = points.iter().map(|v| v.x).fold(f64::INFINITY, f64::min);
    let x_max = points.iter().map(|v| v.x).fold(f64::NEG_INFINITY, f64::max);
    let y_min = points.iter().map(|v| v.y).fold(f64::INFINITY, f64::min);
    let y_max = points.iter().map(|v| v.y).fold(f64::NEG_INFINITY, f64::max);
    let size = (x_max - x_min).max(y_max - y_min).max(f64::EPSILON);
    let (cx, cy) = ((x_min + x_max) / 2.0, (y_min + y_max) / 2.0);

    let mut all_points = points.to_vec();
    all_points.push(Vertex::new(cx - 20.0 * size, cy - 10.0 * size));
    all_points.push(Vertex::new(cx + 20.0 * size, cy - 10.0 * size));
    all_points.push(Vertex::new(cx, cy + 20.0 * size));

    let mut triangles = vec![Circumscribed::new(&all_points, [n, n + 1, n + 2])];

    let bar = ProgressBar::new(n as u64);
    for p_idx in 0..n {
        bar.inc(1);
        let p = all_points[p_idx];

        let mut bad: Vec<bool> = triangles
            .iter()
            .map(|tri| tri.contains(p))
            .collect();

        // the triangle holding the vertex always belongs to the cavity
        let seed = triangles
            .iter()
            .position(|tri| {
                let [a, b, c] = tri.nodes.map(|i| all_points[i]);
                orient(a, b, p) >= 0.0 && orient(b, c, p) >= 0.0 && orient(c, a, p) >= 0.0
            })
            .ok_or_else(|| {
                PappusError::Mesher(format!("vertex ({}, {}) could not be located", p.x, p.y))
            })?;
        bad[seed] = true;
        repair_cavity(&all_points, &triangles, &mut bad, seed, p)?;

        let cavity_edges: HashSet<(usize, usize)> = triangles
            .iter()
            .zip(&bad)
            .filter(|(_, is_bad)| **is_bad)
            .flat_map(|(tri, _)| (0..3).map(move |k| (tri.nodes[k], tri.nodes[(k + 1) % 3])))
            .collect();

        let mut created: Vec<Circumscribed> = Vec::new();
        for (tri, _) in triangles.iter().zip(&bad).filter(|(_, is_bad)| **is_bad) {
            for k in 0..3 {
                let (u, v) = (tri.nodes[k], tri.nodes[(k + 1) % 3]);
                if cavity_edges.contains(&(v, u)) {
                    continue;
                }
                if orient(all_points[u], all_points[v], p) <= 0.0 {
                    return Err(PappusError::Mesher(format!(
                        "degenerate triangle while inserting vertex ({}, {})",
                        p.x, p.y
                    )));
                }
                created.push(Circumscribed::new(&all_points, [u, v, p_idx]));
            }
        }

        let mut idx = 0;
        triangles.retain(|_| {
            let keep = !bad[idx];
            idx += 1;
            keep
        });
        triangles.extend(created);
    }
    bar.finish_and_clear();

    Ok((all_points, triangles.into_iter().map(|t| t.nodes).collect()))
}

/// Directed edge to the triangle holding it
fn build_edge_map(triangles: &[[usize; 3]]) -> HashMap<(usize, usize), usize> {
    let mut edge_map = HashMap::with_capacity(3 * triangles.len());
    for (t, nodes) in triangles.iter().enumerate() {
        for k in 0..3 {
            edge_map.insert((nodes[k], nodes[(k + 1) % 3]), t);
        }
    }
    edge_map
}

/// Rotates a triangle so that it starts with `first`
fn rotate_to(nodes: [usize; 3], first: usize) -> [usize; 3] {
    match nodes.iter().position(|n| *n == first) {
        Some(1) => [nodes[1], nodes[2], nodes[0]],
        Some(2) => [nodes[2], nodes[0], nodes[1]],
        _ => nodes,
    }
}

/// Forces the segment `a -> b` into the triangulation by flipping the edges
/// that cross it.
fn recover_segment(
    points: &[Vertex],
    triangles: &mut [[usize; 3]],
    edge_map: &mut HashMap<(usize, usize), usize>,
    (a, b): (usize, usize),
) -> Result<()> {
    if edge_map.contains_key(&(a, b)) || edge_map.contains_key(&(b, a)) {
        return Ok(());
    }

    let (pa, pb) = (points[a], points[b]);
    let mut crossing: VecDeque<(usize, usize)> = VecDeque::new();
    for (&(u, v), _) in edge_map.iter() {
        if u > v || !edge_map.contains_key(&(v, u)) {
            continue;
        }
        for w in [u, v] {
            if w != a && w != b && orient(pa, pb, points[w]) == 0.0 && on_segment(pa, pb, points[w]) {
                return Err(PappusError::Mesher(format!(
                    "vertex ({}, {}) lies on a boundary segment",
                    points[w].x, points[w].y
                )));
            }
        }
        if segments_cross(pa, pb, points[u], points[v]) {
            crossing.push_back((u, v));
        }
    }
    // hash order is arbitrary; flips must not depend on it
    crossing.make_contiguous().sort_unstable();

    let max_attempts = 100 * (crossing.len() + 1) * (crossing.len() + 1);
    let mut attempts = 0;

    while let Some((u, v)) = crossing.pop_front() {
        attempts += 1;
        if attempts > max_attempts {
            return Err(PappusError::Mesher(format!(
                "unable to recover boundary segment ({:.4}, {:.4}) -> ({:.4}, {:.4})",
                pa.x, pa.y, pb.x, pb.y
            )));
        }

        let (Some(&t1), Some(&t2)) = (edge_map.get(&(u, v)), edge_map.get(&(v, u))) else {
            return Err(PappusError::Mesher(
                "crossing edge vanished during boundary recovery".to_owned(),
            ));
        };
        let w1 = rotate_to(triangles[t1], u)[2];
        let w2 = rotate_to(triangles[t2], v)[2];
        let (pu, pv, pw1, pw2) = (points[u], points[v], points[w1], points[w2]);

        // only a strictly convex quadrilateral can be flipped
        if orient(pu, pw2, pw1) <= 0.0 || orient(pw2, pv, pw1) <= 0.0 {
            crossing.push_back((u, v));
            continue;
        }

        triangles[t1] = [w1, u, w2];
        triangles[t2] = [w2, v, w1];
        edge_map.remove(&(u, v));
        edge_map.remove(&(v, u));
        edge_map.insert((u, w2), t1);
        edge_map.insert((w2, w1), t1);
        edge_map.insert((v, w1), t2);
        edge_map.insert((w1, w2), t2);

        if segments_cross(pa, pb, pw1, pw2) {
            crossing.push_back((w1.min(w2), w1.max(w2)));
        }
    }

    if edge_map.contains_key(&(a, b)) {
        Ok(())
    } else {
        Err(PappusError::Mesher(format!(
            "boundary segment ({:.4}, {:.4}) -> ({:.4}, {:.4}) is missing from the mesh",
            pa.x, pa.y, pb.x, pb.y
        )))
    }
}

fn undirected(u: usize, v: usize) -> (usize, usize) {
    (u.min(v), u.max(v))
}

/// Triangles reachable from the inner side of the contour without crossing it
fn interior_triangles(
    triangles: &[[usize; 3]],
    edge_map: &HashMap<(usize, usize), usize>,
    segments: &[(usize, usize)],
) -> Result<Vec<bool>> {
    let walls: HashSet<(usize, usize)> = segments.iter().map(|&(u, v)| undirected(u, v)).collect();
    let mut inside = vec![false; triangles.len()];
    let mut queue: VecDeque<usize> = VecDeque::new();

    for &(a, b) in segments {
        match edge_map.get(&(a, b)) {
            Some(&t) => queue.push_back(t),
            None => {
                return Err(PappusError::Mesher(
                    "boundary segment has no interior triangle".to_owned(),
                ))
            }
        }
    }

    while let Some(t) = queue.pop_front() {
        if inside[t] {
            continue;
        }
        inside[t] = true;
        let nodes = triangles[t];
        for k in 0..3 {
            let (u, v) = (nodes[k], nodes[(k + 1) % 3]);
            if walls.contains(&undirected(u, v)) {
                continue;
            }
            if let Some(&neighbor) = edge_map.get(&(v, u)) {
                if !inside[neighbor] {
                    queue.push_back(neighbor);
                }
            }
        }
    }

    Ok(inside)
}

fn min_angle_degrees(mesh: &Mesh) -> f64 {
    mesh.elements
        .iter()
        .flat_map(|element| {
            let p = element.nodes.map(|i| mesh.vertices[i]);
            (0..3).map(move |k| {
                let (a, b, c) = (p[k], p[(k + 1) % 3], p[(k + 2) % 3]);
                let (ux, uy) = (b.x - a.x, b.y - a.y);
                let (vx, vy) = (c.x - a.x, c.y - a.y);
                f64::atan2((ux * vy - uy * vx).abs(), ux * vx + uy * vy).to_degrees()
            })
        })
        .fold(180.0, f64::min)
}

/// Checks that the boundary edges are exactly the edges used by one triangle
/// and that no triangle is degenerate.
fn check_conformity(mesh: &Mesh, contour_area: f64) -> Result<()> {
    let tolerance = 1e-12 * contour_area;
    for element in &mesh.elements {
        let area = mesh.element_area(element);
        if area <= tolerance {
            return Err(PappusError::Mesher(format!(
                "degenerate element {:?} with area {area:.3e}",
                element.nodes
            )));
        }
    }

    let mut edge_uses: HashMap<(usize, usize), usize> = HashMap::new();
    for element in &mesh.elements {
        for k in 0..3 {
            *edge_uses
                .entry(undirected(element.nodes[k], element.nodes[(k + 1) % 3]))
                .or_insert(0) += 1;
        }
    }

    let boundary: HashSet<(usize, usize)> = mesh
        .boundary_edges
        .iter()
        .map(|e| undirected(e.nodes[0], e.nodes[1]))
        .collect();

    for (edge, uses) in &edge_uses {
        let expected = if boundary.contains(edge) { 1 } else { 2 };
        if *uses != expected {
            return Err(PappusError::Mesher(format!(
                "edge {edge:?} is shared by {uses} elements, expected {expected}"
            )));
        }
    }
    if let Some(missing) = boundary.iter().find(|e| !edge_uses.contains_key(e)) {
        return Err(PappusError::Mesher(format!(
            "boundary edge {missing:?} is not an element edge"
        )));
    }

    let mesh_area = mesh.total_area();
    if (mesh_area - contour_area).abs() > 1e-9 * contour_area {
        return Err(PappusError::Mesher(format!(
            "mesh area {mesh_area} differs from contour area {contour_area}"
        )));
    }

    Ok(())
}

/// Triangulates the inside of a closed counter-clockwise polygon. Segment
/// `i` runs from vertex `i` to vertex `i + 1` and carries `labels[i]`.
///
/// # Arguments
/// * `boundary` - The contour polygon
/// * `labels` - One curve label per contour segment
/// * `spacing` - Target spacing of the interior vertices
pub fn triangulate(boundary: &[Vertex], labels: &[u32], spacing: f64) -> Result<Mesh> {
    check_contour(boundary)?;
    if labels.len() != boundary.len() {
        return Err(PappusError::Mesher(format!(
            "{} labels for {} contour segments",
            labels.len(),
            boundary.len()
        )));
    }

    let nb = boundary.len();
    let mut points = boundary.to_vec();
    points.extend(interior_points(boundary, spacing));
    debug!(
        "mesher: {} boundary and {} interior vertices",
        nb,
        points.len() - nb
    );

    let (all_points, mut triangles) = delaunay(&points)?;
    let mut edge_map = build_edge_map(&triangles);

    let segments: Vec<(usize, usize)> = (0..nb).map(|i| (i, (i + 1) % nb)).collect();
    for segment in &segments {
        recover_segment(&all_points, &mut triangles, &mut edge_map, *segment)?;
    }

    let inside = interior_triangles(&triangles, &edge_map, &segments)?;

    // compact away the enclosing triangle and any unused vertex
    let mut kept: Vec<[usize; 3]> = Vec::new();
    for (nodes, is_inside) in triangles.iter().zip(&inside) {
        if !is_inside {
            continue;
        }
        if nodes.iter().any(|n| *n >= points.len()) {
            return Err(PappusError::Mesher(
                "contour is not closed; interior leaks outside".to_owned(),
            ));
        }
        kept.push(*nodes);
    }

    let mut used = vec![false; points.len()];
    for nodes in &kept {
        for n in nodes {
            used[*n] = true;
        }
    }
    if let Some(unused) = used[..nb].iter().position(|u| !u) {
        return Err(PappusError::Mesher(format!(
            "boundary vertex ({}, {}) is not part of any element",
            boundary[unused].x, boundary[unused].y
        )));
    }

    let mut new_index = vec![usize::MAX; points.len()];
    let mut vertices: Vec<Vertex> = Vec::with_capacity(points.len());
    for (i, point) in points.iter().enumerate() {
        if used[i] {
            new_index[i] = vertices.len();
            vertices.push(*point);
        }
    }

    let mesh = Mesh {
        vertices,
        elements: kept
            .iter()
            .map(|nodes| Element {
                nodes: nodes.map(|n| new_index[n]),
            })
            .collect(),
        boundary_edges: segments
            .iter()
            .zip(labels)
            .map(|(&(a, b), &label)| BoundaryEdge {
                nodes: [new_index[a], new_index[b]],
                label,
            })
            .collect(),
    };

    check_conformity(&mesh, polygon_area(boundary))?;

    Ok(mesh)
}

/// Runs the mesher
///
/// # Arguments
/// * `curves` - The closed, counter-clockwise sequence of boundary curves
/// * `density` - Segments per unit of characteristic length
pub fn run(curves: &[BoundaryCurve], density: f64) -> Result<Mesh> {
    if !(density >= 1.0) {
        return Err(PappusError::Mesher(format!(
            "mesh density must be at least 1, got {density}"
        )));
    }

    let (boundary, labels) = discretize_boundary(curves, density)?;
    info!("meshing contour with {} boundary segments...", boundary.len());

    let mesh = triangulate(&boundary, &labels, 1.0 / density)?;

    info!(
        "loaded {} vertices and {} elements (minimum angle {:.1} degrees)",
        mesh.vertices.len(),
        mesh.elements.len(),
        min_angle_degrees(&mesh)
    );

    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geometry::{BoundaryGeometry, LABEL_VASCULATURE_LEFT, LABEL_VASCULATURE_RIGHT},
        parameters::ParameterSet,
    };
    use approx::assert_relative_eq;

    fn square(n: usize) -> (Vec<Vertex>, Vec<u32>) {
        let mut points = Vec::new();
        let mut labels = Vec::new();
        let corners = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        for side in 0..4 {
            let (x0, y0) = corners[side];
            let (x1, y1) = corners[(side + 1) % 4];
            for k in 0..n {
                let t = k as f64 / n as f64;
                points.push(Vertex::new(x0 + t * (x1 - x0), y0 + t * (y1 - y0)));
                labels.push(side as u32 + 1);
            }
        }
        (points, labels)
    }

    #[test]
    fn test_predicates() {
        let a = Vertex::new(0.0, 0.0);
        let b = Vertex::new(1.0, 0.0);
        let c = Vertex::new(0.0, 1.0);
        assert!(orient(a, b, c) > 0.0);

        let points = [a, b, c, Vertex::new(1.0, 1.0)];
        let circle = Circumscribed::new(&points, [0, 1, 2]);
        assert!(circle.contains(Vertex::new(0.4, 0.4)));
        assert!(!circle.contains(Vertex::new(2.0, 2.0)));
        // cocircular with the triangle
        assert!(!circle.contains(points[3]));

        assert!(segments_cross(a, Vertex::new(1.0, 1.0), b, c));
        assert!(!segments_cross(a, b, c, Vertex::new(1.0, 1.0)));
        assert!(segments_touch(a, b, Vertex::new(0.5, 0.0), Vertex::new(0.5, 1.0)));
    }

    #[test]
    fn test_square_is_fully_covered() {
        let (points, labels) = square(8);
        let mesh = triangulate(&points, &labels, 1.0 / 8.0).unwrap();

        assert_relative_eq!(mesh.total_area(), 1.0, epsilon = 1e-12);
        assert_eq!(mesh.boundary_edges.len(), 32);
        assert!(mesh.vertices.len() > 32);
        assert!(mesh.elements.iter().all(|e| mesh.element_area(e) > 0.0));
        assert!(min_angle_degrees(&mesh) > 5.0);
    }

    #[test]
    fn test_non_convex_contour() {
        // an L shape: the reflex corner must not be filled in
        let points = vec![
            Vertex::new(0.0, 0.0),
            Vertex::new(2.0, 0.0),
            Vertex::new(2.0, 1.0),
            Vertex::new(1.0, 1.0),
            Vertex::new(1.0, 2.0),
            Vertex::new(0.0, 2.0),
        ];
        let labels = vec![1; points.len()];
        let mesh = triangulate(&points, &labels, 0.25).unwrap();
        assert_relative_eq!(mesh.total_area(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_clockwise_contour_is_rejected() {
        let (mut points, labels) = square(4);
        points.reverse();
        assert!(matches!(
            triangulate(&points, &labels, 0.25),
            Err(PappusError::Mesher(_))
        ));
    }

    #[test]
    fn test_self_intersecting_contour_is_rejected() {
        let points = vec![
            Vertex::new(0.0, 0.0),
            Vertex::new(3.0, 0.0),
            Vertex::new(3.0, 2.0),
            Vertex::new(1.0, -1.0),
            Vertex::new(0.0, 2.0),
        ];
        let labels = vec![1; points.len()];
        let err = triangulate(&points, &labels, 0.25).unwrap_err();
        assert!(format!("{err}").contains("intersects itself"));
    }

    #[test]
    fn test_gap_between_curves_is_rejected() {
        let geometry = BoundaryGeometry::new(&ParameterSet::default()).unwrap();
        let mut curves = geometry.curves();
        curves.remove(3);
        let err = run(&curves, 10.0).unwrap_err();
        assert!(matches!(err, PappusError::Mesher(_)));
        assert!(format!("{err}").contains("gap"));
    }

    #[test]
    fn test_segment_count_follows_density() {
        let geometry = BoundaryGeometry::new(&ParameterSet::default()).unwrap();
        let curves = geometry.curves();
        // right edge, characteristic length ly = 1.2
        assert_eq!(segment_count(&curves[11], 40.0), 48);
        assert_eq!(segment_count(&curves[0], 1.0), 1);
    }

    fn circle(n: usize) -> Vec<Vertex> {
        (0..n)
            .map(|k| {
                let t = 2.0 * std::f64::consts::PI * k as f64 / n as f64;
                Vertex::new(0.3 + t.cos(), -1.7 + t.sin())
            })
            .collect()
    }

    #[test]
    fn test_finely_sampled_circle() {
        // every boundary vertex is cocircular with every other
        let points = circle(160);
        let labels = vec![1; points.len()];
        let mesh = triangulate(&points, &labels, 0.05).unwrap();

        assert_relative_eq!(mesh.total_area(), polygon_area(&points), max_relative = 1e-9);
        assert_eq!(mesh.boundary_edges.len(), 160);
        assert!(mesh.elements.iter().all(|e| mesh.element_area(e) > 0.0));
    }

    #[test]
    fn test_concentric_arcs() {
        // an annular sector bounded by two sampled arcs about one centre
        let (inner, outer, n) = (1.2, 1.6, 48);
        let mut points: Vec<Vertex> = (0..=n)
            .map(|k| {
                let t = std::f64::consts::PI * k as f64 / n as f64;
                Vertex::new(outer * t.cos(), outer * t.sin())
            })
            .collect();
        points.extend((0..=n).map(|k| {
            let t = std::f64::consts::PI * (n - k) as f64 / n as f64;
            Vertex::new(inner * t.cos(), inner * t.sin())
        }));
        let labels = vec![1; points.len()];

        let mesh = triangulate(&points, &labels, 0.04).unwrap();
        assert_relative_eq!(mesh.total_area(), polygon_area(&points), max_relative = 1e-9);
    }

    #[test]
    fn test_actuator_mesh_at_default_density() {
        let params = ParameterSet::default();
        let geometry = BoundaryGeometry::new(&params).unwrap();
        let curves = geometry.curves();
        let mesh = run(&curves, params.mesh_density).unwrap();

        let (boundary, _) = discretize_boundary(&curves, params.mesh_density).unwrap();
        assert_eq!(mesh.boundary_edges.len(), boundary.len());
        assert_relative_eq!(
            mesh.total_area(),
            polygon_area(&boundary),
            max_relative = 1e-9
        );
        assert!(mesh.elements.iter().all(|e| mesh.element_area(e) > 0.0));
    }

    #[test]
    fn test_actuator_mesh_at_every_density() {
        let geometry = BoundaryGeometry::new(&ParameterSet::default()).unwrap();
        let curves = geometry.curves();
        for density in [4.0, 6.0, 10.0, 15.0, 20.0, 25.0] {
            let mesh = run(&curves, density)
                .unwrap_or_else(|err| panic!("density {density}: {err}"));
            assert!(mesh.elements.iter().all(|e| mesh.element_area(e) > 0.0));
        }
    }

    #[test]
    fn test_actuator_mesh_conforms_to_contour() {
        let params = ParameterSet::default();
        let geometry = BoundaryGeometry::new(&params).unwrap();
        let curves = geometry.curves();
        let mesh = run(&curves, 12.0).unwrap();

        let expected: usize = curves.iter().map(|c| segment_count(c, 12.0)).sum();
        assert_eq!(mesh.boundary_edges.len(), expected);
        assert!(!mesh.labelled_vertices(LABEL_VASCULATURE_LEFT).is_empty());
        assert!(!mesh.labelled_vertices(LABEL_VASCULATURE_RIGHT).is_empty());

        let (boundary, _) = discretize_boundary(&curves, 12.0).unwrap();
        assert_relative_eq!(
            mesh.total_area(),
            polygon_area(&boundary),
            max_relative = 1e-9
        );
    }
}
