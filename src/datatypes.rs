#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

impl Vertex {
    pub fn new(x: f64, y: f64) -> Vertex {
        Vertex { x, y }
    }

    pub fn distance(&self, other: &Vertex) -> f64 {
        f64::sqrt(f64::powi(self.x - other.x, 2) + f64::powi(self.y - other.y, 2))
    }
}

/// A linear triangle. Nodes are stored counter-clockwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Element {
    pub nodes: [usize; 3],
}

/// A mesh edge lying on the outer contour, tagged with the label of the
/// curve it was cut from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryEdge {
    pub nodes: [usize; 2],
    pub label: u32,
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub elements: Vec<Element>,
    pub boundary_edges: Vec<BoundaryEdge>,
}

impl Mesh {
    /// Signed area of an element; positive for counter-clockwise nodes
    pub fn element_area(&self, element: &Element) -> f64 {
        let v0 = &self.vertices[element.nodes[0]];
        let v1 = &self.vertices[element.nodes[1]];
        let v2 = &self.vertices[element.nodes[2]];

        0.5 * (v0.x * (v1.y - v2.y) + v1.x * (v2.y - v0.y) + v2.x * (v0.y - v1.y))
    }

    pub fn element_centroid(&self, element: &Element) -> Vertex {
        let [a, b, c] = element.nodes.map(|i| self.vertices[i]);
        Vertex::new((a.x + b.x + c.x) / 3.0, (a.y + b.y + c.y) / 3.0)
    }

    pub fn total_area(&self) -> f64 {
        self.elements.iter().map(|e| self.element_area(e)).sum()
    }

    /// Vertex indices touched by boundary edges carrying `label`
    pub fn labelled_vertices(&self, label: u32) -> Vec<usize> {
        let mut nodes: Vec<usize> = self
            .boundary_edges
            .iter()
            .filter(|edge| edge.label == label)
            .flat_map(|edge| edge.nodes)
            .collect();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }
}

/// Material zones of the actuator cross-section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    Vasculature,
    Nectary,
    Side,
    Mesophyll,
}

impl Zone {
    pub const ALL: [Zone; 4] = [Zone::Vasculature, Zone::Nectary, Zone::Side, Zone::Mesophyll];

    /// Index used when the zone field is exported for plotting
    pub fn plot_index(&self) -> u8 {
        match self {
            Zone::Vasculature => 1,
            Zone::Side => 2,
            Zone::Nectary => 3,
            Zone::Mesophyll => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Zone::Vasculature => "vasculature",
            Zone::Nectary => "floral podium",
            Zone::Side => "side",
            Zone::Mesophyll => "cortex",
        }
    }
}
