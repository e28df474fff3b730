use std::collections::HashMap;

use crate::{
    datatypes::{Mesh, Vertex},
    error::PappusError,
    material::{ElementMaterial, MaterialField},
};
use indicatif::ProgressBar;
use log::{info, warn};
use nalgebra::{matrix, SMatrix, SVector, Vector3};
use nalgebra_sparse::{coo::CooMatrix, csr::CsrMatrix};

use argmin::{
    core::{
        observers::{Observe, ObserverMode},
        Error, Executor, Operator, State, KV,
    },
    solver::conjugategradient::ConjugateGradient,
};

pub const DOF: usize = 2;
/// Nodes of a quadratic triangle: three vertices then the midpoints of edges
/// 0-1, 1-2 and 2-0
pub const NODES_PER_ELEMENT: usize = 6;
pub const MAX_CG_ITER: u64 = 1e6 as u64;
/// Target residual of the normalised system
pub const TARGET_CG_COST: f64 = 1e-14;
/// Largest relative residual `|Ku - f| / |f|` accepted after the solve
pub const RESIDUAL_TOLERANCE: f64 = 1e-6;

/// Barycentric coordinates and weights of the 3-point Gauss rule, exact for
/// quadratic integrands
const QUADRATURE: [([f64; 3], f64); 3] = [
    ([2.0 / 3.0, 1.0 / 6.0, 1.0 / 6.0], 1.0 / 3.0),
    ([1.0 / 6.0, 2.0 / 3.0, 1.0 / 6.0], 1.0 / 3.0),
    ([1.0 / 6.0, 1.0 / 6.0, 2.0 / 3.0], 1.0 / 3.0),
];

/// Quadratic Lagrange nodes on a triangle mesh. The mesh vertices come first
/// (same indices), followed by one node per edge.
#[derive(Debug, Clone)]
pub struct QuadraticSpace {
    pub nodes: Vec<Vertex>,
    pub elements: Vec<[usize; NODES_PER_ELEMENT]>,
    pub vertex_count: usize,
    edge_nodes: HashMap<(usize, usize), usize>,
}

impl QuadraticSpace {
    pub fn new(mesh: &Mesh) -> QuadraticSpace {
        let mut nodes = mesh.vertices.clone();
        let mut edge_nodes: HashMap<(usize, usize), usize> = HashMap::new();
        let mut elements = Vec::with_capacity(mesh.elements.len());

        for element in &mesh.elements {
            let [a, b, c] = element.nodes;
            let mut midpoint = |u: usize, v: usize| -> usize {
                *edge_nodes.entry((u.min(v), u.max(v))).or_insert_with(|| {
                    let (pu, pv) = (mesh.vertices[u], mesh.vertices[v]);
                    nodes.push(Vertex::new((pu.x + pv.x) / 2.0, (pu.y + pv.y) / 2.0));
                    nodes.len() - 1
                })
            };
            let m01 = midpoint(a, b);
            let m12 = midpoint(b, c);
            let m20 = midpoint(c, a);
            elements.push([a, b, c, m01, m12, m20]);
        }

        QuadraticSpace {
            nodes,
            elements,
            vertex_count: mesh.vertices.len(),
            edge_nodes,
        }
    }

    pub fn edge_node(&self, u: usize, v: usize) -> Option<usize> {
        self.edge_nodes.get(&(u.min(v), u.max(v))).copied()
    }

    fn corners(&self, element: usize) -> [Vertex; 3] {
        let e = &self.elements[element];
        [self.nodes[e[0]], self.nodes[e[1]], self.nodes[e[2]]]
    }
}

/// Gradients of the barycentric coordinates of a straight triangle
///
/// # Returns
/// The three gradients and the signed area of the triangle
pub fn barycentric_gradients(corners: &[Vertex; 3]) -> ([[f64; 2]; 3], f64) {
    let [v0, v1, v2] = corners;
    let area = 0.5 * (v0.x * (v1.y - v2.y) + v1.x * (v2.y - v0.y) + v2.x * (v0.y - v1.y));

    let beta = [v1.y - v2.y, v2.y - v0.y, v0.y - v1.y];
    let gamma = [v2.x - v1.x, v0.x - v2.x, v1.x - v0.x];

    let gradients = [0, 1, 2].map(|i| [beta[i] / (2.0 * area), gamma[i] / (2.0 * area)]);
    (gradients, area)
}

/// Quadratic shape functions at barycentric coordinates `l`
pub fn shape_values(l: [f64; 3]) -> [f64; NODES_PER_ELEMENT] {
    [
        l[0] * (2.0 * l[0] - 1.0),
        l[1] * (2.0 * l[1] - 1.0),
        l[2] * (2.0 * l[2] - 1.0),
        4.0 * l[0] * l[1],
        4.0 * l[1] * l[2],
        4.0 * l[2] * l[0],
    ]
}

/// Cartesian gradients of the quadratic shape functions at barycentric
/// coordinates `l`
pub fn shape_gradients(l: [f64; 3], g: &[[f64; 2]; 3]) -> [[f64; 2]; NODES_PER_ELEMENT] {
    let vertex = |i: usize| [0, 1].map(|d| (4.0 * l[i] - 1.0) * g[i][d]);
    let edge = |i: usize, j: usize| [0, 1].map(|d| 4.0 * (l[i] * g[j][d] + l[j] * g[i][d]));

    [vertex(0), vertex(1), vertex(2), edge(0, 1), edge(1, 2), edge(2, 0)]
}

/// Calculates the strain-displacement matrix at a point of the element
///
/// Strains are ordered `(exx, eyy, gxy)` with the engineering shear strain.
///
/// # Arguments
/// * `l` - Barycentric coordinates of the point
/// * `gradients` - Barycentric gradients of the element
pub fn compute_strain_displacement_matrix(
    l: [f64; 3],
    gradients: &[[f64; 2]; 3],
) -> SMatrix<f64, 3, 12> {
    let mut strain_displacement_mat: SMatrix<f64, 3, 12> = SMatrix::zeros();

    for (k, [dx, dy]) in shape_gradients(l, gradients).into_iter().enumerate() {
        strain_displacement_mat[(0, DOF * k)] = dx;
        strain_displacement_mat[(1, DOF * k + 1)] = dy;
        strain_displacement_mat[(2, DOF * k)] = dy;
        strain_displacement_mat[(2, DOF * k + 1)] = dx;
    }

    strain_displacement_mat
}

/// Calculates the stress-strain matrix from the Lamé parameters
///
/// # Arguments
/// * `lambda` - First Lamé parameter
/// * `mu` - Shear modulus
///
/// # Returns
/// A 3x3 stress-strain matrix acting on `(exx, eyy, gxy)`
pub fn compute_stress_strain_matrix(lambda: f64, mu: f64) -> SMatrix<f64, 3, 3> {
    matrix![
        lambda + 2.0 * mu, lambda, 0.0;
        lambda, lambda + 2.0 * mu, 0.0;
        0.0, 0.0, mu;
    ]
}

/// Computes the stiffness matrix for a given element
///
/// # Arguments
/// * `corners` - The element vertices, counter-clockwise
/// * `material` - The element coefficients
///
/// # Returns
/// A 12x12 stiffness matrix
pub fn compute_element_stiffness_matrix(
    corners: &[Vertex; 3],
    material: &ElementMaterial,
) -> SMatrix<f64, 12, 12> {
    let (gradients, area) = barycentric_gradients(corners);
    let stress_strain_mat = compute_stress_strain_matrix(material.lambda, material.mu);

    QUADRATURE
        .iter()
        .fold(SMatrix::zeros(), |acc, (l, weight)| {
            let b = compute_strain_displacement_matrix(*l, &gradients);
            acc + (b.transpose() * stress_strain_mat) * b * (weight * area)
        })
}

/// Computes the free swelling load of an element:
///
/// `s/(1+ani) ((2mu+lambda) dv1/dx + lambda dv2/dy)
///   + ani s/(1+ani) (lambda dv1/dx + (2mu+lambda) dv2/dy)`
///
/// integrated over the element for every test function.
///
/// # Arguments
/// * `corners` - The element vertices, counter-clockwise
/// * `material` - The element coefficients
pub fn compute_element_load(corners: &[Vertex; 3], material: &ElementMaterial) -> SVector<f64, 12> {
    let (gradients, area) = barycentric_gradients(corners);
    let stress_strain_mat = compute_stress_strain_matrix(material.lambda, material.mu);

    let share = material.swelling / (1.0 + material.anisotropy);
    let isotropic_axis = stress_strain_mat * Vector3::new(1.0, 0.0, 0.0);
    let anisotropic_axis = stress_strain_mat * Vector3::new(0.0, 1.0, 0.0);

    QUADRATURE
        .iter()
        .fold(SVector::zeros(), |acc, (l, weight)| {
            let b_t = compute_strain_displacement_matrix(*l, &gradients).transpose();
            acc + (b_t * isotropic_axis * share
                + b_t * anisotropic_axis * (material.anisotropy * share))
                * (weight * area)
        })
}

/// Prescribed displacement on every node of the boundary edges with `label`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirichletCondition {
    pub label: u32,
    pub ux: f64,
    pub uy: f64,
}

/// Displacement at every node of a [`QuadraticSpace`]
#[derive(Debug, Clone)]
pub struct DisplacementField {
    pub space: QuadraticSpace,
    /// `ux, uy` interleaved per node
    pub values: Vec<f64>,
}

impl DisplacementField {
    pub fn zeros(space: QuadraticSpace) -> DisplacementField {
        let values = vec![0.0; DOF * space.nodes.len()];
        DisplacementField { space, values }
    }

    /// Rigid translation of every node
    #[cfg(test)]
    pub fn uniform(space: QuadraticSpace, ux: f64, uy: f64) -> DisplacementField {
        let values = (0..space.nodes.len()).flat_map(|_| [ux, uy]).collect();
        DisplacementField { space, values }
    }

    pub fn at_node(&self, node: usize) -> (f64, f64) {
        (self.values[DOF * node], self.values[DOF * node + 1])
    }

    /// Displacement of a mesh vertex
    pub fn at_vertex(&self, vertex: usize) -> (f64, f64) {
        self.at_node(vertex)
    }

    /// Largest displacement magnitude over all nodes
    pub fn max_magnitude(&self) -> f64 {
        self.values
            .chunks(DOF)
            .map(|u| f64::sqrt(u[0] * u[0] + u[1] * u[1]))
            .fold(0.0, f64::max)
    }

    /// Interpolates the displacement at an arbitrary point of the mesh
    pub fn evaluate(&self, x: f64, y: f64) -> Result<(f64, f64), PappusError> {
        let point = Vertex::new(x, y);
        let mut best: Option<(usize, [f64; 3], f64)> = None;

        for element in 0..self.space.elements.len() {
            let corners = self.space.corners(element);
            let (gradients, _) = barycentric_gradients(&corners);
            let l = [0, 1, 2].map(|i| {
                let [gx, gy] = gradients[i];
                // L_i vanishes on the opposite edge, which passes through the next vertex
                let origin = corners[(i + 1) % 3];
                gx * (point.x - origin.x) + gy * (point.y - origin.y)
            });
            let inside = l.iter().copied().fold(f64::INFINITY, f64::min);
            if best.map_or(true, |(_, _, b)| inside > b) {
                best = Some((element, l, inside));
            }
        }

        let Some((element, l, inside)) = best else {
            return Err(PappusError::Solver("displacement field has no elements".to_owned()));
        };
        if inside < -1e-9 {
            return Err(PappusError::Solver(format!(
                "point ({x}, {y}) lies outside the mesh"
            )));
        }

        let nodes = self.space.elements[element];
        let (mut ux, mut uy) = (0.0, 0.0);
        for (node, weight) in nodes.iter().zip(shape_values(l)) {
            let (nx, ny) = self.at_node(*node);
            ux += weight * nx;
            uy += weight * ny;
        }

        Ok((ux, uy))
    }

    /// Elastic stress `(sxx, syy, sxy)` at every element centroid: the strain
    /// in excess of the free swelling strain, times the stiffness
    ///
    /// # Arguments
    /// * `material` - The material field the displacement was solved with
    pub fn compute_stress(&self, material: &MaterialField) -> Vec<[f64; 3]> {
        let centroid = [1.0 / 3.0; 3];

        self.space
            .elements
            .iter()
            .enumerate()
            .zip(&material.elements)
            .map(|((element, nodes), coefficients)| {
                let (gradients, _) = barycentric_gradients(&self.space.corners(element));
                let displacements: SVector<f64, 12> = SVector::from_iterator(
                    nodes.iter().flat_map(|n| {
                        let (ux, uy) = self.at_node(*n);
                        [ux, uy]
                    }),
                );
                let strain = compute_strain_displacement_matrix(centroid, &gradients) * displacements
                    - Vector3::from(coefficients.eigenstrain());
                let stress = compute_stress_strain_matrix(coefficients.lambda, coefficients.mu)
                    * strain;
                [stress[0], stress[1], stress[2]]
            })
            .collect()
    }
}

/// Runs multiplication for Conjugate Gradient Solver on the symmetrically
/// Jacobi-scaled system `S A S`
struct ConjugateGradientOperator<'a> {
    a: &'a CsrMatrix<f64>,
    scale: &'a [f64],
}

impl<'a> Operator for ConjugateGradientOperator<'a> {
    type Param = Vec<f64>;
    type Output = Vec<f64>;

    fn apply(&self, x: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self
            .a
            .row_iter()
            .enumerate()
            .map(|(i, row)| {
                let sum: f64 = row
                    .col_indices()
                    .iter()
                    .zip(row.values())
                    .map(|(j, value)| value * self.scale[*j] * x[*j])
                    .sum();
                self.scale[i] * sum
            })
            .collect())
    }
}

/// Sparse matrix-vector product
fn multiply(a: &CsrMatrix<f64>, x: &[f64]) -> Vec<f64> {
    a.row_iter()
        .map(|row| {
            row.col_indices()
                .iter()
                .zip(row.values())
                .map(|(j, value)| value * x[*j])
                .sum()
        })
        .collect()
}

fn norm(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Observer bar for argmin solver
struct ConjugateGradientObserverBar {
    bar: ProgressBar,
    final_mag: f64,
    initial_mag: Option<f64>,
}

impl ConjugateGradientObserverBar {
    fn new() -> ConjugateGradientObserverBar {
        ConjugateGradientObserverBar {
            bar: ProgressBar::new(1000),
            final_mag: TARGET_CG_COST.log10().floor(),
            initial_mag: None,
        }
    }
}

impl<I> Observe<I> for ConjugateGradientObserverBar
where
    I: State<Float = f64>,
{
    fn observe_iter(&mut self, state: &I, _kv: &KV) -> Result<(), Error> {
        let cost = state.get_cost();
        if !cost.is_finite() || cost <= 0.0 {
            return Ok(());
        }
        let cost_mag = cost.log10();
        let initial_mag = *self.initial_mag.get_or_insert(cost_mag);
        let span = (initial_mag - self.final_mag).max(1.0);
        let progress = (1000.0 * (initial_mag - cost_mag) / span).clamp(0.0, 1000.0) as u64;
        self.bar.set_position(progress);

        Ok(())
    }

    fn observe_final(&mut self, _state: &I) -> Result<(), Error> {
        self.bar.finish_and_clear();
        Ok(())
    }
}

/// Solves `Ax = b` for a symmetric positive definite `A` with the
/// Jacobi-scaled conjugate gradient method
///
/// # Arguments
/// * `a` - A square positive definite matrix
/// * `b` - The right hand side
fn run_conjugate_gradient(a: &CsrMatrix<f64>, b: &[f64]) -> Result<Vec<f64>, PappusError> {
    let b_norm = norm(b);
    if b_norm == 0.0 {
        return Ok(vec![0.0; b.len()]);
    }

    let mut scale: Vec<f64> = vec![0.0; a.nrows()];
    for (i, row) in a.row_iter().enumerate() {
        let diagonal = row
            .col_indices()
            .iter()
            .zip(row.values())
            .find(|(j, _)| **j == i)
            .map(|(_, value)| *value)
            .unwrap_or(0.0);
        if diagonal.is_nan() || diagonal <= 0.0 {
            return Err(PappusError::Solver(format!(
                "stiffness matrix is singular: diagonal entry {i} is {diagonal}"
            )));
        }
        scale[i] = 1.0 / diagonal.sqrt();
    }

    // normalise so the target cost is relative
    let scaled_b: Vec<f64> = b.iter().zip(&scale).map(|(v, s)| v * s).collect();
    let scaled_norm = norm(&scaled_b);
    let scaled_b: Vec<f64> = scaled_b.iter().map(|v| v / scaled_norm).collect();

    let solver: ConjugateGradient<_, f64> = ConjugateGradient::new(scaled_b);
    let initial_guess: Vec<f64> = vec![0.0; b.len()];

    let operator = ConjugateGradientOperator { a, scale: &scale };
    let observer = ConjugateGradientObserverBar::new();

    let res = Executor::new(operator, solver)
        .configure(|state| {
            state
                .param(initial_guess)
                .max_iters(MAX_CG_ITER)
                .target_cost(TARGET_CG_COST)
        })
        .add_observer(observer, ObserverMode::NewBest)
        .run()
        .map_err(|err| PappusError::Solver(format!("Conjugate Gradient error: {err}")))?;

    let best_param = res.state().get_best_param().cloned().ok_or_else(|| {
        PappusError::Solver("Conjugate Gradient could not produce best parameter".to_owned())
    })?;
    info!("conjugate gradient stopped after {} iterations", res.state().get_iter());

    let x: Vec<f64> = best_param
        .iter()
        .zip(&scale)
        .map(|(y, s)| y * s * scaled_norm)
        .collect();

    let residual: Vec<f64> = multiply(a, &x).iter().zip(b).map(|(ax, bi)| ax - bi).collect();
    let relative_residual = norm(&residual) / b_norm;
    if !relative_residual.is_finite() || relative_residual > RESIDUAL_TOLERANCE {
        return Err(PappusError::Solver(format!(
            "system is singular or did not converge (relative residual {relative_residual:.3e})"
        )));
    }

    Ok(x)
}

/// Linear elastic solve with a free swelling load. Single shot: build it,
/// call [`ElasticitySolver::solve`] once.
pub struct ElasticitySolver<'a> {
    mesh: &'a Mesh,
    material: &'a MaterialField,
    conditions: Vec<DirichletCondition>,
}

impl<'a> ElasticitySolver<'a> {
    pub fn new(
        mesh: &'a Mesh,
        material: &'a MaterialField,
        conditions: Vec<DirichletCondition>,
    ) -> ElasticitySolver<'a> {
        ElasticitySolver {
            mesh,
            material,
            conditions,
        }
    }

    /// Prescribed value of every degree of freedom, `None` where unknown
    fn build_prescribed(&self, space: &QuadraticSpace) -> Result<Vec<Option<f64>>, PappusError> {
        let mut prescribed: Vec<Option<f64>> = vec![None; DOF * space.nodes.len()];

        for condition in &self.conditions {
            let edges: Vec<_> = self
                .mesh
                .boundary_edges
                .iter()
                .filter(|edge| edge.label == condition.label)
                .collect();
            if edges.is_empty() {
                return Err(PappusError::Solver(format!(
                    "no boundary edge carries label {}",
                    condition.label
                )));
            }

            for edge in edges {
                let [u, v] = edge.nodes;
                let midpoint = space.edge_node(u, v).ok_or_else(|| {
                    PappusError::Solver(format!("boundary edge {u}-{v} is not an element edge"))
                })?;
                for node in [u, v, midpoint] {
                    prescribed[DOF * node] = Some(condition.ux);
                    prescribed[DOF * node + 1] = Some(condition.uy);
                }
            }
        }

        if prescribed.iter().all(|p| p.is_none()) {
            return Err(PappusError::Solver(
                "no displacement is prescribed; rigid body motion is unconstrained".to_owned(),
            ));
        }

        Ok(prescribed)
    }

    /// Assembles the system on the unknown degrees of freedom. Known
    /// displacements move to the right hand side.
    ///
    /// # Returns
    /// The reduced stiffness matrix, the reduced load and the index of each
    /// unknown in the global numbering
    fn assemble(
        &self,
        space: &QuadraticSpace,
        prescribed: &[Option<f64>],
    ) -> (CsrMatrix<f64>, Vec<f64>, Vec<usize>) {
        let unknowns: Vec<usize> = (0..prescribed.len())
            .filter(|dof| prescribed[*dof].is_none())
            .collect();
        let mut reduced_index = vec![usize::MAX; prescribed.len()];
        for (row, dof) in unknowns.iter().enumerate() {
            reduced_index[*dof] = row;
        }

        let mut stiffness = CooMatrix::new(unknowns.len(), unknowns.len());
        let mut load = vec![0.0; unknowns.len()];

        let bar = ProgressBar::new(space.elements.len() as u64);
        for (element, (nodes, material)) in space
            .elements
            .iter()
            .zip(&self.material.elements)
            .enumerate()
        {
            bar.inc(1);
            let corners = space.corners(element);
            let element_stiffness = compute_element_stiffness_matrix(&corners, material);
            let element_load = compute_element_load(&corners, material);

            let dofs: Vec<usize> = nodes
                .iter()
                .flat_map(|n| [DOF * n, DOF * n + 1])
                .collect();

            for (local_row, global_row) in dofs.iter().enumerate() {
                if prescribed[*global_row].is_some() {
                    continue;
                }
                let row = reduced_index[*global_row];
                load[row] += element_load[local_row];

                for (local_col, global_col) in dofs.iter().enumerate() {
                    let value = element_stiffness[(local_row, local_col)];
                    match prescribed[*global_col] {
                        Some(known) => load[row] -= value * known,
                        None => stiffness.push(row, reduced_index[*global_col], value),
                    }
                }
            }
        }
        bar.finish_and_clear();

        (CsrMatrix::from(&stiffness), load, unknowns)
    }

    /// Assembles and solves the system
    pub fn solve(self) -> Result<DisplacementField, PappusError> {
        if self.material.elements.len() != self.mesh.elements.len() {
            return Err(PappusError::Solver(format!(
                "{} material entries for {} elements",
                self.material.elements.len(),
                self.mesh.elements.len()
            )));
        }

        let space = QuadraticSpace::new(self.mesh);
        let prescribed = self.build_prescribed(&space)?;

        info!("building stiffness matrix for {} elements...", space.elements.len());
        let (stiffness, load, unknowns) = self.assemble(&space, &prescribed);
        info!(
            "solving for {} unknown displacements ({} prescribed)...",
            unknowns.len(),
            prescribed.len() - unknowns.len()
        );

        let start = std::time::Instant::now();
        let solution = if unknowns.is_empty() {
            warn!("every displacement is prescribed; nothing to solve");
            Vec::new()
        } else {
            run_conjugate_gradient(&stiffness, &load)?
        };
        let elapsed = (std::time::Instant::now() - start).as_secs_f32();
        info!("solved system in {:.3} seconds", elapsed);

        let mut field = DisplacementField::zeros(space);
        for (dof, value) in prescribed.iter().enumerate() {
            if let Some(value) = value {
                field.values[dof] = *value;
            }
        }
        for (dof, value) in unknowns.iter().zip(solution) {
            field.values[*dof] = value;
        }

        Ok(field)
    }
}
