use log::info;

use crate::{
    datatypes::{Mesh, Vertex},
    error::{PappusError, Result},
    solver::DisplacementField,
};

/// Moves every vertex of a mesh by the displacement found at it
///
/// Connectivity and boundary labels are kept, so element `i` of the result is
/// the image of element `i` of the input.
///
/// # Arguments
/// * `mesh` - The undeformed mesh
/// * `field` - A displacement field solved on `mesh`
///
/// # Returns
/// The deformed mesh
pub fn deform(mesh: &Mesh, field: &DisplacementField) -> Result<Mesh> {
    if field.space.vertex_count != mesh.vertices.len() {
        return Err(PappusError::Solver(format!(
            "displacement field has {} vertices but the mesh has {}",
            field.space.vertex_count,
            mesh.vertices.len()
        )));
    }

    let vertices = mesh
        .vertices
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let (ux, uy) = field.at_vertex(i);
            Vertex::new(v.x + ux, v.y + uy)
        })
        .collect();

    let deformed = Mesh {
        vertices,
        elements: mesh.elements.clone(),
        boundary_edges: mesh.boundary_edges.clone(),
    };

    let inverted = deformed
        .elements
        .iter()
        .filter(|e| deformed.element_area(e) <= 0.0)
        .count();
    if inverted > 0 {
        return Err(PappusError::Mesher(format!(
            "{inverted} elements are inverted or flat after deformation"
        )));
    }
    info!(
        "deformed mesh: area {:.6} -> {:.6}",
        mesh.total_area(),
        deformed.total_area()
    );

    Ok(deformed)
}

/// Rigid translation of a mesh
#[cfg(test)]
pub fn translate(mesh: &Mesh, dx: f64, dy: f64) -> Mesh {
    Mesh {
        vertices: mesh
            .vertices
            .iter()
            .map(|v| Vertex::new(v.x + dx, v.y + dy))
            .collect(),
        elements: mesh.elements.clone(),
        boundary_edges: mesh.boundary_edges.clone(),
    }
}
