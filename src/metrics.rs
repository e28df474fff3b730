use log::info;

use crate::{
    datatypes::{Mesh, Zone},
    error::{PappusError, Result},
    parameters::{ParameterSet, ZoneCoefficients},
    solver::DisplacementField,
};

/// Integrated area of each zone over one mesh configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneAreas {
    pub zones: ZoneCoefficients,
    pub total: f64,
}

impl ZoneAreas {
    /// Sums element areas per zone
    ///
    /// # Arguments
    /// * `mesh` - The mesh to integrate over
    /// * `zones` - The zone of every element of `mesh`
    pub fn compute(mesh: &Mesh, zones: &[Zone]) -> Result<ZoneAreas> {
        if zones.len() != mesh.elements.len() {
            return Err(PappusError::Mesher(format!(
                "{} zone labels for {} elements",
                zones.len(),
                mesh.elements.len()
            )));
        }

        let mut areas = ZoneCoefficients {
            vasculature: 0.0,
            nectary: 0.0,
            side: 0.0,
            mesophyll: 0.0,
        };
        for (element, zone) in mesh.elements.iter().zip(zones) {
            let area = mesh.element_area(element);
            match zone {
                Zone::Vasculature => areas.vasculature += area,
                Zone::Nectary => areas.nectary += area,
                Zone::Side => areas.side += area,
                Zone::Mesophyll => areas.mesophyll += area,
            }
        }

        Ok(ZoneAreas {
            zones: areas,
            total: mesh.total_area(),
        })
    }

    pub fn get(&self, zone: Zone) -> f64 {
        self.zones.get(zone)
    }
}

/// `original / deformed` area for every zone
///
/// # Arguments
/// * `original` - Zone areas of the undeformed mesh
/// * `deformed` - Zone areas of the deformed mesh
pub fn area_ratios(original: &ZoneAreas, deformed: &ZoneAreas) -> Result<ZoneCoefficients> {
    for zone in Zone::ALL {
        let area = deformed.get(zone);
        if !area.is_finite() || area <= 0.0 {
            return Err(PappusError::Mesher(format!(
                "{} has area {area} in the deformed mesh",
                zone.name()
            )));
        }
    }

    Ok(ZoneCoefficients {
        vasculature: original.zones.vasculature / deformed.zones.vasculature,
        nectary: original.zones.nectary / deformed.zones.nectary,
        side: original.zones.side / deformed.zones.side,
        mesophyll: original.zones.mesophyll / deformed.zones.mesophyll,
    })
}

/// Angle in degrees between the vertical and the segment joining two points
/// `m` (lower) and `n` (upper); positive when `n` leans towards +x
pub fn angle_to_vertical(m: (f64, f64), n: (f64, f64)) -> f64 {
    let (dx, dy) = (n.0 - m.0, n.1 - m.1);
    f64::asin(dx / f64::sqrt(dx * dx + dy * dy)).to_degrees()
}

/// Tilt of the right edge over the side band after deformation
///
/// Samples the displacement at the top right corner and `hside` below it.
///
/// # Arguments
/// * `params` - The parameters the field was solved with
/// * `field` - The displacement field
pub fn bending_angle(params: &ParameterSet, field: &DisplacementField) -> Result<f64> {
    let x = params.lx / 2.0;

    let (top_ux, top_uy) = field.evaluate(x, 0.0)?;
    let (low_ux, low_uy) = field.evaluate(x, -params.hside)?;

    let n = (x + top_ux, top_uy);
    let m = (x + low_ux, -params.hside + low_uy);

    Ok(angle_to_vertical(m, n))
}

/// Scalar outputs of one run
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub original_areas: ZoneAreas,
    pub deformed_areas: ZoneAreas,
    pub area_ratios: ZoneCoefficients,
    pub side_angle: f64,
}

impl SimulationReport {
    /// Reduces both configurations to the reported scalars
    ///
    /// # Arguments
    /// * `params` - The parameters of the run
    /// * `original` - The undeformed mesh
    /// * `deformed` - The deformed mesh, same connectivity as `original`
    /// * `zones` - Element zones, sampled on the undeformed mesh
    /// * `field` - The solved displacement
    pub fn compute(
        params: &ParameterSet,
        original: &Mesh,
        deformed: &Mesh,
        zones: &[Zone],
        field: &DisplacementField,
    ) -> Result<SimulationReport> {
        let original_areas = ZoneAreas::compute(original, zones)?;
        let deformed_areas = ZoneAreas::compute(deformed, zones)?;
        let area_ratios = area_ratios(&original_areas, &deformed_areas)?;
        let side_angle = bending_angle(params, field)?;

        info!(
            "total area {:.6} -> {:.6}, side angle {:.3} degrees",
            original_areas.total, deformed_areas.total, side_angle
        );

        Ok(SimulationReport {
            original_areas,
            deformed_areas,
            area_ratios,
            side_angle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        datatypes::{BoundaryEdge, Element, Vertex},
        deformer,
        solver::QuadraticSpace,
    };
    use approx::assert_relative_eq;

    /// Four unit squares in a row, one per zone
    fn strip() -> (Mesh, Vec<Zone>) {
        let mut vertices = Vec::new();
        for i in 0..=4 {
            vertices.push(Vertex::new(i as f64, 0.0));
            vertices.push(Vertex::new(i as f64, 1.0));
        }
        let mut elements = Vec::new();
        let mut zones = Vec::new();
        for (i, zone) in Zone::ALL.iter().enumerate() {
            let (a, b, c, d) = (2 * i, 2 * i + 2, 2 * i + 3, 2 * i + 1);
            elements.push(Element { nodes: [a, b, c] });
            elements.push(Element { nodes: [a, c, d] });
            zones.extend([*zone, *zone]);
        }
        let mesh = Mesh {
            vertices,
            elements,
            boundary_edges: vec![BoundaryEdge { nodes: [0, 2], label: 1 }],
        };
        (mesh, zones)
    }

    #[test]
    fn test_zone_areas() {
        let (mesh, zones) = strip();
        let areas = ZoneAreas::compute(&mesh, &zones).unwrap();

        for zone in Zone::ALL {
            assert_relative_eq!(areas.get(zone), 1.0);
        }
        assert_relative_eq!(areas.total, 4.0);
    }

    #[test]
    fn test_translation_conserves_zone_areas() {
        let (mesh, zones) = strip();
        let moved = deformer::translate(&mesh, 12.5, -7.25);

        let before = ZoneAreas::compute(&mesh, &zones).unwrap();
        let after = ZoneAreas::compute(&moved, &zones).unwrap();
        let ratios = area_ratios(&before, &after).unwrap();

        for zone in Zone::ALL {
            assert_relative_eq!(before.get(zone), after.get(zone), epsilon = 1e-12);
            assert_relative_eq!(ratios.get(zone), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_shrinking_gives_ratio_above_one() {
        let (mesh, zones) = strip();
        let mut shrunk = mesh.clone();
        for v in shrunk.vertices.iter_mut() {
            v.x *= 0.5;
        }

        let before = ZoneAreas::compute(&mesh, &zones).unwrap();
        let after = ZoneAreas::compute(&shrunk, &zones).unwrap();
        let ratios = area_ratios(&before, &after).unwrap();
        assert_relative_eq!(ratios.mesophyll, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_collapsed_zone_has_no_ratio() {
        let (mesh, zones) = strip();
        let mut collapsed = mesh.clone();
        // squash the vasculature square onto its left edge
        collapsed.vertices[2].x = 0.0;
        collapsed.vertices[3].x = 0.0;

        let before = ZoneAreas::compute(&mesh, &zones).unwrap();
        let after = ZoneAreas::compute(&collapsed, &zones).unwrap();
        assert!(matches!(
            area_ratios(&before, &after),
            Err(PappusError::Mesher(_))
        ));
    }

    #[test]
    fn test_inverted_zone_has_no_ratio() {
        let (mesh, zones) = strip();
        let mut mirrored = mesh.clone();
        // reflect the whole strip: every element turns clockwise
        for v in mirrored.vertices.iter_mut() {
            v.x = -v.x;
        }

        let before = ZoneAreas::compute(&mesh, &zones).unwrap();
        let after = ZoneAreas::compute(&mirrored, &zones).unwrap();
        assert!(after.get(Zone::Side) < 0.0);
        assert!(matches!(
            area_ratios(&before, &after),
            Err(PappusError::Mesher(_))
        ));
    }

    #[test]
    fn test_angle_to_vertical() {
        assert_relative_eq!(angle_to_vertical((0.0, 0.0), (0.0, 1.0)), 0.0);
        assert_relative_eq!(angle_to_vertical((0.0, 0.0), (1.0, 1.0)), 45.0, epsilon = 1e-12);
        assert_relative_eq!(angle_to_vertical((1.0, 0.0), (0.0, 1.0)), -45.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bending_angle_of_sheared_field() {
        let mut params = ParameterSet::default();
        params.lx = 2.0;
        params.hside = 0.5;

        let mesh = Mesh {
            vertices: vec![
                Vertex::new(-1.0, -1.0),
                Vertex::new(1.0, -1.0),
                Vertex::new(1.0, 0.0),
                Vertex::new(-1.0, 0.0),
            ],
            elements: vec![Element { nodes: [0, 1, 2] }, Element { nodes: [0, 2, 3] }],
            boundary_edges: Vec::new(),
        };
        // simple shear u = (y + 1) tan(30 deg), so vertical lines tilt by 30 degrees
        let space = QuadraticSpace::new(&mesh);
        let tilt = 30f64.to_radians().tan();
        let values = space
            .nodes
            .iter()
            .flat_map(|p| [(p.y + 1.0) * tilt, 0.0])
            .collect();
        let field = DisplacementField { space, values };

        assert_relative_eq!(bending_angle(&params, &field).unwrap(), 30.0, epsilon = 1e-9);
    }
}
