use log::info;

use crate::{
    datatypes::{Mesh, Zone},
    deformer,
    error::Result,
    geometry::{BoundaryGeometry, LABEL_VASCULATURE_LEFT, LABEL_VASCULATURE_RIGHT},
    material::MaterialField,
    mesher,
    metrics::SimulationReport,
    parameters::ParameterSet,
    regions::RegionClassifier,
    solver::{DirichletCondition, DisplacementField, ElasticitySolver},
};

/// Everything one run produces
#[derive(Debug, Clone)]
pub struct Simulation {
    pub original: Mesh,
    pub deformed: Mesh,
    pub zones: Vec<Zone>,
    pub displacement: DisplacementField,
    pub stress: Vec<[f64; 3]>,
    pub report: SimulationReport,
}

/// The vasculature bottoms are pushed towards each other by `vd`
pub fn vasculature_conditions(params: &ParameterSet) -> Vec<DirichletCondition> {
    vec![
        DirichletCondition {
            label: LABEL_VASCULATURE_LEFT,
            ux: params.vd,
            uy: 0.0,
        },
        DirichletCondition {
            label: LABEL_VASCULATURE_RIGHT,
            ux: -params.vd,
            uy: 0.0,
        },
    ]
}

/// Runs every stage once for a parameter set
///
/// # Arguments
/// * `params` - The parameters of the run
///
/// # Returns
/// Both mesh configurations, the fields and the scalar report
pub fn run(params: &ParameterSet) -> Result<Simulation> {
    params.validate()?;

    let geometry = BoundaryGeometry::new(params)?;
    let original = mesher::run(&geometry.curves(), params.mesh_density)?;

    let classifier = RegionClassifier::new(&geometry);
    let material = MaterialField::new(params, &original, &classifier);

    let conditions = vasculature_conditions(params);
    for condition in &conditions {
        info!(
            "label {}: {} vertices displaced by ({}, {})",
            condition.label,
            original.labelled_vertices(condition.label).len(),
            condition.ux,
            condition.uy
        );
    }

    let solver = ElasticitySolver::new(&original, &material, conditions);
    let displacement = solver.solve()?;
    info!("largest displacement {:.6}", displacement.max_magnitude());
    let stress = displacement.compute_stress(&material);

    let deformed = deformer::deform(&original, &displacement)?;
    let zones = material.zones();
    let report = SimulationReport::compute(params, &original, &deformed, &zones, &displacement)?;

    Ok(Simulation {
        original,
        deformed,
        zones,
        displacement,
        stress,
        report,
    })
}
