use log::debug;

use crate::{
    datatypes::{Mesh, Zone},
    parameters::ParameterSet,
    regions::RegionClassifier,
};

/// Coefficients of one element
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementMaterial {
    pub zone: Zone,
    pub youngs_modulus: f64,
    pub lambda: f64,
    pub mu: f64,
    pub swelling: f64,
    pub anisotropy: f64,
}

impl ElementMaterial {
    pub fn new(zone: Zone, params: &ParameterSet) -> ElementMaterial {
        let youngs_modulus = params.youngs_modulus * params.modulus_ratios.get(zone);
        let (lambda, mu) = lame_parameters(youngs_modulus, params.poisson_ratio);

        ElementMaterial {
            zone,
            youngs_modulus,
            lambda,
            mu,
            swelling: params.swelling.get(zone),
            anisotropy: params.anisotropy,
        }
    }

    /// Free swelling strain `(exx, eyy, gxy)`: the swelling coefficient split
    /// between the axes by the anisotropy ratio
    pub fn eigenstrain(&self) -> [f64; 3] {
        let share = self.swelling / (1.0 + self.anisotropy);
        [share, self.anisotropy * share, 0.0]
    }
}

/// Lamé parameters `(lambda, mu)` of an isotropic material
///
/// # Arguments
/// * `youngs_modulus` - The modulus of elasticity
/// * `poisson_ratio` - The Poisson ratio
pub fn lame_parameters(youngs_modulus: f64, poisson_ratio: f64) -> (f64, f64) {
    let mu = youngs_modulus / (2.0 * (1.0 + poisson_ratio));
    let lambda =
        youngs_modulus * poisson_ratio / ((1.0 + poisson_ratio) * (1.0 - 2.0 * poisson_ratio));
    (lambda, mu)
}

/// Piecewise-constant coefficient fields, one entry per mesh element
#[derive(Debug, Clone)]
pub struct MaterialField {
    pub elements: Vec<ElementMaterial>,
}

impl MaterialField {
    pub fn new(params: &ParameterSet, mesh: &Mesh, classifier: &RegionClassifier) -> MaterialField {
        let elements: Vec<ElementMaterial> = classifier
            .classify_elements(mesh)
            .into_iter()
            .map(|zone| ElementMaterial::new(zone, params))
            .collect();

        for zone in Zone::ALL {
            debug!(
                "material: {} elements in {}",
                elements.iter().filter(|m| m.zone == zone).count(),
                zone.name()
            );
        }

        MaterialField { elements }
    }

    pub fn zones(&self) -> Vec<Zone> {
        self.elements.iter().map(|m| m.zone).collect()
    }
}
