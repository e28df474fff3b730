use json::JsonValue;
use log::{info, warn};

use crate::{
    datatypes::Zone,
    error::{PappusError, Result},
};

/// Physical lengths are given in micrometres and divided by this scale
pub const UNITS: f64 = 200.0;

/// Measured tissue densities; the Young modulus of each zone is taken
/// proportional to its density.
pub const DENSITY_CORTEX: f64 = 0.668060839;
pub const DENSITY_PODIUM: f64 = 1.01896008;
pub const DENSITY_SIDE: f64 = 0.918032482;
pub const DENSITY_VASCULATURE: f64 = 0.882171532;

pub const DEFAULT_POISSON_RATIO: f64 = 0.29;
pub const DEFAULT_MESH_DENSITY: f64 = 40.0;

/// One scalar per material zone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneCoefficients {
    pub vasculature: f64,
    pub nectary: f64,
    pub side: f64,
    pub mesophyll: f64,
}

impl ZoneCoefficients {
    pub fn get(&self, zone: Zone) -> f64 {
        match zone {
            Zone::Vasculature => self.vasculature,
            Zone::Nectary => self.nectary,
            Zone::Side => self.side,
            Zone::Mesophyll => self.mesophyll,
        }
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> ZoneCoefficients {
        ZoneCoefficients {
            vasculature: f(self.vasculature),
            nectary: f(self.nectary),
            side: f(self.side),
            mesophyll: f(self.mesophyll),
        }
    }
}

/// Raw inputs as a user supplies them: lengths in micrometres and swelling
/// given as shrinkage magnitudes.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalInputs {
    pub width: f64,
    pub height: f64,
    pub podium_height: f64,
    pub outer_radius: f64,
    pub side_height: f64,
    pub side_width: f64,
    pub vasculature_thickness: f64,
    pub cavity_width: f64,
    pub vasculature_displacement: f64,
    pub anisotropy: f64,
    pub swelling_cortex: f64,
    pub swelling_podium: f64,
    pub swelling_side: f64,
    pub swelling_vasculature: f64,
    pub mesh_density: f64,
    pub poisson_ratio: f64,
}

impl Default for PhysicalInputs {
    fn default() -> Self {
        PhysicalInputs {
            width: 491.0,
            height: 240.0,
            podium_height: 38.8,
            outer_radius: 363.0,
            side_height: 91.4,
            side_width: 47.6,
            vasculature_thickness: 34.3,
            cavity_width: 74.8,
            vasculature_displacement: 15.3,
            anisotropy: 1.0,
            swelling_cortex: 0.464888,
            swelling_podium: 0.443697,
            swelling_side: 0.573482,
            swelling_vasculature: 0.236087,
            mesh_density: DEFAULT_MESH_DENSITY,
            poisson_ratio: DEFAULT_POISSON_RATIO,
        }
    }
}

impl PhysicalInputs {
    fn field_mut(&mut self, key: &str) -> Option<&mut f64> {
        let field = match key {
            "D" => &mut self.width,
            "H" => &mut self.height,
            "Hpod" => &mut self.podium_height,
            "R" => &mut self.outer_radius,
            "Hside" => &mut self.side_height,
            "Wside" => &mut self.side_width,
            "Wvasculature" => &mut self.vasculature_thickness,
            "Dcavity" => &mut self.cavity_width,
            "dvasc" => &mut self.vasculature_displacement,
            "ani" => &mut self.anisotropy,
            "scort" => &mut self.swelling_cortex,
            "spod" => &mut self.swelling_podium,
            "sside" => &mut self.swelling_side,
            "svasc" => &mut self.swelling_vasculature,
            "nvertex" => &mut self.mesh_density,
            "poisson_ratio" => &mut self.poisson_ratio,
            _ => return None,
        };
        Some(field)
    }

    /// Overrides fields from the `parameters` object of an input json
    ///
    /// # Arguments
    /// * `input_json` - The parsed input file
    pub fn apply_json(&mut self, input_json: &JsonValue) -> Result<()> {
        if !input_json.has_key("parameters") {
            return Err(PappusError::Configuration(
                "Input json missing parameters field".to_owned(),
            ));
        }

        let mut applied: usize = 0;
        for (key, value) in input_json["parameters"].entries() {
            let Some(field) = self.field_mut(key) else {
                warn!("skipping unknown parameter '{key}' in input json");
                continue;
            };
            *field = value.as_f64().ok_or_else(|| {
                PappusError::Configuration(format!("Parameter '{key}' is not a number"))
            })?;
            applied += 1;
        }
        info!("loaded {applied} parameter overrides from input json");

        Ok(())
    }
}

/// Parses an input json file into a JsonValue object
///
/// # Arguments
/// * `input_file` - The path to the input file
pub fn load_input_file(input_file: &str) -> Result<JsonValue> {
    let file_string = std::fs::read_to_string(input_file).map_err(|err| {
        PappusError::Configuration(format!("Unable to open input file {input_file}: {err}"))
    })?;

    json::parse(&file_string)
        .map_err(|err| PappusError::Configuration(format!("Error in input file json: {err}")))
}

/// Every physical quantity the pipeline reads, with lengths expressed in
/// units of [`UNITS`] micrometres.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    pub lx: f64,
    pub ly: f64,
    pub hnect: f64,
    /// Measured outer radius; the inner arc uses `outer_radius - hnect`
    pub outer_radius: f64,
    pub hside: f64,
    pub lside: f64,
    pub vthickness: f64,
    pub cwidth: f64,
    pub vd: f64,
    pub mesh_density: f64,
    pub poisson_ratio: f64,
    pub youngs_modulus: f64,
    pub modulus_ratios: ZoneCoefficients,
    pub swelling: ZoneCoefficients,
    pub anisotropy: f64,
}

impl Default for ParameterSet {
    fn default() -> Self {
        ParameterSet::convert(&PhysicalInputs::default())
    }
}

impl ParameterSet {
    fn convert(inputs: &PhysicalInputs) -> ParameterSet {
        ParameterSet {
            lx: inputs.width / UNITS,
            ly: inputs.height / UNITS,
            hnect: inputs.podium_height / UNITS,
            outer_radius: inputs.outer_radius / UNITS,
            hside: inputs.side_height / UNITS,
            lside: inputs.side_width / UNITS,
            vthickness: inputs.vasculature_thickness / UNITS,
            cwidth: inputs.cavity_width / UNITS,
            vd: inputs.vasculature_displacement / UNITS,
            mesh_density: inputs.mesh_density,
            poisson_ratio: inputs.poisson_ratio,
            youngs_modulus: 1.0,
            modulus_ratios: ZoneCoefficients {
                vasculature: DENSITY_VASCULATURE,
                nectary: DENSITY_PODIUM,
                side: DENSITY_SIDE,
                mesophyll: DENSITY_CORTEX,
            }
            .map(|density| density / DENSITY_VASCULATURE),
            // inputs are shrinkage magnitudes
            swelling: ZoneCoefficients {
                vasculature: inputs.swelling_vasculature,
                nectary: inputs.swelling_podium,
                side: inputs.swelling_side,
                mesophyll: inputs.swelling_cortex,
            }
            .map(|shrinkage| -shrinkage),
            anisotropy: inputs.anisotropy,
        }
    }

    /// Converts physical inputs to model units and validates the result
    pub fn from_physical(inputs: &PhysicalInputs) -> Result<ParameterSet> {
        let params = ParameterSet::convert(inputs);
        params.validate()?;
        Ok(params)
    }

    /// Radius of the inner (top) arc
    pub fn arc_radius(&self) -> f64 {
        self.outer_radius - self.hnect
    }

    /// Checks that every parameter lies in its valid domain
    pub fn validate(&self) -> Result<()> {
        let lengths = [
            ("actuator width", self.lx),
            ("actuator height", self.ly),
            ("podium height", self.hnect),
            ("outer radius", self.outer_radius),
            ("side height", self.hside),
            ("side width", self.lside),
            ("vasculature thickness", self.vthickness),
            ("cavity width", self.cwidth),
        ];
        for (name, value) in lengths {
            if !value.is_finite() || value <= 0.0 {
                return Err(PappusError::Configuration(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        if !self.vd.is_finite() {
            return Err(PappusError::Configuration(
                "vasculature displacement must be finite".to_owned(),
            ));
        }
        if !self.mesh_density.is_finite() || self.mesh_density < 1.0 {
            return Err(PappusError::Configuration(format!(
                "mesh density must be at least 1, got {}",
                self.mesh_density
            )));
        }
        if !(self.poisson_ratio > -1.0 && self.poisson_ratio < 0.5) {
            return Err(PappusError::Configuration(format!(
                "Poisson ratio must lie in (-1, 0.5), got {}",
                self.poisson_ratio
            )));
        }
        if !self.youngs_modulus.is_finite() || self.youngs_modulus <= 0.0 {
            return Err(PappusError::Configuration(format!(
                "Young modulus must be positive, got {}",
                self.youngs_modulus
            )));
        }
        for zone in Zone::ALL {
            let ratio = self.modulus_ratios.get(zone);
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(PappusError::Configuration(format!(
                    "modulus ratio of {} must be positive, got {ratio}",
                    zone.name()
                )));
            }
            if !self.swelling.get(zone).is_finite() {
                return Err(PappusError::Configuration(format!(
                    "swelling coefficient of {} must be finite",
                    zone.name()
                )));
            }
        }
        if !self.anisotropy.is_finite() || self.anisotropy == -1.0 {
            return Err(PappusError::Configuration(format!(
                "anisotropy ratio must be finite and not -1, got {}",
                self.anisotropy
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_are_converted_to_model_units() {
        let params = ParameterSet::default();
        assert_relative_eq!(params.lx, 491.0 / 200.0);
        assert_relative_eq!(params.ly, 1.2);
        assert_relative_eq!(params.arc_radius(), (363.0 - 38.8) / 200.0);
        assert_relative_eq!(params.vd, 15.3 / 200.0);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_swelling_inputs_are_shrinkage() {
        let params = ParameterSet::default();
        assert_relative_eq!(params.swelling.mesophyll, -0.464888);
        assert_relative_eq!(params.swelling.vasculature, -0.236087);
        assert_relative_eq!(params.modulus_ratios.vasculature, 1.0);
        assert_relative_eq!(
            params.modulus_ratios.nectary,
            DENSITY_PODIUM / DENSITY_VASCULATURE
        );
    }

    #[test]
    fn test_incompressible_material_is_rejected() {
        let inputs = PhysicalInputs {
            poisson_ratio: 0.5,
            ..PhysicalInputs::default()
        };
        let err = ParameterSet::from_physical(&inputs).unwrap_err();
        assert!(matches!(err, PappusError::Configuration(_)));
    }

    #[test]
    fn test_negative_modulus_ratio_is_rejected() {
        let mut params = ParameterSet::default();
        params.modulus_ratios.side = -0.5;
        assert!(matches!(
            params.validate(),
            Err(PappusError::Configuration(_))
        ));
    }

    #[test]
    fn test_non_positive_length_is_rejected() {
        let inputs = PhysicalInputs {
            cavity_width: 0.0,
            ..PhysicalInputs::default()
        };
        assert!(ParameterSet::from_physical(&inputs).is_err());
    }

    #[test]
    fn test_json_overrides() {
        let input = json::parse(r#"{"parameters": {"D": 500.0, "ani": 0.5, "bogus": 1}}"#)
            .unwrap();
        let mut inputs = PhysicalInputs::default();
        inputs.apply_json(&input).unwrap();
        assert_relative_eq!(inputs.width, 500.0);
        assert_relative_eq!(inputs.anisotropy, 0.5);
        assert_relative_eq!(inputs.height, 240.0);
    }

    #[test]
    fn test_json_non_numeric_value_is_rejected() {
        let input = json::parse(r#"{"parameters": {"H": "tall"}}"#).unwrap();
        let mut inputs = PhysicalInputs::default();
        assert!(inputs.apply_json(&input).is_err());

        let missing = json::parse(r#"{"other": {}}"#).unwrap();
        assert!(inputs.apply_json(&missing).is_err());
    }
}
