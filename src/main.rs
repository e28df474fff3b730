use std::path::PathBuf;

use clap::Parser;
use log::error;

mod datatypes;
mod deformer;
mod error;
mod geometry;
mod material;
mod mesher;
mod metrics;
mod parameters;
mod pipeline;
mod post_processor;
mod regions;
mod solver;

use error::Result;
use parameters::{ParameterSet, PhysicalInputs};

/// Swelling-driven bending of a dandelion pappus actuator cross-section.
///
/// Lengths are in micrometres. Flags override values from `--input`, which
/// override the measured defaults.
#[derive(Parser, Debug)]
#[command(name = "pappus")]
struct Args {
    /// Output directory for the mesh csv files
    #[arg(long, default_value = ".")]
    out: PathBuf,
    /// Json file with a `parameters` object of overrides
    #[arg(long)]
    input: Option<String>,
    /// Actuator width
    #[arg(short = 'D')]
    width: Option<f64>,
    /// Actuator height
    #[arg(short = 'H')]
    height: Option<f64>,
    /// Floral podium height
    #[arg(long = "hpod")]
    podium_height: Option<f64>,
    /// Measured outer radius of the podium
    #[arg(short = 'R')]
    radius: Option<f64>,
    /// Side height
    #[arg(long = "hside")]
    side_height: Option<f64>,
    /// Side width
    #[arg(long = "wside")]
    side_width: Option<f64>,
    /// Vasculature thickness
    #[arg(long = "wvasculature")]
    vasculature_thickness: Option<f64>,
    /// Cavity width
    #[arg(long = "dcavity")]
    cavity_width: Option<f64>,
    /// Lateral displacement of each vascular bundle
    #[arg(long = "dvasc")]
    vasculature_displacement: Option<f64>,
    /// Anisotropy of the swelling
    #[arg(long)]
    ani: Option<f64>,
    /// Cortex shrinkage
    #[arg(long)]
    scort: Option<f64>,
    /// Floral podium shrinkage
    #[arg(long)]
    spod: Option<f64>,
    /// Side shrinkage
    #[arg(long)]
    sside: Option<f64>,
    /// Vasculature shrinkage
    #[arg(long)]
    svasc: Option<f64>,
    /// Boundary segments per unit length
    #[arg(long)]
    nvertex: Option<f64>,
}

impl Args {
    fn apply(&self, inputs: &mut PhysicalInputs) {
        let overrides = [
            (self.width, &mut inputs.width),
            (self.height, &mut inputs.height),
            (self.podium_height, &mut inputs.podium_height),
            (self.radius, &mut inputs.outer_radius),
            (self.side_height, &mut inputs.side_height),
            (self.side_width, &mut inputs.side_width),
            (self.vasculature_thickness, &mut inputs.vasculature_thickness),
            (self.cavity_width, &mut inputs.cavity_width),
            (self.vasculature_displacement, &mut inputs.vasculature_displacement),
            (self.ani, &mut inputs.anisotropy),
            (self.scort, &mut inputs.swelling_cortex),
            (self.spod, &mut inputs.swelling_podium),
            (self.sside, &mut inputs.swelling_side),
            (self.svasc, &mut inputs.swelling_vasculature),
            (self.nvertex, &mut inputs.mesh_density),
        ];
        for (value, field) in overrides {
            if let Some(value) = value {
                *field = value;
            }
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let mut inputs = PhysicalInputs::default();
    if let Some(input_file) = &args.input {
        inputs.apply_json(&parameters::load_input_file(input_file)?)?;
    }
    args.apply(&mut inputs);

    let params = ParameterSet::from_physical(&inputs)?;
    let simulation = pipeline::run(&params)?;

    post_processor::csv_output(
        &args.out,
        &simulation.original,
        &simulation.deformed,
        &simulation.zones,
        &simulation.displacement,
        &simulation.stress,
    )?;
    println!("{}", post_processor::report(&simulation.report));

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(err) = run(&args) {
        error!("{err}");
        std::process::exit(1);
    }
}
