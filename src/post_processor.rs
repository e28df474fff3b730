use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::info;

use crate::{
    datatypes::{Mesh, Zone},
    error::PappusError,
    metrics::SimulationReport,
    solver::DisplacementField,
};

pub const ORIGINAL_NODES_CSV: &str = "mesh-original-nodes.csv";
pub const ORIGINAL_ELEMENTS_CSV: &str = "mesh-original-elements.csv";
pub const DEFORMED_NODES_CSV: &str = "mesh-deformed-nodes.csv";
pub const DEFORMED_ELEMENTS_CSV: &str = "mesh-deformed-elements.csv";

fn create(output_dir: &Path, name: &str) -> Result<BufWriter<File>, PappusError> {
    let path = output_dir.join(name);
    File::create(&path).map(BufWriter::new).map_err(|err| {
        PappusError::PostProcessor(format!("Failed to create {}: {err}", path.display()))
    })
}

fn write_line(file: &mut impl Write, line: String, name: &str) -> Result<(), PappusError> {
    file.write_all(line.as_bytes())
        .map_err(|err| PappusError::PostProcessor(format!("Failed to write {name}: {err}")))
}

/// Writes the mesh vertices, optionally with their displacement
fn write_nodes(
    output_dir: &Path,
    name: &str,
    mesh: &Mesh,
    field: Option<&DisplacementField>,
) -> Result<(), PappusError> {
    let mut nodes_file = create(output_dir, name)?;

    match field {
        Some(field) => {
            write_line(&mut nodes_file, "x,y,ux,uy\n".to_owned(), name)?;
            for (i, vertex) in mesh.vertices.iter().enumerate() {
                let (ux, uy) = field.at_vertex(i);
                write_line(
                    &mut nodes_file,
                    format!("{x},{y},{ux},{uy}\n", x = vertex.x, y = vertex.y),
                    name,
                )?;
            }
        }
        None => {
            write_line(&mut nodes_file, "x,y\n".to_owned(), name)?;
            for vertex in &mesh.vertices {
                write_line(
                    &mut nodes_file,
                    format!("{x},{y}\n", x = vertex.x, y = vertex.y),
                    name,
                )?;
            }
        }
    }

    nodes_file
        .flush()
        .map_err(|err| PappusError::PostProcessor(format!("Failed to write {name}: {err}")))
}

/// Writes element connectivity with the zone plot index, optionally with the
/// stress magnitude of each element
fn write_elements(
    output_dir: &Path,
    name: &str,
    mesh: &Mesh,
    zones: &[Zone],
    stress: Option<&[[f64; 3]]>,
) -> Result<(), PappusError> {
    let mut elements_file = create(output_dir, name)?;

    let header = match stress {
        Some(_) => "n0,n1,n2,zone,stress\n",
        None => "n0,n1,n2,zone\n",
    };
    write_line(&mut elements_file, header.to_owned(), name)?;

    for (i, (element, zone)) in mesh.elements.iter().zip(zones).enumerate() {
        let [n0, n1, n2] = element.nodes;
        let zone = zone.plot_index();
        let line = match stress {
            Some(stress) => {
                let [sx, sy, _] = stress[i];
                format!("{n0},{n1},{n2},{zone},{}\n", f64::sqrt(sx * sx + sy * sy))
            }
            None => format!("{n0},{n1},{n2},{zone}\n"),
        };
        write_line(&mut elements_file, line, name)?;
    }

    elements_file
        .flush()
        .map_err(|err| PappusError::PostProcessor(format!("Failed to write {name}: {err}")))
}

/// Writes simulation results to four CSV files
///
/// # Arguments
/// * `output_dir` - Directory receiving the files; created if missing
/// * `original` - The undeformed mesh
/// * `deformed` - The deformed mesh
/// * `zones` - Zone of every element
/// * `field` - The solved displacement
/// * `stress` - Per-element stress `(sxx, syy, sxy)`
///
/// # Returns
/// Paths of the written files
pub fn csv_output(
    output_dir: &Path,
    original: &Mesh,
    deformed: &Mesh,
    zones: &[Zone],
    field: &DisplacementField,
    stress: &[[f64; 3]],
) -> Result<Vec<PathBuf>, PappusError> {
    std::fs::create_dir_all(output_dir).map_err(|err| {
        PappusError::PostProcessor(format!(
            "Failed to create output directory {}: {err}",
            output_dir.display()
        ))
    })?;

    write_nodes(output_dir, ORIGINAL_NODES_CSV, original, None)?;
    write_elements(output_dir, ORIGINAL_ELEMENTS_CSV, original, zones, None)?;
    write_nodes(output_dir, DEFORMED_NODES_CSV, deformed, Some(field))?;
    write_elements(output_dir, DEFORMED_ELEMENTS_CSV, deformed, zones, Some(stress))?;

    let written: Vec<PathBuf> = [
        ORIGINAL_NODES_CSV,
        ORIGINAL_ELEMENTS_CSV,
        DEFORMED_NODES_CSV,
        DEFORMED_ELEMENTS_CSV,
    ]
    .iter()
    .map(|name| output_dir.join(name))
    .collect();

    info!("wrote output to {}", output_dir.display());

    Ok(written)
}

/// Formats the area changes and the side angle
pub fn report(report: &SimulationReport) -> String {
    let rule = "----------------------";
    let ratios = &report.area_ratios;

    [
        rule.to_owned(),
        "Areachanges (Awet/Adry) :".to_owned(),
        rule.to_owned(),
        format!("{} -> {}", Zone::Mesophyll.name(), ratios.mesophyll),
        format!("{} -> {}", Zone::Nectary.name(), ratios.nectary),
        format!("{} -> {}", Zone::Side.name(), ratios.side),
        format!("{} -> {}", Zone::Vasculature.name(), ratios.vasculature),
        rule.to_owned(),
        format!("Generated side angle = {} degrees", report.side_angle),
        rule.to_owned(),
    ]
    .join("\n")
}
