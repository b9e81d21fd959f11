//! Runs an envelope query against a layer, building the R-tree first when
//! asked. The envelope is given in the layer's coordinate reference system
//! (SWEREF99 TM metres for files written by `quickstart`).
//!
//! Usage:
//!   cargo run --features wkt --bin spatial_query -- <path.gpkg> <layer> \
//!     <min_x> <min_y> <max_x> <max_y> [--index]

use gpkg_bulk::types::Envelope;
use gpkg_bulk::{Gpkg, Value};
use wkt::to_wkt::write_geometry;

fn main() {
    if let Err(err) = run() {
        eprintln!("spatial_query failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    const USAGE: &str =
        "Usage: spatial_query <path.gpkg> <layer> <min_x> <min_y> <max_x> <max_y> [--index]";

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 6 {
        return Err(USAGE.into());
    }
    let path = &args[0];
    let layer_name = &args[1];
    let envelope = Envelope::new(
        args[2].parse()?,
        args[3].parse()?,
        args[4].parse()?,
        args[5].parse()?,
    );
    let build_index = args.get(6).map(String::as_str) == Some("--index");

    let gpkg = if build_index {
        Gpkg::open(path)?
    } else {
        Gpkg::open_read_only(path)?
    };
    let layer = gpkg.open_layer(layer_name)?;

    if build_index {
        layer.build_spatial_index()?;
        println!("built R-tree index for \"{layer_name}\"");
    }

    let features = layer.features_in_envelope(&envelope)?;
    println!(
        "{} of {} features intersect ({}, {}) - ({}, {}){}",
        features.len(),
        layer.count()?,
        envelope.min_x,
        envelope.min_y,
        envelope.max_x,
        envelope.max_y,
        if layer.has_spatial_index()? {
            " [via R-tree]"
        } else {
            " [full scan]"
        }
    );

    for feature in features {
        let mut wkt = String::new();
        write_geometry(&mut wkt, &feature.geometry()?)?;

        let mut values = Vec::with_capacity(layer.property_columns.len());
        for column in &layer.property_columns {
            let value = feature.property::<Value>(&column.name)?;
            values.push(format!("{}={}", column.name, format_value(&value)));
        }

        println!("  {}: {wkt} | {}", feature.id(), values.join(", "));
    }

    Ok(())
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(value) => value.to_string(),
        Value::Real(value) => value.to_string(),
        Value::Text(value) => value.clone(),
        Value::Blob(value) => format!("{value:?}"),
    }
}
