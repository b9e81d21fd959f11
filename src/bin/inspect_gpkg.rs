use gpkg_bulk::Gpkg;

fn main() {
    if let Err(err) = run() {
        eprintln!("inspect_gpkg failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .ok_or("Usage: inspect_gpkg <path-to-gpkg>")?;
    let gpkg = Gpkg::open_read_only(&path)?;

    let layers = gpkg.list_layers()?;
    println!("{path}: {} feature layer(s)", layers.len());

    for layer_name in layers {
        let layer = gpkg.open_layer(&layer_name)?;
        println!("\nlayer: {layer_name}");
        println!(
            "  geometry: \"{}\" ({:?}, {:?}, srs_id {})",
            layer.geometry_column, layer.geometry_type, layer.geometry_dimension, layer.srs_id
        );
        println!("  primary key: \"{}\"", layer.primary_key_column);

        if layer.property_columns.is_empty() {
            println!("  properties: (none)");
        } else {
            println!("  properties:");
            for column in &layer.property_columns {
                println!("    \"{}\" {}", column.name, column.column_type);
            }
        }

        println!("  features: {}", layer.count()?);
        println!(
            "  spatial index: {}",
            if layer.has_spatial_index()? {
                "yes"
            } else {
                "no"
            }
        );
    }

    Ok(())
}
