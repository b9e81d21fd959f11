use gpkg_bulk::types::{ColumnSpec, ColumnType, LayerOptions, ReadOptions};
use gpkg_bulk::{Gpkg, SWEREF99_TM_DEFINITION, Value};
use std::str::FromStr;
use wkt::Wkt;
use wkt::to_wkt::write_geometry;

// A handful of Swedish cities in SWEREF99 TM (EPSG:3006) metres.
const CITIES: [(&str, i64, f64, f64); 5] = [
    ("Stockholm", 978_770, 674_032.0, 6_580_822.0),
    ("Gothenburg", 587_549, 319_180.0, 6_399_862.0),
    ("Malmö", 347_949, 374_096.0, 6_164_244.0),
    ("Uppsala", 233_839, 647_749.0, 6_638_173.0),
    ("Kiruna", 22_243, 717_556.0, 7_534_563.0),
];

fn main() {
    if let Err(err) = run() {
        eprintln!("quickstart failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .ok_or("Usage: quickstart <output.gpkg>")?;

    let gpkg = Gpkg::create(&path)?;
    gpkg.register_srs(
        "SWEREF99 TM",
        3006,
        "EPSG",
        3006,
        SWEREF99_TM_DEFINITION,
        "Swedish national grid",
    )?;

    let columns = vec![
        ColumnSpec::new("name", ColumnType::Text),
        ColumnSpec::new("population", ColumnType::Integer),
    ];
    let layer = gpkg.ensure_layer(
        "cities",
        "geom",
        wkb::reader::GeometryType::Point,
        wkb::reader::Dimension::Xy,
        3006,
        &columns,
        &LayerOptions::default(),
    )?;

    for (name, population, x, y) in CITIES {
        let point = Wkt::<f64>::from_str(&format!("POINT ({x} {y})"))?;
        layer.insert(
            point,
            vec![Value::Text(name.to_string()), Value::Integer(population)],
        )?;
    }

    println!("wrote {} cities to {path}", layer.count()?);

    for feature in layer.features(&ReadOptions::default())? {
        let mut wkt = String::new();
        write_geometry(&mut wkt, &feature.geometry()?)?;
        let name: String = feature.property("name")?;
        let population: i64 = feature.property("population")?;
        println!("  {}: {name} ({population} inhabitants) at {wkt}", feature.id());
    }

    Ok(())
}
