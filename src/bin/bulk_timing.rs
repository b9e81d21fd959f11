//! Compares the two insertion code paths on the same synthetic dataset:
//! one autocommit statement per feature versus batched transactions, then
//! shows what the R-tree does to an envelope query.
//!
//! Usage:
//!   cargo run --release --features wkt --bin bulk_timing <output.gpkg> [rows]

use gpkg_bulk::types::{BulkInsertOptions, ColumnSpec, ColumnType, Envelope, LayerOptions};
use gpkg_bulk::{Gpkg, GpkgLayer, SWEREF99_TM_DEFINITION, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::str::FromStr;
use std::time::{Duration, Instant};
use wkt::Wkt;

const DEFAULT_ROWS: usize = 10_000;
const BATCH_SIZES: [usize; 3] = [100, 1_000, 10_000];

// Synthetic extent roughly covering Sweden in SWEREF99 TM metres.
const MIN_X: f64 = 280_000.0;
const MAX_X: f64 = 920_000.0;
const MIN_Y: f64 = 6_130_000.0;
const MAX_Y: f64 = 7_680_000.0;

fn main() {
    if let Err(err) = run() {
        eprintln!("bulk_timing failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .ok_or("Usage: bulk_timing <output.gpkg> [rows]")?;
    let rows = match std::env::args().nth(2) {
        Some(arg) => arg.parse::<usize>()?,
        None => DEFAULT_ROWS,
    };

    let gpkg = Gpkg::create(&path)?;
    gpkg.register_srs(
        "SWEREF99 TM",
        3006,
        "EPSG",
        3006,
        SWEREF99_TM_DEFINITION,
        "Swedish national grid",
    )?;

    println!("Timing insertion paths with {rows} synthetic points...");
    let records = synthetic_points(rows)?;

    // Path 1: one statement per feature, autocommitted.
    let per_row_layer = point_layer(&gpkg, "per_row")?;
    let per_row_records = records.clone();
    let start = Instant::now();
    for (point, properties) in per_row_records {
        per_row_layer.insert(point, properties)?;
    }
    let per_row = start.elapsed();
    print_row("per-row insert", rows, per_row);

    // Path 2: batched transactions at several batch sizes.
    let mut batched = Vec::with_capacity(BATCH_SIZES.len());
    for batch_size in BATCH_SIZES {
        let layer = point_layer(&gpkg, &format!("batched_{batch_size}"))?;
        let options = BulkInsertOptions {
            batch_size,
            ..Default::default()
        };
        let batch_records = records.clone();
        let start = Instant::now();
        layer.bulk_insert(batch_records, &options)?;
        let elapsed = start.elapsed();
        print_row(&format!("bulk insert ({batch_size}/batch)"), rows, elapsed);
        batched.push(elapsed);
    }

    if let Some(best) = batched.iter().min() {
        println!(
            "\nBest batched path is {:.1}x faster than per-row inserts.",
            per_row.as_secs_f64() / best.as_secs_f64()
        );
    }

    // Envelope query, before and after indexing. The envelope covers
    // roughly a quarter of the synthetic extent.
    let envelope = Envelope::new(
        MIN_X,
        MIN_Y,
        MIN_X + (MAX_X - MIN_X) / 2.0,
        MIN_Y + (MAX_Y - MIN_Y) / 2.0,
    );
    let query_layer = gpkg.open_layer("batched_1000")?;

    println!("\nEnvelope query over {rows} rows:");
    let (hits, elapsed) = time_envelope_query(&query_layer, &envelope)?;
    println!("  full scan:    {:>10.2}ms  ({hits} hits)", ms(elapsed));

    let start = Instant::now();
    query_layer.build_spatial_index()?;
    println!("  index build:  {:>10.2}ms", ms(start.elapsed()));

    let (hits, elapsed) = time_envelope_query(&query_layer, &envelope)?;
    println!("  with R-tree:  {:>10.2}ms  ({hits} hits)", ms(elapsed));

    Ok(())
}

fn point_layer<'a>(gpkg: &'a Gpkg, name: &str) -> gpkg_bulk::Result<GpkgLayer<'a>> {
    let columns = vec![
        ColumnSpec::new("name", ColumnType::Text),
        ColumnSpec::new("value", ColumnType::Double),
    ];
    gpkg.ensure_layer(
        name,
        "geom",
        wkb::reader::GeometryType::Point,
        wkb::reader::Dimension::Xy,
        3006,
        &columns,
        &LayerOptions::default(),
    )
}

fn synthetic_points(rows: usize) -> Result<Vec<(Wkt<f64>, Vec<Value>)>, Box<dyn std::error::Error>> {
    // Fixed seed so repeated runs time the same workload.
    let mut rng = StdRng::seed_from_u64(3006);
    let mut records = Vec::with_capacity(rows);
    for i in 0..rows {
        let x = rng.gen_range(MIN_X..MAX_X);
        let y = rng.gen_range(MIN_Y..MAX_Y);
        let point = Wkt::<f64>::from_str(&format!("POINT ({x} {y})"))?;
        records.push((
            point,
            vec![
                Value::Text(format!("point {i}")),
                Value::Real(rng.gen_range(0.0..100.0)),
            ],
        ));
    }
    Ok(records)
}

fn time_envelope_query(
    layer: &GpkgLayer<'_>,
    envelope: &Envelope,
) -> gpkg_bulk::Result<(usize, Duration)> {
    let start = Instant::now();
    let hits = layer.features_in_envelope(envelope)?.len();
    Ok((hits, start.elapsed()))
}

fn print_row(label: &str, rows: usize, elapsed: Duration) {
    let rows_per_sec = rows as f64 / elapsed.as_secs_f64();
    println!(
        "  {label:<28} {:>10.2}ms  ({rows_per_sec:>10.0} rows/s)",
        ms(elapsed)
    );
}

fn ms(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}
