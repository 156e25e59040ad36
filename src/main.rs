// jogja_ingestor/src/main.rs
// Entry point for the jogja-ingestor CLI application.

use std::process::ExitCode;

use clap::Parser;
use jogja_ingestor::cli::{BoxArgs, Cli, Commands, ImportArgs, NearbyArgs, StoreArgs};
use jogja_ingestor::error::{IngestorError, Result};
use jogja_ingestor::importer::Importer;
use jogja_ingestor::mongo::MongoStore;
use jogja_ingestor::proximity;
use jogja_ingestor::repair::repair_geospatial;
use jogja_ingestor::source::open_csv;
use jogja_ingestor::store::MemoryStore;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let file_appender = tracing_appender::rolling::never(".", "jogja-ingestor.log",);
    let (non_blocking, _guard,) = tracing_appender::non_blocking(file_appender,);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info",),),)
        .with(fmt::layer().with_writer(std::io::stderr,),)
        .with(fmt::layer().with_writer(non_blocking,).with_ansi(false,),)
        .init();

    let cli = Cli::parse();
    let res = match &cli.command {
        Commands::Import(args,) => handle_import(args, cli.report,).await,
        Commands::RepairGeo(args,) => handle_repair(args, cli.report,).await,
        Commands::Nearby(args,) => handle_nearby(args,).await,
        Commands::WithinBox(args,) => handle_within_box(args,).await,
    };

    match res {
        Ok((),) => ExitCode::SUCCESS,
        Err(e,) => {
            error!("{}", e);
            ExitCode::FAILURE
        },
    }
}

async fn connect(args: &StoreArgs,) -> Result<MongoStore,> {
    let uri = args.uri.as_deref().filter(|u| !u.trim().is_empty(),).ok_or_else(|| {
        IngestorError::ConfigurationError(
            "MONGODB_URI is not set (use --uri, the environment or a .env file)".to_string(),
        )
    },)?;
    MongoStore::connect(uri, &args.database, &args.collection, args.connect_timeout(),).await
}

fn save_report<T: Serialize,>(report: &T, file_name: &str,) -> Result<(),> {
    let json = serde_json::to_string_pretty(report,)
        .map_err(|e| IngestorError::Other(format!("Failed to serialize report: {}", e),),)?;
    std::fs::write(file_name, json,)
        .map_err(|e| IngestorError::Other(format!("Failed to write {}: {}", file_name, e),),)?;
    info!("Report saved to {}", file_name);
    Ok((),)
}

async fn handle_import(args: &ImportArgs, write_report: bool,) -> Result<(),> {
    let source = open_csv(&args.path,).await?;
    let report = if args.dry_run {
        info!("Dry run: importing into an in-memory store");
        let store = MemoryStore::new();
        Importer::new(&store, args.import_config(),).run(source.into_rows(),).await?
    } else {
        let store = connect(&args.store,).await?;
        Importer::new(&store, args.import_config(),).run(source.into_rows(),).await?
    };
    println!("{}", report);

    if write_report {
        save_report(&report, "import_report.json",)?;
    }
    Ok((),)
}

async fn handle_repair(args: &StoreArgs, write_report: bool,) -> Result<(),> {
    let store = connect(args,).await?;
    let report = repair_geospatial(&store,).await?;

    println!("Geospatial repair summary");
    println!("  Scanned:            {}", report.scanned);
    println!("  Fixed:              {}", report.fixed);
    println!("  Already consistent: {}", report.already_consistent);
    println!("  Invalid:            {}", report.invalid.len());
    println!("  Update failures:    {}", report.update_failures);
    println!("  Indexes:            {}", report.indexes.join(", "));

    if write_report {
        save_report(&report, "repair_report.json",)?;
    }
    Ok((),)
}

async fn handle_nearby(args: &NearbyArgs,) -> Result<(),> {
    let store = connect(&args.store,).await?;

    if args.by_category {
        let groups =
            proximity::nearby_by_category(&store, args.lat, args.lng, args.max_distance,).await?;
        for group in groups {
            println!(
                "{}: {} destinations, avg {:.0} m ({})",
                group.category,
                group.count,
                group.avg_distance_m,
                group.places.join(", ")
            );
        }
        return Ok((),);
    }

    let found = proximity::find_nearby(&store, args.lat, args.lng, args.max_distance,).await?;
    info!("Found {} destinations", found.len());
    for hit in found {
        println!(
            "{:>8.2} km  {} [{}] ({})",
            hit.distance_km, hit.record.place_name, hit.record.category, hit.record.city
        );
    }
    Ok((),)
}

async fn handle_within_box(args: &BoxArgs,) -> Result<(),> {
    let store = connect(&args.store,).await?;
    let found =
        proximity::find_within_box(&store, (args.south, args.west,), (args.north, args.east,),)
            .await?;
    info!("Found {} destinations", found.len());
    for record in found {
        println!(
            "{} [{}] ({}, {})",
            record.place_name, record.category, record.coordinate.lat, record.coordinate.lng
        );
    }
    Ok((),)
}
