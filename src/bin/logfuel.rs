use chrono::NaiveDate;
use clap::Parser;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{error, info, LevelFilter};
use pumpstat::{Coord, FuelAmount, FuelObservation, PumpStatResult, StationDatabase};
use serde::Deserialize;
use simple_logger::SimpleLogger;
use std::{
    fmt::{self, Display},
    path::PathBuf,
    thread::{self, JoinHandle},
};

const CHANNEL_SIZE: usize = 100;

/*-------------------------------------------------------------------------------------------------
 *                                     Command Line Options
 *-----------------------------------------------------------------------------------------------*/
///
/// Import fuel purchase logs into the stations database.
///
/// This program walks a directory tree of CSV exports (or takes a single CSV file), matches
/// every located purchase onto a station cluster, and stores the records so they can be served
/// by price queries. Purchases without coordinates are stored without a station.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "logfuel")]
#[clap(author, version, about)]
struct LogFuelOptionsInit {
    /// The path to the stations database file.
    ///
    /// If this is not specified, then the program will check for it in the "STATIONS_DB"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "STATIONS_DB")]
    stations_store_file: PathBuf,

    /// A CSV file or a directory tree of CSV files to import.
    import_path: PathBuf,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

#[derive(Debug)]
struct LogFuelOptionsChecked {
    /// The path to the database file.
    stations_store_file: PathBuf,

    /// The file or directory to import.
    import_path: PathBuf,

    /// Verbose output
    verbose: bool,
}

impl Display for LogFuelOptionsChecked {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        writeln!(f, "\n")?; // yes, two blank lines.
        writeln!(f, "    Database: {}", self.stations_store_file.display())?;
        writeln!(f, "      Import: {}", self.import_path.display())?;
        writeln!(f, "\n")?; // yes, two blank lines.

        Ok(())
    }
}

/// Get the command line arguments and check them.
///
/// If there is missing data, try to fill it in with environment variables.
fn parse_args() -> PumpStatResult<LogFuelOptionsChecked> {
    let LogFuelOptionsInit {
        stations_store_file,
        import_path,
        verbose,
    } = LogFuelOptionsInit::parse();

    if !import_path.exists() {
        return Err(format!("import path does not exist: {}", import_path.display()).into());
    }

    let checked = LogFuelOptionsChecked {
        stations_store_file,
        import_path,
        verbose,
    };

    if verbose {
        info!("{}", checked);
    }

    Ok(checked)
}

/*-------------------------------------------------------------------------------------------------
 *                                        CSV Row Parsing
 *-----------------------------------------------------------------------------------------------*/
/// One row of a fuel log CSV export.
///
/// Everything except the date and the fuel type is optional. An empty field
/// deserializes to None.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    /// The day the purchase was made, as YYYY-MM-DD.
    date: NaiveDate,
    /// The fuel type label, for example "Gasoline (Unleaded)".
    fuel_type: String,
    /// Either "liters" or "kwh". Only consulted when quantity is present.
    quantity_kind: String,
    quantity: Option<f64>,
    cost: Option<f64>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    location: Option<String>,
}

impl CsvRecord {
    fn into_observation(self) -> PumpStatResult<FuelObservation> {
        if self.fuel_type.trim().is_empty() {
            return Err("missing fuel type".into());
        }

        let amount = match self.quantity {
            Some(value) => match self.quantity_kind.as_str() {
                "liters" => Some(FuelAmount::Liters(value)),
                "kwh" => Some(FuelAmount::Kwh(value)),
                other => return Err(format!("unknown quantity kind: {}", other).into()),
            },
            None => None,
        };

        // A lone latitude or longitude is as useless as neither.
        let coord = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Coord { lat, lon }),
            _ => None,
        };

        Ok(FuelObservation {
            date: self.date,
            fuel_type: self.fuel_type,
            amount,
            cost: self.cost,
            coord,
            location: self.location,
        })
    }
}

/*-------------------------------------------------------------------------------------------------
 *                                       Pipeline Threads
 *-----------------------------------------------------------------------------------------------*/
fn start_path_generation_thread(
    import_path: PathBuf,
    to_parse_thread: Sender<walkdir::DirEntry>,
) -> PumpStatResult<JoinHandle<u64>> {
    let jh = thread::Builder::new()
        .name("logfuel-path_gen".to_owned())
        .spawn(move || {
            let mut files = 0_u64;

            for entry in walkdir::WalkDir::new(&import_path)
                .into_iter()
                .filter_map(|res| res.ok())
                // Ignore directories, WalkDir will take care of recursing into them.
                .filter(|entry| entry.path().is_file())
                // Only consider CSV files.
                .filter(|entry| {
                    entry
                        .file_name()
                        .to_string_lossy()
                        .to_lowercase()
                        .ends_with(".csv")
                })
            {
                log::debug!("Scanning {}", entry.path().display());
                files += 1;
                to_parse_thread.send(entry).unwrap();
            }

            files
        })?;

    Ok(jh)
}

fn start_parse_thread(
    from_path_gen: Receiver<walkdir::DirEntry>,
    to_database_thread: Sender<FuelObservation>,
) -> PumpStatResult<JoinHandle<(u64, u64)>> {
    let jh = thread::Builder::new()
        .name("logfuel-parse".to_owned())
        .spawn(move || {
            let mut parsed = 0_u64;
            let mut rejected = 0_u64;

            for entry in from_path_gen {
                let mut reader = match csv::Reader::from_path(entry.path()) {
                    Ok(reader) => reader,
                    Err(err) => {
                        error!("Error opening {}: {}", entry.path().display(), err);
                        continue;
                    }
                };

                for row in reader.deserialize::<CsvRecord>() {
                    let record = match row {
                        Ok(record) => record,
                        Err(err) => {
                            error!("Malformed row in {}: {}", entry.path().display(), err);
                            rejected += 1;
                            continue;
                        }
                    };

                    match record.into_observation() {
                        Ok(obs) => {
                            to_database_thread.send(obs).unwrap();
                            parsed += 1;
                        }
                        Err(err) => {
                            error!("Rejected row in {}: {}", entry.path().display(), err);
                            rejected += 1;
                        }
                    }
                }
            }

            (parsed, rejected)
        })?;

    Ok(jh)
}

/// Running totals from the database thread.
#[derive(Debug, Default)]
struct IngestTotals {
    stored: u64,
    created: u64,
    matched: u64,
    unclustered: u64,
    failed: u64,
}

fn start_database_thread(
    stations_store_file: PathBuf,
    from_parse_thread: Receiver<FuelObservation>,
) -> PumpStatResult<JoinHandle<IngestTotals>> {
    let jh = thread::Builder::new()
        .name("logfuel-database".to_owned())
        .spawn(move || {
            let mut db = StationDatabase::connect(&stations_store_file).unwrap();

            let mut totals = IngestTotals::default();

            for obs in from_parse_thread {
                match db.add_observation(&obs) {
                    Ok(Some(outcome)) => {
                        totals.stored += 1;
                        if outcome.was_created() {
                            totals.created += 1;
                        } else {
                            totals.matched += 1;
                        }
                    }
                    Ok(None) => {
                        totals.stored += 1;
                        totals.unclustered += 1;
                    }
                    Err(err) => {
                        error!("Error storing observation: {}", err);
                        totals.failed += 1;
                    }
                }
            }

            totals
        })?;

    Ok(jh)
}

/*-------------------------------------------------------------------------------------------------
 *                                             MAIN
 *-----------------------------------------------------------------------------------------------*/
fn main() -> PumpStatResult<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .with_module_level("logfuel", LevelFilter::Debug)
        .init()?;

    let opts = parse_args()?;

    // Make sure the schema exists before any worker opens a connection.
    StationDatabase::initialize(&opts.stations_store_file)?;

    if opts.verbose {
        info!("Importing from {}", opts.import_path.display());
    }

    let (to_parse_thread, from_path_gen) = bounded(CHANNEL_SIZE);
    let (to_database_thread, from_parse_thread) = bounded(CHANNEL_SIZE);

    let path_gen = start_path_generation_thread(opts.import_path.clone(), to_parse_thread)?;
    let parse_thread = start_parse_thread(from_path_gen, to_database_thread)?;
    let db_thread = start_database_thread(opts.stations_store_file.clone(), from_parse_thread)?;

    let files = path_gen.join().unwrap();
    let (parsed, rejected) = parse_thread.join().unwrap();
    let totals = db_thread.join().unwrap();

    info!("");
    info!("Imported fuel purchase logs:");
    info!("       files scanned - {:>9}", files);
    info!("         rows parsed - {:>9}", parsed);
    info!("       rows rejected - {:>9}", rejected);
    info!("         rows stored - {:>9}", totals.stored);
    info!("    clusters created - {:>9}", totals.created);
    info!("     reports matched - {:>9}", totals.matched);
    info!("  stored unclustered - {:>9}", totals.unclustered);
    info!("    storage failures - {:>9}", totals.failed);
    info!("");

    Ok(())
}
