use chrono::Utc;
use clap::Parser;
use log::info;
use pumpstat::{
    nearby_prices, NearbyQuery, PumpStatResult, StationDatabase, StationPriceSummary, TimeWindow,
    DEFAULT_RADIUS_KM,
};
use serde::Serialize;
use simple_logger::SimpleLogger;
use std::{
    fmt::{self, Display},
    path::PathBuf,
};
use strum::IntoEnumIterator;

/// Attached to every result when a strictly-today query came back empty.
const FALLBACK_MESSAGE: &str = "No prices today. Showing last 24 hours.";

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Show fuel prices at the stations near a point.
///
/// This program queries the stations database for clusters within a radius of the given
/// coordinates and prints a recency weighted price summary for each one, nearest first. When a
/// "today" query finds nothing, the search widens to the last 24 hours and says so.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "nearbyprices")]
#[clap(author, version, about)]
struct NearbyPricesOptionsInit {
    /// The path to the stations database file.
    ///
    /// If this is not specified, then the program will check for it in the "STATIONS_DB"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "STATIONS_DB")]
    stations_store_file: PathBuf,

    /// The latitude of the search center, -90 to 90.
    lat: f64,

    /// The longitude of the search center, -180 to 180.
    lon: f64,

    /// The time window to consider: today, 24h, 3d, or 7d.
    #[clap(parse(try_from_str=parse_time_window))]
    #[clap(default_value = "3d")]
    window: TimeWindow,

    /// The search radius in kilometers, 0.1 to 50.
    #[clap(short, long)]
    #[clap(default_value_t = DEFAULT_RADIUS_KM)]
    radius: f64,

    /// Only count fuel types containing this text, for example "Gasoline" or "Diesel".
    ///
    /// Matching is case sensitive, so "Gasoline" covers "Gasoline (Premium)" but "gasoline"
    /// covers nothing.
    #[clap(short, long)]
    fuel_type: Option<String>,

    /// Print the results as JSON instead of a table.
    #[clap(long)]
    json: bool,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

/// Parse a command line time window token.
fn parse_time_window(token: &str) -> PumpStatResult<TimeWindow> {
    let window = TimeWindow::from_token(token).ok_or_else(|| {
        let valid: Vec<&str> = TimeWindow::iter().map(|w| w.name()).collect();
        format!(
            "not a valid time window: {}, expected one of {}",
            token,
            valid.join(", ")
        )
    })?;

    Ok(window)
}

#[derive(Debug)]
struct NearbyPricesOptionsChecked {
    /// The path to the database file.
    stations_store_file: PathBuf,

    /// The validated query.
    query: NearbyQuery,

    /// The window the query starts from.
    window: TimeWindow,

    /// Print JSON.
    json: bool,

    /// Verbose output
    verbose: bool,
}

impl Display for NearbyPricesOptionsChecked {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        writeln!(f, "\n")?; // yes, two blank lines.
        writeln!(f, "     Database: {}", self.stations_store_file.display())?;
        writeln!(f, "       Center: {}", self.query.center())?;
        writeln!(f, "       Radius: {:.1} km", self.query.radius_km())?;
        writeln!(
            f,
            "    Fuel Type: {}",
            self.query.fuel_type().unwrap_or("any")
        )?;
        writeln!(
            f,
            "       Window: {} ({} days back)",
            self.window.name(),
            self.query.days_back()
        )?;
        writeln!(f, "\n")?; // yes, two blank lines.

        Ok(())
    }
}

/// Get the command line arguments and check them.
///
/// If there is missing data, try to fill it in with environment variables.
fn parse_args() -> PumpStatResult<NearbyPricesOptionsChecked> {
    let NearbyPricesOptionsInit {
        stations_store_file,
        lat,
        lon,
        window,
        radius,
        fuel_type,
        json,
        verbose,
    } = NearbyPricesOptionsInit::parse();

    let query = NearbyQuery::new(lat, lon, radius, window.days_back(), fuel_type)?;

    let checked = NearbyPricesOptionsChecked {
        stations_store_file,
        query,
        window,
        json,
        verbose,
    };

    if verbose {
        info!("{}", checked);
    }

    Ok(checked)
}

/*-------------------------------------------------------------------------------------------------
 *                                         Printing
 *-----------------------------------------------------------------------------------------------*/
#[derive(Serialize)]
struct JsonReport<'a> {
    time_window: &'a str,
    days_back: i64,
    count: usize,
    stations: &'a [StationPriceSummary],
}

fn print_json(window: TimeWindow, summaries: &[StationPriceSummary]) -> PumpStatResult<()> {
    let report = JsonReport {
        time_window: window.name(),
        days_back: window.days_back(),
        count: summaries.len(),
        stations: summaries,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

fn print_table(
    opts: &NearbyPricesOptionsChecked,
    window: TimeWindow,
    summaries: &[StationPriceSummary],
) {
    if summaries.is_empty() {
        println!(
            "No stations with usable prices within {:.1} km for the {} window.",
            opts.query.radius_km(),
            window.name()
        );
        return;
    }

    println!(
        "{} station(s) within {:.1} km of {}, {} window, nearest first.",
        summaries.len(),
        opts.query.radius_km(),
        opts.query.center(),
        window.name()
    );

    for summary in summaries {
        println!();
        println!("{}", summary.name);
        println!("        cluster - {}", summary.cluster_id);
        println!(
            "       location - ({:.6}, {:.6})",
            summary.latitude, summary.longitude
        );
        println!("       distance - {:>8.2} km", summary.distance_km);
        println!("      avg price - {:>8.2}", summary.avg_price_per_unit);
        println!("      min price - {:>8.2}", summary.min_price);
        println!("      max price - {:>8.2}", summary.max_price);
        println!("        samples - {:>8}", summary.sample_count);
        println!(
            "   last updated - {} ({} hours ago)",
            summary.last_updated, summary.hours_since_update
        );

        for fuel in &summary.fuel_prices {
            println!(
                "      {:<28} avg {:>8.2}  min {:>8.2}  max {:>8.2}  samples {}",
                fuel.fuel_type,
                fuel.avg_price_per_unit,
                fuel.min_price,
                fuel.max_price,
                fuel.sample_count
            );
        }

        if let Some(ref message) = summary.fallback_message {
            println!("   note: {}", message);
        }
    }

    println!();
}

/*-------------------------------------------------------------------------------------------------
 *                                             MAIN
 *-----------------------------------------------------------------------------------------------*/
fn main() -> PumpStatResult<()> {
    SimpleLogger::new().init()?;

    let opts = parse_args()?;

    let db = StationDatabase::connect(&opts.stations_store_file)?;

    let now = Utc::now();
    let mut window = opts.window;
    let mut summaries = nearby_prices(&db, &opts.query, now)?;

    // A strictly-today query with nothing to show widens to the last 24 hours.
    if summaries.is_empty() && opts.window == TimeWindow::Today {
        window = TimeWindow::Last24Hours;
        let widened = opts.query.with_days_back(window.days_back());
        summaries = nearby_prices(&db, &widened, now)?;

        for summary in summaries.iter_mut() {
            summary.is_fallback = true;
            summary.fallback_message = Some(FALLBACK_MESSAGE.to_string());
        }
    }

    if opts.verbose {
        info!("Aggregated {} station(s).", summaries.len());
    }

    if opts.json {
        print_json(window, &summaries)?;
    } else {
        print_table(&opts, window, &summaries);
    }

    Ok(())
}
