use clap::Parser;
use log::info;
use pumpstat::{BoundingBox, Coord, PumpStatResult, StationDatabase};
use simple_logger::SimpleLogger;
use std::{
    fmt::{self, Display},
    path::PathBuf,
};

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// List the station clusters in the database.
///
/// This program prints every station cluster, or only the ones whose centroids fall inside a
/// bounding box, ordered by cluster id.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "showstations")]
#[clap(author, version, about)]
struct ShowStationsOptionsInit {
    /// The path to the stations database file.
    ///
    /// If this is not specified, then the program will check for it in the "STATIONS_DB"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "STATIONS_DB")]
    stations_store_file: PathBuf,

    /// Bounding Box as bottom_lat,left_lon,top_lat,right_lon
    #[clap(short, long)]
    #[clap(parse(try_from_str=parse_bbox))]
    bbox: Option<BoundingBox>,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

/// Parse a bounding box argument.
fn parse_bbox(bbox_str: &str) -> PumpStatResult<BoundingBox> {
    let corners: Vec<_> = bbox_str.split(',').collect();

    if corners.len() < 4 {
        return Err("Invalid number of coords".into());
    }

    let min_lat = corners[0].parse()?;
    let min_lon = corners[1].parse()?;
    let max_lat = corners[2].parse()?;
    let max_lon = corners[3].parse()?;

    if min_lat >= max_lat || min_lon >= max_lon {
        return Err(format!(
            concat!(
                "Minimum Lat/Lon must be less than Maximum Lat/Lon:",
                " min_lat={} max_lat={} min_lon={} max_lon={}"
            ),
            min_lat, max_lat, min_lon, max_lon
        )
        .into());
    }

    if min_lat < -90.0 || max_lat > 90.0 || min_lon < -180.0 || max_lon > 180.0 {
        return Err(format!(
            concat!(
                "Lat/Lon are out of range (-90.0 to 90.0 and -180.0 to 180.0):",
                " min_lat={} max_lat={} min_lon={} max_lon={}"
            ),
            min_lat, max_lat, min_lon, max_lon
        )
        .into());
    }

    let ll = Coord {
        lat: min_lat,
        lon: min_lon,
    };
    let ur = Coord {
        lat: max_lat,
        lon: max_lon,
    };

    Ok(BoundingBox { ll, ur })
}

#[derive(Debug)]
struct ShowStationsOptionsChecked {
    /// The path to the database file.
    stations_store_file: PathBuf,

    /// Bounding Box
    bbox: Option<BoundingBox>,

    /// Verbose output
    verbose: bool,
}

impl Display for ShowStationsOptionsChecked {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        writeln!(f, "\n")?; // yes, two blank lines.
        writeln!(f, "    Database: {}", self.stations_store_file.display())?;
        match self.bbox {
            Some(area) => writeln!(
                f,
                "Bounding Box: ({:.6}, {:.6}) <---> ({:.6}, {:.6})",
                area.ll.lat, area.ll.lon, area.ur.lat, area.ur.lon
            )?,
            None => writeln!(f, "Bounding Box: whole database")?,
        }
        writeln!(f, "\n")?; // yes, two blank lines.

        Ok(())
    }
}

/// Get the command line arguments and check them.
///
/// If there is missing data, try to fill it in with environment variables.
fn parse_args() -> PumpStatResult<ShowStationsOptionsChecked> {
    let ShowStationsOptionsInit {
        stations_store_file,
        bbox,
        verbose,
    } = ShowStationsOptionsInit::parse();

    let checked = ShowStationsOptionsChecked {
        stations_store_file,
        bbox,
        verbose,
    };

    if verbose {
        info!("{}", checked);
    }

    Ok(checked)
}

/*-------------------------------------------------------------------------------------------------
 *                                             MAIN
 *-----------------------------------------------------------------------------------------------*/
fn main() -> PumpStatResult<()> {
    SimpleLogger::new().init()?;

    let opts = parse_args()?;

    let db = StationDatabase::connect(&opts.stations_store_file)?;

    let stations = match opts.bbox {
        Some(area) => db.stations_in_region(area)?,
        None => db.all_stations()?,
    };

    if opts.verbose {
        info!("Retrieved {} station clusters.", stations.len());
    }

    for station in &stations {
        println!("{}", station);
    }

    Ok(())
}
