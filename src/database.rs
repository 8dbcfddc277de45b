/*!
 * SQLite persistence for station clusters and fuel observations.
 *
 * All durable state lives in a single SQLite file with two tables, stations
 * and observations. Reads can run from any connection at any time, but every
 * ingest goes through [StationDatabase::add_observation], which wraps the
 * whole match-or-create decision and the observation insert in one immediate
 * transaction. Two ingesters racing on the same new station would otherwise
 * both miss the lookup and both insert a cluster.
 */
use crate::{
    geo::{BoundingBox, Coord},
    location::{normalize_location, NormalizedLocation},
    observation::{FuelAmount, FuelObservation},
    station::{self, ResolveOutcome, StationCluster},
    PumpStatResult,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use log::debug;
use rusqlite::{Connection, OpenFlags, ToSql, TransactionBehavior};
use std::{path::Path, time::Duration};

/// Represents a connection to the database where ALL the station and observation data is stored.
pub struct StationDatabase {
    conn: Connection,
}

impl StationDatabase {
    /// Initialize a database.
    ///
    /// Initialize a database to make sure it exists and is set up properly. This should be run in
    /// the main thread before any other threads open a connection to the database to ensure
    /// consistency.
    pub fn initialize<P: AsRef<Path>>(path: P) -> PumpStatResult<()> {
        let path = path.as_ref();

        let _conn = Self::open_database_to_write(path)?;
        Ok(())
    }

    /// Open a connection to the database to store stations and observations.
    pub fn connect<P: AsRef<Path>>(path: P) -> PumpStatResult<Self> {
        let path = path.as_ref();

        let conn = Self::open_database_to_write(path)?;
        Ok(StationDatabase { conn })
    }

    fn open_database_to_write(path: &Path) -> PumpStatResult<Connection> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.busy_timeout(Duration::from_secs(5))?;

        conn.execute_batch(include_str!("database/create_station_db.sql"))?;

        Ok(conn)
    }

    /**
     * Record one fuel purchase observation.
     *
     * When the observation carries coordinates it is matched against the stored clusters near
     * those coordinates and either absorbed into the best match or used to create a new cluster,
     * then stored tagged with that cluster's id. The lookup, the cluster insert or update, and
     * the observation insert commit together or not at all.
     *
     * # Returns
     *
     * How the observation was clustered, or `None` when it had no coordinates and was stored
     * unclustered.
     */
    pub fn add_observation(
        &mut self,
        obs: &FuelObservation,
    ) -> PumpStatResult<Option<ResolveOutcome>> {
        let norm = normalize_location(obs.location.as_deref());
        let now = Utc::now();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let outcome = match obs.coord {
            Some(coord) => Some(resolve_station(&tx, coord, &norm, now)?),
            None => None,
        };

        let (liters, kwh) = match obs.amount {
            Some(FuelAmount::Liters(val)) => (Some(val), None),
            Some(FuelAmount::Kwh(val)) => (None, Some(val)),
            None => (None, None),
        };

        // The normalized name is only meaningful for observations that went through clustering.
        let normalized_location = outcome.as_ref().map(|_| norm.normalized_name.as_str());
        let cluster_id = outcome.as_ref().map(|o| o.cluster_id());

        tx.prepare_cached(include_str!("database/add_observation.sql"))?
            .execute([
                &date_to_timestamp(obs.date) as &dyn ToSql,
                &obs.fuel_type,
                &liters,
                &kwh,
                &obs.cost,
                &obs.coord.map(|c| c.lat),
                &obs.coord.map(|c| c.lon),
                &obs.location,
                &normalized_location,
                &cluster_id,
            ])?;

        tx.commit()?;

        Ok(outcome)
    }

    /// Get all the station clusters whose centroids fall inside `area`.
    ///
    /// Results come back ordered by cluster id.
    pub fn stations_in_region(&self, area: BoundingBox) -> PumpStatResult<Vec<StationCluster>> {
        stations_in_region_conn(&self.conn, area)
    }

    /// Get every station cluster in the database, ordered by cluster id.
    pub fn all_stations(&self) -> PumpStatResult<Vec<StationCluster>> {
        let mut stmt = self
            .conn
            .prepare_cached(include_str!("database/query_all_stations.sql"))?;

        let rows = stmt.query_and_then([], row_to_station)?;

        let mut stations = vec![];
        for row in rows {
            stations.push(row?);
        }

        Ok(stations)
    }

    /// Look up a single station cluster by id.
    pub fn station(&self, cluster_id: &str) -> PumpStatResult<Option<StationCluster>> {
        let mut stmt = self
            .conn
            .prepare_cached(include_str!("database/query_station.sql"))?;

        let station = stmt
            .query_and_then([&cluster_id as &dyn ToSql], row_to_station)?
            .next()
            .transpose()?;

        Ok(station)
    }

    /**
     * Get the observations recorded against a station cluster on or after a date.
     *
     * Only the columns price aggregation works from come back, oldest first.
     */
    pub fn observations_for_station(
        &self,
        cluster_id: &str,
        since: NaiveDate,
    ) -> PumpStatResult<Vec<StationObservationRow>> {
        let mut stmt = self
            .conn
            .prepare_cached(include_str!("database/query_station_observations.sql"))?;

        let rows = stmt.query_and_then(
            [&cluster_id as &dyn ToSql, &date_to_timestamp(since)],
            row_to_observation,
        )?;

        let mut observations = vec![];
        for row in rows {
            observations.push(row?);
        }

        Ok(observations)
    }
}

/// Match a report to a stored cluster or create one, inside the caller's transaction.
fn resolve_station(
    conn: &Connection,
    coord: Coord,
    norm: &NormalizedLocation,
    now: DateTime<Utc>,
) -> PumpStatResult<ResolveOutcome> {
    // The bounding box circumscribes the matching radius, so it can only over-select.
    // The exact distance check happens in find_best_match.
    let area = BoundingBox::around(coord, station::CLUSTER_RADIUS_KM);
    let candidates = stations_in_region_conn(conn, area)?;

    if let Some(index) = station::find_best_match(&candidates, coord, &norm.normalized_name) {
        let mut cluster = candidates
            .into_iter()
            .nth(index)
            .ok_or("matched station index out of range")?;

        cluster.absorb(coord, now);

        conn.prepare_cached(include_str!("database/update_station.sql"))?
            .execute([
                &cluster.centroid().lat as &dyn ToSql,
                &cluster.centroid().lon,
                &cluster.report_count(),
                &cluster.updated_at().timestamp(),
                &cluster.cluster_id(),
            ])?;

        debug!("matched report to station cluster {}", cluster.cluster_id());

        return Ok(ResolveOutcome::Matched(cluster.cluster_id().to_string()));
    }

    let cluster = StationCluster::from_observation(norm, coord, now);

    conn.prepare_cached(include_str!("database/add_station.sql"))?
        .execute([
            &cluster.cluster_id() as &dyn ToSql,
            &cluster.normalized_name(),
            &cluster.brand(),
            &cluster.street(),
            &cluster.centroid().lat,
            &cluster.centroid().lon,
            &cluster.report_count(),
            &cluster.created_at().timestamp(),
            &cluster.updated_at().timestamp(),
        ])?;

    debug!("created station cluster {}", cluster.cluster_id());

    Ok(ResolveOutcome::Created(cluster.cluster_id().to_string()))
}

fn stations_in_region_conn(
    conn: &Connection,
    area: BoundingBox,
) -> PumpStatResult<Vec<StationCluster>> {
    let mut stmt = conn.prepare_cached(include_str!("database/query_stations_in_region.sql"))?;

    let rows = stmt.query_and_then(
        [
            &area.ll.lat as &dyn ToSql,
            &area.ur.lat,
            &area.ll.lon,
            &area.ur.lon,
        ],
        row_to_station,
    )?;

    let mut stations = vec![];
    for row in rows {
        stations.push(row?);
    }

    Ok(stations)
}

fn row_to_station(row: &rusqlite::Row) -> PumpStatResult<StationCluster> {
    let cluster_id: String = row.get(0)?;
    let normalized_name: String = row.get(1)?;
    let brand: Option<String> = row.get(2)?;
    let street: Option<String> = row.get(3)?;
    let lat: f64 = row.get(4)?;
    let lon: f64 = row.get(5)?;
    let report_count: i64 = row.get(6)?;
    let created_at = timestamp_to_datetime(row.get(7)?)?;
    let updated_at = timestamp_to_datetime(row.get(8)?)?;

    Ok(StationCluster::new(
        cluster_id,
        normalized_name,
        brand.unwrap_or_default(),
        street.unwrap_or_default(),
        Coord { lat, lon },
        report_count,
        created_at,
        updated_at,
    ))
}

fn row_to_observation(row: &rusqlite::Row) -> PumpStatResult<StationObservationRow> {
    let date = timestamp_to_datetime(row.get(0)?)?.date_naive();
    let fuel_type: String = row.get(1)?;
    let liters: Option<f64> = row.get(2)?;
    let kwh: Option<f64> = row.get(3)?;
    let cost: Option<f64> = row.get(4)?;

    let amount = match (liters, kwh) {
        (Some(val), _) => Some(FuelAmount::Liters(val)),
        (None, Some(val)) => Some(FuelAmount::Kwh(val)),
        (None, None) => None,
    };

    Ok(StationObservationRow {
        date,
        fuel_type,
        amount,
        cost,
    })
}

/**
 * The slice of one stored observation that price aggregation works from.
 */
#[derive(Debug, Clone)]
pub struct StationObservationRow {
    /// The day the purchase was made.
    pub date: NaiveDate,
    /// Free form fuel type label, exactly as reported.
    pub fuel_type: String,
    /// How much fuel changed hands, if reported.
    pub amount: Option<FuelAmount>,
    /// Total cost of the purchase, if reported.
    pub cost: Option<f64>,
}

impl StationObservationRow {
    /// The unit price implied by this row, if the row is usable for pricing.
    ///
    /// A row is usable when it has a positive amount and a nonzero cost. Zero and negative
    /// amounts would make the division meaningless, and a zero cost is a free fill-up nobody
    /// wants averaged into their price estimate.
    pub fn price_per_unit(&self) -> Option<f64> {
        let amount = self.amount?.value();
        let cost = self.cost?;

        if amount > 0.0 && cost != 0.0 {
            Some(cost / amount)
        } else {
            None
        }
    }
}

/// Convert a date to the unix timestamp of its midnight, UTC.
fn date_to_timestamp(date: NaiveDate) -> i64 {
    NaiveDateTime::new(date, NaiveTime::MIN).and_utc().timestamp()
}

fn timestamp_to_datetime(timestamp: i64) -> PumpStatResult<DateTime<Utc>> {
    let datetime =
        DateTime::from_timestamp(timestamp, 0).ok_or("invalid timestamp in the database")?;
    Ok(datetime)
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    fn test_db() -> (TempDir, StationDatabase) {
        let dir = TempDir::new().unwrap();
        let db = StationDatabase::connect(dir.path().join("pumpstat_test.sqlite")).unwrap();
        (dir, db)
    }

    fn day(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn obs(
        date: NaiveDate,
        fuel_type: &str,
        amount: Option<FuelAmount>,
        cost: Option<f64>,
        coord: Option<Coord>,
        location: Option<&str>,
    ) -> FuelObservation {
        FuelObservation {
            date,
            fuel_type: fuel_type.to_string(),
            amount,
            cost,
            coord,
            location: location.map(str::to_string),
        }
    }

    #[test]
    fn observation_without_coordinates_is_stored_unclustered() {
        let (_dir, mut db) = test_db();

        let outcome = db
            .add_observation(&obs(
                day(2024, 3, 1),
                "Diesel",
                Some(FuelAmount::Liters(40.0)),
                Some(2400.0),
                None,
                Some("Shell, EDSA"),
            ))
            .unwrap();

        assert!(outcome.is_none());
        assert!(db.all_stations().unwrap().is_empty());
    }

    #[test]
    fn nearby_reports_with_similar_names_share_a_cluster() {
        let (_dir, mut db) = test_db();

        let first = db
            .add_observation(&obs(
                day(2024, 3, 1),
                "Diesel",
                Some(FuelAmount::Liters(40.0)),
                Some(2400.0),
                Some(Coord {
                    lat: 14.5995,
                    lon: 120.9842,
                }),
                Some("Petron, EDSA"),
            ))
            .unwrap()
            .unwrap();
        assert!(first.was_created());

        // About 15 meters away with a name that normalizes close enough.
        let second = db
            .add_observation(&obs(
                day(2024, 3, 2),
                "Diesel",
                Some(FuelAmount::Liters(30.0)),
                Some(1830.0),
                Some(Coord {
                    lat: 14.5996,
                    lon: 120.9843,
                }),
                Some("Petron EDSA corner"),
            ))
            .unwrap()
            .unwrap();
        assert!(!second.was_created());
        assert_eq!(first.cluster_id(), second.cluster_id());

        let stations = db.all_stations().unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].report_count(), 2);

        let centroid = stations[0].centroid();
        assert!((centroid.lat - 14.59955).abs() < 1.0e-9);
        assert!((centroid.lon - 120.98425).abs() < 1.0e-9);

        let found = db.station(first.cluster_id()).unwrap();
        assert!(found.is_some());
        assert!(db.station("no_such_station_0_0").unwrap().is_none());
    }

    #[test]
    fn distant_reports_make_separate_clusters() {
        let (_dir, mut db) = test_db();

        db.add_observation(&obs(
            day(2024, 3, 1),
            "Diesel",
            Some(FuelAmount::Liters(40.0)),
            Some(2400.0),
            Some(Coord {
                lat: 14.5995,
                lon: 120.9842,
            }),
            Some("Petron, EDSA"),
        ))
        .unwrap();

        // Same name, roughly a kilometer north.
        let far = db
            .add_observation(&obs(
                day(2024, 3, 1),
                "Diesel",
                Some(FuelAmount::Liters(35.0)),
                Some(2100.0),
                Some(Coord {
                    lat: 14.6085,
                    lon: 120.9842,
                }),
                Some("Petron, EDSA"),
            ))
            .unwrap()
            .unwrap();

        assert!(far.was_created());
        assert_eq!(db.all_stations().unwrap().len(), 2);
    }

    #[test]
    fn dissimilar_names_make_separate_clusters() {
        let (_dir, mut db) = test_db();

        db.add_observation(&obs(
            day(2024, 3, 1),
            "Diesel",
            Some(FuelAmount::Liters(40.0)),
            Some(2400.0),
            Some(Coord {
                lat: 14.5995,
                lon: 120.9842,
            }),
            Some("Petron, EDSA"),
        ))
        .unwrap();

        let other = db
            .add_observation(&obs(
                day(2024, 3, 1),
                "Diesel",
                Some(FuelAmount::Liters(45.0)),
                Some(2700.0),
                Some(Coord {
                    lat: 14.5995,
                    lon: 120.9842,
                }),
                Some("Shell, EDSA"),
            ))
            .unwrap()
            .unwrap();

        assert!(other.was_created());
        assert_eq!(db.all_stations().unwrap().len(), 2);
    }

    #[test]
    fn missing_location_text_still_clusters_under_the_fallback_name() {
        let (_dir, mut db) = test_db();

        let outcome = db
            .add_observation(&obs(
                day(2024, 3, 1),
                "Diesel",
                Some(FuelAmount::Liters(40.0)),
                Some(2400.0),
                Some(Coord {
                    lat: 14.5995,
                    lon: 120.9842,
                }),
                None,
            ))
            .unwrap()
            .unwrap();

        assert!(outcome.was_created());

        let stations = db.all_stations().unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].normalized_name(), "Gas Station");
        assert_eq!(stations[0].brand(), "Gas Station");
    }

    #[test]
    fn observations_come_back_filtered_by_date() {
        let (_dir, mut db) = test_db();

        let coord = Some(Coord {
            lat: 14.5995,
            lon: 120.9842,
        });

        let mut cluster_id = String::new();
        for (date, cost) in [
            (day(2024, 3, 1), 2400.0),
            (day(2024, 3, 5), 2440.0),
            (day(2024, 3, 10), 2480.0),
        ] {
            let outcome = db
                .add_observation(&obs(
                    date,
                    "Diesel",
                    Some(FuelAmount::Liters(40.0)),
                    Some(cost),
                    coord,
                    Some("Petron, EDSA"),
                ))
                .unwrap()
                .unwrap();
            cluster_id = outcome.cluster_id().to_string();
        }

        // The cutoff is inclusive.
        let rows = db
            .observations_for_station(&cluster_id, day(2024, 3, 5))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, day(2024, 3, 5));
        assert_eq!(rows[1].date, day(2024, 3, 10));
        assert_eq!(rows[0].fuel_type, "Diesel");
        assert_eq!(rows[0].price_per_unit(), Some(61.0));

        let all = db
            .observations_for_station(&cluster_id, day(2024, 1, 1))
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn price_per_unit_requires_a_positive_amount_and_a_nonzero_cost() {
        let row = |amount, cost| StationObservationRow {
            date: day(2024, 3, 1),
            fuel_type: "Diesel".to_string(),
            amount,
            cost,
        };

        assert_eq!(
            row(Some(FuelAmount::Liters(40.0)), Some(2400.0)).price_per_unit(),
            Some(60.0)
        );
        assert_eq!(
            row(Some(FuelAmount::Kwh(50.0)), Some(600.0)).price_per_unit(),
            Some(12.0)
        );
        assert_eq!(row(None, Some(2400.0)).price_per_unit(), None);
        assert_eq!(row(Some(FuelAmount::Liters(40.0)), None).price_per_unit(), None);
        assert_eq!(
            row(Some(FuelAmount::Liters(0.0)), Some(2400.0)).price_per_unit(),
            None
        );
        assert_eq!(
            row(Some(FuelAmount::Liters(-5.0)), Some(2400.0)).price_per_unit(),
            None
        );
        assert_eq!(
            row(Some(FuelAmount::Liters(40.0)), Some(0.0)).price_per_unit(),
            None
        );
    }
}
