/*!
 * Price statistics over the observations of a station cluster.
 *
 * This is where stored purchases turn into the numbers a driver cares about:
 * a recency weighted average price per unit for each fuel type sold at a
 * station, extrema, sample counts, and how stale the data is. The weighting
 * favors the newest reports so a volatile crowd sourced signal tracks the
 * market, while older reports still keep sparsely visited stations on the map.
 */
use crate::{
    database::{StationDatabase, StationObservationRow},
    error::ValidationError,
    geo::{great_circle_distance, BoundingBox, Coord},
    station::StationCluster,
    PumpStatResult,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rustc_hash::FxHashMap as HashMap;
use serde::Serialize;
use std::cmp::Ordering;
use strum::{EnumIter, IntoEnumIterator};

/// Weight multiplier applied for each day a price lags the newest one in its group.
pub const RECENCY_DECAY: f64 = 0.85;

/// Smallest search radius a query may ask for, kilometers.
pub const MIN_RADIUS_KM: f64 = 0.1;

/// Largest search radius a query may ask for, kilometers.
pub const MAX_RADIUS_KM: f64 = 50.0;

/// Search radius used when the caller does not provide one, kilometers.
pub const DEFAULT_RADIUS_KM: f64 = 5.0;

/** The named lookback windows a price query can ask for. */
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum TimeWindow {
    /// Purchases made today only.
    Today,
    /// Today and yesterday.
    Last24Hours,
    /// The last 3 days.
    Last3Days,
    /// The last 7 days.
    Last7Days,
}

impl TimeWindow {
    /// Get the token for this window as used on the command line.
    pub fn name(&self) -> &'static str {
        use TimeWindow::*;

        match self {
            Today => "today",
            Last24Hours => "24h",
            Last3Days => "3d",
            Last7Days => "7d",
        }
    }

    /// How many days before today the window reaches back. Zero means today only.
    pub fn days_back(&self) -> i64 {
        use TimeWindow::*;

        match self {
            Today => 0,
            Last24Hours => 1,
            Last3Days => 3,
            Last7Days => 7,
        }
    }

    /// Match a command line token to a window.
    pub fn from_token(token: &str) -> Option<TimeWindow> {
        TimeWindow::iter().find(|window| window.name() == token)
    }

    /// The earliest day inside the window, counting back from `today`.
    pub fn start_date(&self, today: NaiveDate) -> NaiveDate {
        today - Duration::days(self.days_back())
    }
}

/** Price statistics for one fuel type at one station. */
#[derive(Debug, Clone, Serialize)]
pub struct FuelTypeStats {
    /// The fuel type label these statistics cover, exactly as reported.
    pub fuel_type: String,
    /// Recency weighted average price per unit.
    pub avg_price_per_unit: f64,
    pub min_price: f64,
    pub max_price: f64,
    /// How many usable purchases produced these numbers.
    pub sample_count: usize,
    /// The most recent purchase date among them.
    pub last_observation_date: NaiveDate,
}

/** The aggregated price picture for one station, as returned by a nearby query. */
#[derive(Debug, Clone, Serialize)]
pub struct StationPriceSummary {
    pub cluster_id: String,
    pub name: String,
    pub brand: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Great circle distance from the query point, kilometers, rounded to 2 decimals.
    pub distance_km: f64,
    /// Recency weighted average over every usable purchase, all fuel types together.
    pub avg_price_per_unit: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub sample_count: usize,
    /// The most recent usable purchase date across every fuel type.
    pub last_updated: NaiveDate,
    /// Whole hours elapsed between midnight UTC of `last_updated` and the query time.
    pub hours_since_update: i64,
    /// Per fuel type breakdown, sorted by fuel type name.
    pub fuel_prices: Vec<FuelTypeStats>,
    /// True when these numbers come from a widened fallback window.
    pub is_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_message: Option<String>,
}

/**
 * Build the price summary for one station from its observations.
 *
 * `rows` must already be restricted to the time window of interest. When
 * `fuel_type_filter` is given only observations whose fuel type contains it
 * as a case sensitive substring count, so "Gasoline" covers both
 * "Gasoline (Unleaded)" and "Gasoline (Premium)" while "gasoline" covers
 * neither.
 *
 * # Returns
 *
 * None when nothing in `rows` survives filtering with a usable price. That
 * means "no current data" and the station is dropped from query results, it
 * is never reported as a price of zero.
 */
pub fn summarize_station(
    cluster: &StationCluster,
    rows: &[StationObservationRow],
    fuel_type_filter: Option<&str>,
    distance_km: f64,
    now: DateTime<Utc>,
) -> Option<StationPriceSummary> {
    let mut groups: HashMap<&str, Vec<&StationObservationRow>> = HashMap::default();
    for row in rows {
        if let Some(filter) = fuel_type_filter {
            if !row.fuel_type.contains(filter) {
                continue;
            }
        }

        groups.entry(row.fuel_type.as_str()).or_default().push(row);
    }

    // Process fuel types in name order so the breakdown and the floating point
    // sums do not depend on hash iteration order.
    let mut fuel_types: Vec<&str> = groups.keys().copied().collect();
    fuel_types.sort_unstable();

    let mut fuel_prices = vec![];
    let mut all_points: Vec<(f64, NaiveDate)> = vec![];
    let mut last_updated: Option<NaiveDate> = None;

    for fuel_type in fuel_types {
        let points: Vec<(f64, NaiveDate)> = groups[fuel_type]
            .iter()
            .filter_map(|row| row.price_per_unit().map(|price| (price, row.date)))
            .collect();

        if points.is_empty() {
            continue;
        }

        let max_date = points.iter().map(|&(_, date)| date).max()?;
        let min_price = points.iter().map(|&(price, _)| price).fold(f64::INFINITY, f64::min);
        let max_price = points
            .iter()
            .map(|&(price, _)| price)
            .fold(f64::NEG_INFINITY, f64::max);

        fuel_prices.push(FuelTypeStats {
            fuel_type: fuel_type.to_string(),
            avg_price_per_unit: round2(weighted_average(&points)),
            min_price: round2(min_price),
            max_price: round2(max_price),
            sample_count: points.len(),
            last_observation_date: max_date,
        });

        match last_updated {
            Some(latest) if latest >= max_date => {}
            _ => last_updated = Some(max_date),
        }

        all_points.extend(points);
    }

    if fuel_prices.is_empty() {
        return None;
    }

    let last_updated = last_updated?;

    let overall_min = all_points.iter().map(|&(price, _)| price).fold(f64::INFINITY, f64::min);
    let overall_max = all_points
        .iter()
        .map(|&(price, _)| price)
        .fold(f64::NEG_INFINITY, f64::max);

    Some(StationPriceSummary {
        cluster_id: cluster.cluster_id().to_string(),
        name: cluster.normalized_name().to_string(),
        brand: cluster.brand().to_string(),
        latitude: cluster.centroid().lat,
        longitude: cluster.centroid().lon,
        distance_km: round2(distance_km),
        avg_price_per_unit: round2(weighted_average(&all_points)),
        min_price: round2(overall_min),
        max_price: round2(overall_max),
        sample_count: all_points.len(),
        last_updated,
        hours_since_update: hours_since(last_updated, now),
        fuel_prices,
        is_fallback: false,
        fallback_message: None,
    })
}

/** A validated nearby price query. */
#[derive(Debug, Clone)]
pub struct NearbyQuery {
    center: Coord,
    radius_km: f64,
    days_back: i64,
    fuel_type: Option<String>,
}

impl NearbyQuery {
    /**
     * Validate the raw query values.
     *
     * Latitude must be in [-90, 90], longitude in [-180, 180], the radius in
     * [[MIN_RADIUS_KM], [MAX_RADIUS_KM]], and the lookback not negative.
     */
    pub fn new(
        lat: f64,
        lon: f64,
        radius_km: f64,
        days_back: i64,
        fuel_type: Option<String>,
    ) -> Result<Self, ValidationError> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(ValidationError::new(format!(
                "latitude {} is out of range, must be between -90 and 90",
                lat
            )));
        }

        if !(-180.0..=180.0).contains(&lon) {
            return Err(ValidationError::new(format!(
                "longitude {} is out of range, must be between -180 and 180",
                lon
            )));
        }

        if !(MIN_RADIUS_KM..=MAX_RADIUS_KM).contains(&radius_km) {
            return Err(ValidationError::new(format!(
                "radius {} km is out of range, must be between {} and {}",
                radius_km, MIN_RADIUS_KM, MAX_RADIUS_KM
            )));
        }

        if days_back < 0 {
            return Err(ValidationError::new(format!(
                "days back must not be negative, got {}",
                days_back
            )));
        }

        Ok(NearbyQuery {
            center: Coord { lat, lon },
            radius_km,
            days_back,
            fuel_type,
        })
    }

    /// The same query reaching back a different number of days.
    pub fn with_days_back(&self, days_back: i64) -> Self {
        NearbyQuery {
            center: self.center,
            radius_km: self.radius_km,
            days_back: days_back.max(0),
            fuel_type: self.fuel_type.clone(),
        }
    }

    pub fn center(&self) -> Coord {
        self.center
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    pub fn days_back(&self) -> i64 {
        self.days_back
    }

    pub fn fuel_type(&self) -> Option<&str> {
        self.fuel_type.as_deref()
    }
}

/**
 * Find the stations near a point and summarize their recent prices.
 *
 * Enumerates the clusters whose centroids fall inside the bounding box around
 * the search circle, keeps those within the exact great circle radius,
 * aggregates each survivor's observations since the start of the window, and
 * returns the summaries sorted nearest first. Stations with no usable prices
 * in the window are left out entirely, so an empty list is a normal answer,
 * not an error.
 */
pub fn nearby_prices(
    db: &StationDatabase,
    query: &NearbyQuery,
    now: DateTime<Utc>,
) -> PumpStatResult<Vec<StationPriceSummary>> {
    let since = now.date_naive() - Duration::days(query.days_back());

    let area = BoundingBox::around(query.center(), query.radius_km());
    let candidates = db.stations_in_region(area)?;

    let mut summaries = vec![];
    for cluster in candidates {
        let distance = great_circle_distance(
            query.center().lat,
            query.center().lon,
            cluster.centroid().lat,
            cluster.centroid().lon,
        );

        if distance > query.radius_km() {
            continue;
        }

        let rows = db.observations_for_station(cluster.cluster_id(), since)?;

        if let Some(summary) = summarize_station(&cluster, &rows, query.fuel_type(), distance, now)
        {
            summaries.push(summary);
        }
    }

    // Stable sort on the rounded distance, so stations the same display
    // distance apart keep the deterministic cluster id order they arrived in.
    summaries.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(Ordering::Equal)
    });

    Ok(summaries)
}

/// Recency weighted mean of a set of dated prices.
///
/// The newest point weighs 1.0 and every day a point lags the newest scales
/// its weight by another factor of [RECENCY_DECAY].
fn weighted_average(points: &[(f64, NaiveDate)]) -> f64 {
    let max_date = match points.iter().map(|&(_, date)| date).max() {
        Some(max_date) => max_date,
        None => return 0.0,
    };

    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for &(price, date) in points {
        let days_old = (max_date - date).num_days();
        let weight = RECENCY_DECAY.powi(days_old as i32);

        weighted_sum += price * weight;
        total_weight += weight;
    }

    weighted_sum / total_weight
}

/// Whole hours between midnight UTC of `date` and `now`, truncated.
fn hours_since(date: NaiveDate, now: DateTime<Utc>) -> i64 {
    let midnight = NaiveDateTime::new(date, NaiveTime::MIN).and_utc();
    (now - midnight).num_hours()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
