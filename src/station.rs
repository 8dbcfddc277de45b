/*!
 * Station clusters and the matching rules that build them.
 *
 * A [StationCluster] is the engine's best guess at one physical gas station,
 * assembled from many independent reports with noisy coordinates and
 * inconsistently spelled names. Clusters are created once, never deleted,
 * never split, and never merged with each other. Only the centroid and the
 * report count change after creation.
 */
use crate::{
    geo::{great_circle_distance, Coord},
    location::NormalizedLocation,
};
use chrono::{DateTime, Utc};
use std::fmt::{self, Display};

/// Maximum distance between a report and a cluster centroid for a match, kilometers.
pub const CLUSTER_RADIUS_KM: f64 = 0.1;

/// Minimum name similarity score, on a 0 to 100 scale, for a match.
pub const NAME_SIMILARITY_THRESHOLD: f64 = 80.0;

/// Longest sanitized name prefix used when deriving a cluster id.
const MAX_ID_NAME_LEN: usize = 50;

/**
 * One physical gas station as inferred from many noisy reports.
 */
#[derive(Debug, Clone)]
pub struct StationCluster {
    /// Stable identifier derived from the normalized name and coordinates of the
    /// report that created this cluster. Never reassigned afterwards.
    cluster_id: String,
    /// The matching key. Set at creation, never updated by later reports, even
    /// when a later report spells the station better.
    normalized_name: String,
    /// Brand extracted from the creating report.
    brand: String,
    /// Street extracted from the creating report.
    street: String,
    /// Running unweighted mean of the coordinates of every absorbed report.
    centroid: Coord,
    /// How many reports have been merged into this cluster, including the one
    /// that created it.
    report_count: i64,
    /// When the cluster was created.
    created_at: DateTime<Utc>,
    /// When the last report was absorbed.
    updated_at: DateTime<Utc>,
}

impl Display for StationCluster {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        writeln!(f, "  Cluster ID: {}", self.cluster_id)?;
        writeln!(f, "        Name: {}", self.normalized_name)?;
        writeln!(f, "       Brand: {}", self.brand)?;
        writeln!(f, "      Street: {}", self.street)?;
        writeln!(f, "    Centroid: {}", self.centroid)?;
        writeln!(f, "     Reports: {}", self.report_count)?;
        writeln!(f, "Last Updated: {}", self.updated_at)
    }
}

impl StationCluster {
    /// Create a cluster from the raw parts.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        cluster_id: String,
        normalized_name: String,
        brand: String,
        street: String,
        centroid: Coord,
        report_count: i64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        StationCluster {
            cluster_id,
            normalized_name,
            brand,
            street,
            centroid,
            report_count,
            created_at,
            updated_at,
        }
    }

    /// Create a brand new cluster for a report that matched nothing.
    pub fn from_observation(norm: &NormalizedLocation, coord: Coord, now: DateTime<Utc>) -> Self {
        let cluster_id = make_cluster_id(&norm.normalized_name, coord.lat, coord.lon);

        Self::new(
            cluster_id,
            norm.normalized_name.clone(),
            norm.brand.clone(),
            norm.street.clone(),
            coord,
            1,
            now,
            now,
        )
    }

    /// Get the stable identifier of this cluster.
    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    /// Get the normalized name this cluster was created with.
    pub fn normalized_name(&self) -> &str {
        &self.normalized_name
    }

    /// Get the brand of the creating report.
    pub fn brand(&self) -> &str {
        &self.brand
    }

    /// Get the street of the creating report.
    pub fn street(&self) -> &str {
        &self.street
    }

    /// Get the current centroid estimate.
    pub fn centroid(&self) -> Coord {
        self.centroid
    }

    /// Get the number of reports merged into this cluster.
    pub fn report_count(&self) -> i64 {
        self.report_count
    }

    /// Get the time this cluster was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the time the last report was absorbed.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /**
     * Merge one more report into this cluster.
     *
     * The centroid moves to the running mean of every coordinate seen so far,
     * so after absorbing reports at p1..pN starting from creation at p0 the
     * centroid is the plain average of p0..pN. The report count and centroid
     * always change together.
     */
    pub fn absorb(&mut self, coord: Coord, now: DateTime<Utc>) {
        self.report_count += 1;
        let n = self.report_count as f64;

        self.centroid.lat = (self.centroid.lat * (n - 1.0) + coord.lat) / n;
        self.centroid.lon = (self.centroid.lon * (n - 1.0) + coord.lon) / n;
        self.updated_at = now;
    }
}

/// How a report was resolved against the set of known clusters.
#[derive(Debug, Clone)]
pub enum ResolveOutcome {
    /// The report matched an existing cluster.
    Matched(String),
    /// No cluster qualified and a new one was created.
    Created(String),
}

impl ResolveOutcome {
    /// Get the cluster id the report was assigned to.
    pub fn cluster_id(&self) -> &str {
        use ResolveOutcome::*;

        match self {
            Matched(id) | Created(id) => id,
        }
    }

    /// Check if resolution created a new cluster.
    pub fn was_created(&self) -> bool {
        matches!(self, ResolveOutcome::Created(_))
    }
}

/**
 * Derive a stable cluster id from a normalized name and coordinates.
 *
 * The name is lowercased with every run of non alphanumeric characters folded
 * to a single underscore and capped at 50 characters, then suffixed with the
 * coordinates scaled by 10^4 and truncated to integers. Same name and same
 * location always produce the same id, while nearby stations with the same
 * name land on different suffixes.
 */
pub fn make_cluster_id(normalized_name: &str, lat: f64, lon: f64) -> String {
    let mut clean = String::with_capacity(normalized_name.len());
    let mut last_was_underscore = false;
    for c in normalized_name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            clean.push(c);
            last_was_underscore = false;
        } else if !last_was_underscore {
            clean.push('_');
            last_was_underscore = true;
        }
    }
    clean.truncate(MAX_ID_NAME_LEN);

    format!(
        "{}_{}_{}",
        clean,
        (lat * 10_000.0) as i64,
        (lon * 10_000.0) as i64
    )
}

/// Score how alike two station names are, on a 0 to 100 scale.
///
/// Case does not matter. 100 means identical.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(&a.to_lowercase(), &b.to_lowercase()) * 100.0
}

/**
 * Pick the cluster a report belongs to, if any.
 *
 * A candidate qualifies when its centroid lies within [CLUSTER_RADIUS_KM] of
 * the report and its stored name scores at least [NAME_SIMILARITY_THRESHOLD]
 * against the report's normalized name. Among qualifying candidates the
 * closest one wins; on equal distance the earliest in the slice wins, and the
 * store hands candidates over ordered by cluster id, so the choice is stable.
 *
 * #Arguments
 * * candidates - the clusters to consider.
 * * coord - where the report was made.
 * * normalized_name - the report's normalized location name.
 *
 * #Returns
 * The index of the matching cluster in `candidates`, or None.
 */
pub fn find_best_match(
    candidates: &[StationCluster],
    coord: Coord,
    normalized_name: &str,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;

    for (i, cluster) in candidates.iter().enumerate() {
        let distance = great_circle_distance(
            coord.lat,
            coord.lon,
            cluster.centroid.lat,
            cluster.centroid.lon,
        );

        if distance > CLUSTER_RADIUS_KM {
            continue;
        }

        let similarity = name_similarity(&cluster.normalized_name, normalized_name);
        if similarity < NAME_SIMILARITY_THRESHOLD {
            continue;
        }

        match best {
            Some((_, best_distance)) if best_distance <= distance => {}
            _ => best = Some((i, distance)),
        }
    }

    best.map(|(i, _)| i)
}
