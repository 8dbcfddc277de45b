pub use database::{StationDatabase, StationObservationRow};
pub use error::{PumpStatResult, ValidationError};
pub use geo::{great_circle_distance, BoundingBox, Coord};
pub use location::{normalize_location, string_contains_brand, NormalizedLocation};
pub use observation::{FuelAmount, FuelObservation};
pub use prices::{
    nearby_prices, summarize_station, FuelTypeStats, NearbyQuery, StationPriceSummary, TimeWindow,
    DEFAULT_RADIUS_KM, MAX_RADIUS_KM, MIN_RADIUS_KM, RECENCY_DECAY,
};
pub use station::{
    find_best_match, make_cluster_id, name_similarity, ResolveOutcome, StationCluster,
    CLUSTER_RADIUS_KM, NAME_SIMILARITY_THRESHOLD,
};

/**************************************************************************************************
 * Private Implementation
 *************************************************************************************************/
mod database;
mod error;
mod geo;
mod location;
mod observation;
mod prices;
mod station;
