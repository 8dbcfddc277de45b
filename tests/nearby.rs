use chrono::{DateTime, Duration, NaiveDate, Utc};
use pumpstat::{
    nearby_prices, Coord, FuelAmount, FuelObservation, NearbyQuery, StationDatabase, TimeWindow,
};
use tempfile::TempDir;

const MANILA: Coord = Coord {
    lat: 14.5995,
    lon: 120.9842,
};

fn test_db() -> (TempDir, StationDatabase) {
    let dir = TempDir::new().unwrap();
    let db = StationDatabase::connect(dir.path().join("stations.sqlite")).unwrap();
    (dir, db)
}

fn observation(
    date: NaiveDate,
    fuel_type: &str,
    liters: f64,
    cost: f64,
    coord: Option<Coord>,
    location: Option<&str>,
) -> FuelObservation {
    FuelObservation {
        date,
        fuel_type: fuel_type.to_string(),
        amount: Some(FuelAmount::Liters(liters)),
        cost: Some(cost),
        coord,
        location: location.map(str::to_string),
    }
}

fn query(center: Coord, radius_km: f64, days_back: i64) -> NearbyQuery {
    NearbyQuery::new(center.lat, center.lon, radius_km, days_back, None).unwrap()
}

#[test]
fn two_noisy_reports_become_one_station_with_a_weighted_price() {
    let (_dir, mut db) = test_db();
    let now: DateTime<Utc> = Utc::now();
    let today = now.date_naive();

    let first = db
        .add_observation(&observation(
            today,
            "Diesel",
            50.0,
            3000.0,
            Some(MANILA),
            Some("Petron, EDSA"),
        ))
        .unwrap()
        .unwrap();
    assert!(first.was_created());

    let second = db
        .add_observation(&observation(
            today - Duration::days(1),
            "Diesel",
            50.0,
            3100.0,
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

    let cluster = db.station(first.cluster_id()).unwrap().unwrap();
    assert_eq!(cluster.report_count(), 2);

    let summaries = nearby_prices(
        &db,
        &query(MANILA, 5.0, TimeWindow::Last24Hours.days_back()),
        now,
    )
    .unwrap();

    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];

    assert_eq!(summary.cluster_id, first.cluster_id());
    assert_eq!(summary.name, "Petron, EDSA");
    assert_eq!(summary.brand, "Petron");
    assert_eq!(summary.sample_count, 2);

    // (60 * 1.0 + 62 * 0.85) / 1.85 rounds to 60.92.
    assert_eq!(summary.avg_price_per_unit, 60.92);
    assert_eq!(summary.min_price, 60.0);
    assert_eq!(summary.max_price, 62.0);

    // The query point is a few meters from the averaged centroid.
    assert_eq!(summary.distance_km, 0.01);
    assert_eq!(summary.last_updated, today);
}

#[test]
fn results_come_back_nearest_first_and_the_radius_is_exact() {
    let (_dir, mut db) = test_db();
    let now = Utc::now();
    let today = now.date_naive();

    // About 2 km north of the query point.
    let caltex = Coord {
        lat: MANILA.lat + 0.018,
        lon: MANILA.lon,
    };
    // About 100 km away, well outside any allowed radius.
    let faraway = Coord {
        lat: MANILA.lat + 0.9,
        lon: MANILA.lon,
    };

    for (coord, location) in [
        (faraway, "Shell, Tarlac"),
        (caltex, "Caltex, Quezon Ave"),
        (MANILA, "Petron, EDSA"),
    ] {
        db.add_observation(&observation(
            today,
            "Diesel",
            50.0,
            3000.0,
            Some(coord),
            Some(location),
        ))
        .unwrap();
    }

    let summaries = nearby_prices(&db, &query(MANILA, 5.0, 1), now).unwrap();

    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].name, "Petron, EDSA");
    assert_eq!(summaries[1].name, "Caltex, Quezon Ave");
    assert!(summaries[0].distance_km <= summaries[1].distance_km);

    // Even the widest radius does not reach the distant station.
    let widest = nearby_prices(&db, &query(MANILA, 50.0, 1), now).unwrap();
    assert_eq!(widest.len(), 2);

    // A tight radius drops the station 2 km out as well.
    let tight = nearby_prices(&db, &query(MANILA, 1.0, 1), now).unwrap();
    assert_eq!(tight.len(), 1);
    assert_eq!(tight[0].name, "Petron, EDSA");
}

#[test]
fn stations_with_only_old_prices_drop_out_of_narrow_windows() {
    let (_dir, mut db) = test_db();
    let now = Utc::now();
    let today = now.date_naive();

    db.add_observation(&observation(
        today - Duration::days(5),
        "Diesel",
        50.0,
        3000.0,
        Some(MANILA),
        Some("Petron, EDSA"),
    ))
    .unwrap();

    let last_24h = nearby_prices(
        &db,
        &query(MANILA, 5.0, TimeWindow::Last24Hours.days_back()),
        now,
    )
    .unwrap();
    assert!(last_24h.is_empty());

    let last_week = nearby_prices(
        &db,
        &query(MANILA, 5.0, TimeWindow::Last7Days.days_back()),
        now,
    )
    .unwrap();
    assert_eq!(last_week.len(), 1);
    assert_eq!(last_week[0].last_updated, today - Duration::days(5));
}

#[test]
fn a_today_window_only_counts_todays_prices() {
    let (_dir, mut db) = test_db();
    let now = Utc::now();
    let today = now.date_naive();

    db.add_observation(&observation(
        today - Duration::days(1),
        "Diesel",
        50.0,
        3000.0,
        Some(MANILA),
        Some("Petron, EDSA"),
    ))
    .unwrap();

    let strictly_today = nearby_prices(
        &db,
        &query(MANILA, 5.0, TimeWindow::Today.days_back()),
        now,
    )
    .unwrap();
    assert!(strictly_today.is_empty());

    let widened = nearby_prices(
        &db,
        &query(MANILA, 5.0, TimeWindow::Last24Hours.days_back()),
        now,
    )
    .unwrap();
    assert_eq!(widened.len(), 1);
    assert!(!widened[0].is_fallback);
}

#[test]
fn the_fuel_type_filter_narrows_results() {
    let (_dir, mut db) = test_db();
    let now = Utc::now();
    let today = now.date_naive();

    db.add_observation(&observation(
        today,
        "Gasoline (Premium)",
        40.0,
        2800.0,
        Some(MANILA),
        Some("Petron, EDSA"),
    ))
    .unwrap();

    let gasoline = NearbyQuery::new(
        MANILA.lat,
        MANILA.lon,
        5.0,
        1,
        Some("Gasoline".to_string()),
    )
    .unwrap();
    assert_eq!(nearby_prices(&db, &gasoline, now).unwrap().len(), 1);

    let diesel =
        NearbyQuery::new(MANILA.lat, MANILA.lon, 5.0, 1, Some("Diesel".to_string())).unwrap();
    assert!(nearby_prices(&db, &diesel, now).unwrap().is_empty());

    // The filter match is case sensitive.
    let lowercase =
        NearbyQuery::new(MANILA.lat, MANILA.lon, 5.0, 1, Some("gasoline".to_string())).unwrap();
    assert!(nearby_prices(&db, &lowercase, now).unwrap().is_empty());
}

#[test]
fn an_empty_area_is_a_normal_answer() {
    let (_dir, mut db) = test_db();
    let now = Utc::now();

    // An observation with no coordinates is stored but never joins a cluster.
    db.add_observation(&observation(
        now.date_naive(),
        "Diesel",
        50.0,
        3000.0,
        None,
        Some("Petron, EDSA"),
    ))
    .unwrap();

    let summaries = nearby_prices(&db, &query(MANILA, 5.0, 7), now).unwrap();
    assert!(summaries.is_empty());
}
