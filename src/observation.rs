/*!
 * The raw fuel purchase record the engine consumes.
 *
 * Observations arrive from the vehicle tracking side of the system. Each one is
 * immutable once recorded. The location fields are optional because contributors
 * can log a purchase without sharing a GPS fix or typing a station name.
 */
use crate::geo::Coord;
use chrono::NaiveDate;

/** The amount of fuel purchased, in the unit the vehicle uses. */
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FuelAmount {
    /// Liquid fuel, liters.
    Liters(f64),
    /// Electric charge, kilowatt hours.
    Kwh(f64),
}

impl FuelAmount {
    /// Get the numeric amount regardless of unit.
    pub fn value(&self) -> f64 {
        use FuelAmount::*;

        match self {
            Liters(v) | Kwh(v) => *v,
        }
    }

    /// Get a string representing the name of the unit.
    pub fn unit_name(&self) -> &'static str {
        use FuelAmount::*;

        match self {
            Liters(_) => "liters",
            Kwh(_) => "kwh",
        }
    }
}

/** A single fuel purchase report from a contributor. */
#[derive(Debug, Clone)]
pub struct FuelObservation {
    /// The purchase date.
    pub date: NaiveDate,
    /// The fuel type of the vehicle this purchase was logged for.
    pub fuel_type: String,
    /// The amount purchased, if recorded.
    pub amount: Option<FuelAmount>,
    /// The total cost of the purchase, if recorded.
    pub cost: Option<f64>,
    /// Where the purchase happened, if the phone had a fix.
    pub coord: Option<Coord>,
    /// The free text location label, if the contributor supplied one.
    pub location: Option<String>,
}
