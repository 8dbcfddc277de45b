/*! Error handling for the pumpstat crate. */
use std::{
    error::Error,
    fmt::{Display, Formatter},
};

/// Result type used throughout the crate.
///
/// Errors are boxed so storage, parsing, and formatting failures can all flow
/// through the same channel, and `Send + Sync` so they can cross the ingest
/// pipeline's thread boundaries.
pub type PumpStatResult<T> = Result<T, Box<dyn Error + Send + Sync + 'static>>;

/// A request parameter was rejected at the boundary.
///
/// The engine itself assumes validated numeric ranges, so anything malformed
/// (coordinates out of range, radius out of bounds, an unknown time window
/// token) is turned into one of these before the engine is invoked.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub msg: String,
}

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        ValidationError { msg: msg.into() }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        write!(f, "{}", self.msg)
    }
}

impl Error for ValidationError {}
