/*!
 * Free text location normalization.
 *
 * Contributors label the same station all kinds of ways ("Petron, EDSA",
 * "Petron EDSA corner", "Petron Gas Station, 123 Quezon Ave, Quezon City").
 * Normalization is lossy and heuristic on purpose. It only has to produce a
 * consistent enough key for the similarity matching in the cluster resolver,
 * not a correct postal address.
 */

/// Gas station brands recognized in location text, scanned in order.
pub const GAS_BRANDS: [&str; 10] = [
    "Shell",
    "Petron",
    "Caltex",
    "Phoenix",
    "Seaoil",
    "PTT",
    "Total",
    "Unioil",
    "Flying V",
    "Cleanfuel",
];

/// The brand used when no known brand appears in the text.
pub const FALLBACK_BRAND: &str = "Gas Station";

/// Longest normalized name that will be stored.
const MAX_NORMALIZED_LEN: usize = 100;

/** The canonical form of a free text location. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLocation {
    /// The brand found in the text, or the generic fallback.
    pub brand: String,
    /// The street portion of the text, possibly empty.
    pub street: String,
    /// The "brand, street" key used for cluster matching.
    pub normalized_name: String,
}

impl NormalizedLocation {
    fn fallback() -> Self {
        NormalizedLocation {
            brand: FALLBACK_BRAND.to_string(),
            street: String::new(),
            normalized_name: FALLBACK_BRAND.to_string(),
        }
    }

    fn unnamed(normalized_name: String) -> Self {
        NormalizedLocation {
            brand: FALLBACK_BRAND.to_string(),
            street: String::new(),
            normalized_name,
        }
    }
}

/**
 * Turn a raw location string into a (brand, street, normalized name) triple.
 *
 * Total function. Missing or empty input yields the generic fallback triple,
 * placeholder text such as "Unnamed Location (14.5995, 120.9842)" yields a name
 * synthesized from the coordinate text, and anything else goes through brand
 * scanning and street extraction. For the example above the docstring form is
 * brand "Gas Station" and normalized name "Station at 14.5995, 120.984".
 *
 * #Arguments
 * * raw_location - the free text location, if the contributor supplied one.
 *
 * #Returns
 * The normalized triple, never an error.
 */
pub fn normalize_location(raw_location: Option<&str>) -> NormalizedLocation {
    let raw = match raw_location {
        Some(text) if !text.is_empty() => text,
        _ => return NormalizedLocation::fallback(),
    };

    // Placeholder names carry nothing but the coordinates they were synthesized
    // from, so pull those back out rather than scanning for a brand.
    if raw.starts_with("Unnamed Location (") || raw.starts_with("Location (") {
        let normalized = match find_coordinate_text(raw) {
            Some((lat_text, lon_text)) => format!(
                "Station at {}, {}",
                truncate_chars(lat_text, 7),
                truncate_chars(lon_text, 7)
            ),
            None => "Unnamed Gas Station".to_string(),
        };
        return NormalizedLocation::unnamed(normalized);
    }

    let brand = string_contains_brand(raw).unwrap_or(FALLBACK_BRAND);

    // Addresses usually come in as "Brand, Street, City, Region, Country".
    let parts: Vec<&str> = raw.split(',').collect();

    let mut street = String::new();
    if parts.len() >= 2 {
        let street_part = if brand != FALLBACK_BRAND {
            parts[1].trim()
        } else {
            parts[0].trim()
        };
        street = clean_street(street_part);
    }

    // Nothing useful extracted, keep the first segment verbatim.
    if street.is_empty() {
        street = parts[0].trim().to_string();
    }

    let normalized_name = if street.is_empty() {
        brand.to_string()
    } else {
        truncate_chars(&format!("{}, {}", brand, street), MAX_NORMALIZED_LEN).to_string()
    };

    NormalizedLocation {
        brand: brand.to_string(),
        street,
        normalized_name,
    }
}

/// Scan the string for the occurrence of a known brand name.
pub fn string_contains_brand(string: &str) -> Option<&'static str> {
    let lower = string.to_lowercase();
    for brand in &GAS_BRANDS {
        if lower.contains(&brand.to_lowercase()) {
            return Some(brand);
        }
    }

    None
}

/// Tidy up a street candidate.
///
/// Drops a leading house number, drops "gas station" wording, and collapses
/// runs of whitespace.
fn clean_street(street_part: &str) -> String {
    let rest = street_part
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start();

    let mut words: Vec<&str> = Vec::new();
    let mut tokens = rest.split_whitespace().peekable();
    while let Some(word) = tokens.next() {
        if word.eq_ignore_ascii_case("gas") {
            if let Some(next) = tokens.peek() {
                if next.eq_ignore_ascii_case("station") {
                    tokens.next();
                    continue;
                }
            }
        }
        words.push(word);
    }

    words.join(" ")
}

/// Find the first parenthesized "lat, lon" pair in the text.
///
/// Both halves must be runs of digits, '.', and '-' only, the way placeholder
/// names are generated, otherwise the parenthesized group is skipped.
fn find_coordinate_text(text: &str) -> Option<(&str, &str)> {
    let mut search = text;
    while let Some(open) = search.find('(') {
        let after = &search[open + 1..];
        if let Some(close) = after.find(')') {
            if let Some(pair) = split_coordinate_pair(&after[..close]) {
                return Some(pair);
            }
        }
        search = after;
    }

    None
}

/// Split "14.5995, 120.9842" into its halves, or None if it is not shaped
/// like a coordinate pair.
fn split_coordinate_pair(inner: &str) -> Option<(&str, &str)> {
    let (lat_text, lon_text) = inner.split_once(',')?;
    let lon_text = lon_text.trim_start();

    if lat_text.is_empty() || lon_text.is_empty() {
        return None;
    }

    if is_coordinate_text(lat_text) && is_coordinate_text(lon_text) {
        Some((lat_text, lon_text))
    } else {
        None
    }
}

fn is_coordinate_text(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_ascii_digit() || c == '-' || c == '.')
}

/// Truncate to at most `max` characters.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
