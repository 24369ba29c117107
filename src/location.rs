use crate::models::Venue;

pub const DEFAULT_SEPARATOR: &str = ", ";

/// Joins the populated venue fields (name, address, city) in that order,
/// dropping values already seen. Blank fields count as missing.
pub fn compose_location(venue: Option<&Venue>, separator: &str) -> String {
    let venue = match venue {
        Some(venue) => venue,
        None => return String::new(),
    };

    let mut parts: Vec<&str> = Vec::with_capacity(3);
    for value in [&venue.name, &venue.address, &venue.city]
        .into_iter()
        .flatten()
        .filter(|value| !value.trim().is_empty())
    {
        if !parts.contains(&value.as_str()) {
            parts.push(value.as_str());
        }
    }
    parts.join(separator)
}
