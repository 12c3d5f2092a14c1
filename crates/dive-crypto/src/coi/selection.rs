//! Choosing the community whose key wraps a resource's DEK.

use std::collections::BTreeSet;

/// Five Eyes members.
pub const FVEY: &[&str] = &["AUS", "CAN", "GBR", "NZL", "USA"];

/// NATO members (ISO 3166-1 alpha-3).
pub const NATO: &[&str] = &[
    "ALB", "BEL", "BGR", "CAN", "CZE", "DEU", "DNK", "ESP", "EST", "FIN", "FRA", "GBR", "GRC",
    "HRV", "HUN", "ISL", "ITA", "LTU", "LUX", "LVA", "MKD", "MNE", "NLD", "NOR", "POL", "PRT",
    "ROU", "SVK", "SVN", "SWE", "TUR", "USA",
];

/// Canonical bilateral tags, keyed by their sorted member pair.
const BILATERAL: &[(&str, &str, &str)] = &[
    ("CAN", "USA", "CAN-US"),
    ("FRA", "USA", "FRA-US"),
    ("GBR", "USA", "GBR-US"),
];

/// Conservative default when nothing else can be inferred.
pub const DEFAULT_COI: &str = "US-ONLY";

/// Member countries of a COI tag, when the membership is known.
///
/// `US-ONLY` and `<XXX>-ONLY` tags have a single member; `NATO-COSMIC`
/// shares NATO's membership.
pub fn coi_members(coi: &str) -> Option<Vec<&'static str>> {
    match coi {
        "FVEY" => Some(FVEY.to_vec()),
        "NATO" | "NATO-COSMIC" => Some(NATO.to_vec()),
        "US-ONLY" => Some(vec!["USA"]),
        _ => {
            if let Some((a, b, _)) = BILATERAL.iter().find(|(_, _, tag)| *tag == coi) {
                return Some(vec![*a, *b]);
            }
            let country = coi.strip_suffix("-ONLY")?;
            lookup_country(country).map(|c| vec![c])
        }
    }
}

fn lookup_country(code: &str) -> Option<&'static str> {
    NATO.iter()
        .chain(FVEY.iter())
        .find(|c| **c == code)
        .copied()
}

/// Picks the COI for a resource.
///
/// Explicit tags win: the most restrictive tag (fewest known members) is
/// chosen, falling back to the first tag when none has a known membership.
/// Otherwise the community is inferred from `releasability_to`.
pub fn select_coi_for_resource(releasability_to: &[String], explicit_coi: &[String]) -> String {
    let explicit: Vec<&str> = explicit_coi
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();

    if !explicit.is_empty() {
        let restrictive = explicit
            .iter()
            .filter_map(|tag| coi_members(tag).map(|members| (*tag, members.len())))
            .min_by_key(|(_, size)| *size)
            .map(|(tag, _)| tag);
        return restrictive.unwrap_or(explicit[0]).to_string();
    }

    let countries: BTreeSet<String> = releasability_to
        .iter()
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty())
        .collect();

    infer_from_releasability(&countries)
}

fn infer_from_releasability(countries: &BTreeSet<String>) -> String {
    let codes: Vec<&str> = countries.iter().map(String::as_str).collect();

    match codes.as_slice() {
        [] => DEFAULT_COI.to_string(),
        [single] => format!("{single}-ONLY"),
        _ if codes == FVEY => "FVEY".to_string(),
        [a, b] => BILATERAL
            .iter()
            .find(|(x, y, _)| x == a && y == b)
            .map_or_else(|| widest_fallback(&codes), |(_, _, tag)| (*tag).to_string()),
        _ => widest_fallback(&codes),
    }
}

/// Smallest releasability set inferred as `NATO`.
pub const NATO_MIN_MEMBERS: usize = 3;

/// Sets that match no canonical community: stay inside FVEY when every
/// member is Five Eyes, use NATO when three or more members are all NATO,
/// else the default.
fn widest_fallback(codes: &[&str]) -> String {
    if codes.iter().all(|c| FVEY.contains(c)) {
        "FVEY".to_string()
    } else if codes.len() >= NATO_MIN_MEMBERS && codes.iter().all(|c| NATO.contains(c)) {
        "NATO".to_string()
    } else {
        DEFAULT_COI.to_string()
    }
}
