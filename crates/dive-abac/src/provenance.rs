//! Attribute provenance: where each subject attribute in a decision came
//! from.

use serde::Serialize;
use serde_json::{Map, Value};

pub const SOURCE_DERIVED_EMAIL: &str = "Derived (email domain)";
pub const SOURCE_DEFAULT: &str = "Default (not asserted)";

/// Email top-level domains that imply a country of affiliation.
const EMAIL_DOMAIN_COUNTRIES: &[(&str, &str)] = &[
    ("mil", "USA"),
    ("gov", "USA"),
    ("us", "USA"),
    ("uk", "GBR"),
    ("ca", "CAN"),
    ("au", "AUS"),
    ("nz", "NZL"),
    ("fr", "FRA"),
    ("de", "DEU"),
    ("es", "ESP"),
    ("it", "ITA"),
    ("nl", "NLD"),
    ("pl", "POL"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeProvenance {
    pub value: Option<String>,
    pub source: String,
}

impl AttributeProvenance {
    fn claim(value: &str, claim: &str) -> Self {
        Self {
            value: Some(value.to_string()),
            source: format!("Token claim ({claim})"),
        }
    }

    fn absent() -> Self {
        Self {
            value: None,
            source: SOURCE_DEFAULT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectProvenance {
    pub issuer: AttributeProvenance,
    #[serde(rename = "uniqueID")]
    pub unique_id: AttributeProvenance,
    pub clearance: AttributeProvenance,
    pub country_of_affiliation: AttributeProvenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub subject: SubjectProvenance,
}

fn string_claim<'a>(claims: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    claims
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// First present claim among `names`, tagged with the claim that supplied it.
fn first_claim(claims: &Map<String, Value>, names: &[&str]) -> AttributeProvenance {
    names
        .iter()
        .find_map(|name| string_claim(claims, name).map(|v| AttributeProvenance::claim(v, name)))
        .unwrap_or_else(AttributeProvenance::absent)
}

/// Country implied by the domain of an email address.
pub fn country_from_email(email: &str) -> Option<&'static str> {
    let (_, domain) = email.rsplit_once('@')?;
    let tld = domain.rsplit('.').next()?.to_ascii_lowercase();
    EMAIL_DOMAIN_COUNTRIES
        .iter()
        .find(|(suffix, _)| *suffix == tld)
        .map(|(_, country)| *country)
}

/// Builds attribute provenance from decoded token claims.
///
/// Explicit claims win. The country falls back to the email domain, tagged
/// `"Derived (email domain)"`.
pub fn build_provenance(claims: &Map<String, Value>) -> Provenance {
    let issuer = first_claim(claims, &["iss"]);
    let unique_id = first_claim(claims, &["uniqueID", "preferred_username", "sub"]);
    let clearance = first_claim(claims, &["clearance", "clearanceOriginal"]);

    let mut country = first_claim(claims, &["countryOfAffiliation"]);
    if country.value.is_none() {
        let derived = ["email", "uniqueID", "preferred_username"]
            .iter()
            .filter_map(|name| string_claim(claims, name))
            .find_map(country_from_email);
        if let Some(code) = derived {
            country = AttributeProvenance {
                value: Some(code.to_string()),
                source: SOURCE_DERIVED_EMAIL.to_string(),
            };
        }
    }

    Provenance {
        subject: SubjectProvenance {
            issuer,
            unique_id,
            clearance,
            country_of_affiliation: country,
        },
    }
}
