//! Translation of national clearance vocabularies onto [`Clearance`].
//!
//! Partner IdPs release clearances in their own language ("SECRET DEFENSE",
//! "GEHEIM", "OFFICIAL SENSITIVE"). Comparisons always happen on the
//! canonical hierarchy; anything that cannot be mapped becomes
//! `UNCLASSIFIED`.

use dive_types::Clearance;
use tracing::warn;

use Clearance::{Confidential, Restricted, Secret, TopSecret, Unclassified};

/// National vocabularies, keyed by ISO 3166-1 alpha-3 code.
///
/// Terms are stored in normalized form (see [`normalize_term`]).
const NATIONAL_TABLES: &[(&str, &[(&str, Clearance)])] = &[
    (
        "FRA",
        &[
            ("NON_PROTEGE", Unclassified),
            ("DIFFUSION_RESTREINTE", Restricted),
            ("CONFIDENTIEL_DEFENSE", Confidential),
            ("SECRET_DEFENSE", Secret),
            ("TRES_SECRET_DEFENSE", TopSecret),
        ],
    ),
    (
        "DEU",
        &[
            ("OFFEN", Unclassified),
            ("VS_NUR_FUR_DEN_DIENSTGEBRAUCH", Restricted),
            ("VS_NUR_FUER_DEN_DIENSTGEBRAUCH", Restricted),
            ("VS_VERTRAULICH", Confidential),
            ("GEHEIM", Secret),
            ("STRENG_GEHEIM", TopSecret),
        ],
    ),
    (
        "GBR",
        &[
            ("OFFICIAL", Unclassified),
            ("OFFICIAL_SENSITIVE", Restricted),
            ("CONFIDENTIAL", Confidential),
            ("SECRET", Secret),
            ("TOP_SECRET", TopSecret),
        ],
    ),
    (
        "ESP",
        &[
            ("NO_CLASIFICADO", Unclassified),
            ("DIFUSION_LIMITADA", Restricted),
            ("CONFIDENCIAL", Confidential),
            ("SECRETO", Secret),
            ("ALTO_SECRETO", TopSecret),
        ],
    ),
    (
        "ITA",
        &[
            ("NON_CLASSIFICATO", Unclassified),
            ("RISERVATO", Restricted),
            ("RISERVATISSIMO", Confidential),
            ("SEGRETO", Secret),
            ("SEGRETISSIMO", TopSecret),
        ],
    ),
    (
        "NLD",
        &[
            ("NIET_GERUBRICEERD", Unclassified),
            ("DEPARTEMENTAAL_VERTROUWELIJK", Restricted),
            ("VERTROUWELIJK", Confidential),
            ("GEHEIM", Secret),
            ("ZEER_GEHEIM", TopSecret),
        ],
    ),
    (
        "POL",
        &[
            ("JAWNY", Unclassified),
            ("ZASTRZEZONE", Restricted),
            ("POUFNE", Confidential),
            ("TAJNE", Secret),
            ("SCISLE_TAJNE", TopSecret),
        ],
    ),
    (
        "CAN",
        &[
            ("UNCLASSIFIED", Unclassified),
            ("PROTECTED_A", Restricted),
            ("PROTECTED_B", Confidential),
            ("SECRET", Secret),
            ("TOP_SECRET", TopSecret),
        ],
    ),
];

/// Upper-cases, folds common diacritics, and treats spaces, `-` and `_`
/// alike.
pub fn normalize_term(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_sep = false;

    for ch in value.trim().chars() {
        let folded = match ch {
            ' ' | '-' | '_' | '\t' => {
                pending_sep = !out.is_empty();
                continue;
            }
            'À' | 'Â' | 'Á' | 'à' | 'â' | 'á' | 'Ą' | 'ą' => 'A',
            'É' | 'È' | 'Ê' | 'é' | 'è' | 'ê' | 'Ę' | 'ę' => 'E',
            'Í' | 'Î' | 'í' | 'î' => 'I',
            'Ó' | 'Ô' | 'ó' | 'ô' => 'O',
            'Ú' | 'Ü' | 'ú' | 'ü' => 'U',
            'Ś' | 'ś' => 'S',
            'Ż' | 'Ź' | 'ż' | 'ź' => 'Z',
            'Ł' | 'ł' => 'L',
            'Ń' | 'ń' | 'Ñ' | 'ñ' => 'N',
            'Ć' | 'ć' | 'Ç' | 'ç' => 'C',
            other => other.to_ascii_uppercase(),
        };
        if pending_sep {
            out.push('_');
            pending_sep = false;
        }
        out.push(folded);
    }

    out
}

fn lookup(table: &[(&str, Clearance)], term: &str) -> Option<Clearance> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == term)
        .map(|(_, level)| *level)
}

/// Maps a clearance string onto the canonical hierarchy without fallback.
///
/// Canonical names are accepted for every country. Otherwise the issuing
/// country's table is consulted first, then every other table.
pub fn try_translate_clearance(value: &str, country: Option<&str>) -> Option<Clearance> {
    let term = normalize_term(value);
    if term.is_empty() {
        return None;
    }

    if let Some(level) = Clearance::parse(&term) {
        return Some(level);
    }

    let own = country.and_then(|code| {
        NATIONAL_TABLES
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(code))
            .and_then(|(_, table)| lookup(table, &term))
    });

    own.or_else(|| NATIONAL_TABLES.iter().find_map(|(_, table)| lookup(table, &term)))
}

/// Maps a clearance string onto the canonical hierarchy.
///
/// Unknown values map to `UNCLASSIFIED`, the lowest level.
pub fn translate_clearance(value: &str, country: Option<&str>) -> Clearance {
    try_translate_clearance(value, country).unwrap_or_else(|| {
        warn!(
            clearance = %value,
            country = country.unwrap_or("-"),
            "unmapped clearance, treating as UNCLASSIFIED"
        );
        Clearance::Unclassified
    })
}

/// Countries with a national vocabulary.
pub fn supported_countries() -> impl Iterator<Item = &'static str> {
    NATIONAL_TABLES.iter().map(|(country, _)| *country)
}
