use crate::types::RawAddress;
use once_cell::sync::Lazy;
use regex::Regex;

/// Address fields after normalization, ready for candidate-query building.
///
/// Same shape as [`RawAddress`] with tighter invariants: the postal code is
/// digits only, a "no number" sentinel becomes an empty number, street names
/// have their leading abbreviation expanded, and casing is canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedAddress {
    pub street: String,
    pub number: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

impl NormalizedAddress {
    pub fn as_raw(&self) -> RawAddress {
        RawAddress {
            street: self.street.clone(),
            number: self.number.clone(),
            neighborhood: self.neighborhood.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            postal_code: self.postal_code.clone(),
        }
    }
}

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static NON_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\D").unwrap());

/// Carrier sentinels meaning "address has no street number".
const NO_NUMBER_SENTINELS: [&str; 5] = ["0", "SN", "S/N", "SN.", "S N"];

/// Street-type abbreviations expanded at the start of a street name.
/// Longer forms come first so that e.g. "RUA" is not matched as "R" + text.
static STREET_PREFIXES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"(?i)^RUA\s+").unwrap(), "Rua "),
        (Regex::new(r"(?i)^R\.\s*").unwrap(), "Rua "),
        (Regex::new(r"(?i)^R\s+").unwrap(), "Rua "),
        (Regex::new(r"(?i)^AVENIDA\s+").unwrap(), "Avenida "),
        (Regex::new(r"(?i)^AV\.\s*").unwrap(), "Avenida "),
        (Regex::new(r"(?i)^AV\s+").unwrap(), "Avenida "),
        (Regex::new(r"(?i)^TRAVESSA\s+").unwrap(), "Travessa "),
        (Regex::new(r"(?i)^TRAV\.\s*").unwrap(), "Travessa "),
        (Regex::new(r"(?i)^TRAV\s+").unwrap(), "Travessa "),
        (Regex::new(r"(?i)^PRAÇA\s+").unwrap(), "Praça "),
        (Regex::new(r"(?i)^PR\.\s*").unwrap(), "Praça "),
        (Regex::new(r"(?i)^PR\s+").unwrap(), "Praça "),
    ]
});

/// Cleans raw NF-e address fragments into a canonical form for geocoding.
///
/// Pure and total: malformed input degrades to empty or partial fields, it
/// never errors. Applying it to an already-normalized address is a no-op.
pub fn normalize(raw: &RawAddress) -> NormalizedAddress {
    let postal_code = NON_DIGIT
        .replace_all(raw.postal_code.trim(), "")
        .into_owned();

    let number = raw.number.trim();
    let number = if NO_NUMBER_SENTINELS.contains(&number.to_uppercase().as_str()) {
        String::new()
    } else {
        number.to_string()
    };

    NormalizedAddress {
        street: normalize_street(&raw.street),
        number,
        neighborhood: title_case(raw.neighborhood.trim()),
        city: title_case(raw.city.trim()),
        state: raw.state.trim().to_uppercase(),
        postal_code,
    }
}

fn normalize_street(street: &str) -> String {
    let collapsed = WHITESPACE.replace_all(street.trim(), " ").into_owned();
    if collapsed.is_empty() {
        return collapsed;
    }

    let expanded = STREET_PREFIXES
        .iter()
        .find(|(pattern, _)| pattern.is_match(&collapsed))
        .map(|(pattern, replacement)| pattern.replace(&collapsed, *replacement).into_owned())
        .unwrap_or(collapsed);

    title_case(expanded.trim())
}

/// Title-cases each whitespace-separated word without corrupting multi-byte
/// characters (diacritics survive).
fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
