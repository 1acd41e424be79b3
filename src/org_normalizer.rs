//! Employer Name Normalization
//!
//! Turns raw employer names from case records into search keys the business
//! directory's search form handles well:
//! - "Doing business as" names: `Foo LLC d/b/a Bar Foods` -> `Bar Foods`
//! - Corporate suffixes and affiliate phrases: `Acme, Inc. a subsidiary of X` -> `Acme`
//! - Noise fragments: `-TV`, `Ltd`, parenthesized text
//! - Overlong names, shortened on word boundaries with [`truncate`]
//!
//! Normalization never fails. An empty result means the case has no
//! searchable name.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// "d/b/a", "dba", "d.b.a.", "doing business as"
static DBA_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:d[^a-z0-9]?b[^a-z0-9]?a|doing business as)\b\.?").unwrap()
});

/// Markers after which the rest of the name is dropped, applied in order.
static TRUNCATION_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i),?\s*\binc\b\.?",
        r"(?i),?\s*\bl\.?l\.?c\b\.?",
        r"(?i)\ba subsidiary\b",
        r"(?i)\ban affiliate\b",
        r"(?i)\ba division\b",
        // standalone dash, not a hyphenated word
        r"\s-|-\s",
        r"/",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

/// Fragments removed wherever they appear.
static NOISE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"(?i)-tv\b", r"(?i)\bltd\b\.?", r"\([^)]*\)"]
        .iter()
        .map(|pattern| Regex::new(pattern).unwrap())
        .collect()
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Upper bound on cleanup passes; a pass can expose a new marker
/// (e.g. removing parentheses), so cleanup runs until the name is stable.
const MAX_PASSES: usize = 4;

/// Normalize a raw employer name into a directory search key.
pub fn normalize(raw_name: &str) -> String {
    let mut current = raw_name.to_string();

    for _ in 0..MAX_PASSES {
        let next = normalize_once(&current);
        if next == current {
            break;
        }
        current = next;
    }

    debug!("Normalized '{}' to '{}'", raw_name, current);
    current
}

fn normalize_once(name: &str) -> String {
    // Keep only the trade name after the last "doing business as" marker
    let mut result = match DBA_MARKER.find_iter(name).last() {
        Some(marker) => name[marker.end()..].to_string(),
        None => name.to_string(),
    };

    for marker in TRUNCATION_MARKERS.iter() {
        if let Some(found) = marker.find(&result) {
            result.truncate(found.start());
        }
    }

    for noise in NOISE.iter() {
        result = noise.replace_all(&result, "").into_owned();
    }

    clean_edges(&result)
}

/// Collapse internal whitespace and trim whitespace and dangling commas.
fn clean_edges(name: &str) -> String {
    let collapsed = WHITESPACE.replace_all(name, " ");
    collapsed
        .trim_matches(|c: char| c.is_whitespace() || c == ',')
        .to_string()
}

/// The registered (legal) name preceding a "doing business as" marker, normalized.
/// Returns `None` when the name carries no marker.
pub fn legal_name(raw_name: &str) -> Option<String> {
    let marker = DBA_MARKER.find(raw_name)?;
    let legal = normalize(&raw_name[..marker.start()]);
    if legal.is_empty() {
        None
    } else {
        Some(legal)
    }
}

/// Shorten `name` to at most `limit` characters by dropping whole trailing words.
///
/// A name whose first word alone exceeds the limit truncates to an empty string.
pub fn truncate(name: &str, limit: usize) -> String {
    if name.chars().count() <= limit {
        return name.to_string();
    }

    let mut truncated = String::new();
    let mut length = 0;

    for word in name.split_whitespace() {
        let word_length = word.chars().count();
        let needed = if truncated.is_empty() {
            word_length
        } else {
            length + 1 + word_length
        };
        if needed > limit {
            break;
        }
        if !truncated.is_empty() {
            truncated.push(' ');
        }
        truncated.push_str(word);
        length = needed;
    }

    truncated
}

/// Search-name guesses for one case, in the order they should be tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCandidates {
    pub primary: String,
    pub secondary: Option<String>,
}

/// Build the name guesses for a case.
///
/// Pre-computed clean names from the work list win; missing ones are derived
/// from the raw employer name. The secondary guess is dropped when empty or
/// equal (case-insensitively) to the primary.
pub fn candidate_names(
    raw_name: &str,
    clean_name_1: Option<&str>,
    clean_name_2: Option<&str>,
    max_chars: usize,
) -> NameCandidates {
    let primary = match clean_name_1.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => normalize(raw_name),
    };
    let primary = truncate(&primary, max_chars);

    let secondary = match clean_name_2.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => Some(name.to_string()),
        None => legal_name(raw_name),
    }
    .map(|name| truncate(&name, max_chars))
    .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case(&primary));

    NameCandidates { primary, secondary }
}
