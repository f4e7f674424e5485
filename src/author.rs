use deunicode::deunicode;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NORMALIZE_RE: Regex = Regex::new(r"[^\w\s]").unwrap();
}

/// Rows scoring at or below this are not downloaded. Catalog names carry
/// birth/death years and "Last, First" ordering, so the bar is low.
pub const AUTHOR_MATCH_THRESHOLD: u8 = 40;

/// Similarity of two author fields in `0..=100`.
///
/// A missing author on either side counts as a match (100): an absent field
/// says nothing against the title match. Otherwise the names are normalized
/// and compared with a substring-aware partial ratio, both as written and
/// with their tokens sorted, and the better score is kept. A name made only
/// of punctuation is compared case-folded as written.
pub fn author_match(a: Option<&str>, b: Option<&str>) -> u8 {
    let (Some(raw_a), Some(raw_b)) = (present(a), present(b)) else {
        return 100;
    };

    let a = normalize_name(raw_a);
    let b = normalize_name(raw_b);
    if a.is_empty() || b.is_empty() {
        let folded = partial_ratio(&raw_a.trim().to_lowercase(), &raw_b.trim().to_lowercase());
        return to_score(folded);
    }
    let direct = partial_ratio(&a, &b);
    let sorted = partial_ratio(&token_sort(&a), &token_sort(&b));
    to_score(direct.max(sorted))
}

fn to_score(ratio: f64) -> u8 {
    (ratio * 100.0).round() as u8
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Transliterates to ASCII, lowercases, drops punctuation and collapses
/// whitespace.
fn normalize_name(text: &str) -> String {
    let unidecoded = deunicode(text);
    let lowercased = unidecoded.to_lowercase();
    let cleaned = NORMALIZE_RE.replace_all(&lowercased, "");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn token_sort(text: &str) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Best similarity between the shorter string and any equally long window of
/// the longer one, in `0.0..=1.0`.
fn partial_ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (short, long) = if a_chars.len() <= b_chars.len() {
        (a_chars, b_chars)
    } else {
        (b_chars, a_chars)
    };
    if short.is_empty() {
        return 0.0;
    }

    let needle: String = short.iter().collect();
    let mut best = 0.0f64;
    for start in 0..=(long.len() - short.len()) {
        let window: String = long[start..start + short.len()].iter().collect();
        let score = strsim::normalized_levenshtein(&needle, &window);
        if score > best {
            best = score;
            if best >= 1.0 {
                break;
            }
        }
    }
    best
}
