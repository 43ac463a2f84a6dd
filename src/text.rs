//! TEXT / ANALYSIS segment: delimiter-framed keyword/value decoding into
//! an order-preserving metadata map.

use std::collections::HashMap;
use std::str;

use crate::error::{FcsError, FcsResult};

/// An ordered mapping of lowercased keys to string values.
///
/// Iteration order matches input order on read and explicit insertion
/// order on write — a plain `HashMap` would silently reorder keywords,
/// which breaks both the "file order" read guarantee and the
/// deterministic-output guarantee on write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `key` with `value`. `key` is used verbatim;
    /// callers that want the "standard keys are stored lowercase"
    /// convention should lowercase before calling.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(&i) = self.index.get(&key) {
            self.entries[i].1 = value;
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.index.get(key).map(|&i| self.entries[i].1.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

/// Decode a raw TEXT/ANALYSIS byte range. Tries UTF-8 first, falling
/// back to ISO-8859-1 (Latin-1), since FCS files in the wild are not
/// reliably one encoding and Latin-1 is a total function over bytes.
pub(crate) fn decode_segment(bytes: &[u8]) -> String {
    match str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Split `body` on occurrences of `delimiter` that are standalone,
/// contracting doubled delimiters into a single literal character in
/// the surrounding token.
///
/// This plays the role the FCS reference implementation gives a regex
/// with lookaround (`(?<=[^delim])delim(?!delim)`); the `regex` crate
/// used elsewhere in this codebase does not support lookaround, so the
/// split is done with an explicit two-state scan instead.
fn scan_tokens(body: &str, delimiter: char) -> Vec<String> {
    let chars: Vec<char> = body.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == delimiter {
            if i + 1 < chars.len() && chars[i + 1] == delimiter {
                current.push(delimiter);
                i += 2;
            } else {
                tokens.push(std::mem::take(&mut current));
                i += 1;
            }
        } else {
            current.push(chars[i]);
            i += 1;
        }
    }
    tokens.push(current);
    tokens
}

/// Parse a decoded TEXT/ANALYSIS string into an ordered [`Metadata`].
///
/// The first character is the delimiter. Leading/trailing delimiters
/// are stripped, all `$` characters are removed (they mark standard
/// keywords on disk only, they are not part of the key), and the
/// remainder is tokenized on standalone delimiter occurrences and
/// paired up as (key, value).
pub(crate) fn parse_pairs(text: &str) -> FcsResult<Metadata> {
    let mut chars = text.chars();
    let delimiter = chars
        .next()
        .ok_or_else(|| FcsError::parse("TEXT segment is empty, no delimiter character"))?;

    let mut body: String = chars.collect();
    if body.ends_with(delimiter) {
        body.pop();
    }
    let body: String = body.chars().filter(|&c| c != '$').collect();

    let tokens = scan_tokens(&body, delimiter);
    if tokens.len() % 2 != 0 {
        return Err(FcsError::parse(format!(
            "TEXT segment has an odd number of tokens ({}); cannot pair keywords and values",
            tokens.len()
        )));
    }

    let mut metadata = Metadata::new();
    for pair in tokens.chunks(2) {
        metadata.insert(pair[0].to_lowercase(), pair[1].clone());
    }
    Ok(metadata)
}

/// Parse a raw TEXT/ANALYSIS byte range into [`Metadata`], or an empty
/// map if the range is empty.
pub(crate) fn parse_segment(bytes: &[u8]) -> FcsResult<Metadata> {
    if bytes.is_empty() {
        return Ok(Metadata::new());
    }
    parse_pairs(&decode_segment(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_pairs() {
        let text = "/$BEGINDATA/256/$PAR/2/";
        let meta = parse_segment(text.as_bytes()).unwrap();
        assert_eq!(meta.get("begindata"), Some("256"));
        assert_eq!(meta.get("par"), Some("2"));
    }

    #[test]
    fn keys_are_lowercased_values_preserve_case() {
        let text = "/$CYT/FACSAria/";
        let meta = parse_segment(text.as_bytes()).unwrap();
        assert_eq!(meta.get("cyt"), Some("FACSAria"));
    }

    #[test]
    fn doubled_delimiter_contracts_to_literal() {
        // value contains a literal '/' stored as '//'
        let text = "/$COM/a//b/";
        let meta = parse_segment(text.as_bytes()).unwrap();
        assert_eq!(meta.get("com"), Some("a/b"));
    }

    #[test]
    fn preserves_input_order() {
        let text = "/$TOT/10/$PAR/2/$CYT/Aria/";
        let meta = parse_segment(text.as_bytes()).unwrap();
        let keys: Vec<&str> = meta.keys().collect();
        assert_eq!(keys, vec!["tot", "par", "cyt"]);
    }

    #[test]
    fn odd_token_count_is_parse_error() {
        let text = "/$TOT/10/$PAR/";
        let err = parse_segment(text.as_bytes()).unwrap_err();
        assert!(matches!(err, FcsError::Parse(_)));
    }

    #[test]
    fn empty_range_yields_empty_map() {
        let meta = parse_segment(&[]).unwrap();
        assert!(meta.is_empty());
    }

    #[test]
    fn pipe_delimiter_is_handled_without_regex_escaping() {
        let text = "|$PAR|2|";
        let meta = parse_segment(text.as_bytes()).unwrap();
        assert_eq!(meta.get("par"), Some("2"));
    }
}
