//! Secret reference scanning
//!
//! A reference is a `${provider:payload}` token inside a variable value.
//! The provider name matches `[A-Za-z][A-Za-z0-9_-]*` and the payload is any
//! run of characters other than `}`. There is no nesting and no escaping.

use crate::parser::EnvVariable;
use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::OnceLock;

/// Regular expression matching a single token
pub const REFERENCE_PATTERN: &str = r"\$\{(?P<provider>[A-Za-z][A-Za-z0-9_-]*):(?P<reference>[^}]+)\}";

/// Compiled token pattern, shared by the scanner and the rewriter
pub(crate) fn reference_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(REFERENCE_PATTERN).expect("reference pattern is a valid regex"))
}

/// Build the canonical key for a provider and payload
pub fn canonical_key(provider_name: &str, reference: &str) -> String {
    format!("{}://{}", provider_name, reference)
}

/// Canonical key for a regex match of [`REFERENCE_PATTERN`]
pub(crate) fn canonical_key_of(captures: &Captures<'_>) -> String {
    canonical_key(&captures["provider"], &captures["reference"])
}

/// A token found in a variable value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretReference {
    /// Provider name from the token
    pub provider_name: String,
    /// Opaque payload handed to the provider
    pub reference: String,
    /// Key of the variable the token belongs to
    pub key: String,
    /// Byte offset of the token start within the value
    pub start: usize,
    /// Byte offset just past the token end within the value
    pub end: usize,
}

impl SecretReference {
    /// `provider://payload`, the deduplication key for resolution
    pub fn canonical_key(&self) -> String {
        canonical_key(&self.provider_name, &self.reference)
    }
}

/// Extract every token from the variables' values, in file order
pub fn find_references(variables: &[EnvVariable]) -> Vec<SecretReference> {
    let regex = reference_regex();

    variables
        .iter()
        .flat_map(|var| {
            regex.captures_iter(&var.value).filter_map(move |caps| {
                let whole = caps.get(0)?;
                Some(SecretReference {
                    provider_name: caps["provider"].to_string(),
                    reference: caps["reference"].to_string(),
                    key: var.key.clone(),
                    start: whole.start(),
                    end: whole.end(),
                })
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_single_reference() {
        let vars = parse("DB_PASSWORD=${env:DB_PASSWORD}");
        let refs = find_references(&vars);

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].provider_name, "env");
        assert_eq!(refs[0].reference, "DB_PASSWORD");
        assert_eq!(refs[0].key, "DB_PASSWORD");
        assert_eq!((refs[0].start, refs[0].end), (0, 18));
        assert_eq!(refs[0].canonical_key(), "env://DB_PASSWORD");
    }

    #[test]
    fn test_multiple_references_in_one_value() {
        let vars = parse("URL=postgres://${env:USER}:${vault:secret/db/pass}@host/db");
        let refs = find_references(&vars);

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].provider_name, "env");
        assert_eq!(refs[1].provider_name, "vault");
        assert_eq!(refs[1].reference, "secret/db/pass");
        assert_eq!(refs[0].start, 11);
        assert_eq!(&vars[0].value[refs[1].start..refs[1].end], "${vault:secret/db/pass}");
    }

    #[test]
    fn test_spans_are_relative_to_quote_stripped_value() {
        let vars = parse(r#"KEY="  ${env:X}""#);
        let refs = find_references(&vars);
        assert_eq!((refs[0].start, refs[0].end), (2, 10));
    }

    #[test]
    fn test_provider_name_grammar() {
        let vars = parse(
            "A=${1password:v/i/f}\nB=${my-provider_2:x}\nC=${:x}\nD=${env:}\nE=${_bad:x}",
        );
        let refs = find_references(&vars);

        // A token must start with a letter, so `1password` is not a provider name here
        let providers: Vec<&str> = refs.iter().map(|r| r.provider_name.as_str()).collect();
        assert_eq!(providers, vec!["my-provider_2"]);
    }

    #[test]
    fn test_payload_stops_at_first_closing_brace() {
        let vars = parse("A=${env:X}}");
        let refs = find_references(&vars);
        assert_eq!(refs[0].reference, "X");
    }

    #[test]
    fn test_no_references() {
        let vars = parse("PLAIN=value\nDOLLAR=$HOME\nBRACES={x}");
        assert!(find_references(&vars).is_empty());
    }

    #[test]
    fn test_duplicate_tokens_are_separate_references() {
        let vars = parse("A=${env:HOST}\nB=${env:HOST}");
        let refs = find_references(&vars);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].key, "A");
        assert_eq!(refs[1].key, "B");
        assert_eq!(refs[0].canonical_key(), refs[1].canonical_key());
    }
}
