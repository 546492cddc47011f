//! Content rewriting
//!
//! Substitutes resolved values for tokens in one pass over the whole file
//! text. Tokens are looked up by canonical key; a token without an entry is
//! left byte-for-byte unchanged.

use crate::reference::{canonical_key_of, reference_regex};
use regex::Captures;
use std::borrow::Cow;
use std::collections::HashMap;

/// Replace every token in `content` whose canonical key has a resolved value
pub fn rewrite<'a>(content: &'a str, resolved: &HashMap<String, String>) -> Cow<'a, str> {
    if resolved.is_empty() {
        return Cow::Borrowed(content);
    }

    reference_regex().replace_all(content, |caps: &Captures<'_>| {
        match resolved.get(&canonical_key_of(caps)) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        }
    })
}
