//! Line-oriented key=value dictionaries
//!
//! The encoding of control documents such as the root topology. One entry
//! per line, key and value separated by the first `=`; newlines, carriage
//! returns and backslashes inside keys or values are backslash-escaped.
//! Serialization is canonical (sorted by key), which makes the serialized
//! form stable enough to sign.

use std::collections::BTreeMap;
use std::fmt;

/// An ordered string-to-string dictionary
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dictionary {
    entries: BTreeMap<String, String>,
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a serialized dictionary. Lenient: lines without a separator
    /// are skipped.
    pub fn parse(s: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in s.lines() {
            if line.is_empty() {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                entries.insert(unescape(key), unescape(value));
            }
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Insert or replace an entry. Keys must not contain `=`.
    pub fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
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

    /// Parse an entry's value as a nested dictionary
    pub fn sub_dictionary(&self, key: &str) -> Option<Dictionary> {
        self.get(key).map(Dictionary::parse)
    }
}

impl fmt::Display for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            writeln!(f, "{}={}", escape(key), escape(value))?;
        }
        Ok(())
    }
}
