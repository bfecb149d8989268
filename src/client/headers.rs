//! Header bag used by request builders.
//!
//! # Responsibilities
//! - Keep header values per name in insertion order
//! - Match names case-insensitively
//! - Convert into a `HeaderMap` when a request is prepared
//!
//! # Design Decisions
//! - Validation is deferred to `to_header_map`, so `add`/`set` are total
//! - Storage is an owned `Vec`; `Clone` yields fully independent storage

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::client::error::BoxError;

/// Ordered multi-map of header name to values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBag {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` to the values already stored under `name`.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Replace every value stored under `name` with `value`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1 = vec![value],
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Values stored under `name`, empty when absent.
    pub fn values(&self, name: &str) -> &[String] {
        self.position(name)
            .map(|i| self.entries[i].1.as_slice())
            .unwrap_or(&[])
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every `(name, value)` pair in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(name, values)| {
            values.iter().map(move |value| (name.as_str(), value.as_str()))
        })
    }

    /// Build a `HeaderMap`, failing on the first invalid name or value.
    pub fn to_header_map(&self) -> Result<HeaderMap, BoxError> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in self.iter() {
            let name = HeaderName::from_bytes(name.as_bytes())?;
            let value = HeaderValue::from_str(value)?;
            map.append(name, value);
        }
        Ok(map)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderBag
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = HeaderBag::new();
        for (name, value) in iter {
            bag.add(name, value);
        }
        bag
    }
}
