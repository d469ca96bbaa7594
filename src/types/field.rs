//! Field selectors and the per-sample value tuple

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{CloudletError, Result};

/// Record key reserved for the running sample index
pub const INDEX_KEY: char = 'n';

/// Maximum number of user-selectable fields per record
pub const MAX_FIELDS: usize = 4;

/// A single-character field name a record may carry.
///
/// Lowercase `a`-`z` are selectable, except the reserved index key `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldKey(char);

impl FieldKey {
    /// Every selectable key in alphabet order
    pub fn all() -> impl Iterator<Item = FieldKey> {
        ('a'..='z').filter(|&c| c != INDEX_KEY).map(FieldKey)
    }

    pub fn as_char(self) -> char {
        self.0
    }
}

impl TryFrom<char> for FieldKey {
    type Error = CloudletError;

    fn try_from(value: char) -> Result<Self> {
        if value.is_ascii_lowercase() && value != INDEX_KEY {
            Ok(FieldKey(value))
        } else {
            Err(CloudletError::InvalidFieldKey { key: value.to_string() })
        }
    }
}

impl FromStr for FieldKey {
    type Err = CloudletError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => FieldKey::try_from(c),
            _ => Err(CloudletError::InvalidFieldKey { key: trimmed.to_string() }),
        }
    }
}

impl TryFrom<String> for FieldKey {
    type Error = CloudletError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<FieldKey> for String {
    fn from(key: FieldKey) -> Self {
        key.0.to_string()
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered set of one to four distinct field keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FieldKey>", into = "Vec<FieldKey>")]
pub struct FieldLayout {
    keys: Vec<FieldKey>,
}

impl FieldLayout {
    /// Validate and store a key order
    pub fn new(keys: impl IntoIterator<Item = FieldKey>) -> Result<Self> {
        let keys: Vec<FieldKey> = keys.into_iter().collect();

        if keys.is_empty() {
            return Err(CloudletError::invalid_fields("at least one key is required"));
        }
        if keys.len() > MAX_FIELDS {
            return Err(CloudletError::invalid_fields(format!(
                "{} keys given, at most {} allowed",
                keys.len(),
                MAX_FIELDS
            )));
        }
        for (i, key) in keys.iter().enumerate() {
            if keys[..i].contains(key) {
                return Err(CloudletError::invalid_fields(format!("key '{}' repeated", key)));
            }
        }

        Ok(Self { keys })
    }

    /// Parse a comma separated list such as `x,y`
    pub fn parse_list(list: &str) -> Result<Self> {
        let keys = list.split(',').map(str::parse).collect::<Result<Vec<FieldKey>>>()?;
        Self::new(keys)
    }

    pub fn keys(&self) -> &[FieldKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Default block layout `a, b, c, d`
impl Default for FieldLayout {
    fn default() -> Self {
        Self { keys: vec![FieldKey('a'), FieldKey('b'), FieldKey('c'), FieldKey('d')] }
    }
}

impl TryFrom<Vec<FieldKey>> for FieldLayout {
    type Error = CloudletError;

    fn try_from(keys: Vec<FieldKey>) -> Result<Self> {
        Self::new(keys)
    }
}

impl From<FieldLayout> for Vec<FieldKey> {
    fn from(layout: FieldLayout) -> Self {
        layout.keys
    }
}

/// Up to four positional sample values.
///
/// Positions are significant: a missing second value with a present third value
/// leaves the second key out of the record and gives the third key its value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SampleValues([Option<f64>; MAX_FIELDS]);

impl SampleValues {
    pub fn new(v1: f64, v2: Option<f64>, v3: Option<f64>, v4: Option<f64>) -> Self {
        Self([Some(v1), v2, v3, v4])
    }

    pub fn get(&self, position: usize) -> Option<f64> {
        self.0.get(position).copied().flatten()
    }

    /// Number of values actually supplied
    pub fn supplied(&self) -> usize {
        self.0.iter().filter(|v| v.is_some()).count()
    }
}

impl From<f64> for SampleValues {
    fn from(v: f64) -> Self {
        Self::new(v, None, None, None)
    }
}

impl From<(f64, f64)> for SampleValues {
    fn from((a, b): (f64, f64)) -> Self {
        Self::new(a, Some(b), None, None)
    }
}

impl From<(f64, f64, f64)> for SampleValues {
    fn from((a, b, c): (f64, f64, f64)) -> Self {
        Self::new(a, Some(b), Some(c), None)
    }
}

impl From<(f64, f64, f64, f64)> for SampleValues {
    fn from((a, b, c, d): (f64, f64, f64, f64)) -> Self {
        Self::new(a, Some(b), Some(c), Some(d))
    }
}

impl From<&[f64]> for SampleValues {
    fn from(values: &[f64]) -> Self {
        let mut slots = [None; MAX_FIELDS];
        for (slot, value) in slots.iter_mut().zip(values) {
            *slot = Some(*value);
        }
        Self(slots)
    }
}
