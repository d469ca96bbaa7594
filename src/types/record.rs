//! Sample records and their canonical text form

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::field::{FieldKey, FieldLayout, INDEX_KEY, SampleValues};
use crate::Result;

/// Largest magnitude at which every integer is exactly representable in an f64
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// One sample: field values in layout order plus the running index.
///
/// Built fresh for every sample. The index is kept apart from the user fields so a
/// record can never carry `n` as a selectable key; it is injected just before
/// serialization and always serializes last.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleRecord {
    fields: Vec<(FieldKey, f64)>,
    index: Option<u64>,
}

impl SampleRecord {
    /// Zip a layout with positional values, omitting keys whose value is absent
    pub fn build(layout: &FieldLayout, values: &SampleValues) -> Self {
        let fields = layout
            .keys()
            .iter()
            .enumerate()
            .filter_map(|(position, key)| values.get(position).map(|v| (*key, v)))
            .collect();

        Self { fields, index: None }
    }

    /// Set the reserved index, replacing any previous one
    pub fn with_index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    pub fn get(&self, key: FieldKey) -> Option<f64> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Field keys in insertion order, excluding the index
    pub fn keys(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.fields.iter().map(|(k, _)| *k)
    }

    pub fn index(&self) -> Option<u64> {
        self.index
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serialize to the compact JSON object the collector parses
    pub fn to_canonical_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for SampleRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let entries = self.fields.len() + usize::from(self.index.is_some());
        let mut map = serializer.serialize_map(Some(entries))?;
        for (key, value) in &self.fields {
            map.serialize_entry(&key.as_char(), &CanonicalNumber(*value))?;
        }
        if let Some(index) = self.index {
            map.serialize_entry(&INDEX_KEY, &index)?;
        }
        map.end()
    }
}

/// Number formatting the collector expects: integral values without a fraction,
/// non-finite values as `null`.
struct CanonicalNumber(f64);

impl Serialize for CanonicalNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let v = self.0;
        if !v.is_finite() {
            serializer.serialize_unit()
        } else if v.fract() == 0.0 && v.abs() < MAX_EXACT_INTEGER {
            serializer.serialize_i64(v as i64)
        } else {
            serializer.serialize_f64(v)
        }
    }
}
