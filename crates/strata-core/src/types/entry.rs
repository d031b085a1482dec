use crate::error::{Result, StrataError};
use crate::types::id::EntryId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A single field value: UTF-8 text or opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Binary(Vec<u8>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FieldValue::Text(s) => s.as_bytes(),
            FieldValue::Binary(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(b: Vec<u8>) -> Self {
        FieldValue::Binary(b)
    }
}

impl From<&[u8]> for FieldValue {
    fn from(b: &[u8]) -> Self {
        FieldValue::Binary(b.to_vec())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Binary(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Ordered field map of an entry. Keys are unique and there is at least one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fields(Vec<(String, FieldValue)>);

impl Fields {
    /// Build a validated field list, preserving the caller's order.
    pub fn new<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let pairs: Vec<(String, FieldValue)> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        if pairs.is_empty() {
            return Err(StrataError::InvalidEntry(
                "an entry needs at least one field".into(),
            ));
        }

        let mut seen = HashSet::with_capacity(pairs.len());
        for (key, _) in &pairs {
            if !seen.insert(key.as_str()) {
                return Err(StrataError::InvalidEntry(format!(
                    "duplicate field '{}'",
                    key
                )));
            }
        }

        Ok(Self(pairs))
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total key and value bytes.
    pub fn payload_bytes(&self) -> usize {
        self.0.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

/// An immutable record in a log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub fields: Fields,
}

impl Entry {
    pub fn new(id: EntryId, fields: Fields) -> Self {
        Self { id, fields }
    }

    /// Shortcut for `self.fields.get(key)` returning text values only.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(FieldValue::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_preserve_order() {
        let fields = Fields::new([("event", "signup"), ("userId", "101")]).unwrap();
        let keys: Vec<&str> = fields.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["event", "userId"]);
        assert_eq!(fields.get("userId").and_then(FieldValue::as_str), Some("101"));
    }

    #[test]
    fn test_empty_fields_rejected() {
        let err = Fields::new(Vec::<(String, String)>::new()).unwrap_err();
        assert!(matches!(err, StrataError::InvalidEntry(_)));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let err = Fields::new([("a", "1"), ("a", "2")]).unwrap_err();
        assert!(matches!(err, StrataError::InvalidEntry(_)));
    }

    #[test]
    fn test_binary_values_survive_json() {
        let fields = Fields::new([
            ("name", FieldValue::from("blob")),
            ("data", FieldValue::from(vec![0u8, 159, 146, 150])),
        ])
        .unwrap();
        let entry = Entry::new(EntryId::new(1, 0), fields);

        let json = serde_json::to_vec(&entry).unwrap();
        let back: Entry = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, entry);
        assert_eq!(back.text("name"), Some("blob"));
        assert_eq!(back.fields.payload_bytes(), 4 + 4 + 4 + 4);
    }
}
