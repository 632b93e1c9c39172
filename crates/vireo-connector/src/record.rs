//! External record and attribute value types.
//!
//! An [`ExternalRecord`] is the external system's representation of one
//! identity: an opaque unique id, a human-readable name, and a set of
//! named, multi-valued attributes. Records are immutable once read from
//! the connector.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A scalar attribute value.
///
/// External systems deliver loosely typed data; the engine keeps it as
/// read, and interprets it against an internal schema only at
/// correlation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Explicit null marker.
    Null,
    /// A string value.
    String(String),
    /// An integer value.
    Integer(i64),
    /// A boolean value.
    Boolean(bool),
    /// A floating-point value.
    Float(f64),
}

impl AttributeValue {
    /// Check if this is the null marker.
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Get as a string if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an integer if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as a boolean if this is a boolean value.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Render the value as plain text, the form used for opaque
    /// identifier comparison.
    pub fn to_text(&self) -> String {
        match self {
            AttributeValue::Null => String::new(),
            AttributeValue::String(s) => s.clone(),
            AttributeValue::Integer(i) => i.to_string(),
            AttributeValue::Boolean(b) => b.to_string(),
            AttributeValue::Float(f) => f.to_string(),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        AttributeValue::Float(f)
    }
}

/// The external system's representation of one identity.
///
/// Immutable once read; accessors hand out references and projection
/// copies values, so downstream mutation never aliases the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRecord {
    uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    attributes: HashMap<String, Vec<AttributeValue>>,
}

impl ExternalRecord {
    /// Create a new record with the given opaque uid.
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: None,
            attributes: HashMap::new(),
        }
    }

    /// Set the human-readable name (builder style).
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set a single-valued attribute (builder style).
    #[must_use]
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(name.into(), vec![value.into()]);
        self
    }

    /// Set a multi-valued attribute (builder style).
    #[must_use]
    pub fn with_values(mut self, name: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), values);
        self
    }

    /// The opaque unique id in the external system.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// The human-readable name, if the external system provides one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Get an attribute's value list.
    pub fn get(&self, name: &str) -> Option<&[AttributeValue]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    /// Get the first non-null value of an attribute.
    pub fn first_value(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .get(name)?
            .iter()
            .find(|v| !v.is_null())
    }

    /// Check if the attribute is present on the record, regardless of
    /// whether it carries any values.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Check if the attribute is present but carries no usable value
    /// (empty list or only null markers).
    pub fn is_empty_attribute(&self, name: &str) -> bool {
        match self.attributes.get(name) {
            Some(values) => values.iter().all(AttributeValue::is_null),
            None => false,
        }
    }

    /// Iterate over all attributes.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &[AttributeValue])> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let record = ExternalRecord::new("uid=jdoe")
            .with_name("John Doe")
            .with_attribute("mail", "j@x.com")
            .with_values("groups", vec!["staff".into(), "admins".into()]);

        assert_eq!(record.uid(), "uid=jdoe");
        assert_eq!(record.name(), Some("John Doe"));
        assert_eq!(record.first_value("mail").unwrap().as_str(), Some("j@x.com"));
        assert_eq!(record.get("groups").unwrap().len(), 2);
    }

    #[test]
    fn test_empty_attribute_detection() {
        let record = ExternalRecord::new("u1")
            .with_values("cleared", vec![])
            .with_values("nulled", vec![AttributeValue::Null])
            .with_attribute("mail", "a@b.c");

        assert!(record.has_attribute("cleared"));
        assert!(record.is_empty_attribute("cleared"));
        assert!(record.is_empty_attribute("nulled"));
        assert!(!record.is_empty_attribute("mail"));
        assert!(!record.is_empty_attribute("absent"));
        assert!(!record.has_attribute("absent"));
    }

    #[test]
    fn test_first_value_skips_nulls() {
        let record = ExternalRecord::new("u1").with_values(
            "mail",
            vec![AttributeValue::Null, "a@b.c".into()],
        );
        assert_eq!(record.first_value("mail").unwrap().as_str(), Some("a@b.c"));
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(AttributeValue::from("x").to_text(), "x");
        assert_eq!(AttributeValue::from(42i64).to_text(), "42");
        assert_eq!(AttributeValue::from(true).to_text(), "true");
        assert_eq!(AttributeValue::Null.to_text(), "");
    }

    #[test]
    fn test_value_serializes_untagged() {
        assert_eq!(
            serde_json::to_string(&AttributeValue::from("x")).unwrap(),
            "\"x\""
        );
        assert_eq!(serde_json::to_string(&AttributeValue::from(7i64)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&AttributeValue::Null).unwrap(), "null");
    }
}
