//! Internal entity model.
//!
//! The engine is generic over entity kinds through [`KindProfile`]: a
//! kind tag plus the attribute schema needed to interpret loosely typed
//! external values. Orchestrators take a list of profiles instead of
//! being duplicated per kind.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use vireo_connector::AttributeValue;

/// Unique identifier of an internal entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Create a new random EntityId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an EntityId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse from a string representation.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Kind of internal entity under reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A person identity.
    User,
    /// A role or group.
    Group,
    /// Any other entity kind a resource may expose.
    Generic,
}

impl EntityKind {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Group => "group",
            EntityKind::Generic => "generic",
        }
    }

    /// Whether deltas of this kind run in the dedicated group pass
    /// with owner resolution.
    #[must_use]
    pub fn is_group_like(&self) -> bool {
        matches!(self, EntityKind::Group)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(EntityKind::User),
            "group" => Ok(EntityKind::Group),
            "generic" => Ok(EntityKind::Generic),
            _ => Err(format!("Unknown entity kind: {s}")),
        }
    }
}

/// One internal identity record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Entity id.
    pub id: EntityId,
    /// Entity kind.
    pub kind: EntityKind,
    /// Unique name within the kind.
    pub name: String,
    /// Named, multi-valued attributes.
    #[serde(default)]
    pub attributes: HashMap<String, Vec<AttributeValue>>,
}

impl Entity {
    /// Create a new entity with a fresh id and no attributes.
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            kind,
            name: name.into(),
            attributes: HashMap::new(),
        }
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

    /// Get the first non-null value of an attribute.
    pub fn first_value(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)?.iter().find(|v| !v.is_null())
    }
}

/// Declared type of an internal schema attribute.
///
/// Used to interpret the account-id value during fallback correlation;
/// a value that fails to parse degrades to raw text, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaType {
    /// Free text.
    Text,
    /// Signed integer.
    Integer,
    /// Boolean flag.
    Boolean,
    /// Decimal number.
    Decimal,
}

impl SchemaType {
    /// Parse raw text against this type; `None` on mismatch.
    pub fn parse_value(&self, raw: &str) -> Option<AttributeValue> {
        match self {
            SchemaType::Text => Some(AttributeValue::String(raw.to_string())),
            SchemaType::Integer => raw.parse::<i64>().ok().map(AttributeValue::Integer),
            SchemaType::Boolean => raw.parse::<bool>().ok().map(AttributeValue::Boolean),
            SchemaType::Decimal => raw.parse::<f64>().ok().map(AttributeValue::Float),
        }
    }
}

/// Capability describing one reconcilable entity kind on a resource:
/// the kind tag, the external object class it maps to, and the declared
/// attribute schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindProfile {
    /// The internal entity kind.
    pub kind: EntityKind,
    /// The external object class served by the connector.
    pub object_class: String,
    /// Declared types of internal plain attributes; attributes not
    /// listed default to [`SchemaType::Text`].
    #[serde(default)]
    pub schema: HashMap<String, SchemaType>,
}

impl KindProfile {
    /// Create a profile with an empty schema.
    pub fn new(kind: EntityKind, object_class: impl Into<String>) -> Self {
        Self {
            kind,
            object_class: object_class.into(),
            schema: HashMap::new(),
        }
    }

    /// Declare an attribute's schema type (builder style).
    #[must_use]
    pub fn with_schema(mut self, attribute: impl Into<String>, ty: SchemaType) -> Self {
        self.schema.insert(attribute.into(), ty);
        self
    }

    /// The declared type of an attribute, defaulting to text.
    pub fn schema_type(&self, attribute: &str) -> SchemaType {
        self.schema
            .get(attribute)
            .copied()
            .unwrap_or(SchemaType::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_roundtrip() {
        for kind in [EntityKind::User, EntityKind::Group, EntityKind::Generic] {
            let parsed: EntityKind = kind.as_str().parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_group_like() {
        assert!(EntityKind::Group.is_group_like());
        assert!(!EntityKind::User.is_group_like());
        assert!(!EntityKind::Generic.is_group_like());
    }

    #[test]
    fn test_schema_type_parsing() {
        assert_eq!(
            SchemaType::Integer.parse_value("42"),
            Some(AttributeValue::Integer(42))
        );
        assert_eq!(SchemaType::Integer.parse_value("forty-two"), None);
        assert_eq!(
            SchemaType::Boolean.parse_value("true"),
            Some(AttributeValue::Boolean(true))
        );
        assert_eq!(
            SchemaType::Text.parse_value("anything"),
            Some(AttributeValue::String("anything".to_string()))
        );
    }

    #[test]
    fn test_profile_schema_defaults_to_text() {
        let profile = KindProfile::new(EntityKind::User, "user")
            .with_schema("employeeNumber", SchemaType::Integer);
        assert_eq!(profile.schema_type("employeeNumber"), SchemaType::Integer);
        assert_eq!(profile.schema_type("unknown"), SchemaType::Text);
    }

    #[test]
    fn test_entity_first_value() {
        let entity = Entity::new(EntityKind::User, "jdoe").with_attribute("mail", "j@x.com");
        assert_eq!(entity.first_value("mail").unwrap().as_str(), Some("j@x.com"));
        assert!(entity.first_value("absent").is_none());
    }

    #[test]
    fn test_entity_id_ordering_is_stable() {
        let a = EntityId::from_uuid(Uuid::from_u128(1));
        let b = EntityId::from_uuid(Uuid::from_u128(2));
        assert!(a < b);
    }
}
