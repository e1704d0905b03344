use serde::{Deserialize, Serialize};
use std::fmt;

/// Field type reported by the recognition service for a text span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Name,
    Mobile,
    Landline,
    Address,
    Email,
    DateOfBirth,
    LastSeen,
    Other,
}

impl EntityType {
    /// All field types that take part in record assembly
    pub const FIELDS: [EntityType; 7] = [
        EntityType::Name,
        EntityType::Mobile,
        EntityType::Landline,
        EntityType::Address,
        EntityType::Email,
        EntityType::DateOfBirth,
        EntityType::LastSeen,
    ];
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::Name => write!(f, "name"),
            EntityType::Mobile => write!(f, "mobile"),
            EntityType::Landline => write!(f, "landline"),
            EntityType::Address => write!(f, "address"),
            EntityType::Email => write!(f, "email"),
            EntityType::DateOfBirth => write!(f, "dateofbirth"),
            EntityType::LastSeen => write!(f, "lastseen"),
            EntityType::Other => write!(f, "other"),
        }
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "name" => EntityType::Name,
            "mobile" => EntityType::Mobile,
            "landline" => EntityType::Landline,
            "address" => EntityType::Address,
            "email" => EntityType::Email,
            "dateofbirth" => EntityType::DateOfBirth,
            "lastseen" => EntityType::LastSeen,
            _ => EntityType::Other,
        }
    }
}

/// One typed, confidence-scored text span returned for a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,

    // Cleaned text of the span
    pub value: String,

    // Recognition confidence, clamped to 0.0..=1.0
    pub confidence: f32,
}

impl Entity {
    pub fn new(entity_type: EntityType, value: &str, confidence: f32) -> Self {
        Entity {
            entity_type,
            value: value.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// All entities extracted from a single document, in document order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub entities: Vec<Entity>,
}

impl ExtractedEntities {
    pub fn new() -> Self {
        ExtractedEntities {
            entities: Vec::new(),
        }
    }

    pub fn add_entity(&mut self, entity: Entity) {
        self.entities.push(entity);
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Values of one entity type, preserving document order
    pub fn values_of(&self, entity_type: EntityType) -> Vec<&str> {
        self.entities
            .iter()
            .filter(|e| e.entity_type == entity_type)
            .map(|e| e.value.as_str())
            .collect()
    }
}

impl From<Vec<Entity>> for ExtractedEntities {
    fn from(entities: Vec<Entity>) -> Self {
        ExtractedEntities { entities }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_parsing() {
        assert_eq!(EntityType::from("Name"), EntityType::Name);
        assert_eq!(EntityType::from(" MOBILE "), EntityType::Mobile);
        assert_eq!(EntityType::from("dateofbirth"), EntityType::DateOfBirth);
        assert_eq!(EntityType::from("lastseen"), EntityType::LastSeen);
        assert_eq!(EntityType::from("passport"), EntityType::Other);
    }

    #[test]
    fn test_values_of_keeps_order() {
        let extracted = ExtractedEntities::from(vec![
            Entity::new(EntityType::Name, "Jane Doe", 0.9),
            Entity::new(EntityType::Mobile, "0411111111", 0.9),
            Entity::new(EntityType::Name, "John Roe", 0.8),
        ]);

        assert_eq!(extracted.values_of(EntityType::Name), vec!["Jane Doe", "John Roe"]);
        assert_eq!(extracted.values_of(EntityType::Email), Vec::<&str>::new());
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(Entity::new(EntityType::Name, "x", 1.7).confidence, 1.0);
        assert_eq!(Entity::new(EntityType::Name, "x", -0.2).confidence, 0.0);
    }
}
