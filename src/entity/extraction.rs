use crate::entity::normalizer::normalize_text;
use crate::entity::types::{Entity, EntityType, ExtractedEntities};
use anyhow::Result;
use serde_json::Value;
use tracing::{debug, error};

use super::TARGET_ENTITY;

/// Parse a recognition service response into cleaned entities.
///
/// Accepts `{"document": {"entities": [...]}}` as well as a bare
/// `{"entities": [...]}`. Each entity carries `type`, `mentionText` (or
/// `mention_text`) and `confidence`; values are run through [`normalize_text`]
/// and dropped when nothing survives cleaning. A `document` with no
/// `entities` field is a page with nothing recognised and yields no entities.
pub fn parse_recognition_response(json: &Value) -> Result<ExtractedEntities> {
    let document = json.get("document").filter(|doc| doc.is_object());
    let entities_value = document
        .and_then(|doc| doc.get("entities"))
        .or_else(|| json.get("entities"));

    let entities = match entities_value {
        Some(Value::Array(entities)) => entities,
        Some(other) => {
            error!(
                target: TARGET_ENTITY,
                "The 'entities' field is not an array: {}", other
            );
            return Err(anyhow::anyhow!("The 'entities' field is not an array"));
        }
        None if document.is_some() => {
            debug!(target: TARGET_ENTITY, "No entities found in recognised document");
            return Ok(ExtractedEntities::new());
        }
        None => {
            error!(
                target: TARGET_ENTITY,
                "No 'entities' field found in response. Top-level fields: {}",
                json.as_object()
                    .map(|obj| obj.keys().map(|k| k.to_string()).collect::<Vec<_>>().join(", "))
                    .unwrap_or_else(|| "None".to_string())
            );
            return Err(anyhow::anyhow!("No entities array in recognition response"));
        }
    };

    let mut extracted = ExtractedEntities::new();
    for entity_value in entities {
        if let Some(entity) = parse_entity_object(entity_value) {
            extracted.add_entity(entity);
        }
    }

    debug!(
        target: TARGET_ENTITY,
        "Parsed {} of {} entities from recognition response",
        extracted.len(),
        entities.len()
    );

    Ok(extracted)
}

/// Parse a single entity; `None` when it has no usable text
fn parse_entity_object(entity_value: &Value) -> Option<Entity> {
    let raw_text = entity_value
        .get("mentionText")
        .or_else(|| entity_value.get("mention_text"))
        .or_else(|| entity_value.get("value"))
        .and_then(Value::as_str)?;

    let value = normalize_text(raw_text);
    if value.is_empty() {
        return None;
    }

    let entity_type = entity_value
        .get("type")
        .and_then(Value::as_str)
        .map(EntityType::from)
        .unwrap_or(EntityType::Other);

    let confidence = entity_value
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.0) as f32;

    Some(Entity::new(entity_type, &value, confidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_document_entities() {
        let response = json!({
            "document": {
                "entities": [
                    {"type": "Name", "mention_text": "José  Smith", "confidence": 0.93},
                    {"type": "mobile", "mention_text": "0412 345 678", "confidence": 0.88},
                    {"type": "email", "mention_text": "😀", "confidence": 0.5},
                ]
            }
        });

        let extracted = parse_recognition_response(&response).unwrap();
        assert_eq!(extracted.len(), 2);
        assert_eq!(extracted.entities[0].entity_type, EntityType::Name);
        assert_eq!(extracted.entities[0].value, "Jose Smith");
        assert_eq!(extracted.entities[1].entity_type, EntityType::Mobile);
        assert!((extracted.entities[1].confidence - 0.88).abs() < 1e-6);
    }

    #[test]
    fn test_accepts_top_level_entities() {
        let response = json!({
            "entities": [{"type": "address", "mention_text": "12 King St Sydney NSW"}]
        });

        let extracted = parse_recognition_response(&response).unwrap();
        assert_eq!(extracted.values_of(EntityType::Address), vec!["12 King St Sydney NSW"]);
        assert_eq!(extracted.entities[0].confidence, 0.0);
    }

    #[test]
    fn test_rejects_malformed_response() {
        assert!(parse_recognition_response(&json!({"entities": "nope"})).is_err());
        assert!(parse_recognition_response(&json!({"pages": []})).is_err());
        assert!(parse_recognition_response(&json!({"document": {"entities": {}}})).is_err());
    }

    #[test]
    fn test_accepts_camel_case_mention_text() {
        let response = json!({
            "document": {
                "entities": [
                    {"type": "name", "mentionText": "John Smith", "confidence": 0.9},
                    {"type": "mobile", "mentionText": "0412 345 678", "confidence": 0.9},
                ]
            }
        });

        let extracted = parse_recognition_response(&response).unwrap();
        assert_eq!(extracted.values_of(EntityType::Name), vec!["John Smith"]);
        assert_eq!(extracted.values_of(EntityType::Mobile), vec!["0412 345 678"]);
    }

    #[test]
    fn test_document_without_entities_is_empty() {
        let response = json!({"document": {"text": "", "pages": [{}]}});

        let extracted = parse_recognition_response(&response).unwrap();
        assert!(extracted.is_empty());
    }
}
