use crate::error::GenerationError;
use crate::generation::{GenerationOptions, TextGenerator};
use crate::models::{Entity, EntityKind, RelationKind, Relationship};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// How much chunk text is handed to the extraction model.
const EXTRACTION_TEXT_CAP: usize = 1000;

#[derive(Debug, Default, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default)]
    relationships: Vec<RawRelation>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRelation {
    from: String,
    to: String,
    #[serde(rename = "type", default)]
    kind: String,
}

fn extraction_prompt(text: &str) -> String {
    let capped: String = text.chars().take(EXTRACTION_TEXT_CAP).collect();
    format!(
        "Extract agricultural entities from this text. Return ONLY a JSON object:\n\
{{\n\
  \"entities\": [{{\"name\": \"entity_name\", \"type\": \"Crop|Disease|Technique|Chemical\", \"description\": \"brief\"}}],\n\
  \"relationships\": [{{\"from\": \"entity1\", \"to\": \"entity2\", \"type\": \"TREATS|AFFECTS|PREVENTS\"}}]\n\
}}\n\n\
Text: {capped}\n\n\
Return ONLY valid JSON:"
    )
}

/// Derives entities and relation triples from chunk text via the generative
/// model. Malformed model output degrades to empty sets; extraction never
/// aborts an ingestion batch on its own.
pub async fn extract_entities<T: TextGenerator + ?Sized>(
    generator: &T,
    text: &str,
) -> Result<(Vec<Entity>, Vec<Relationship>), GenerationError> {
    let options = GenerationOptions {
        max_tokens: 400,
        temperature: 0.3,
        stop_sequences: Vec::new(),
    };

    let content = generator.generate(&extraction_prompt(text), &options).await?;
    Ok(parse_extraction(&content))
}

/// Parses the model's reply, salvaging the first `{` .. last `}` span.
pub fn parse_extraction(content: &str) -> (Vec<Entity>, Vec<Relationship>) {
    let raw = match salvage_json(content) {
        Some(span) => match serde_json::from_str::<RawExtraction>(span) {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(%error, "entity extraction returned malformed json");
                return (Vec::new(), Vec::new());
            }
        },
        None => {
            warn!("entity extraction returned no json object");
            return (Vec::new(), Vec::new());
        }
    };

    let mut seen = HashSet::new();
    let mut entities = Vec::new();
    for raw_entity in raw.entities {
        let name = raw_entity.name.trim().to_string();
        if name.is_empty() {
            continue;
        }
        let entity = Entity {
            name,
            kind: EntityKind::parse(&raw_entity.kind),
            description: raw_entity
                .description
                .filter(|description| !description.trim().is_empty()),
        };
        if seen.insert(entity.identity()) {
            entities.push(entity);
        }
    }

    let mut seen_edges = HashSet::new();
    let mut relationships = Vec::new();
    for raw_relation in raw.relationships {
        let from = raw_relation.from.trim().to_string();
        let to = raw_relation.to.trim().to_string();
        if from.is_empty() || to.is_empty() {
            continue;
        }
        let relationship = Relationship {
            from,
            to,
            kind: sanitize_relation(&raw_relation.kind),
        };
        if seen_edges.insert((
            relationship.from.to_lowercase(),
            relationship.to.to_lowercase(),
            relationship.kind.label().to_string(),
        )) {
            relationships.push(relationship);
        }
    }

    debug!(
        entities = entities.len(),
        relationships = relationships.len(),
        "parsed extraction output"
    );
    (entities, relationships)
}

fn salvage_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&content[start..=end])
}

/// Normalizes a model-produced relation type to `[A-Z0-9_]+`, mapping the
/// known vocabulary to its variants and everything unusable to RELATED_TO.
pub fn sanitize_relation(raw: &str) -> RelationKind {
    static NON_TOKEN: OnceLock<Regex> = OnceLock::new();
    let non_token = NON_TOKEN.get_or_init(|| Regex::new(r"[^A-Z0-9]+").expect("static pattern"));

    let upper = raw.to_uppercase();
    let token = non_token
        .replace_all(&upper, "_")
        .trim_matches('_')
        .to_string();

    match token.as_str() {
        "TREATS" => RelationKind::Treats,
        "AFFECTS" => RelationKind::Affects,
        "PREVENTS" => RelationKind::Prevents,
        _ if token.len() >= 2 => RelationKind::Other(token),
        _ => RelationKind::Other("RELATED_TO".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_embedded_in_chatter() {
        let content = r#"Sure, here is the JSON you asked for:
{"entities": [{"name": "Wheat", "type": "Crop"}, {"name": "Rust", "type": "Disease", "description": "fungal"}],
 "relationships": [{"from": "Rust", "to": "Wheat", "type": "AFFECTS"}]}
Hope this helps!"#;

        let (entities, relationships) = parse_extraction(content);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].kind, EntityKind::Crop);
        assert_eq!(entities[1].description.as_deref(), Some("fungal"));
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].kind, RelationKind::Affects);
    }

    #[test]
    fn malformed_output_degrades_to_empty_sets() {
        let (entities, relationships) = parse_extraction("no json here at all");
        assert!(entities.is_empty());
        assert!(relationships.is_empty());

        let (entities, relationships) = parse_extraction("{broken json");
        assert!(entities.is_empty());
        assert!(relationships.is_empty());
    }

    #[test]
    fn duplicate_entities_within_one_reply_collapse() {
        let content = r#"{"entities": [
            {"name": "Wheat", "type": "Crop"},
            {"name": "wheat", "type": "Crop"}
        ], "relationships": []}"#;

        let (entities, _) = parse_extraction(content);
        assert_eq!(entities.len(), 1);
    }

    #[test]
    fn relation_types_are_sanitized() {
        assert_eq!(sanitize_relation("treats"), RelationKind::Treats);
        assert_eq!(
            sanitize_relation("grown in | region"),
            RelationKind::Other("GROWN_IN_REGION".to_string())
        );
        assert_eq!(
            sanitize_relation("?"),
            RelationKind::Other("RELATED_TO".to_string())
        );
        assert_eq!(
            sanitize_relation(""),
            RelationKind::Other("RELATED_TO".to_string())
        );
    }

    #[test]
    fn missing_fields_are_tolerated() {
        let content = r#"{"entities": [{"name": "Barley"}]}"#;
        let (entities, relationships) = parse_extraction(content);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].kind, EntityKind::Other);
        assert!(relationships.is_empty());
    }
}
