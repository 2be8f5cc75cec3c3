use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of one ingested source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub document_id: String,
    pub source_file: String,
    pub checksum: String,
    pub page_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// Overlapping word-window derived from one or more document pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub source_file: String,
    pub chunk_index: u64,
    pub text: String,
    /// Distinct, sorted 1-indexed page numbers this chunk's words came from.
    pub page_numbers: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Crop,
    Disease,
    Technique,
    Chemical,
    Other,
}

impl EntityKind {
    /// Parses a model-produced type string. Accepts pipe-joined alternatives
    /// ("Crop|Disease") by taking the first segment, anything unrecognized
    /// falls back to `Other`.
    pub fn parse(raw: &str) -> Self {
        let first = raw.split('|').next().unwrap_or("").trim();
        match first.to_ascii_lowercase().as_str() {
            "crop" => EntityKind::Crop,
            "disease" => EntityKind::Disease,
            "technique" | "method" => EntityKind::Technique,
            "chemical" => EntityKind::Chemical,
            _ => EntityKind::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Crop => "Crop",
            EntityKind::Disease => "Disease",
            EntityKind::Technique => "Technique",
            EntityKind::Chemical => "Chemical",
            EntityKind::Other => "Entity",
        }
    }
}

/// Named entity extracted from chunk text. Identity is (lowercased name, kind);
/// re-extraction of the same entity must upsert, never duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    pub description: Option<String>,
}

impl Entity {
    pub fn identity(&self) -> String {
        format!("{}:{}", self.kind.label(), self.name.to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    Treats,
    Affects,
    Prevents,
    /// Sanitized uppercase token for anything outside the known set.
    Other(String),
}

impl RelationKind {
    pub fn label(&self) -> &str {
        match self {
            RelationKind::Treats => "TREATS",
            RelationKind::Affects => "AFFECTS",
            RelationKind::Prevents => "PREVENTS",
            RelationKind::Other(token) => token,
        }
    }
}

/// Directed relation between two extracted entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,
    pub to: String,
    pub kind: RelationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FragmentOrigin {
    Vector,
    Graph,
}

/// One piece of retrieved context, traceable to its source pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextFragment {
    pub chunk_id: String,
    pub document_id: String,
    pub source_file: String,
    pub page_numbers: Vec<u32>,
    pub text: String,
    pub origin: FragmentOrigin,
    /// Similarity score for vector-phase fragments, absent for graph hops.
    pub score: Option<f64>,
}

/// Ordered, deduplicated context assembled for one query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextBundle {
    pub fragments: Vec<ContextFragment>,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Citations for the fragments actually present in this bundle, grouped
    /// by source file in first-appearance order, pages sorted and distinct.
    pub fn citations(&self) -> Vec<Citation> {
        let mut order: Vec<String> = Vec::new();
        let mut pages_by_source: std::collections::HashMap<String, Vec<u32>> =
            std::collections::HashMap::new();

        for fragment in &self.fragments {
            let entry = pages_by_source
                .entry(fragment.source_file.clone())
                .or_insert_with(|| {
                    order.push(fragment.source_file.clone());
                    Vec::new()
                });
            for page in &fragment.page_numbers {
                if !entry.contains(page) {
                    entry.push(*page);
                }
            }
        }

        order
            .into_iter()
            .map(|source_file| {
                let mut pages = pages_by_source.remove(&source_file).unwrap_or_default();
                pages.sort_unstable();
                Citation { source_file, pages }
            })
            .collect()
    }
}

/// (source file, pages) pair derived from the context actually used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source_file: String,
    pub pages: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
    /// False when the bundle was empty and the fixed fallback was returned.
    pub grounded: bool,
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub chunks_written: usize,
    pub entities_written: usize,
    pub relationships_written: usize,
    /// Chunks skipped because an external call failed; logged, not fatal.
    pub chunks_failed: usize,
}

/// Current store-side counts, for the stats accessor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub vectors: usize,
    pub entity_nodes: usize,
    pub relationship_edges: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_takes_first_pipe_segment() {
        assert_eq!(EntityKind::parse("Crop|Disease"), EntityKind::Crop);
        assert_eq!(EntityKind::parse(" disease "), EntityKind::Disease);
        assert_eq!(EntityKind::parse("Method"), EntityKind::Technique);
        assert_eq!(EntityKind::parse("???"), EntityKind::Other);
        assert_eq!(EntityKind::parse(""), EntityKind::Other);
    }

    #[test]
    fn entity_identity_is_case_insensitive() {
        let first = Entity {
            name: "Wheat Rust".to_string(),
            kind: EntityKind::Disease,
            description: None,
        };
        let second = Entity {
            name: "wheat rust".to_string(),
            kind: EntityKind::Disease,
            description: Some("fungal".to_string()),
        };
        assert_eq!(first.identity(), second.identity());
    }

    #[test]
    fn citations_group_by_source_with_sorted_pages() {
        let bundle = ContextBundle {
            fragments: vec![
                ContextFragment {
                    chunk_id: "c1".to_string(),
                    document_id: "d1".to_string(),
                    source_file: "wheat.pdf".to_string(),
                    page_numbers: vec![2, 1],
                    text: String::new(),
                    origin: FragmentOrigin::Vector,
                    score: Some(0.9),
                },
                ContextFragment {
                    chunk_id: "c2".to_string(),
                    document_id: "d2".to_string(),
                    source_file: "soil.pdf".to_string(),
                    page_numbers: vec![4],
                    text: String::new(),
                    origin: FragmentOrigin::Graph,
                    score: None,
                },
                ContextFragment {
                    chunk_id: "c3".to_string(),
                    document_id: "d1".to_string(),
                    source_file: "wheat.pdf".to_string(),
                    page_numbers: vec![2, 3],
                    text: String::new(),
                    origin: FragmentOrigin::Vector,
                    score: Some(0.5),
                },
            ],
        };

        let citations = bundle.citations();
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].source_file, "wheat.pdf");
        assert_eq!(citations[0].pages, vec![1, 2, 3]);
        assert_eq!(citations[1].source_file, "soil.pdf");
        assert_eq!(citations[1].pages, vec![4]);
    }
}
