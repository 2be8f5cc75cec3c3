use crate::config::EntityMatching;
use crate::error::GraphStoreError;
use crate::models::{Chunk, ContextFragment, Entity, FragmentOrigin, Relationship};
use crate::traits::GraphIndex;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Upper bound on traversal depth; deeper walks pull in whole components.
const MAX_HOPS: usize = 5;

pub struct Neo4jStore {
    endpoint: String,
    database: String,
    username: String,
    password: String,
    client: Client,
}

impl Neo4jStore {
    pub fn new(
        endpoint: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            database: database.into(),
            username: username.into(),
            password: password.into(),
            client: Client::new(),
        }
    }

    fn tx_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.endpoint, self.database)
    }

    async fn run_statements(&self, statements: Vec<Value>) -> Result<Value, GraphStoreError> {
        let response = self
            .client
            .post(self.tx_url())
            .basic_auth(&self.username, Some(&self.password))
            .json(&json!({ "statements": statements }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GraphStoreError::BackendResponse {
                backend: "neo4j".to_string(),
                details: response.status().to_string(),
            });
        }

        let body: Value = response.json().await?;
        if let Some(errors) = body.pointer("/errors").and_then(Value::as_array) {
            if let Some(first) = errors.first() {
                return Err(GraphStoreError::BackendResponse {
                    backend: "neo4j".to_string(),
                    details: first
                        .pointer("/message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown cypher error")
                        .to_string(),
                });
            }
        }

        Ok(body)
    }
}

#[async_trait]
impl GraphIndex for Neo4jStore {
    async fn upsert_graph(
        &self,
        chunk: &Chunk,
        entities: &[Entity],
        relationships: &[Relationship],
    ) -> Result<(), GraphStoreError> {
        let mut statements = Vec::new();

        statements.push(json!({
            "statement": r#"
                MERGE (d:Document {document_id: $document_id})
                SET d.source_file = $source_file
                MERGE (c:Chunk {chunk_id: $chunk_id})
                SET c.document_id = $document_id,
                    c.source_file = $source_file,
                    c.pages = $pages,
                    c.text = $text
                MERGE (d)-[:HAS_CHUNK]->(c)
            "#,
            "parameters": {
                "document_id": chunk.document_id,
                "source_file": chunk.source_file,
                "chunk_id": chunk.chunk_id,
                "pages": chunk.page_numbers,
                "text": chunk.text,
            }
        }));

        for entity in entities {
            // Entity kinds are a closed enum, so interpolating the label is
            // safe; identity is the lowercased name per kind.
            let cypher = format!(
                r#"
                MERGE (e:{label} {{name_key: $name_key}})
                SET e.name = $name,
                    e.description = coalesce($description, e.description)
                WITH e
                MATCH (c:Chunk {{chunk_id: $chunk_id}})
                MERGE (c)-[:MENTIONS]->(e)
                "#,
                label = entity.kind.label()
            );
            statements.push(json!({
                "statement": cypher,
                "parameters": {
                    "name_key": entity.name.to_lowercase(),
                    "name": entity.name,
                    "description": entity.description,
                    "chunk_id": chunk.chunk_id,
                }
            }));
        }

        for relationship in relationships {
            // One relationship type with the kind as a property keeps the
            // triple MERGE-able and model-produced names out of the Cypher.
            statements.push(json!({
                "statement": r#"
                    MATCH (a {name_key: $from_key}), (b {name_key: $to_key})
                    MERGE (a)-[r:RELATES {kind: $kind}]->(b)
                "#,
                "parameters": {
                    "from_key": relationship.from.to_lowercase(),
                    "to_key": relationship.to.to_lowercase(),
                    "kind": relationship.kind.label(),
                }
            }));
        }

        self.run_statements(statements).await?;
        Ok(())
    }

    async fn neighborhood(
        &self,
        seed_terms: &[String],
        hops: usize,
        matching: EntityMatching,
    ) -> Result<Vec<ContextFragment>, GraphStoreError> {
        if seed_terms.is_empty() {
            return Ok(Vec::new());
        }

        let body = self
            .run_statements(vec![json!({
                "statement": neighborhood_cypher(hops, matching),
                "parameters": { "terms": seed_terms }
            })])
            .await?;

        let mut fragments = Vec::new();
        for row in extract_rows(&body) {
            let Some(values) = row.as_array() else {
                continue;
            };
            if values.len() < 5 {
                continue;
            }

            let page_numbers = values
                .get(3)
                .and_then(Value::as_array)
                .map(|pages| {
                    pages
                        .iter()
                        .filter_map(Value::as_u64)
                        .map(|page| page as u32)
                        .collect()
                })
                .unwrap_or_default();

            fragments.push(ContextFragment {
                chunk_id: values
                    .first()
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                document_id: values
                    .get(1)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                source_file: values
                    .get(2)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                page_numbers,
                text: values
                    .get(4)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                origin: FragmentOrigin::Graph,
                score: None,
            });
        }

        Ok(fragments)
    }

    async fn graph_counts(&self) -> Result<(usize, usize), GraphStoreError> {
        let body = self
            .run_statements(vec![
                json!({
                    "statement": "MATCH (n) WHERE n.name_key IS NOT NULL RETURN count(n)"
                }),
                json!({
                    "statement": "MATCH ()-[r:RELATES]->() RETURN count(r)"
                }),
            ])
            .await?;

        let count_at = |index: usize| {
            body.pointer(&format!("/results/{index}/data/0/row/0"))
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize
        };

        Ok((count_at(0), count_at(1)))
    }
}

/// Traversal is restricted to :RELATES edges; walking untyped would let a
/// path hop through :MENTIONS and reach entities that merely share a chunk.
/// Rows are ordered by chunk id so the same snapshot yields the same rows
/// under the LIMIT.
fn neighborhood_cypher(hops: usize, matching: EntityMatching) -> String {
    let hops = hops.clamp(1, MAX_HOPS);
    let seed_filter = match matching {
        EntityMatching::Exact => "seed.name_key IN $terms",
        EntityMatching::Contains => "any(term IN $terms WHERE seed.name_key CONTAINS term)",
    };

    format!(
        r#"
        MATCH (seed)
        WHERE seed.name_key IS NOT NULL AND {seed_filter}
        OPTIONAL MATCH (seed)-[:RELATES*1..{hops}]-(related)
        WHERE related.name_key IS NOT NULL
        WITH collect(DISTINCT seed) + collect(DISTINCT related) AS reached
        UNWIND reached AS entity
        MATCH (c:Chunk)-[:MENTIONS]->(entity)
        RETURN DISTINCT c.chunk_id, c.document_id, c.source_file, c.pages, c.text
        ORDER BY c.chunk_id
        LIMIT 20
        "#
    )
}

fn extract_rows(payload: &Value) -> Vec<&Value> {
    payload
        .pointer("/results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter_map(|result| result.pointer("/data").and_then(Value::as_array))
                .flatten()
                .filter_map(|entry| entry.pointer("/row"))
                .filter(|row| row.is_array())
                .collect()
        })
        .unwrap_or_default()
}
