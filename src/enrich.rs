//! Entity enrichment
//!
//! Resolves the entity ids referenced by a turn into full records. Lookups
//! fan out concurrently and join behind a single barrier: one failed lookup
//! fails the whole batch.

use crate::engine::EngineError;
use crate::runtime::EntityLookup;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Catalog record returned by the lookup service, passed through unmodified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(Value);

impl Entity {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Best-effort human label for plain-text presentation
    pub fn label(&self) -> String {
        ["name", "title", "id"]
            .iter()
            .find_map(|key| self.0.get(key))
            .map_or_else(
                || self.0.to_string(),
                |v| v.as_str().map_or_else(|| v.to_string(), str::to_string),
            )
    }
}

/// A batch failed because at least one lookup failed
#[derive(Debug, Error)]
#[error("Failed to resolve entity {entity_id}: {source}")]
pub struct EnrichmentError {
    pub entity_id: String,
    #[source]
    pub source: EngineError,
}

/// Resolves entity ids through an [`EntityLookup`]
pub struct EntityEnricher<L: EntityLookup> {
    lookup: Arc<L>,
}

impl<L: EntityLookup> EntityEnricher<L> {
    pub fn new(lookup: Arc<L>) -> Self {
        Self { lookup }
    }

    pub async fn enrich(&self, entity_ids: &[String]) -> Result<Vec<Entity>, EnrichmentError> {
        if entity_ids.is_empty() {
            return Ok(vec![]);
        }

        let start = Instant::now();
        let lookups = entity_ids.iter().map(|id| async move {
            self.lookup
                .lookup(id)
                .await
                .map_err(|source| EnrichmentError {
                    entity_id: id.clone(),
                    source,
                })
        });

        let result = try_join_all(lookups).await;
        match &result {
            Ok(entities) => tracing::debug!(
                count = entities.len(),
                duration_ms = %start.elapsed().as_millis(),
                "Entities resolved"
            ),
            Err(e) => tracing::warn!(
                entity_id = %e.entity_id,
                error = %e.source,
                transient = e.source.kind.is_transient(),
                "Entity lookup failed"
            ),
        }
        result
    }
}
