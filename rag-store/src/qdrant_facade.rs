//! Thin adapter around `qdrant-client` to isolate API usage.
//!
//! This facade concentrates all Qdrant interactions behind a minimal API,
//! hiding the builder pattern and keeping the rest of the application
//! decoupled from `qdrant-client`.

use std::collections::HashMap;

use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, Filter, PointId, PointStruct, ScoredPoint,
    SearchParamsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value as QValue,
    VectorParamsBuilder, point_id::PointIdOptions,
};
use qdrant_client::{Payload, Qdrant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{DistanceKind, RagConfig};
use crate::errors::RagError;
use crate::record::{CollectionStats, PassagePayload, StoredHit};

/// A facade over the Qdrant client bound to one collection.
pub struct QdrantFacade {
    client: Qdrant,
    collection: String,
    vector_size: usize,
    distance: DistanceKind,
    exact: bool,
}

impl QdrantFacade {
    /// Creates a new facade from the given configuration.
    ///
    /// The client connects lazily; no request is made here.
    pub fn new(cfg: &RagConfig) -> Result<Self, RagError> {
        cfg.validate()?;

        let mut builder = Qdrant::from_url(&cfg.qdrant_url);
        if let Some(key) = &cfg.qdrant_api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            collection: cfg.collection.clone(),
            vector_size: cfg.vector_size,
            distance: cfg.distance,
            exact: cfg.exact_search,
        })
    }

    /// Ensures that the collection exists.
    ///
    /// - If the collection already exists → no-op.
    /// - If missing → creates it; a concurrent "already exists" is success.
    pub async fn ensure_collection(&self) -> Result<(), RagError> {
        if self.client.collection_info(&self.collection).await.is_ok() {
            debug!(collection = %self.collection, "collection already exists");
            return Ok(());
        }

        info!(
            collection = %self.collection,
            size = self.vector_size,
            distance = ?self.distance,
            "creating collection"
        );

        let distance = match self.distance {
            DistanceKind::Cosine => Distance::Cosine,
            DistanceKind::Dot => Distance::Dot,
            DistanceKind::Euclid => Distance::Euclid,
        };

        let created = self
            .client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(self.vector_size as u64, distance)),
            )
            .await;

        match created {
            Ok(_) => {
                info!(collection = %self.collection, "collection created");
                Ok(())
            }
            Err(e) if is_already_exists(&e.to_string()) => {
                warn!(collection = %self.collection, error = %e, "collection created concurrently");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Upserts one point. The vector length must equal the collection size.
    pub async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        payload: &PassagePayload,
    ) -> Result<(), RagError> {
        if vector.len() != self.vector_size {
            return Err(RagError::VectorSizeMismatch {
                got: vector.len(),
                want: self.vector_size,
            });
        }

        let q_payload: Payload = serde_json::to_value(payload)?
            .try_into()
            .map_err(|e| RagError::Qdrant(format!("payload convert: {e}")))?;
        let point = PointStruct::new(point_id(id), vector, q_payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await?;
        debug!(collection = %self.collection, id, "point upserted");
        Ok(())
    }

    /// Similarity search with a server-side score threshold.
    ///
    /// Hits come back ordered by descending score.
    pub async fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
        score_threshold: f32,
        filter: Option<Filter>,
    ) -> Result<Vec<StoredHit>, RagError> {
        let mut builder = SearchPointsBuilder::new(&self.collection, vector, limit)
            .with_payload(true)
            .score_threshold(score_threshold);
        if let Some(f) = filter {
            builder = builder.filter(f);
        }
        if self.exact {
            builder = builder.params(SearchParamsBuilder::default().exact(true));
        }

        let res = self.client.search_points(builder).await?;

        let mut out = decode_hits(&self.collection, res.result);
        out.sort_by(|a, b| b.score.total_cmp(&a.score));

        debug!(collection = %self.collection, limit, hits = out.len(), "search completed");
        Ok(out)
    }

    /// Point count of the collection.
    pub async fn stats(&self) -> Result<CollectionStats, RagError> {
        let info = self.client.collection_info(&self.collection).await?;
        let points_count = info.result.and_then(|r| r.points_count).unwrap_or(0);
        Ok(CollectionStats {
            collection: self.collection.clone(),
            points_count,
        })
    }
}

fn is_already_exists(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("already exists") || lower.contains("conflict")
}

/// Numeric and UUID ids pass through; any other string maps to a stable UUIDv5.
fn point_id(id: &str) -> PointId {
    if let Ok(n) = id.parse::<u64>() {
        return PointId::from(n);
    }
    match Uuid::parse_str(id) {
        Ok(u) => PointId::from(u.to_string()),
        Err(_) => PointId::from(Uuid::new_v5(&Uuid::nil(), id.as_bytes()).to_string()),
    }
}

fn point_id_to_string(id: Option<PointId>) -> String {
    match id.and_then(|p| p.point_id_options) {
        Some(PointIdOptions::Uuid(s)) => s,
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    }
}

/// Points with an undecodable payload are skipped, not fatal.
fn decode_hits(collection: &str, points: Vec<ScoredPoint>) -> Vec<StoredHit> {
    let mut out = Vec::with_capacity(points.len());
    for sp in points {
        let id = point_id_to_string(sp.id.clone());
        match scored_point_to_hit(sp) {
            Ok(hit) => out.push(hit),
            Err(e) => warn!(collection, id = %id, error = %e, "skipping point with bad payload"),
        }
    }
    out
}

fn scored_point_to_hit(sp: ScoredPoint) -> Result<StoredHit, RagError> {
    let payload = serde_json::from_value(payload_to_json(sp.payload))?;
    Ok(StoredHit {
        id: point_id_to_string(sp.id),
        score: sp.score,
        payload,
    })
}

/// Converts a Qdrant payload (`HashMap<String, qdrant::Value>`) into JSON.
fn payload_to_json(p: HashMap<String, QValue>) -> serde_json::Value {
    let map = p.into_iter().map(|(k, v)| (k, v.into_json())).collect();
    serde_json::Value::Object(map)
}
