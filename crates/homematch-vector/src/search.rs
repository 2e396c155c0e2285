use anyhow::anyhow;
use arrow_array::{Array, Float32Array, Int32Array, RecordBatch, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::sync::Arc;

use homematch_core::error::{Error, Result};
use homematch_core::traits::{Embedder, SimilarityIndex};
use homematch_core::types::{CandidateMatch, FragmentId, ListingId};

/// Query handle over a LanceDB fragment table.
///
/// Relevance is cosine similarity, `1 - cosine distance`.
pub struct LanceIndex {
	table: Table,
	embedder: Arc<dyn Embedder>,
}

impl LanceIndex {
	pub fn new(table: Table, embedder: Arc<dyn Embedder>) -> Self { Self { table, embedder } }

	async fn search(&self, statement: &str, top_k: usize) -> anyhow::Result<Vec<CandidateMatch>> {
		let query_vec = self.embedder.embed_batch(&[statement.to_string()]).await?.pop().ok_or_else(|| anyhow!("embedder returned no vector"))?;
		let mut stream = self
			.table
			.vector_search(query_vec)?
			.distance_type(DistanceType::Cosine)
			.limit(top_k)
			.execute()
			.await?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			hits.extend(batch_to_candidates(&batch)?);
		}
		// Lance returns nearest first; keep a stable order for equal scores.
		hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.fragment.key().cmp(&b.fragment.key())));
		hits.truncate(top_k);
		Ok(hits)
	}
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> anyhow::Result<&'a StringArray> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("{name} column missing"))
}

fn batch_to_candidates(batch: &RecordBatch) -> anyhow::Result<Vec<CandidateMatch>> {
	let listing_col = string_col(batch, "listing_id")?;
	let chunk_col = batch
		.column_by_name("chunk_index")
		.and_then(|c| c.as_any().downcast_ref::<Int32Array>())
		.ok_or_else(|| anyhow!("chunk_index column missing"))?;
	let distance_col = batch
		.column_by_name("_distance")
		.and_then(|c| c.as_any().downcast_ref::<Float32Array>())
		.ok_or_else(|| anyhow!("_distance column missing"))?;
	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		if distance_col.is_null(i) { continue; }
		let chunk_index = usize::try_from(chunk_col.value(i))?;
		out.push(CandidateMatch {
			fragment: FragmentId::new(ListingId::new(listing_col.value(i)), chunk_index),
			score: 1.0 - distance_col.value(i),
		});
	}
	Ok(out)
}

#[async_trait]
impl SimilarityIndex for LanceIndex {
	async fn query(&self, statement: &str, top_k: usize) -> Result<Vec<CandidateMatch>> {
		self.search(statement, top_k).await.map_err(|e| Error::Query(format!("{e:#}")))
	}

	async fn fragment_count(&self) -> Result<usize> {
		self.table.count_rows(None).await.map_err(|e| Error::Query(e.to_string()))
	}
}
