use anyhow::{anyhow, Result};
use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::Connection;
use std::sync::Arc;
use tracing::info;

use homematch_core::traits::Embedder;
use homematch_core::types::Fragment;

use crate::schema::build_fragment_schema;
use crate::table::ensure_table;

/// Embeds `fragments` in batches of `batch_size` and writes them to `table`,
/// creating it on the first batch.
pub struct FragmentWriter<'a> {
	conn: &'a Connection,
	table_name: &'a str,
	embedder: &'a dyn Embedder,
	batch_size: usize,
}

impl<'a> FragmentWriter<'a> {
	pub fn new(conn: &'a Connection, table_name: &'a str, embedder: &'a dyn Embedder, batch_size: usize) -> Self {
		Self { conn, table_name, embedder, batch_size: batch_size.max(1) }
	}

	fn dim(&self) -> Result<i32> {
		i32::try_from(self.embedder.dim()).map_err(|_| anyhow!("embedding dim {} too large", self.embedder.dim()))
	}

	pub async fn write(&self, fragments: &[Fragment]) -> Result<usize> {
		let dim = self.dim()?;
		if fragments.is_empty() {
			info!(table = self.table_name, "no fragments to index");
			ensure_table(self.conn, self.table_name, build_fragment_schema(dim)).await?;
			return Ok(0);
		}
		info!(fragments = fragments.len(), table = self.table_name, "indexing fragments");
		let pb = ProgressBar::new(fragments.len() as u64);
		pb.set_style(
			ProgressStyle::default_bar()
				.template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} fragments ({percent}%) {msg}")
				.unwrap_or_else(|_| ProgressStyle::default_bar())
				.progress_chars("#>-"),
		);
		let mut processed = 0usize;
		let mut created = false;
		for batch in fragments.chunks(self.batch_size) {
			let texts: Vec<String> = batch.iter().map(|f| f.content.clone()).collect();
			let embeddings = self.embedder.embed_batch(&texts).await?;
			if embeddings.len() != batch.len() {
				return Err(anyhow!("embedder returned {} vectors for {} fragments", embeddings.len(), batch.len()));
			}
			let record_batch = fragments_to_record_batch(batch, &embeddings, dim)?;
			let schema = record_batch.schema();
			let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
			if created {
				self.conn.open_table(self.table_name).execute().await?.add(reader).execute().await?;
			} else {
				self.conn.create_table(self.table_name, reader).execute().await?;
				created = true;
			}
			processed += batch.len();
			pb.set_position(processed as u64);
		}
		pb.finish_with_message("done");
		info!(fragments = processed, table = self.table_name, "indexed fragments");
		Ok(processed)
	}
}

fn fragments_to_record_batch(fragments: &[Fragment], embeddings: &[Vec<f32>], dim: i32) -> Result<RecordBatch> {
	let mut fragment_ids = Vec::with_capacity(fragments.len());
	let mut listing_ids = Vec::with_capacity(fragments.len());
	let mut chunk_indices = Vec::with_capacity(fragments.len());
	let mut total_chunks = Vec::with_capacity(fragments.len());
	let mut contents = Vec::with_capacity(fragments.len());
	let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(fragments.len());
	for (f, v) in fragments.iter().zip(embeddings) {
		fragment_ids.push(f.id.key());
		listing_ids.push(f.id.listing_id.to_string());
		chunk_indices.push(i32::try_from(f.id.chunk_index)?);
		total_chunks.push(i32::try_from(f.total_chunks)?);
		contents.push(f.content.clone());
		vectors.push(Some(v.iter().map(|&x| Some(x)).collect()));
	}
	let record_batch = RecordBatch::try_new(build_fragment_schema(dim), vec![
		Arc::new(StringArray::from(fragment_ids)),
		Arc::new(StringArray::from(listing_ids)),
		Arc::new(Int32Array::from(chunk_indices)),
		Arc::new(Int32Array::from(total_chunks)),
		Arc::new(StringArray::from(contents)),
		Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
	])?;
	Ok(record_batch)
}
