//! LanceDB connection helpers and the build stamp kept in the `meta` table.

use anyhow::{anyhow, Result};
use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::schema::{build_meta_schema, META_TABLE};

pub async fn open_db(uri: &str) -> Result<Connection> { Ok(connect(uri).execute().await?) }

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
	Ok(conn.table_names().execute().await?.iter().any(|n| n == name))
}

/// Create `name` with zero rows unless it already exists.
pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
	if table_exists(conn, name).await? { return Ok(()); }
	let empty = RecordBatchIterator::new(Vec::new().into_iter(), Arc::clone(&schema));
	conn.create_table(name, Box::new(empty)).execute().await?;
	Ok(())
}

/// Remove one table's dataset from a local database directory, leaving the
/// other tables (and anything else in the directory) alone.
pub fn drop_fragment_table(db_path: &Path, name: &str) -> Result<()> {
	let dataset = db_path.join(format!("{name}.lance"));
	if dataset.exists() { std::fs::remove_dir_all(&dataset)?; }
	Ok(())
}

/// What a fragment table was built from. Reuse requires both the corpus
/// fingerprint and the embedder id to match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStamp {
	pub fingerprint: String,
	pub embedder_id: String,
	pub built_at: String,
}

const FINGERPRINT: &str = "fingerprint";
const EMBEDDER: &str = "embedder";
const BUILT_AT: &str = "built_at";

fn stamp_key(table: &str, field: &str) -> String { format!("{table}.{field}") }

fn quoted(s: &str) -> String { format!("'{}'", s.replace('\'', "''")) }

fn stamp_filter(table: &str) -> String {
	let wanted: Vec<String> = [FINGERPRINT, EMBEDDER, BUILT_AT].iter().map(|f| quoted(&stamp_key(table, f))).collect();
	format!("key IN ({})", wanted.join(", "))
}

/// Forget the stamp for `table`; no-op when nothing was stamped.
pub async fn clear_stamp(conn: &Connection, table: &str) -> Result<()> {
	if !table_exists(conn, META_TABLE).await? { return Ok(()); }
	let _ = conn.open_table(META_TABLE).execute().await?.delete(&stamp_filter(table)).await?;
	Ok(())
}

/// Upsert the stamp for `table` as three key/value rows.
pub async fn write_stamp(conn: &Connection, table: &str, stamp: &BuildStamp) -> Result<()> {
	ensure_table(conn, META_TABLE, build_meta_schema()).await?;
	let fields = [(FINGERPRINT, &stamp.fingerprint), (EMBEDDER, &stamp.embedder_id), (BUILT_AT, &stamp.built_at)];
	let keys: Vec<String> = fields.iter().map(|(f, _)| stamp_key(table, f)).collect();
	let values: Vec<String> = fields.iter().map(|(_, v)| (*v).clone()).collect();
	let now = Utc::now().timestamp_millis();
	let batch = RecordBatch::try_new(build_meta_schema(), vec![
		Arc::new(StringArray::from(keys)),
		Arc::new(StringArray::from(values)),
		Arc::new(TimestampMillisecondArray::from(vec![now; fields.len()])),
	])?;
	let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), build_meta_schema()));
	let meta = conn.open_table(META_TABLE).execute().await?;
	let mut upsert = meta.merge_insert(&["key"]);
	upsert.when_matched_update_all(None).when_not_matched_insert_all();
	let _ = upsert.execute(reader).await?;
	Ok(())
}

/// The stamp for `table`, or `None` when it was never (fully) written.
pub async fn read_stamp(conn: &Connection, table: &str) -> Result<Option<BuildStamp>> {
	if !table_exists(conn, META_TABLE).await? { return Ok(None); }
	let meta = conn.open_table(META_TABLE).execute().await?;
	let mut stream = meta.query().only_if(stamp_filter(table)).execute().await?;
	let mut found: HashMap<String, String> = HashMap::new();
	while let Some(batch) = stream.try_next().await? {
		let col = |name: &str| {
			batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("meta.{name} column missing"))
		};
		let (keys, values) = (col("key")?, col("value")?);
		for i in 0..batch.num_rows() {
			found.insert(keys.value(i).to_string(), values.value(i).to_string());
		}
	}
	let mut take = |field: &str| found.remove(&stamp_key(table, field));
	Ok(match (take(FINGERPRINT), take(EMBEDDER)) {
		(Some(fingerprint), Some(embedder_id)) => Some(BuildStamp { fingerprint, embedder_id, built_at: take(BUILT_AT).unwrap_or_default() }),
		_ => None,
	})
}
