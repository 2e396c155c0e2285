//! Listing corpus loading and validation.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::traits::CorpusLoader;
use crate::types::{Listing, ListingAttributes, ListingId};

/// Keys accepted as the listing identifier, first match wins.
const ID_KEYS: [&str; 2] = ["record_uuid", "id"];

/// Validated listing set with unique identifiers.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    listings: Vec<Listing>,
    by_id: HashMap<ListingId, usize>,
}

impl Corpus {
    /// Rejects blank identifiers, blank bodies and duplicate identifiers,
    /// naming the offending position.
    pub fn new(listings: Vec<Listing>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(listings.len());
        for (position, listing) in listings.iter().enumerate() {
            if listing.id.as_str().trim().is_empty() {
                return Err(Error::Validation { position, id: None, reason: "blank listing identifier".into() });
            }
            if listing.body.trim().is_empty() {
                return Err(Error::Validation { position, id: Some(listing.id.to_string()), reason: "missing text body".into() });
            }
            if let Some(first) = by_id.insert(listing.id.clone(), position) {
                return Err(Error::Validation {
                    position,
                    id: Some(listing.id.to_string()),
                    reason: format!("duplicate identifier (first seen at position {first})"),
                });
            }
        }
        Ok(Self { listings, by_id })
    }

    pub fn get(&self, id: &ListingId) -> Option<&Listing> { self.by_id.get(id).map(|&i| &self.listings[i]) }
    pub fn listings(&self) -> &[Listing] { &self.listings }
    pub fn len(&self) -> usize { self.listings.len() }
    pub fn is_empty(&self) -> bool { self.listings.is_empty() }
}

/// Loads a JSON array of listing objects.
///
/// Each object needs a `record_uuid` (or `id`) string. The body is the
/// object's `text` field when present, otherwise the compact JSON of the
/// whole record, which keeps every factual field visible to the embedder and
/// the generator.
pub struct JsonCorpusLoader {
    path: PathBuf,
}

impl JsonCorpusLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

    pub fn parse(content: &str) -> Result<Vec<Listing>> {
        let value: Value = serde_json::from_str(content)?;
        let Value::Array(records) = value else {
            return Err(Error::Validation { position: 0, id: None, reason: "corpus must be a JSON array of listings".into() });
        };
        records.into_iter().enumerate().map(|(position, record)| parse_record(position, record)).collect()
    }
}

fn parse_record(position: usize, record: Value) -> Result<Listing> {
    let Value::Object(fields) = record else {
        return Err(Error::Validation { position, id: None, reason: "listing is not a JSON object".into() });
    };
    let id = ID_KEYS
        .iter()
        .find_map(|k| fields.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Validation { position, id: None, reason: "missing record_uuid".into() })?
        .to_string();
    let body = match fields.get("text") {
        Some(Value::String(text)) => text.clone(),
        Some(_) => return Err(Error::Validation { position, id: Some(id), reason: "text must be a string".into() }),
        None if has_content(&fields) => serde_json::to_string(&fields)?,
        None => String::new(),
    };
    if body.trim().is_empty() {
        return Err(Error::Validation { position, id: Some(id), reason: "missing text body".into() });
    }
    let attributes: ListingAttributes = serde_json::from_value(Value::Object(fields))
        .map_err(|e| Error::Validation { position, id: Some(id.clone()), reason: format!("bad attribute: {e}") })?;
    Ok(Listing { id: ListingId::new(id), body, attributes })
}

/// Whether the record carries anything beyond its identifier.
fn has_content(fields: &Map<String, Value>) -> bool {
    fields.iter().any(|(k, v)| !ID_KEYS.contains(&k.as_str()) && !v.is_null())
}

impl CorpusLoader for JsonCorpusLoader {
    fn load(&self) -> Result<Vec<Listing>> {
        let content = fs::read_to_string(&self.path)?;
        let listings = Self::parse(&content)?;
        info!(path = %self.path.display(), listings = listings.len(), "loaded JSON corpus");
        Ok(listings)
    }
}

/// Loads every `.txt` file under a directory; the file stem is the identifier.
pub struct TextDirLoader {
    root: PathBuf,
}

impl TextDirLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    fn list_txt_files(root: &Path) -> Vec<PathBuf> {
        let mut txt_files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("txt"))
            .map(|e| e.path().to_path_buf())
            .collect();
        txt_files.sort();
        txt_files
    }

    fn read_file_content(path: &Path) -> Result<String> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(path)?).to_string()),
        }
    }
}

impl CorpusLoader for TextDirLoader {
    fn load(&self) -> Result<Vec<Listing>> {
        if !self.root.is_dir() {
            return Err(Error::NotFound(format!("corpus directory {}", self.root.display())));
        }
        let files = Self::list_txt_files(&self.root);
        let mut listings = Vec::with_capacity(files.len());
        for (position, path) in files.iter().enumerate() {
            let id = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .ok_or_else(|| Error::Validation { position, id: None, reason: format!("no file stem for {}", path.display()) })?;
            debug!(position, path = %path.display(), "reading listing");
            let body = Self::read_file_content(path)?;
            listings.push(Listing { id: ListingId::new(id), body, attributes: ListingAttributes::default() });
        }
        info!(root = %self.root.display(), listings = listings.len(), "loaded text corpus");
        Ok(listings)
    }
}
