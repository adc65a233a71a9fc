//! Reader for the flat product catalog written by ingestion.
//!
//! Columns: `id,title,category,brand,description,rag_context,image_path`.
//! Rows without an id or an image path cannot be indexed and are dropped
//! here with a warning; so are rows that fail to parse.

use std::path::Path;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::types::ProductRecord;

pub fn read_catalog(path: &Path) -> Result<Vec<ProductRecord>> {
    let file = std::fs::File::open(path)
        .map_err(|e| Error::Catalog(format!("{}: {}", path.display(), e)))?;
    let records = read_catalog_from(file)?;
    info!(path = %path.display(), products = records.len(), "catalog loaded");
    Ok(records)
}

pub fn read_catalog_from<R: std::io::Read>(reader: R) -> Result<Vec<ProductRecord>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut records = Vec::new();
    for row in rdr.deserialize::<ProductRecord>() {
        let mut rec = match row {
            Ok(rec) => rec,
            Err(e) => {
                if e.is_io_error() {
                    return Err(Error::Catalog(e.to_string()));
                }
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                warn!(line, error = %e, "skipping malformed catalog row");
                continue;
            }
        };
        normalize(&mut rec);
        if rec.id.is_empty() {
            warn!(title = %rec.title, "skipping catalog row without id");
            continue;
        }
        if rec.image_path.is_empty() {
            warn!(id = %rec.id, "skipping catalog row without image path");
            continue;
        }
        records.push(rec);
    }
    Ok(records)
}

fn normalize(rec: &mut ProductRecord) {
    rec.id = rec.id.trim().to_string();
    rec.image_path = rec.image_path.trim().to_string();
    for field in [&mut rec.category, &mut rec.brand, &mut rec.rag_context] {
        if field.as_deref().is_some_and(|s| s.trim().is_empty()) {
            *field = None;
        }
    }
}
