//! Default host adapters: a filesystem-backed loader for documents, text
//! resources and library modules (`.xq` / `.xqm` files).

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use xylem_interpreter::xml::{parse_document, Document};
use xylem_interpreter::{Error, ErrorCode, HostEnvironment, Result};

/// Loads documents and text from the local filesystem. `file://` prefixes
/// are accepted and stripped.
#[derive(Debug, Default)]
pub struct FsHost;

fn to_path(uri: &str) -> PathBuf {
    PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
}

impl HostEnvironment for FsHost {
    fn load_document(&self, uri: &str, order_key: u64) -> Result<Arc<Document>> {
        let text = fs::read_to_string(to_path(uri)).map_err(|error| {
            Error::with_message(ErrorCode::FODC0002, format!("cannot read '{uri}': {error}"))
        })?;
        parse_document(&text, uri, order_key).map_err(|error| {
            Error::with_message(ErrorCode::FODC0002, format!("cannot parse '{uri}': {error}"))
        })
    }

    fn load_text(&self, uri: &str, _encoding: Option<&str>) -> Result<String> {
        fs::read_to_string(to_path(uri)).map_err(|error| {
            Error::with_message(ErrorCode::FOUT1170, format!("cannot read '{uri}': {error}"))
        })
    }
}

/// Convenience: reads a query file (`.xq` / `.xqm`) into a statement
/// string.
pub fn read_query_file(path: &str) -> anyhow::Result<String> {
    Ok(fs::read_to_string(to_path(path))?)
}
