use std::path::Path;

use rayon::prelude::*;

use crate::{
    dedup::sha256_hex,
    error::{Error, Result},
    walker::DiscoveredFile,
};

/// Documents whose trimmed text is this short or shorter are not indexed.
pub const MIN_DOCUMENT_CHARS: usize = 50;

/// A loaded corpus document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Path relative to the corpus root; the document's identity.
    pub path: String,
    pub text: String,
    /// Nanoseconds since the Unix epoch.
    pub mtime: u64,
    /// SHA-256 hex of `text`.
    pub hash: String,
}

impl SourceDocument {
    pub fn new(path: &str, text: String, mtime: u64) -> Self {
        let hash = sha256_hex(&text);
        Self {
            path: path.to_string(),
            text,
            mtime,
            hash,
        }
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Read the text of one file, extracting it from PDFs.
pub fn read_text(path: &Path) -> Result<String> {
    if is_pdf(path) {
        let bytes = std::fs::read(path)?;
        return pdf_extract::extract_text_from_mem(&bytes).map_err(|e| {
            Error::Extract {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        });
    }

    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
}

/// Load every discovered file, in discovery order.
///
/// Files are read in parallel. A file that cannot be read, or whose text is
/// too short to carry content, is logged and left out.
pub fn load_documents(files: &[DiscoveredFile]) -> Vec<SourceDocument> {
    files
        .par_iter()
        .filter_map(|file| {
            let path = file.relative_path.to_string_lossy().to_string();
            let text = match read_text(&file.absolute_path) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(
                        path = %path,
                        error = %e,
                        "skipping unreadable document"
                    );
                    return None;
                }
            };
            if text.trim().chars().count() <= MIN_DOCUMENT_CHARS {
                tracing::debug!(path = %path, "skipping near-empty document");
                return None;
            }
            Some(SourceDocument::new(&path, text, file.mtime))
        })
        .collect()
}
