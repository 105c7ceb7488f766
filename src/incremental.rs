use std::collections::{HashMap, HashSet};

use crate::{error::Result, loader::SourceDocument, settings_db::SettingsDb};

/// What the index last saw of a document.
///
/// Serialized as: `"hash\0mtime"`.
///
/// # Examples
///
/// ```
/// use docrag::incremental::ManifestEntry;
///
/// let entry = ManifestEntry {
///     hash: "ab12".to_string(),
///     mtime: 1700000000,
/// };
/// let restored = ManifestEntry::deserialize(&entry.serialize()).unwrap();
/// assert_eq!(entry, restored);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub hash: String,
    pub mtime: u64,
}

impl ManifestEntry {
    pub fn serialize(&self) -> Vec<u8> {
        format!("{}\0{}", self.hash, self.mtime).into_bytes()
    }

    /// Returns `None` if the format is invalid.
    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        let s = std::str::from_utf8(bytes).ok()?;
        let (hash, mtime) = s.split_once('\0')?;
        Some(Self {
            hash: hash.to_string(),
            mtime: mtime.parse().ok()?,
        })
    }
}

impl From<&SourceDocument> for ManifestEntry {
    fn from(doc: &SourceDocument) -> Self {
        Self {
            hash: doc.hash.clone(),
            mtime: doc.mtime,
        }
    }
}

/// Corpus-relative path → last indexed state.
pub type Manifest = HashMap<String, ManifestEntry>;

/// Read the persisted manifest. Undecodable entries are ignored, which
/// makes their documents count as new.
pub fn load_manifest(db: &SettingsDb) -> Result<Manifest> {
    let mut manifest = Manifest::new();
    for (path, bytes) in db.list_manifest()? {
        match ManifestEntry::deserialize(&bytes) {
            Some(entry) => {
                manifest.insert(path, entry);
            }
            None => {
                tracing::warn!(path = %path, "ignoring corrupt manifest entry")
            }
        }
    }
    Ok(manifest)
}

/// Persist the manifest for the whole current document set, replacing the
/// previous one.
pub fn store_manifest(db: &SettingsDb, docs: &[SourceDocument]) -> Result<()> {
    let entries: Vec<(String, Vec<u8>)> = manifest_for(docs)
        .into_iter()
        .map(|(path, entry)| (path, entry.serialize()))
        .collect();
    db.replace_manifest(&entries)
}

/// Whether `doc` is new, or its content or mtime changed since indexing.
pub fn needs_update(doc: &SourceDocument, manifest: &Manifest) -> bool {
    match manifest.get(&doc.path) {
        None => true,
        Some(entry) => entry.hash != doc.hash || entry.mtime != doc.mtime,
    }
}

/// The documents that need re-indexing, in input order.
pub fn diff_documents<'a>(
    docs: &'a [SourceDocument],
    manifest: &Manifest,
) -> Vec<&'a SourceDocument> {
    docs.iter().filter(|doc| needs_update(doc, manifest)).collect()
}

/// Manifest describing exactly `docs`.
pub fn manifest_for(docs: &[SourceDocument]) -> Manifest {
    docs.iter()
        .map(|doc| (doc.path.clone(), ManifestEntry::from(doc)))
        .collect()
}

/// Manifest paths with no current document, sorted.
pub fn deleted_paths(
    docs: &[SourceDocument],
    manifest: &Manifest,
) -> Vec<String> {
    let current: HashSet<&str> = docs.iter().map(|d| d.path.as_str()).collect();
    let mut deleted: Vec<String> = manifest
        .keys()
        .filter(|path| !current.contains(path.as_str()))
        .cloned()
        .collect();
    deleted.sort();
    deleted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, SettingsDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = SettingsDb::open(&tmp.path().join("settings.redb")).unwrap();
        (tmp, db)
    }

    fn doc(path: &str, text: &str, mtime: u64) -> SourceDocument {
        SourceDocument::new(path, text.to_string(), mtime)
    }

    #[test]
    fn all_documents_are_new_without_manifest() {
        let docs = vec![doc("a.txt", "alpha", 1), doc("b.txt", "beta", 2)];
        let diff = diff_documents(&docs, &Manifest::new());
        assert_eq!(diff.len(), 2);
    }

    #[test]
    fn unchanged_documents_are_skipped() {
        let (_tmp, db) = test_db();
        let docs = vec![doc("a.txt", "alpha", 1)];
        store_manifest(&db, &docs).unwrap();

        let manifest = load_manifest(&db).unwrap();
        assert!(diff_documents(&docs, &manifest).is_empty());
    }

    #[test]
    fn one_byte_change_is_detected_with_same_mtime() {
        let (_tmp, db) = test_db();
        store_manifest(&db, &[doc("a.txt", "alpha", 1)]).unwrap();
        let manifest = load_manifest(&db).unwrap();

        let edited = doc("a.txt", "alphb", 1);
        assert!(needs_update(&edited, &manifest));
    }

    #[test]
    fn touch_without_edit_is_detected() {
        let (_tmp, db) = test_db();
        store_manifest(&db, &[doc("a.txt", "alpha", 1)]).unwrap();
        let manifest = load_manifest(&db).unwrap();

        assert!(needs_update(&doc("a.txt", "alpha", 2), &manifest));
    }

    #[test]
    fn manifest_covers_the_whole_current_set() {
        let (_tmp, db) = test_db();
        store_manifest(&db, &[doc("gone.txt", "old", 1)]).unwrap();

        let docs = vec![doc("a.txt", "alpha", 1), doc("b.txt", "beta", 2)];
        store_manifest(&db, &docs).unwrap();

        let manifest = load_manifest(&db).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest["b.txt"], ManifestEntry::from(&docs[1]));
    }

    #[test]
    fn deleted_paths_are_reported() {
        let manifest = manifest_for(&[
            doc("a.txt", "alpha", 1),
            doc("z.txt", "zeta", 1),
            doc("m.txt", "mu", 1),
        ]);
        let docs = vec![doc("a.txt", "alpha", 1)];
        assert_eq!(deleted_paths(&docs, &manifest), vec!["m.txt", "z.txt"]);
    }

    #[test]
    fn corrupt_entries_are_ignored() {
        let (_tmp, db) = test_db();
        db.replace_manifest(&[
            ("bad.txt".to_string(), b"no separator".to_vec()),
            (
                "good.txt".to_string(),
                ManifestEntry {
                    hash: "h".into(),
                    mtime: 3,
                }
                .serialize(),
            ),
        ])
        .unwrap();

        let manifest = load_manifest(&db).unwrap();
        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains_key("good.txt"));
    }
}
