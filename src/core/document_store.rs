/*
 * File persistence for model documents, used by the collaborators around the
 * model (open/save dialogs, export, file-change reloads). The model itself
 * never touches the file system; these helpers hand it raw document bytes and
 * store encoded documents.
 *
 * `CoreDocumentStore` is the real implementation; the trait exists so the
 * editor's file-facing paths can be exercised with in-memory stores in tests.
 */
use super::checksum_utils;
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

pub const DEFAULT_DOCUMENT_FILENAME: &str = "model.json";
pub const DEFAULT_EXPORT_FILENAME: &str = "export.json";

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Serde(serde_json::Error),
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serde(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "Document I/O error: {e}"),
            StoreError::Serde(e) => write!(f, "Document JSON error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            StoreError::Serde(e) => Some(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/*
 * Documents are handed out as raw bytes so that the caller fingerprints and
 * decodes exactly the same content; a second read could see a newer file.
 */
pub trait DocumentStoreOperations: Send + Sync {
    fn read_document_bytes(&self, path: &Path) -> Result<Vec<u8>>;
    fn write_document(&self, path: &Path, document: &Value) -> Result<String>;
}

pub struct CoreDocumentStore {}

impl CoreDocumentStore {
    pub fn new() -> Self {
        CoreDocumentStore {}
    }
}

impl Default for CoreDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

/*
 * Serializes a document the way hand-maintained model files are laid out:
 * pretty-printed with four-space indentation and a trailing newline.
 *
 * Args:
 *   document: The encoded model document.
 *
 * Returns:
 *   The bytes to store, or a `StoreError::Serde` if serialization fails.
 */
pub fn render_document(document: &Value) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, formatter);
    document.serialize(&mut serializer)?;
    bytes.push(b'\n');
    Ok(bytes)
}

impl DocumentStoreOperations for CoreDocumentStore {
    fn read_document_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        log::trace!("CoreDocumentStore: Reading document {path:?}");
        let bytes = fs::read(path)?;
        log::debug!("CoreDocumentStore: Read {} bytes from {path:?}", bytes.len());
        Ok(bytes)
    }

    /*
     * Writes the rendered document, creating the parent directory if needed.
     *
     * Args:
     *   path: Destination file; replaced if it exists.
     *   document: The encoded model document.
     *
     * Returns:
     *   The SHA-256 fingerprint of the bytes written, so the caller can ignore
     *   the file-change notification its own save triggers.
     */
    fn write_document(&self, path: &Path, document: &Value) -> Result<String> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let bytes = render_document(document)?;
        let mut file = File::create(path)?;
        file.write_all(&bytes)?;
        file.flush()?;
        log::debug!("CoreDocumentStore: Wrote document to {path:?}");
        Ok(checksum_utils::sha256_hex(&bytes))
    }
}

/*
 * Remembers the fingerprint of the document the model was last loaded from,
 * so a file-change notification can tell a real edit from a no-op touch.
 */
#[derive(Debug, Default, Clone)]
pub struct DocumentFingerprint {
    checksum: Option<String>,
}

impl DocumentFingerprint {
    pub fn new() -> Self {
        DocumentFingerprint { checksum: None }
    }

    pub fn record(&mut self, checksum: String) {
        self.checksum = Some(checksum);
    }

    pub fn clear(&mut self) {
        self.checksum = None;
    }

    /// True when nothing was recorded yet or `checksum` differs from the record.
    pub fn differs_from(&self, checksum: &str) -> bool {
        self.checksum.as_deref() != Some(checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read_document() {
        // Arrange
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(DEFAULT_EXPORT_FILENAME);
        let store = CoreDocumentStore::new();
        let document = json!({ "dimensions": [ { "name": "contextual", "factors": [] } ] });

        // Act
        let written_checksum = store.write_document(&path, &document).unwrap();
        let bytes = store.read_document_bytes(&path).unwrap();

        // Assert
        assert_eq!(serde_json::from_slice::<Value>(&bytes).unwrap(), document);
        assert_eq!(written_checksum, checksum_utils::sha256_hex(&bytes));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\n    \"dimensions\""));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_read_missing_document_is_io_error() {
        let dir = tempdir().unwrap();
        let store = CoreDocumentStore::new();
        let result = store.read_document_bytes(&dir.path().join(DEFAULT_DOCUMENT_FILENAME));
        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    #[test]
    fn test_render_document_uses_four_space_indent() {
        let bytes = render_document(&json!({ "dimensions": [] })).unwrap();
        assert_eq!(bytes, b"{\n    \"dimensions\": []\n}\n".to_vec());
    }

    #[test]
    fn test_fingerprint_detects_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_DOCUMENT_FILENAME);
        let store = CoreDocumentStore::new();
        let first = store.write_document(&path, &json!({ "dimensions": [] })).unwrap();

        let mut fingerprint = DocumentFingerprint::new();
        assert!(fingerprint.differs_from(&first));
        fingerprint.record(first.clone());
        let reread = checksum_utils::sha256_hex(&store.read_document_bytes(&path).unwrap());
        assert!(!fingerprint.differs_from(&reread));

        let second = store
            .write_document(&path, &json!({ "dimensions": [ { "name": "x" } ] }))
            .unwrap();
        assert!(fingerprint.differs_from(&second));

        fingerprint.clear();
        assert!(fingerprint.differs_from(&first));
    }
}
