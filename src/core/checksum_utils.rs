/*
 * SHA-256 fingerprints of model documents. A reload triggered by a file-change
 * notification compares fingerprints first, so saving an unchanged document
 * (or a notification for a touch without edits) does not throw away the
 * in-memory tree.
 */
use sha2::{Digest, Sha256};

/*
 * Calculates the SHA-256 digest of a document's bytes.
 *
 * Args:
 *   bytes: The document content exactly as read from or written to disk.
 *
 * Returns:
 *   The digest as a lowercase hex string of 64 characters.
 */
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let hex_checksum = format!("{:x}", hasher.finalize());
    log::trace!(
        "ChecksumUtils: Calculated checksum {hex_checksum} for {} bytes",
        bytes.len()
    );
    hex_checksum
}
