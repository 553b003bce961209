//! Deterministic identity for entities, chunks, and tables.
//!
//! Every subsystem that mints or resolves an identifier goes through this
//! module. The aggregator, resolver, indexer, and query layer must agree on
//! these functions byte-for-byte; any drift breaks the joins between
//! mentions, canonical entities, embeddings, and graph nodes.
//!
//! # Canonical key
//!
//! ```text
//! canonical_key = hex(SHA-256(lower(entity_type + ":" + normalized_value)))[..32]
//! ```
//!
//! # Entity id (LLM-facing)
//!
//! ```text
//! entity_id = lower(entity_type) + "_" + hex(SHA-1(lower(entity_type + ":" + normalized_value)))[..16]
//! ```
//!
//! Both are case-insensitive over the joined string.

use sha1::Sha1;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Number of hex characters kept from the SHA-256 digest for canonical keys.
const CANONICAL_KEY_LEN: usize = 32;

/// Number of hex characters kept from the SHA-1 digest for entity ids.
const ENTITY_ID_HASH_LEN: usize = 16;

/// Compute the canonical key for an `(entity_type, normalized_value)` pair.
///
/// The key is stable across runs and case-insensitive: `("Policy", "POL-1")`
/// and `("policy", "pol-1")` yield the same key.
pub fn canonical_key(entity_type: &str, normalized_value: &str) -> String {
    let joined = format!("{entity_type}:{normalized_value}").to_lowercase();
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(digest)[..CANONICAL_KEY_LEN].to_string()
}

/// Compute the short, human-scannable entity id used in LLM-facing contexts.
pub fn entity_id(entity_type: &str, normalized_value: &str) -> String {
    let joined = format!("{entity_type}:{normalized_value}").to_lowercase();
    let digest = Sha1::digest(joined.as_bytes());
    let short = &hex::encode(digest)[..ENTITY_ID_HASH_LEN];
    format!("{}_{short}", entity_type.to_lowercase())
}

/// Deterministic chunk identifier of the form `doc_<docid>_p<page>_c<index>`.
pub fn stable_chunk_id(document_id: Uuid, page_number: i32, chunk_index: i32) -> String {
    format!("doc_{document_id}_p{page_number}_c{chunk_index}")
}

/// Deterministic table identifier, the table analog of [`stable_chunk_id`].
pub fn stable_table_id(document_id: Uuid, page_number: i32, table_index: i32) -> String {
    format!("doc_{document_id}_p{page_number}_t{table_index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_key_is_case_insensitive() {
        let a = canonical_key("Policy", "POL-8888");
        let b = canonical_key("policy", "pol-8888");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn canonical_key_distinguishes_values() {
        assert_ne!(
            canonical_key("Policy", "POL-8888"),
            canonical_key("Policy", "POL-8889")
        );
        assert_ne!(
            canonical_key("Policy", "POL-8888"),
            canonical_key("Coverage", "POL-8888")
        );
    }

    #[test]
    fn canonical_key_matches_reference_digest() {
        // sha256("policy:pol-8888") truncated to 32 hex chars.
        let digest = Sha256::digest(b"policy:pol-8888");
        let expected = &hex::encode(digest)[..32];
        assert_eq!(canonical_key("Policy", "POL-8888"), expected);
    }

    #[test]
    fn entity_id_shape() {
        let id = entity_id("Coverage", "General Liability");
        assert!(id.starts_with("coverage_"));
        let hash_part = id.strip_prefix("coverage_").unwrap();
        assert_eq!(hash_part.len(), 16);
        assert_eq!(id, entity_id("coverage", "general liability"));
    }

    #[test]
    fn stable_ids_are_reproducible() {
        let doc = Uuid::nil();
        assert_eq!(
            stable_chunk_id(doc, 5, 0),
            "doc_00000000-0000-0000-0000-000000000000_p5_c0"
        );
        assert_eq!(stable_chunk_id(doc, 5, 0), stable_chunk_id(doc, 5, 0));
        assert_ne!(stable_chunk_id(doc, 5, 0), stable_table_id(doc, 5, 0));
    }
}
