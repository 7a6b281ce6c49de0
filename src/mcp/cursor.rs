//! Opaque pagination cursors (§6): "Pagination cursors are opaque strings,
//! bound to `(tool, query-hash, offset, pageSize)`; rejecting mismatched
//! cursors is mandatory." A cursor is a base64url blob a caller must pass
//! back unmodified; decoding validates it was issued for the same tool and
//! query before trusting its offset.

use crate::error::{ErrorCode, PreflightError};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cursor {
    pub tool: String,
    pub query_hash: String,
    pub offset: usize,
    pub page_size: usize,
}

/// Hash the query parameters that must stay fixed across a page sequence
/// (the search string, scope, bundle id, tag filter, …). Callers build this
/// from a `serde_json::Value` of whatever fields identify "the same query".
pub fn query_hash(query: &serde_json::Value) -> String {
    let canonical = crate::models::to_canonical_json(query).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

impl Cursor {
    pub fn first_page(tool: &str, query: &serde_json::Value, page_size: usize) -> Self {
        Cursor { tool: tool.to_string(), query_hash: query_hash(query), offset: 0, page_size }
    }

    pub fn next(&self) -> Self {
        Cursor { tool: self.tool.clone(), query_hash: self.query_hash.clone(), offset: self.offset + self.page_size, page_size: self.page_size }
    }

    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("Cursor always serializes");
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode `raw` and check it matches `tool`/`query`. A cursor minted
    /// for a different tool or a different query (the hash won't match)
    /// is rejected with `invalid_cursor` rather than silently reinterpreted.
    pub fn decode_and_verify(raw: &str, tool: &str, query: &serde_json::Value) -> Result<Self, PreflightError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw)
            .map_err(|_| PreflightError::new(ErrorCode::InvalidCursor, "cursor is not valid base64"))?;
        let cursor: Cursor = serde_json::from_slice(&bytes)
            .map_err(|_| PreflightError::new(ErrorCode::InvalidCursor, "cursor does not decode to a recognized shape"))?;
        if cursor.tool != tool {
            return Err(PreflightError::new(
                ErrorCode::InvalidCursor,
                format!("cursor was issued for tool '{}', not '{tool}'", cursor.tool),
            ));
        }
        let expected = query_hash(query);
        if cursor.query_hash != expected {
            return Err(PreflightError::new(
                ErrorCode::InvalidCursor,
                "cursor does not match the current query parameters",
            ));
        }
        Ok(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let query = serde_json::json!({"q": "hello", "scope": "all"});
        let cursor = Cursor::first_page("preflight_search_by_tags", &query, 20).next();
        let encoded = cursor.encode();
        let decoded = Cursor::decode_and_verify(&encoded, "preflight_search_by_tags", &query).unwrap();
        assert_eq!(decoded.offset, 20);
    }

    #[test]
    fn rejects_cursor_for_a_different_query() {
        let query_a = serde_json::json!({"q": "hello"});
        let query_b = serde_json::json!({"q": "goodbye"});
        let cursor = Cursor::first_page("preflight_search_by_tags", &query_a, 20);
        let encoded = cursor.encode();
        let err = Cursor::decode_and_verify(&encoded, "preflight_search_by_tags", &query_b).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidCursor);
    }

    #[test]
    fn rejects_cursor_for_a_different_tool() {
        let query = serde_json::json!({"q": "hello"});
        let cursor = Cursor::first_page("preflight_search_by_tags", &query, 20);
        let encoded = cursor.encode();
        let err = Cursor::decode_and_verify(&encoded, "preflight_trace_query", &query).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidCursor);
    }
}
