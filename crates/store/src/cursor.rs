//! Opaque pagination cursors.
//!
//! A cursor pins `{offset, limit, state_version}` so that every page of one
//! pagination reads the same committed state, no matter how far "latest"
//! has moved since the first page. Tokens are opaque to clients and carry:
//! - HMAC validation to reject tampering
//! - a context hash binding the token to one collection and owner
//! - the pinned state version for consistent continuation
//!
//! Every decode failure is a [`MalformedCursor`](crate::StoreError) — a
//! client request error, never a store fault.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tidemark_types::{decode, encode, StateVersion};

use crate::error::{MalformedCursorSnafu, Result};

/// Cursor format version for forward compatibility.
const CURSOR_FORMAT: u8 = 1;

/// HMAC key length in bytes.
pub(crate) const HMAC_KEY_LENGTH: usize = 32;

/// HMAC output length (truncated).
const HMAC_LENGTH: usize = 16;

/// Decoded pagination cursor.
///
/// Serialized, HMAC'd, and base64-encoded for client use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Cursor format version.
    pub format: u8,
    /// SeaHash of the collection name and owner key; rejects reuse of a
    /// cursor against a different collection or owner.
    pub context_hash: [u8; 8],
    /// Resume position within the pinned snapshot.
    pub offset: u64,
    /// Page size the pagination started with.
    pub limit: u32,
    /// State version every page of this pagination reads.
    pub pinned_version: StateVersion,
}

impl Cursor {
    /// Creates a cursor bound to one collection and owner.
    pub fn new(
        collection: &str,
        owner: &[u8],
        offset: u64,
        limit: u32,
        pinned_version: StateVersion,
    ) -> Self {
        Self {
            format: CURSOR_FORMAT,
            context_hash: Self::context_hash(collection, owner),
            offset,
            limit,
            pinned_version,
        }
    }

    /// Computes the context hash for a collection/owner pair.
    pub fn context_hash(collection: &str, owner: &[u8]) -> [u8; 8] {
        let mut buf = Vec::with_capacity(collection.len() + 1 + owner.len());
        buf.extend_from_slice(collection.as_bytes());
        buf.push(0);
        buf.extend_from_slice(owner);
        seahash::hash(&buf).to_le_bytes()
    }
}

/// Signed wire form of a cursor.
#[derive(Serialize, Deserialize)]
struct SignedCursor {
    cursor: Cursor,
    hmac: [u8; HMAC_LENGTH],
}

/// Cursor encoder/decoder with HMAC validation.
pub struct CursorCodec {
    key: [u8; HMAC_KEY_LENGTH],
}

impl CursorCodec {
    /// Creates a codec with the given key.
    ///
    /// Different store instances may hold different keys; cursors are then
    /// instance-local, which is fine for a single-process deployment.
    pub fn new(key: [u8; HMAC_KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Creates a codec with a random key.
    pub fn with_random_key() -> Self {
        use rand::RngCore;
        let mut key = [0u8; HMAC_KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Encodes a cursor to an opaque string.
    pub fn encode(&self, cursor: &Cursor) -> String {
        // Postcard encoding of these structs and HMAC construction from a
        // 32-byte key cannot fail; the fallbacks are unreachable.
        let Ok(cursor_bytes) = encode(cursor) else {
            return String::new();
        };
        let Ok(mut mac) = <Hmac<Sha256>>::new_from_slice(&self.key) else {
            return String::new();
        };
        mac.update(&cursor_bytes);
        let digest = mac.finalize().into_bytes();

        let mut hmac = [0u8; HMAC_LENGTH];
        hmac.copy_from_slice(&digest[..HMAC_LENGTH]);

        let signed = SignedCursor { cursor: cursor.clone(), hmac };
        let Ok(bytes) = encode(&signed) else {
            return String::new();
        };
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    /// Decodes and validates a cursor.
    ///
    /// # Errors
    ///
    /// Returns `MalformedCursor` if the token cannot be decoded, fails HMAC
    /// validation, or carries an unsupported format version.
    pub fn decode(&self, encoded: &str) -> Result<Cursor> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| MalformedCursorSnafu { reason: "invalid encoding" }.build())?;
        let signed: SignedCursor = decode(&bytes)
            .map_err(|_| MalformedCursorSnafu { reason: "invalid token" }.build())?;

        let cursor_bytes = encode(&signed.cursor)
            .map_err(|_| MalformedCursorSnafu { reason: "invalid token" }.build())?;
        let mut mac = <Hmac<Sha256>>::new_from_slice(&self.key)
            .map_err(|_| MalformedCursorSnafu { reason: "invalid token" }.build())?;
        mac.update(&cursor_bytes);
        let digest = mac.finalize().into_bytes();

        if signed.hmac[..] != digest[..HMAC_LENGTH] {
            return MalformedCursorSnafu { reason: "signature mismatch" }.fail();
        }
        if signed.cursor.format != CURSOR_FORMAT {
            return MalformedCursorSnafu {
                reason: format!("unsupported format version {}", signed.cursor.format),
            }
            .fail();
        }
        Ok(signed.cursor)
    }

    /// Validates that a cursor matches the requested collection and owner.
    ///
    /// # Errors
    ///
    /// Returns `MalformedCursor` on a context mismatch: the cursor was
    /// issued for a different collection or owner.
    pub fn validate_context(
        &self,
        cursor: &Cursor,
        collection: &str,
        owner: &[u8],
    ) -> Result<()> {
        if cursor.context_hash != Cursor::context_hash(collection, owner) {
            return MalformedCursorSnafu { reason: "cursor does not match request" }.fail();
        }
        Ok(())
    }
}
