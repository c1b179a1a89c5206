// formwork-core/src/core/id_codec.rs
// ============================================================================
// Module: Formwork Sealed Record Ids
// Description: Tamper-evident encoding of record ids sent to clients.
// Purpose: Stop clients from addressing records by guessing integer ids.
// Dependencies: base64, crate::core::{hashing, identifiers, model, record}, subtle
// ============================================================================

//! ## Overview
//! Outgoing ids are sealed as `base64url(id_be || tag)` where `tag` is the
//! first 16 bytes of `sha256(salt || id_be)`. Incoming ids are opened by
//! recomputing the tag and comparing in constant time. Plain integer ids are
//! accepted, and emitted, only when the codec runs in plain mode, which the
//! CLI and tests use.
//!
//! Security posture: tokens are integrity-protected, not encrypted; the id
//! itself is recoverable by anyone holding a token.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Number;
use serde_json::Value;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::core::data_types::DataType;
use crate::core::hashing::sha256_parts;
use crate::core::identifiers::ModelName;
use crate::core::identifiers::RecordId;
use crate::core::model::ModelSpec;
use crate::core::model::RelationKind;
use crate::core::record::ID_KEY;
use crate::core::record::Record;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Tag length in bytes.
const TAG_LENGTH: usize = 16;
/// Sealed payload length: 8 id bytes plus tag.
const SEALED_LENGTH: usize = 8 + TAG_LENGTH;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Id decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdCodecError {
    /// Token is malformed or the tag does not verify.
    #[error("invalid record id token")]
    InvalidToken,
    /// Plain ids are not accepted by this codec.
    #[error("plain record ids are not accepted")]
    PlainIdRejected,
}

// ============================================================================
// SECTION: Codec
// ============================================================================

/// Seals and opens record ids.
#[derive(Debug, Clone)]
pub struct IdCodec {
    /// Salt mixed into tags.
    salt: String,
    /// Accept and emit plain integer ids.
    plain: bool,
}

impl IdCodec {
    /// Creates a codec.
    #[must_use]
    pub fn new(salt: impl Into<String>, allow_plain_ids: bool) -> Self {
        Self {
            salt: salt.into(),
            plain: allow_plain_ids,
        }
    }

    /// Creates a codec that passes ids through as integers.
    #[must_use]
    pub fn plain() -> Self {
        Self::new(String::new(), true)
    }

    /// Returns true when plain ids are in use.
    #[must_use]
    pub const fn is_plain(&self) -> bool {
        self.plain
    }

    /// Computes the tag for an id.
    fn tag(&self, id_bytes: &[u8; 8]) -> [u8; TAG_LENGTH] {
        let digest = sha256_parts(&[self.salt.as_bytes(), id_bytes]);
        let mut tag = [0_u8; TAG_LENGTH];
        tag.copy_from_slice(&digest[.. TAG_LENGTH]);
        tag
    }

    /// Seals an id into a token.
    #[must_use]
    pub fn seal(&self, id: RecordId) -> String {
        let id_bytes = id.get().to_be_bytes();
        let mut payload = Vec::with_capacity(SEALED_LENGTH);
        payload.extend_from_slice(&id_bytes);
        payload.extend_from_slice(&self.tag(&id_bytes));
        URL_SAFE_NO_PAD.encode(payload)
    }

    /// Encodes an id for a client.
    #[must_use]
    pub fn encode(&self, id: RecordId) -> Value {
        if self.plain || !id.is_persisted() {
            Value::Number(Number::from(id.get()))
        } else {
            Value::String(self.seal(id))
        }
    }

    /// Opens a token produced by [`IdCodec::seal`].
    ///
    /// # Errors
    ///
    /// Returns [`IdCodecError::InvalidToken`] when the token does not verify.
    pub fn open_token(&self, token: &str) -> Result<RecordId, IdCodecError> {
        let payload =
            URL_SAFE_NO_PAD.decode(token.as_bytes()).map_err(|_| IdCodecError::InvalidToken)?;
        if payload.len() != SEALED_LENGTH {
            return Err(IdCodecError::InvalidToken);
        }
        let mut id_bytes = [0_u8; 8];
        id_bytes.copy_from_slice(&payload[.. 8]);
        let expected = self.tag(&id_bytes);
        if !bool::from(expected.ct_eq(&payload[8 ..])) {
            return Err(IdCodecError::InvalidToken);
        }
        Ok(RecordId::new(i64::from_be_bytes(id_bytes)))
    }

    /// Opens an id sent by a client.
    ///
    /// Null, empty, and zero always read as [`RecordId::NEW`].
    ///
    /// # Errors
    ///
    /// Returns [`IdCodecError`] when the value is neither a valid token nor an
    /// accepted plain id.
    pub fn open(&self, value: Option<&Value>) -> Result<RecordId, IdCodecError> {
        match value {
            None | Some(Value::Null) => Ok(RecordId::NEW),
            Some(Value::Number(number)) => self.open_plain(number.as_i64()),
            Some(Value::String(text)) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(RecordId::NEW);
                }
                match trimmed.parse::<i64>() {
                    Ok(id) => self.open_plain(Some(id)),
                    Err(_) => self.open_token(trimmed),
                }
            }
            Some(_) => Err(IdCodecError::InvalidToken),
        }
    }

    /// Accepts a plain id when allowed.
    fn open_plain(&self, id: Option<i64>) -> Result<RecordId, IdCodecError> {
        match id {
            Some(id) if id <= 0 => Ok(RecordId::NEW),
            Some(id) if self.plain => Ok(RecordId::new(id)),
            Some(_) => Err(IdCodecError::PlainIdRejected),
            None => Err(IdCodecError::InvalidToken),
        }
    }

    /// Opens `id` and lookup columns in a client record, recursing into
    /// relation payloads.
    ///
    /// # Errors
    ///
    /// Returns [`IdCodecError`] for the first id that fails to open.
    pub fn decrypt_ids<'a, F>(
        &self,
        record: &mut Record,
        model: &ModelSpec,
        resolve: &F,
    ) -> Result<(), IdCodecError>
    where
        F: Fn(&ModelName) -> Option<&'a ModelSpec>,
    {
        self.walk(record, model, resolve, &|codec: &Self, value: &Value| {
            codec.open(Some(value)).map(id_value)
        })
    }

    /// Seals `id` and lookup columns in an outgoing record, recursing into
    /// embedded relations.
    pub fn seal_ids<'a, F>(&self, record: &mut Record, model: &ModelSpec, resolve: &F)
    where
        F: Fn(&ModelName) -> Option<&'a ModelSpec>,
    {
        self.walk(record, model, resolve, &|codec: &Self, value: &Value| {
            Ok(value.as_i64().map_or_else(|| value.clone(), |id| codec.encode(RecordId::new(id))))
        })
        .unwrap_or(());
    }

    /// Applies `convert` to every id-bearing value of a record tree.
    fn walk<'a, F, C>(
        &self,
        record: &mut Record,
        model: &ModelSpec,
        resolve: &F,
        convert: &C,
    ) -> Result<(), IdCodecError>
    where
        F: Fn(&ModelName) -> Option<&'a ModelSpec>,
        C: Fn(&Self, &Value) -> Result<Value, IdCodecError>,
    {
        if let Some(value) = record.get_mut(ID_KEY) {
            *value = convert(self, value)?;
        }
        for column in &model.columns {
            if column.data_type != DataType::Lookup {
                continue;
            }
            if let Some(value) = record.get_mut(column.name.as_str())
                && !value.is_null()
            {
                let converted = convert(self, value)?;
                *value = if converted == Value::from(0) { Value::Null } else { converted };
            }
        }
        for relation in &model.relations {
            let Some(related) = resolve(&relation.model) else {
                continue;
            };
            match (relation.kind, record.get_mut(&relation.name)) {
                (RelationKind::HasMany, Some(Value::Array(items))) => {
                    for item in items {
                        if let Value::Object(child) = item {
                            self.walk(child, related, resolve, convert)?;
                        }
                    }
                }
                (_, Some(Value::Object(child))) => self.walk(child, related, resolve, convert)?,
                _ => {}
            }
        }
        Ok(())
    }
}

/// Converts an opened id back into a JSON value.
fn id_value(id: RecordId) -> Value {
    Value::Number(Number::from(id.get()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
