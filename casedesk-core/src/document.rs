//! Documents and identity normalization.
//!
//! A [`Document`] is an ordered JSON object. Exactly one field identifies it:
//! callers see `id` holding the external string, while `_id` holding
//! `{"$oid": ...}` is the internal form. Every function here is pure and
//! returns a new document instead of editing the caller's copy.

use serde_json::{Map, Value};

use crate::document_id::DocumentId;
use crate::error::ProviderError;

/// An ordered field mapping.
pub type Document = Map<String, Value>;

/// External identity field.
pub const ID_FIELD: &str = "id";

/// Internal identity field.
pub const INTERNAL_ID_FIELD: &str = "_id";

/// Resolves the identity carried by `doc`, if any.
///
/// Either identity field may hold either representation. If both fields are
/// present they must name the same document.
pub fn identity_of(doc: &Document) -> Result<Option<DocumentId>, ProviderError> {
    let external = doc.get(ID_FIELD).map(DocumentId::from_value).transpose()?;
    let internal = doc
        .get(INTERNAL_ID_FIELD)
        .map(DocumentId::from_value)
        .transpose()?;

    match (external, internal) {
        (Some(a), Some(b)) if a != b => Err(ProviderError::MalformedIdentity(format!(
            "`{}` ({}) and `{}` ({}) disagree",
            ID_FIELD, a, INTERNAL_ID_FIELD, b
        ))),
        (Some(id), _) | (None, Some(id)) => Ok(Some(id)),
        (None, None) => Ok(None),
    }
}

/// Resolves the identity of `doc`, failing when there is none.
pub fn require_identity(doc: &Document) -> Result<DocumentId, ProviderError> {
    identity_of(doc)?.ok_or(ProviderError::MissingIdentity)
}

/// Returns `doc` without either identity field.
pub fn strip_identity(doc: &Document) -> Document {
    doc.iter()
        .filter(|(k, _)| k.as_str() != ID_FIELD && k.as_str() != INTERNAL_ID_FIELD)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Returns `body` with `id` prepended as an external string.
pub fn with_external_identity(id: DocumentId, body: &Document) -> Document {
    let mut out = Document::with_capacity(body.len() + 1);
    out.insert(ID_FIELD.to_string(), Value::String(id.to_external()));
    for (k, v) in body {
        if k != ID_FIELD && k != INTERNAL_ID_FIELD {
            out.insert(k.clone(), v.clone());
        }
    }
    out
}

/// Rewrites the identity of `doc` into its external form.
pub fn externalize(doc: &Document) -> Result<Document, ProviderError> {
    match identity_of(doc)? {
        Some(id) => Ok(with_external_identity(id, doc)),
        None => Ok(doc.clone()),
    }
}

/// Externalizes every document of a sequence.
pub fn externalize_all(docs: &[Document]) -> Result<Vec<Document>, ProviderError> {
    docs.iter().map(externalize).collect()
}

/// Rewrites the identity of `doc` into its internal form.
pub fn internalize(doc: &Document) -> Result<Document, ProviderError> {
    match identity_of(doc)? {
        Some(id) => {
            let mut out = Document::with_capacity(doc.len());
            out.insert(INTERNAL_ID_FIELD.to_string(), id.to_internal());
            out.extend(strip_identity(doc));
            Ok(out)
        }
        None => Ok(doc.clone()),
    }
}

/// Converts an arbitrary JSON value into a document.
pub fn from_value(value: Value) -> Option<Document> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Builds a document from a JSON literal; non-objects become empty.
pub fn doc(value: Value) -> Document {
    from_value(value).unwrap_or_default()
}
