//! Execution context codec
//!
//! Serializes the flat typed context map into a BSON document and back.
//! BSON's native numbers cannot carry an arbitrary-precision decimal
//! through a generic document without collapsing it to a double, so the
//! codec writes such values as their canonical string plus a companion
//! field (`<key>_TYPE`) naming the original type; decode reconstructs the
//! value from that tag. Everything else (strings, 64-bit integers,
//! doubles, timestamps) rides on the native BSON types untouched.

use bson::{Bson, Decimal128, Document};
use tracing::warn;

use jobledger_core::{ContextValue, ExecutionContext};

use super::fields;

/// Suffix of the companion field carrying a value's original type name.
pub const TYPE_SUFFIX: &str = "_TYPE";

const NUMERIC_TYPE: &str = "Decimal128";

fn is_reserved(key: &str) -> bool {
    key == fields::ID || key == fields::JOB_EXECUTION_ID || key == fields::STEP_EXECUTION_ID
}

/// Encode a context into the document persisted for `owner_id`, keyed by
/// `owner_key` (the job- or step-execution id field).
pub fn encode(owner_key: &str, owner_id: i64, context: &ExecutionContext) -> Document {
    let mut doc = Document::new();
    doc.insert(owner_key, Bson::Int64(owner_id));

    for (key, value) in context.iter() {
        if is_reserved(key) {
            warn!(key = %key, "dropping context entry colliding with a reserved field");
            continue;
        }
        match value {
            ContextValue::String(s) => {
                doc.insert(key, Bson::String(s.clone()));
            }
            ContextValue::Long(v) => {
                doc.insert(key, Bson::Int64(*v));
            }
            ContextValue::Double(v) => {
                doc.insert(key, Bson::Double(*v));
            }
            ContextValue::Date(d) => {
                doc.insert(key, super::to_bson_datetime(*d));
            }
            ContextValue::Numeric(d) => {
                doc.insert(key, Bson::String(d.to_string()));
                doc.insert(format!("{key}{TYPE_SUFFIX}"), Bson::String(NUMERIC_TYPE.into()));
            }
        }
    }
    doc
}

/// Decode a persisted context document, stripping the owner id field and
/// store-reserved metadata.
pub fn decode(mut doc: Document, owner_key: &str) -> ExecutionContext {
    doc.remove(owner_key);
    doc.remove(fields::ID);

    let mut context = ExecutionContext::new();
    for (key, value) in doc.iter() {
        if let Some(base) = key.strip_suffix(TYPE_SUFFIX) {
            if doc.contains_key(base) {
                continue; // companion field, consumed with its base entry
            }
        }

        let companion_key = format!("{key}{TYPE_SUFFIX}");
        let type_tag = doc.get(companion_key.as_str()).and_then(Bson::as_str);

        let decoded = match (value, type_tag) {
            (Bson::String(s), Some(NUMERIC_TYPE)) => match s.parse::<Decimal128>() {
                Ok(d) => ContextValue::Numeric(d),
                Err(_) => {
                    warn!(key = %key, "failed to reconstruct numeric value, keeping raw string");
                    ContextValue::String(s.clone())
                }
            },
            (Bson::String(s), _) => ContextValue::String(s.clone()),
            (Bson::Int64(v), _) => ContextValue::Long(*v),
            (Bson::Int32(v), _) => ContextValue::Long(i64::from(*v)),
            (Bson::Double(v), _) => ContextValue::Double(*v),
            (Bson::DateTime(dt), _) => ContextValue::Date(super::from_bson_datetime(*dt)),
            (other, _) => {
                warn!(key = %key, kind = ?other.element_type(), "skipping context value of unsupported type");
                continue;
            }
        };
        context.put(key.clone(), decoded);
    }
    context
}
