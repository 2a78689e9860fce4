//! Filter conversion to Qdrant `Filter`.
//!
//! Supports exact equality on scalar fields (`String`, integer `Number`, `Bool`).

use qdrant_client::qdrant::{Condition, Filter};
use tracing::debug;

use crate::record::RagFilter;

/// Converts [`RagFilter`] to a Qdrant [`Filter`] whose conditions all must match.
///
/// - `String` → keyword match
/// - integer `Number` → integer match
/// - `Bool` → boolean match
///
/// Other value types are skipped.
pub fn to_qdrant_filter(f: &RagFilter) -> Filter {
    let mut must: Vec<Condition> = Vec::with_capacity(f.equals.len());

    for (field, val) in &f.equals {
        let cond = match val {
            serde_json::Value::String(s) => Condition::matches(field.clone(), s.clone()),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Condition::matches(field.clone(), i),
                None => continue,
            },
            serde_json::Value::Bool(b) => Condition::matches(field.clone(), *b),
            _ => continue,
        };
        must.push(cond);
    }

    debug!(conditions = must.len(), "filters::to_qdrant_filter");
    Filter::must(must)
}
