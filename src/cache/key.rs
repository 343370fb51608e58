//! Canonical cache key derivation.
//!
//! A cache key is `<app-prefix>:<logical-prefix>:<hash>` where the hash is a
//! truncated BLAKE3 digest over a canonical JSON encoding of the call
//! arguments. Named arguments are sorted by name (recursively, at every
//! nesting level) so argument order never affects the key, and the same
//! logical request produces the same key across process restarts.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("key arguments are not serializable: {0}")]
    Unserializable(#[from] serde_json::Error),

    #[error("named arguments must encode to a JSON object, got {0}")]
    NamedNotObject(&'static str),
}

/// Derives canonical cache keys for a single application namespace.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    app_prefix: String,
}

impl KeyCodec {
    pub fn new(app_prefix: impl Into<String>) -> Self {
        Self {
            app_prefix: app_prefix.into(),
        }
    }

    /// Build a canonical key from a logical prefix plus positional and named
    /// arguments.
    ///
    /// Inputs that cannot be represented as JSON (non-finite floats, maps with
    /// non-string keys) are rejected here rather than hashed through an
    /// unstable textual rendering.
    pub fn build<P, N>(&self, prefix: &str, positional: &P, named: &N) -> Result<String, KeyError>
    where
        P: Serialize,
        N: Serialize,
    {
        let positional = serde_json::to_value(positional)?;
        let named = serde_json::to_value(named)?;
        if !named.is_object() && !named.is_null() {
            return Err(KeyError::NamedNotObject(json_kind(&named)));
        }

        let mut canonical = String::new();
        write_canonical(&positional, &mut canonical);
        canonical.push('|');
        write_canonical(&named, &mut canonical);

        let hex = blake3::hash(canonical.as_bytes()).to_hex();
        Ok(format!("{}:{}:{}", self.app_prefix, prefix, &hex[..16]))
    }

    /// The wildcard pattern covering every key under a logical prefix.
    pub fn prefix_pattern(&self, prefix: &str) -> String {
        format!("{}:{}:*", self.app_prefix, prefix)
    }

    pub fn app_prefix(&self) -> &str {
        &self.app_prefix
    }
}

/// Render a JSON value with object keys sorted at every nesting level.
///
/// `serde_json` preserves insertion order for maps, so a plain `to_string`
/// would make the key depend on argument order.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Object keys are plain strings; escape via serde_json.
                out.push_str(&Value::String((*k).clone()).to_string());
                out.push(':');
                write_canonical(&map[*k], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Glob match with `*` (any run) and `?` (any single char).
///
/// Both tiers route pattern invalidation through this matcher so L1 eviction
/// agrees with the backing store's SCAN semantics: `project:42:*` matches
/// `project:42:x` but not `project:420:x`.
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();

    let (mut pi, mut ki) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ki < k.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == k[ki]) {
            pi += 1;
            ki += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ki));
            pi += 1;
        } else if let Some((sp, sk)) = star {
            // Backtrack: let the last star absorb one more character.
            pi = sp + 1;
            ki = sk + 1;
            star = Some((sp, sk + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
