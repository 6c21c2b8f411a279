//! Deterministic cache key construction.
//!
//! Every consumer derives its key the same way:
//!
//! ```text
//! resource[:segment]*[?canonical-params]
//! ```
//!
//! `canonical-params` is compact JSON with object keys sorted, `null` members
//! dropped and array elements sorted, so the same logical query always maps to
//! the same key no matter how the caller assembled it. `:`, `?` and `%` inside
//! the resource or a segment are percent-escaped, so distinct segment lists
//! never collapse into one key.

use crate::entity::CacheEntity;
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt::Display;

/// Separator between the resource name and each path segment.
pub const SEGMENT_SEPARATOR: char = ':';

/// Separator between the path part and the canonical parameters.
pub const PARAMS_SEPARATOR: char = '?';

/// Fluent builder for cache keys.
///
/// # Example
///
/// ```
/// use coalesce_kit::key::CacheKeyBuilder;
///
/// let key = CacheKeyBuilder::new("brand")
///     .segment(7)
///     .param("per_page", 24)
///     .param("page", 1)
///     .build();
///
/// assert_eq!(key, r#"brand:7?{"page":1,"per_page":24}"#);
/// ```
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    resource: String,
    segments: Vec<String>,
    params: Map<String, Value>,
}

impl CacheKeyBuilder {
    pub fn new(resource: impl Into<String>) -> Self {
        CacheKeyBuilder {
            resource: resource.into(),
            segments: Vec::new(),
            params: Map::new(),
        }
    }

    /// Start a key namespaced by the entity's cache prefix.
    pub fn for_entity<T: CacheEntity>() -> Self {
        Self::new(T::cache_prefix())
    }

    /// Append a path segment (an id, a slug).
    pub fn segment(mut self, segment: impl Display) -> Self {
        self.segments.push(segment.to_string());
        self
    }

    /// Add a single query parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Merge every field of a serializable query object.
    ///
    /// # Errors
    ///
    /// - `Error::SerializationError`: `params` cannot be represented as JSON
    /// - `Error::ValidationError`: `params` is not a JSON object
    pub fn params<P: Serialize>(mut self, params: &P) -> Result<Self> {
        let value = serde_json::to_value(params)
            .map_err(|e| Error::SerializationError(e.to_string()))?;

        match value {
            Value::Object(fields) => {
                self.params.extend(fields);
                Ok(self)
            }
            Value::Null => Ok(self),
            other => Err(Error::ValidationError(format!(
                "key parameters must serialize to an object, got: {}",
                other
            ))),
        }
    }

    /// The key without its parameters; every variant of this family starts
    /// with it. Pair with `CoalescingCacheManager::invalidate_family`.
    pub fn family(&self) -> String {
        let mut family = escape_component(&self.resource).into_owned();
        for segment in &self.segments {
            family.push(SEGMENT_SEPARATOR);
            family.push_str(&escape_component(segment));
        }
        family
    }

    pub fn build(&self) -> String {
        let mut key = self.family();
        let params = canonicalize(&Value::Object(self.params.clone()));

        if matches!(&params, Value::Object(fields) if !fields.is_empty()) {
            key.push(PARAMS_SEPARATOR);
            key.push_str(&canonical_string(&params));
        }
        key
    }
}

/// Percent-escape the characters that delimit key components.
pub fn escape_component(text: &str) -> Cow<'_, str> {
    if !text.contains(|c: char| c == SEGMENT_SEPARATOR || c == PARAMS_SEPARATOR || c == '%') {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 4);
    for c in text.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            '?' => escaped.push_str("%3F"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Whether `key` belongs to `family` (equal, or continues with a separator).
pub fn is_in_family(key: &str, family: &str) -> bool {
    match key.strip_prefix(family) {
        Some("") => true,
        Some(rest) => rest.starts_with(SEGMENT_SEPARATOR) || rest.starts_with(PARAMS_SEPARATOR),
        None => false,
    }
}

/// Normalize a JSON value: drop `null` object members and sort arrays.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect(),
        ),
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(canonicalize).collect();
            items.sort_by_cached_key(canonical_string);
            Value::Array(items)
        }
        other => other.clone(),
    }
}

/// Compact JSON rendering with object keys in sorted order.
///
/// Does not depend on `serde_json`'s map ordering, so it stays stable even
/// when `preserve_order` is enabled elsewhere in the dependency graph.
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(fields) => {
            let mut entries: Vec<(&String, &Value)> = fields.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (name, field)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(name.clone()).to_string());
                out.push(':');
                write_canonical(field, out);
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
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};

    #[derive(Serialize)]
    struct ListingQuery {
        page: u32,
        per_page: u32,
        orderby: Option<String>,
        filters: BTreeMap<String, Vec<String>>,
    }

    #[test]
    fn test_resource_only_key() {
        assert_eq!(CacheKeyBuilder::new("brands").build(), "brands");
    }

    #[test]
    fn test_segments_and_params() {
        let builder = CacheKeyBuilder::new("brand")
            .segment(7)
            .param("page", 1)
            .param("order", "desc");

        assert_eq!(builder.family(), "brand:7");
        assert_eq!(builder.build(), r#"brand:7?{"order":"desc","page":1}"#);
    }

    #[test]
    fn test_filter_value_order_is_irrelevant() {
        let a = CacheKeyBuilder::new("brand")
            .segment(7)
            .param("filters", json!({"color": ["red", "blue"], "size": ["m"]}))
            .build();
        let b = CacheKeyBuilder::new("brand")
            .segment(7)
            .param("filters", json!({"size": ["m"], "color": ["blue", "red"]}))
            .build();

        assert_eq!(a, b);
    }

    #[test]
    fn test_different_values_produce_different_keys() {
        let page1 = CacheKeyBuilder::new("blog").param("page", 1).build();
        let page2 = CacheKeyBuilder::new("blog").param("page", 2).build();
        let page1_as_string = CacheKeyBuilder::new("blog").param("page", "1").build();

        assert_ne!(page1, page2);
        assert_ne!(page1, page1_as_string);
    }

    #[test]
    fn test_params_from_struct_drop_nulls() {
        let query = ListingQuery {
            page: 2,
            per_page: 12,
            orderby: None,
            filters: BTreeMap::new(),
        };

        let key = CacheKeyBuilder::new("blog")
            .params(&query)
            .expect("query is an object")
            .build();

        assert_eq!(key, r#"blog?{"filters":{},"page":2,"per_page":12}"#);
    }

    #[test]
    fn test_params_rejects_non_object() {
        let result = CacheKeyBuilder::new("blog").params(&vec![1, 2, 3]);
        assert!(matches!(result, Err(Error::ValidationError(_))));
    }

    #[test]
    fn test_separators_inside_segments_are_escaped() {
        let joined = CacheKeyBuilder::new("brand").segment("7:page").segment(1);
        let split = CacheKeyBuilder::new("brand")
            .segment(7)
            .segment("page")
            .segment(1);

        assert_eq!(joined.build(), "brand:7%3Apage:1");
        assert_eq!(split.build(), "brand:7:page:1");
        assert!(!is_in_family(&split.build(), &joined.family()));

        assert_eq!(
            CacheKeyBuilder::new("search?q").segment("50%").build(),
            "search%3Fq:50%25"
        );
    }

    #[test]
    fn test_family_membership() {
        assert!(is_in_family("brand:7", "brand:7"));
        assert!(is_in_family(r#"brand:7?{"page":1}"#, "brand:7"));
        assert!(is_in_family("brand:7:attributes", "brand:7"));
        assert!(!is_in_family("brand:70", "brand:7"));
        assert!(!is_in_family("blog", "brand"));
    }

    proptest! {
        #[test]
        fn prop_distinct_segment_lists_give_distinct_keys(
            a in proptest::collection::vec("[a-z0-9:?%]{0,6}", 0..4),
            b in proptest::collection::vec("[a-z0-9:?%]{0,6}", 0..4),
        ) {
            prop_assume!(a != b);
            let key_a = a.iter().fold(CacheKeyBuilder::new("brand"), |k, s| k.segment(s)).build();
            let key_b = b.iter().fold(CacheKeyBuilder::new("brand"), |k, s| k.segment(s)).build();

            prop_assert_ne!(key_a, key_b);
        }

        #[test]
        fn prop_parameter_insertion_order_is_irrelevant(
            params in proptest::collection::hash_map("[a-z]{1,8}", any::<i64>(), 0..8)
        ) {
            let forward = params
                .iter()
                .fold(CacheKeyBuilder::new("catalog"), |b, (k, v)| b.param(k.clone(), *v));

            let mut reversed: Vec<_> = params.iter().collect();
            reversed.reverse();
            let backward = reversed
                .into_iter()
                .fold(CacheKeyBuilder::new("catalog"), |b, (k, v)| b.param(k.clone(), *v));

            prop_assert_eq!(forward.build(), backward.build());
        }

        #[test]
        fn prop_multi_value_filters_are_order_insensitive(
            mut values in proptest::collection::vec("[a-z0-9]{1,6}", 0..10)
        ) {
            let mut filters = HashMap::new();
            filters.insert("pa_color".to_string(), values.clone());
            let original = CacheKeyBuilder::new("brand")
                .segment(3)
                .params(&json!({ "filters": filters }))
                .map(|b| b.build());

            values.reverse();
            let mut filters = HashMap::new();
            filters.insert("pa_color".to_string(), values);
            let shuffled = CacheKeyBuilder::new("brand")
                .segment(3)
                .params(&json!({ "filters": filters }))
                .map(|b| b.build());

            prop_assert_eq!(original, shuffled);
        }
    }
}
