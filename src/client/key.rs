//! Cache key naming

use std::fmt;

/// Which cached shape a key addresses
///
/// One logical page is cached once per shape, so the prefix keeps the raw
/// JSON, the decoded document and the block index from overwriting each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPrefix {
    /// Raw response bytes
    Json,
    /// Untyped decoded document
    Decoded,
    /// Blocks indexed by id
    BlockIndex,
}

impl KeyPrefix {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyPrefix::Json => "json-request",
            KeyPrefix::Decoded => "decoded-request",
            KeyPrefix::BlockIndex => "block-index-request",
        }
    }
}

impl fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the cache key `prefix:version:language:page`
///
/// Field values are not escaped: a `:` inside a version, language or slug can
/// make two different requests share a key.
pub fn cache_key(prefix: KeyPrefix, page: &str, version: &str, language: Option<&str>) -> String {
    format!(
        "{}:{}:{}:{}",
        prefix,
        version,
        language.unwrap_or(""),
        page
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_field_order() {
        assert_eq!(
            cache_key(KeyPrefix::Json, "home", "published", Some("en")),
            "json-request:published:en:home"
        );
        assert_eq!(
            cache_key(KeyPrefix::BlockIndex, "blog/post", "draft", None),
            "block-index-request:draft::blog/post"
        );
    }

    #[test]
    fn test_key_is_deterministic() {
        let first = cache_key(KeyPrefix::Decoded, "about", "published", Some("de"));
        let second = cache_key(KeyPrefix::Decoded, "about", "published", Some("de"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_prefixes_never_collide() {
        let keys: HashSet<String> = [KeyPrefix::Json, KeyPrefix::Decoded, KeyPrefix::BlockIndex]
            .into_iter()
            .map(|prefix| cache_key(prefix, "home", "published", Some("en")))
            .collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_distinct_requests_get_distinct_keys() {
        let requests = [
            ("home", "published", Some("en")),
            ("home", "published", Some("de")),
            ("home", "published", None),
            ("home", "", Some("en")),
            ("about", "published", Some("en")),
            ("", "published", Some("en")),
        ];
        let keys: HashSet<String> = requests
            .iter()
            .map(|(page, version, language)| cache_key(KeyPrefix::Json, page, version, *language))
            .collect();
        assert_eq!(keys.len(), requests.len());
    }

    #[test]
    fn test_separator_in_field_values_can_collide() {
        // Known limitation of the unescaped format
        assert_eq!(
            cache_key(KeyPrefix::Json, "c", "a:b", None),
            cache_key(KeyPrefix::Json, "c", "a", Some("b:"))
        );
    }
}
