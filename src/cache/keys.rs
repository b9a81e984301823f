//! Persisted cache key layout.
//!
//! Entity entries live under `{type}_{id}`; index entries live under the
//! caller-supplied query key verbatim.

use crate::domain::EntityType;

/// Key of one cached entity.
pub fn entity_key(entity_type: &EntityType, id: i64) -> String {
    format!("{}_{id}", entity_type.as_str())
}

/// Key of one cached index result.
pub fn index_key(query_key: &str) -> String {
    query_key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_key_joins_type_and_id() {
        assert_eq!(entity_key(&EntityType::from("node"), 42), "node_42");
        assert_eq!(
            entity_key(&EntityType::from("taxonomy_term"), 7),
            "taxonomy_term_7"
        );
    }

    #[test]
    fn index_key_is_opaque() {
        assert_eq!(
            index_key("node.json?parameters[type]=article&page=0"),
            "node.json?parameters[type]=article&page=0"
        );
    }
}
