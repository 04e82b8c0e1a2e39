//! List queries: equality filters, a semi-join, and keyset pagination.

use serde_json::Value;

use super::TableSchema;

/// Resolves a dotted field path such as `owner.id` inside a row.
#[must_use]
pub fn lookup<'a>(row: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(row, |value, part| value.get(part))
}

/// Equality predicate on one field path. A `Null` value matches absent
/// fields too.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: &'static str,
    pub value: Value,
}

impl Filter {
    #[must_use]
    pub fn matches(&self, row: &Value) -> bool {
        match lookup(row, self.field) {
            Some(v) => *v == self.value,
            None => self.value.is_null(),
        }
    }
}

/// Keeps rows that have at least one partner row in `schema` where
/// `partner[foreign_field] == row[local_field]` and all `filters` hold.
#[derive(Debug, Clone)]
pub struct Join {
    pub schema: &'static TableSchema,
    pub local_field: &'static str,
    pub foreign_field: &'static str,
    pub filters: Vec<Filter>,
}

impl Join {
    #[must_use]
    pub fn new(
        schema: &'static TableSchema,
        local_field: &'static str,
        foreign_field: &'static str,
    ) -> Self {
        Self {
            schema,
            local_field,
            foreign_field,
            filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn filter(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field,
            value: value.into(),
        });
        self
    }
}

/// Position strictly after which a listing resumes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor {
    pub created_at: i64,
    /// Primary-key values in key order.
    pub key: Vec<String>,
}

/// A list query. Results are ordered by `(created_at, primary key)`.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub join: Option<Join>,
    pub after: Option<Cursor>,
    pub limit: Option<usize>,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field,
            value: value.into(),
        });
        self
    }

    /// Adds a filter only when `value` is set.
    #[must_use]
    pub fn filter_opt(self, field: &'static str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.filter(field, v),
            None => self,
        }
    }

    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.join = Some(join);
        self
    }

    #[must_use]
    pub fn after(mut self, cursor: Option<Cursor>) -> Self {
        self.after = cursor;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether every filter holds for `row`. The join is not consulted.
    #[must_use]
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn null_filter_matches_missing_field() {
        let filter = Filter {
            field: "tenant_id",
            value: Value::Null,
        };
        assert!(filter.matches(&json!({"id": "s-1"})));
        assert!(filter.matches(&json!({"id": "s-1", "tenant_id": null})));
        assert!(!filter.matches(&json!({"id": "s-1", "tenant_id": "t-1"})));
    }

    #[test]
    fn dotted_paths_reach_nested_fields() {
        let row = json!({"id": "t-1", "owner": {"id": "o-1", "owner_type": "customer"}});
        let filter = Filter {
            field: "owner.id",
            value: json!("o-1"),
        };
        assert!(filter.matches(&row));
        assert_eq!(lookup(&row, "owner.missing"), None);
    }

    #[test]
    fn filter_opt_skips_unset_values() {
        let query = Query::new()
            .filter_opt("region", Some("eu10"))
            .filter_opt("owner_id", None);
        assert_eq!(query.filters.len(), 1);
        assert!(query.matches(&json!({"region": "eu10"})));
        assert!(!query.matches(&json!({"region": "us10"})));
    }

    #[test]
    fn cursors_order_by_time_then_key() {
        let a = Cursor {
            created_at: 1,
            key: vec!["b".into()],
        };
        let b = Cursor {
            created_at: 2,
            key: vec!["a".into()],
        };
        let c = Cursor {
            created_at: 2,
            key: vec!["b".into()],
        };
        assert!(a < b);
        assert!(b < c);
    }
}
