use serde_json::Value;

use super::{StoreError, StoreResult};

/// The store only supports AND of up to two equality filters.
pub const MAX_FILTERS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { field: String, value: Value },
}

impl Filter {
    pub fn field(&self) -> &str {
        match self {
            Self::Eq { field, .. } => field,
        }
    }

    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Self::Eq { field, value } => doc.get(field).unwrap_or(&Value::Null) == value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unfiltered query over the whole collection.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reject shapes the store cannot serve.
    pub fn validate(&self) -> StoreResult<()> {
        if self.filters.len() > MAX_FILTERS {
            return Err(StoreError::InvalidQuery(format!(
                "at most {} equality filters are supported, got {}",
                MAX_FILTERS,
                self.filters.len()
            )));
        }
        for filter in &self.filters {
            if !is_valid_field(filter.field()) {
                return Err(StoreError::InvalidQuery(format!(
                    "invalid field name: {:?}",
                    filter.field()
                )));
            }
        }
        if let Some(order) = &self.order_by {
            if !is_valid_field(&order.field) {
                return Err(StoreError::InvalidQuery(format!(
                    "invalid order field: {:?}",
                    order.field
                )));
            }
        }
        Ok(())
    }

    /// Evaluate the filters against a document body (used for change feeds).
    pub fn matches(&self, doc: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }
}

/// Field names are interpolated into JSON paths, so keep them to identifiers.
fn is_valid_field(field: &str) -> bool {
    !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
