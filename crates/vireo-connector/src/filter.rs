//! Search filters and pagination for connector queries.

use serde::{Deserialize, Serialize};

use crate::record::AttributeValue;

/// A search filter over external records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Match every record.
    All,
    /// Attribute equals the given value.
    Equals {
        attribute: String,
        value: AttributeValue,
    },
    /// Attribute is present with at least one non-null value.
    Present { attribute: String },
    /// All sub-filters match.
    And { filters: Vec<Filter> },
    /// Any sub-filter matches.
    Or { filters: Vec<Filter> },
}

impl Filter {
    /// Create an equality filter.
    pub fn equals(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a presence filter.
    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present {
            attribute: attribute.into(),
        }
    }

    /// Conjunction of filters.
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And { filters }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::All
    }
}

/// Options for a search call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Attributes to return; empty means all.
    #[serde(default)]
    pub attributes_to_get: Vec<String>,
    /// Optional pagination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageRequest>,
}

/// Pagination parameters for record listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Zero-based offset of the first record.
    pub offset: u64,
    /// Maximum number of records to return.
    pub size: u32,
}

impl PageRequest {
    /// Create a page request.
    pub fn new(offset: u64, size: u32) -> Self {
        Self { offset, size }
    }

    /// The first page of the given size.
    pub fn first(size: u32) -> Self {
        Self { offset: 0, size }
    }

    /// The page following this one.
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            offset: self.offset + u64::from(self.size),
            size: self.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_construction() {
        let f = Filter::and(vec![
            Filter::equals("mail", "j@x.com"),
            Filter::present("employeeNumber"),
        ]);
        match f {
            Filter::And { filters } => assert_eq!(filters.len(), 2),
            _ => panic!("expected And"),
        }
    }

    #[test]
    fn test_page_request_next() {
        let page = PageRequest::first(1000);
        assert_eq!(page.offset, 0);
        let next = page.next();
        assert_eq!(next.offset, 1000);
        assert_eq!(next.size, 1000);
    }
}
