//! Paged search request and response envelope
//!
//! The generic input accepted by every search-enabled service:
//! - pagination (0-based page, bounded size)
//! - optional global search (one term across configured columns)
//! - ordered per-column filters and sorts
//!
//! The surrounding transport layer deserializes its wire format into these
//! types; nothing here is storage-specific.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Page size applied when the caller does not supply one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Hard upper bound on the page size accepted by default.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Pagination envelope. `page` is 0-based.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub size: u32,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }

    /// Row offset of the first result on this page.
    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.size)
    }

    /// Reject out-of-range page sizes before any query is built.
    pub fn validate(&self, max_page_size: u32) -> Result<()> {
        if self.size == 0 {
            return Err(Error::Validation(
                "Page size must be at least 1".to_string(),
            ));
        }
        if self.size > max_page_size {
            return Err(Error::Validation(format!(
                "Page size {} exceeds the maximum of {}",
                self.size, max_page_size
            )));
        }
        Ok(())
    }
}

/// Sort direction for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Free-text search across configured columns.
///
/// An empty `fields` list means "use the entity's default search columns".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSearch {
    pub term: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl GlobalSearch {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            fields: Vec::new(),
        }
    }
}

/// One column entry: an optional `operator:value` filter expression and an
/// optional sort direction. Entries are meaningful in request order — the
/// first sorted column is the primary sort key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnFilter {
    pub field_name: String,
    #[serde(default)]
    pub filter_expression: Option<String>,
    #[serde(default)]
    pub sort_direction: Option<SortDirection>,
}

impl ColumnFilter {
    pub fn filtered(field_name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            filter_expression: Some(expression.into()),
            sort_direction: None,
        }
    }

    pub fn sorted(field_name: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field_name: field_name.into(),
            filter_expression: None,
            sort_direction: Some(direction),
        }
    }
}

/// The generic paged search request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub pagination: PageRequest,
    #[serde(default)]
    pub global_search: Option<GlobalSearch>,
    #[serde(default)]
    pub column_filters: Vec<ColumnFilter>,
}

impl SearchRequest {
    pub fn validate(&self, max_page_size: u32) -> Result<()> {
        self.pagination.validate(max_page_size)
    }
}

/// One page of search results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page_number: u32,
    pub page_size: u32,
    pub total_elements: i64,
    pub total_pages: i64,
    pub last: bool,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, page_number: u32, page_size: u32, total_elements: i64) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            (total_elements + i64::from(page_size) - 1) / i64::from(page_size)
        };
        let last = i64::from(page_number) + 1 >= total_pages;
        Self {
            content,
            page_number,
            page_size,
            total_elements,
            total_pages,
            last,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
