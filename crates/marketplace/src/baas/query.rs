//! `PostgREST` query builder.
//!
//! Covers the subset of the query language the marketplace uses: column
//! selection (including embedded resources), equality filters, a single
//! ordering column and a row limit.

use std::fmt;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// An equality filter `column = value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

/// A query against one table.
///
/// ```rust
/// use rural_grow_marketplace::baas::{Order, Query};
///
/// let query = Query::table("wishlist")
///     .select("id,product_id,created_at")
///     .eq("user_id", "8d0c…")
///     .order("created_at", Order::Desc);
///
/// assert_eq!(query.table_name(), "wishlist");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    table: String,
    select: Option<String>,
    filters: Vec<Filter>,
    order: Option<(String, Order)>,
    limit: Option<usize>,
}

impl Query {
    /// Start a query on `table` selecting every column.
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            select: None,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    /// Restrict the selected columns (`PostgREST` `select=` syntax).
    #[must_use]
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.select = Some(columns.into());
        self
    }

    /// Add an equality filter.
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl fmt::Display) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            value: value.to_string(),
        });
        self
    }

    /// Order by a column.
    #[must_use]
    pub fn order(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order = Some((column.into(), order));
        self
    }

    /// Limit the number of rows returned.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The target table.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Equality filters, in insertion order.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Ordering column and direction, if set.
    #[must_use]
    pub fn ordering(&self) -> Option<(&str, Order)> {
        self.order.as_ref().map(|(column, order)| (column.as_str(), *order))
    }

    /// Row limit, if set.
    #[must_use]
    pub const fn row_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Render as URL query pairs.
    ///
    /// `include_select` is false for mutations, where `select` would change the
    /// meaning of the request.
    #[must_use]
    pub fn to_pairs(&self, include_select: bool) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if include_select {
            pairs.push((
                "select".to_owned(),
                self.select.clone().unwrap_or_else(|| "*".to_owned()),
            ));
        }
        for filter in &self.filters {
            pairs.push((filter.column.clone(), format!("eq.{}", filter.value)));
        }
        if let Some((column, order)) = &self.order {
            pairs.push(("order".to_owned(), format!("{column}.{}", order.as_str())));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_owned(), limit.to_string()));
        }
        pairs
    }
}
