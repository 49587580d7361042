//! Fluent builder for [`Query`]

use std::collections::BTreeSet;

use crate::api::constants::MAX_PAGE_SIZE;
use crate::api::error::{OdaError, Result};

use super::filters::Filter;
use super::orderby::OrderBy;
use super::query::{Query, ResponseFormat, validate_page_size};

/// Fluent builder producing an immutable [`Query`]
///
/// Validation happens in [`QueryBuilder::build`]: the page size must be within
/// `1..=MAX_PAGE_SIZE` (oversized requests are rejected, never clamped) and the
/// entity name must not be blank.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    entity: String,
    filter: Option<String>,
    select: BTreeSet<String>,
    expand: BTreeSet<String>,
    orderby: Option<String>,
    page_size: u32,
    skip: u64,
    include_count: bool,
    format: ResponseFormat,
}

impl QueryBuilder {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            filter: None,
            select: BTreeSet::new(),
            expand: BTreeSet::new(),
            orderby: None,
            page_size: MAX_PAGE_SIZE,
            skip: 0,
            include_count: true,
            format: ResponseFormat::Json,
        }
    }

    /// Set a typed filter, replacing any previous one
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter.to_odata());
        self
    }

    /// Set a filter expression verbatim (e.g. `"year(dato) eq 2025"`)
    pub fn filter_raw(mut self, expression: impl Into<String>) -> Self {
        self.filter = Some(expression.into());
        self
    }

    /// Add fields to `$select`
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(non_blank(fields));
        self
    }

    /// Add navigation paths to `$expand`; nested levels use `/` (`Sagstrin/Aktør`)
    pub fn expand<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expand.extend(non_blank(paths));
        self
    }

    pub fn orderby(mut self, orderby: OrderBy) -> Self {
        self.orderby = Some(orderby.to_odata());
        self
    }

    pub fn orderby_raw(mut self, clause: impl Into<String>) -> Self {
        self.orderby = Some(clause.into());
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Ask the server for a total count hint (`$inlinecount=allpages`)
    pub fn include_count(mut self, include: bool) -> Self {
        self.include_count = include;
        self
    }

    pub fn format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    pub fn build(self) -> Result<Query> {
        let entity = self.entity.trim();
        if entity.is_empty() {
            return Err(OdaError::InvalidQuery("entity name is empty".to_string()));
        }
        validate_page_size(self.page_size)?;

        Ok(Query {
            entity: entity.to_string(),
            filter: self.filter.filter(|f| !f.trim().is_empty()),
            select: self.select,
            expand: self.expand,
            orderby: self.orderby.filter(|o| !o.trim().is_empty()),
            page_size: self.page_size,
            skip: self.skip,
            include_count: self.include_count,
            format: self.format,
        })
    }
}

fn non_blank<I, S>(items: I) -> impl Iterator<Item = String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items
        .into_iter()
        .map(|s| s.into().trim().to_string())
        .filter(|s| !s.is_empty())
}
