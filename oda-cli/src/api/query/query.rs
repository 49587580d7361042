//! Immutable query descriptor and its canonical wire rendering

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::api::constants::{ENCODED_PREFIX, MAX_PAGE_SIZE, params};
use crate::api::error::{OdaError, Result};

use super::builder::QueryBuilder;

/// Response payload format requested with `$format`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Json,
    /// Atom/XML feed, the OData v3 alternate representation
    Atom,
}

impl ResponseFormat {
    pub fn as_param(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Atom => "atom",
        }
    }

    /// Value for the HTTP `Accept` header
    pub fn accept_header(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Atom => "application/atom+xml",
        }
    }
}

/// One logical OData query against an entity set
///
/// Built through [`QueryBuilder`]. Select and expand are kept as sorted sets so
/// that two queries asking for the same thing render identically, which makes
/// the rendered form usable as a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    pub(super) entity: String,
    pub(super) filter: Option<String>,
    pub(super) select: BTreeSet<String>,
    pub(super) expand: BTreeSet<String>,
    pub(super) orderby: Option<String>,
    pub(super) page_size: u32,
    pub(super) skip: u64,
    pub(super) include_count: bool,
    pub(super) format: ResponseFormat,
}

impl Query {
    /// Start building a query for the given entity set
    pub fn builder(entity: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(entity)
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn select(&self) -> &BTreeSet<String> {
        &self.select
    }

    pub fn expand(&self) -> &BTreeSet<String> {
        &self.expand
    }

    pub fn orderby(&self) -> Option<&str> {
        self.orderby.as_deref()
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn skip(&self) -> u64 {
        self.skip
    }

    pub fn include_count(&self) -> bool {
        self.include_count
    }

    pub fn format(&self) -> ResponseFormat {
        self.format
    }

    /// Derive the descriptor for one page of this query
    pub fn page(&self, top: u32, skip: u64) -> Result<Query> {
        validate_page_size(top)?;
        Ok(Query {
            page_size: top,
            skip,
            ..self.clone()
        })
    }

    /// Render to the relative request form, e.g. `Sag?%24filter=...&%24top=100`
    pub fn render(&self) -> Result<String> {
        let rendered = self.render_parts(true);
        ensure_encoded(&rendered)?;
        Ok(rendered)
    }

    /// Rendered form without `$top`, identifying the logical result set
    ///
    /// A non-zero starting `$skip` changes which records come back, so it is
    /// appended as `#skip=N`.
    pub fn cache_key(&self) -> Result<String> {
        let rendered = self.render_parts(false);
        ensure_encoded(&rendered)?;
        if self.skip > 0 {
            Ok(format!("{}#skip={}", rendered, self.skip))
        } else {
            Ok(rendered)
        }
    }

    fn render_parts(&self, paging: bool) -> String {
        let mut parts: Vec<(&str, String)> = Vec::new();

        if let Some(filter) = &self.filter {
            parts.push((params::FILTER, filter.clone()));
        }
        if !self.expand.is_empty() {
            parts.push((params::EXPAND, join(&self.expand)));
        }
        if !self.select.is_empty() {
            parts.push((params::SELECT, join(&self.select)));
        }
        if let Some(orderby) = &self.orderby {
            parts.push((params::ORDERBY, orderby.clone()));
        }
        if paging {
            parts.push((params::TOP, self.page_size.to_string()));
            if self.skip > 0 {
                parts.push((params::SKIP, self.skip.to_string()));
            }
        }
        if self.include_count {
            parts.push((params::INLINECOUNT, "allpages".to_string()));
        }
        parts.push((params::FORMAT, self.format.as_param().to_string()));

        let query_string = parts
            .iter()
            .map(|(name, value)| {
                format!("{}{}={}", ENCODED_PREFIX, name, urlencoding::encode(value))
            })
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", urlencoding::encode(&self.entity), query_string)
    }
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

pub(crate) fn validate_page_size(size: u32) -> Result<()> {
    if size == 0 || size > MAX_PAGE_SIZE {
        return Err(OdaError::InvalidPageSize {
            requested: size,
            max: MAX_PAGE_SIZE,
        });
    }
    Ok(())
}

/// Fail if a rendered request still contains a literal `$`
///
/// Servers behind some proxies and shells silently drop `$filter` and friends
/// when the prefix is not encoded, returning unfiltered data.
pub fn ensure_encoded(rendered: &str) -> Result<()> {
    match rendered.find('$') {
        Some(position) => Err(OdaError::EncodingInvariantViolation {
            rendered: rendered.to_string(),
            position,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::query::{Filter, OrderBy};
    use proptest::prelude::*;

    fn cases_query() -> Query {
        Query::builder("Sag")
            .filter(Filter::eq("periodeid", 160))
            .select(["titel", "id", "opdateringsdato"])
            .expand(["Sagstrin"])
            .orderby(OrderBy::desc("opdateringsdato"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_render_encodes_reserved_prefix() {
        let rendered = cases_query().render().unwrap();
        assert_eq!(
            rendered,
            "Sag?%24filter=periodeid%20eq%20160\
             &%24expand=Sagstrin\
             &%24select=id%2Copdateringsdato%2Ctitel\
             &%24orderby=opdateringsdato%20desc\
             &%24top=100\
             &%24inlinecount=allpages\
             &%24format=json"
        );
        assert!(!rendered.contains('$'));
    }

    #[test]
    fn test_render_encodes_non_ascii_entity() {
        let query = Query::builder("Aktør").build().unwrap();
        let rendered = query.render().unwrap();
        assert!(rendered.starts_with("Akt%C3%B8r?"));
    }

    #[test]
    fn test_select_order_does_not_change_rendering() {
        let a = Query::builder("Sag").select(["titel", "id"]).build().unwrap();
        let b = Query::builder("Sag").select(["id", "titel", "id"]).build().unwrap();
        assert_eq!(a.render().unwrap(), b.render().unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn test_page_renders_skip_and_top() {
        let page = cases_query().page(50, 200).unwrap();
        let rendered = page.render().unwrap();
        assert!(rendered.contains("%24top=50&%24skip=200"));
    }

    #[test]
    fn test_page_rejects_oversized_top() {
        let err = cases_query().page(101, 0).unwrap_err();
        assert!(matches!(
            err,
            OdaError::InvalidPageSize {
                requested: 101,
                max: 100
            }
        ));
    }

    #[test]
    fn test_cache_key_ignores_page_size() {
        let query = cases_query();
        let key = query.cache_key().unwrap();
        assert_eq!(key, query.page(20, 0).unwrap().cache_key().unwrap());
        assert!(!key.contains("top"));
        assert!(!key.contains("skip"));
    }

    #[test]
    fn test_cache_key_includes_starting_skip() {
        let query = cases_query();
        let skipped = query.page(100, 200).unwrap().cache_key().unwrap();
        assert_ne!(query.cache_key().unwrap(), skipped);
        assert!(skipped.ends_with("#skip=200"));
    }

    #[test]
    fn test_atom_format_and_no_count() {
        let query = Query::builder("Møde")
            .format(ResponseFormat::Atom)
            .include_count(false)
            .build()
            .unwrap();
        let rendered = query.render().unwrap();
        assert!(rendered.ends_with("%24top=100&%24format=atom"));
        assert!(!rendered.contains("inlinecount"));
    }

    #[test]
    fn test_ensure_encoded_rejects_literal_prefix() {
        let err = ensure_encoded("Sag?$filter=id%20eq%201").unwrap_err();
        match err {
            OdaError::EncodingInvariantViolation { position, .. } => assert_eq!(position, 4),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(ensure_encoded("Sag?%24filter=id%20eq%201").is_ok());
    }

    #[test]
    fn test_dollar_inside_values_is_encoded() {
        let query = Query::builder("Sag$")
            .filter_raw("titel eq '$100'")
            .build()
            .unwrap();
        let rendered = query.render().unwrap();
        assert!(rendered.starts_with("Sag%24?"));
        assert!(rendered.contains("%27%24100%27"));
    }

    fn arb_query() -> impl Strategy<Value = Query> {
        (
            "[A-Za-zæøåÆØÅ$]{1,12}",
            proptest::option::of("[ -~æø]{0,40}"),
            proptest::collection::vec("[a-z$/]{1,10}", 0..5),
            proptest::collection::vec("[A-Za-z/]{1,10}", 0..4),
            proptest::option::of("[a-z$ ]{1,20}"),
            1u32..=100,
            0u64..10_000,
        )
            .prop_map(|(entity, filter, select, expand, orderby, top, skip)| {
                let mut builder = Query::builder(entity)
                    .select(select)
                    .expand(expand)
                    .page_size(top)
                    .skip(skip);
                if let Some(filter) = filter {
                    builder = builder.filter_raw(filter);
                }
                if let Some(orderby) = orderby {
                    builder = builder.orderby_raw(orderby);
                }
                builder.build().unwrap()
            })
    }

    proptest! {
        #[test]
        fn prop_render_is_deterministic(query in arb_query()) {
            let first = query.render().unwrap();
            let second = query.clone().render().unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_render_never_contains_literal_prefix(query in arb_query()) {
            let rendered = query.render().unwrap();
            prop_assert!(!rendered.contains('$'));
            prop_assert!(rendered.contains("%24top="));
        }
    }
}
