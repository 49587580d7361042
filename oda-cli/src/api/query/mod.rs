//! OData Query Builder Module
//!
//! Builds immutable query descriptors against the ODA entity sets and renders
//! them to a canonical, percent-encoded request string. Follows the usual
//! split between `Query` (reusable value) and `QueryBuilder` (fluent).

pub mod builder;
pub mod filters;
pub mod orderby;
pub mod query;
pub mod result;

pub use builder::QueryBuilder;
pub use filters::{Filter, FilterValue};
pub use orderby::{Direction, OrderBy};
pub use query::{Query, ResponseFormat, ensure_encoded};
pub use result::{DecodeError, Page, decode_page};
