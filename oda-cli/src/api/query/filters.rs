//! Typed OData v3 `$filter` expressions

use chrono::{NaiveDate, NaiveDateTime};

/// A literal value on the right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    Null,
}

impl FilterValue {
    /// Render as an OData v3 literal
    pub fn to_odata(&self) -> String {
        match self {
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::DateTime(dt) => format!("datetime'{}'", dt.format("%Y-%m-%dT%H:%M:%S")),
            Self::Null => "null".to_string(),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<NaiveDateTime> for FilterValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<NaiveDate> for FilterValue {
    fn from(value: NaiveDate) -> Self {
        Self::DateTime(value.and_time(chrono::NaiveTime::MIN))
    }
}

/// A `$filter` expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, FilterValue),
    Ne(String, FilterValue),
    Gt(String, FilterValue),
    Ge(String, FilterValue),
    Lt(String, FilterValue),
    Le(String, FilterValue),
    /// `substringof('value', field)`
    Contains(String, String),
    StartsWith(String, String),
    EndsWith(String, String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// Passed through untouched
    Raw(String),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Ne(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Gt(field.into(), value.into())
    }

    pub fn ge(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Ge(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Lt(field.into(), value.into())
    }

    pub fn le(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Le(field.into(), value.into())
    }

    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::Contains(field.into(), needle.into())
    }

    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::StartsWith(field.into(), prefix.into())
    }

    pub fn ends_with(field: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self::EndsWith(field.into(), suffix.into())
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Self::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Self::Or(filters)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        Self::Not(Box::new(filter))
    }

    pub fn raw(expression: impl Into<String>) -> Self {
        Self::Raw(expression.into())
    }

    /// Render the expression in OData v3 syntax (not yet URL-encoded)
    pub fn to_odata(&self) -> String {
        match self {
            Self::Eq(f, v) => format!("{} eq {}", f, v.to_odata()),
            Self::Ne(f, v) => format!("{} ne {}", f, v.to_odata()),
            Self::Gt(f, v) => format!("{} gt {}", f, v.to_odata()),
            Self::Ge(f, v) => format!("{} ge {}", f, v.to_odata()),
            Self::Lt(f, v) => format!("{} lt {}", f, v.to_odata()),
            Self::Le(f, v) => format!("{} le {}", f, v.to_odata()),
            Self::Contains(f, s) => {
                format!("substringof({}, {})", FilterValue::from(s.as_str()).to_odata(), f)
            }
            Self::StartsWith(f, s) => {
                format!("startswith({}, {})", f, FilterValue::from(s.as_str()).to_odata())
            }
            Self::EndsWith(f, s) => {
                format!("endswith({}, {})", f, FilterValue::from(s.as_str()).to_odata())
            }
            Self::And(filters) => join_group(filters, "and"),
            Self::Or(filters) => join_group(filters, "or"),
            Self::Not(inner) => format!("not ({})", inner.to_odata()),
            Self::Raw(expr) => expr.clone(),
        }
    }

    fn is_group(&self) -> bool {
        matches!(self, Self::And(f) | Self::Or(f) if f.len() > 1)
    }
}

fn join_group(filters: &[Filter], op: &str) -> String {
    filters
        .iter()
        .map(|f| {
            if f.is_group() {
                format!("({})", f.to_odata())
            } else {
                f.to_odata()
            }
        })
        .collect::<Vec<_>>()
        .join(&format!(" {} ", op))
}
