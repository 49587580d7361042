//! Constants for the Folketing OData API

/// Public endpoint of the Danish Parliament's OData service
pub const DEFAULT_BASE_URL: &str = "https://oda.ft.dk/api";

/// Server-enforced maximum number of records per request
pub const MAX_PAGE_SIZE: u32 = 100;

/// Field carrying the last modification time on every ODA entity
pub const MODIFIED_FIELD: &str = "opdateringsdato";

/// Percent-encoded form of the reserved `$` parameter prefix
pub const ENCODED_PREFIX: &str = "%24";

/// Reserved OData query options, without their `$` prefix
pub mod params {
    pub const FILTER: &str = "filter";
    pub const EXPAND: &str = "expand";
    pub const SELECT: &str = "select";
    pub const ORDERBY: &str = "orderby";
    pub const TOP: &str = "top";
    pub const SKIP: &str = "skip";
    pub const INLINECOUNT: &str = "inlinecount";
    pub const FORMAT: &str = "format";
}

/// Commonly queried entity sets
pub mod entities {
    pub const CASE: &str = "Sag";
    pub const CASE_STEP: &str = "Sagstrin";
    pub const ACTOR: &str = "Aktør";
    pub const VOTING: &str = "Afstemning";
    pub const VOTE: &str = "Stemme";
    pub const MEETING: &str = "Møde";
    pub const DOCUMENT: &str = "Dokument";
    pub const FILE: &str = "Fil";
    pub const PERIOD: &str = "Periode";
}
