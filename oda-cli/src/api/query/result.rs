//! Decoding of OData v3 collection payloads (JSON and Atom)

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::api::models::Record;

use super::query::ResponseFormat;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const METADATA_NS: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices/metadata";
const RELATED_REL: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices/related/";

/// One decoded page of an entity set response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Record>,
    /// `odata.count` when `$inlinecount=allpages` was requested
    pub total_count: Option<u64>,
    /// Server-driven continuation link, if any
    pub next_link: Option<String>,
}

impl Page {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            total_count: None,
            next_link: None,
        }
    }

    pub fn with_total_count(mut self, count: u64) -> Self {
        self.total_count = Some(count);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid Atom payload: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("unexpected payload shape: {0}")]
    Shape(String),
}

/// Decode a response body in the given format
pub fn decode_page(body: &str, format: ResponseFormat) -> Result<Page, DecodeError> {
    match format {
        ResponseFormat::Json => decode_json(body),
        ResponseFormat::Atom => decode_atom(body),
    }
}

fn decode_json(body: &str) -> Result<Page, DecodeError> {
    let payload: Value = serde_json::from_str(body)?;
    let object = payload
        .as_object()
        .ok_or_else(|| DecodeError::Shape("top-level value is not an object".to_string()))?;

    let records = match object.get("value") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map.clone()),
                other => Err(DecodeError::Shape(format!(
                    "record is not an object: {}",
                    other
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(DecodeError::Shape("'value' is not an array".to_string())),
        None => return Err(DecodeError::Shape("missing 'value' array".to_string())),
    };

    // v3 verbose JSON sends the count as a string, v4 as a number
    let total_count = ["odata.count", "@odata.count"]
        .iter()
        .find_map(|key| object.get(*key))
        .and_then(|count| match count {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });

    let next_link = ["odata.nextLink", "@odata.nextLink"]
        .iter()
        .find_map(|key| object.get(*key))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Page {
        records,
        total_count,
        next_link,
    })
}

/// Decode an Atom feed, including `$expand`ed navigation properties
fn decode_atom(body: &str) -> Result<Page, DecodeError> {
    let doc = roxmltree::Document::parse(body)?;
    let feed = doc.root_element();
    if feed.tag_name().name() != "feed" {
        return Err(DecodeError::Shape(format!(
            "expected <feed>, found <{}>",
            feed.tag_name().name()
        )));
    }

    let mut page = Page::default();

    for child in feed.children().filter(|n| n.is_element()) {
        let name = child.tag_name();
        match (name.namespace(), name.name()) {
            (Some(METADATA_NS), "count") => {
                page.total_count = child.text().and_then(|t| t.trim().parse().ok());
            }
            (Some(ATOM_NS), "link") if child.attribute("rel") == Some("next") => {
                page.next_link = child.attribute("href").map(str::to_string);
            }
            (Some(ATOM_NS), "entry") => {
                page.records.push(decode_atom_entry(child));
            }
            _ => {}
        }
    }

    Ok(page)
}

fn decode_atom_entry(entry: roxmltree::Node) -> Record {
    let mut record = Map::new();

    // Properties sit under <content> (or directly under <entry> for media entries);
    // only the entry's own <m:properties>, not those of inline expanded entries
    let properties = entry
        .children()
        .filter(|n| n.is_element())
        .flat_map(|n| {
            if n.tag_name().name() == "content" {
                n.children().filter(|c| c.is_element()).collect::<Vec<_>>()
            } else {
                vec![n]
            }
        })
        .find(|n| n.tag_name().namespace() == Some(METADATA_NS) && n.tag_name().name() == "properties");

    if let Some(properties) = properties {
        for prop in properties.children().filter(|n| n.is_element()) {
            let value = atom_value(prop);
            record.insert(prop.tag_name().name().to_string(), value);
        }
    }

    for link in entry
        .children()
        .filter(|n| n.tag_name().namespace() == Some(ATOM_NS) && n.tag_name().name() == "link")
    {
        if let Some((name, value)) = inline_navigation(link) {
            record.insert(name, value);
        }
    }

    record
}

/// An expanded navigation link: `<link rel=".../related/X"><m:inline>...</m:inline></link>`
///
/// A feed becomes an array of records, an entry a nested record, and an empty
/// `m:inline` (no related entity) null, matching the JSON representation.
fn inline_navigation(link: roxmltree::Node) -> Option<(String, Value)> {
    let inline = link.children().find(|n| {
        n.tag_name().namespace() == Some(METADATA_NS) && n.tag_name().name() == "inline"
    })?;
    let name = link
        .attribute("rel")
        .and_then(|rel| rel.strip_prefix(RELATED_REL))
        .or_else(|| link.attribute("title"))?
        .to_string();

    let value = match inline.children().find(|n| n.is_element()) {
        Some(feed) if feed.tag_name().name() == "feed" => Value::Array(
            feed.children()
                .filter(|n| n.tag_name().namespace() == Some(ATOM_NS) && n.tag_name().name() == "entry")
                .map(|e| Value::Object(decode_atom_entry(e)))
                .collect(),
        ),
        Some(entry) if entry.tag_name().name() == "entry" => Value::Object(decode_atom_entry(entry)),
        _ => Value::Null,
    };
    Some((name, value))
}

fn atom_value(prop: roxmltree::Node) -> Value {
    if prop.attribute((METADATA_NS, "null")) == Some("true") {
        return Value::Null;
    }

    let text = prop.text().unwrap_or("");
    match prop.attribute((METADATA_NS, "type")) {
        Some("Edm.Int16" | "Edm.Int32" | "Edm.Int64" | "Edm.Byte" | "Edm.SByte") => text
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        Some("Edm.Double" | "Edm.Single" | "Edm.Decimal") => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(text.to_string())),
        Some("Edm.Boolean") => match text {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(text.to_string()),
        },
        _ => Value::String(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_json_v3() {
        let body = r#"{
            "odata.metadata": "https://oda.ft.dk/api/$metadata#Sag",
            "odata.count": "250",
            "value": [
                {"id": 1, "titel": "Forslag til lov", "opdateringsdato": "2025-01-02T10:00:00.123"},
                {"id": 2, "titel": "Beslutningsforslag", "opdateringsdato": "2025-01-03T11:00:00"}
            ],
            "odata.nextLink": "https://oda.ft.dk/api/Sag?$skip=100"
        }"#;

        let page = decode_page(body, ResponseFormat::Json).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page.total_count, Some(250));
        assert_eq!(page.records[0]["titel"], "Forslag til lov");
        assert_eq!(
            page.next_link.as_deref(),
            Some("https://oda.ft.dk/api/Sag?$skip=100")
        );
    }

    #[test]
    fn test_decode_json_numeric_count() {
        let body = r#"{"@odata.count": 3, "value": []}"#;
        let page = decode_page(body, ResponseFormat::Json).unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total_count, Some(3));
    }

    #[test]
    fn test_decode_json_rejects_bad_shapes() {
        assert!(matches!(
            decode_page("not json", ResponseFormat::Json),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            decode_page(r#"{"id": 1}"#, ResponseFormat::Json),
            Err(DecodeError::Shape(_))
        ));
        assert!(matches!(
            decode_page(r#"{"value": [1, 2]}"#, ResponseFormat::Json),
            Err(DecodeError::Shape(_))
        ));
    }

    #[test]
    fn test_decode_atom_feed() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xml:base="https://oda.ft.dk/api/" xmlns="http://www.w3.org/2005/Atom"
      xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices"
      xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata">
  <title type="text">Aktør</title>
  <m:count>2</m:count>
  <entry>
    <id>https://oda.ft.dk/api/Akt%C3%B8r(1)</id>
    <content type="application/xml">
      <m:properties>
        <d:id m:type="Edm.Int32">1</d:id>
        <d:navn>Lars Løkke Rasmussen</d:navn>
        <d:aktiv m:type="Edm.Boolean">true</d:aktiv>
        <d:biografi m:null="true" />
      </m:properties>
    </content>
  </entry>
  <entry>
    <content type="application/xml">
      <m:properties>
        <d:id m:type="Edm.Int32">2</d:id>
        <d:navn>Mette Frederiksen</d:navn>
      </m:properties>
    </content>
  </entry>
  <link rel="next" href="https://oda.ft.dk/api/Akt%C3%B8r?$skip=2" />
</feed>"#;

        let page = decode_page(body, ResponseFormat::Atom).unwrap();
        assert_eq!(page.total_count, Some(2));
        assert_eq!(page.len(), 2);
        assert_eq!(page.records[0]["id"], 1);
        assert_eq!(page.records[0]["navn"], "Lars Løkke Rasmussen");
        assert_eq!(page.records[0]["aktiv"], true);
        assert!(page.records[0]["biografi"].is_null());
        assert_eq!(page.records[1]["navn"], "Mette Frederiksen");
        assert!(page.next_link.is_some());
    }

    #[test]
    fn test_decode_atom_inline_expansions() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"
      xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices"
      xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata">
  <entry>
    <link rel="http://schemas.microsoft.com/ado/2007/08/dataservices/related/Sagstrin"
          type="application/atom+xml;type=feed" title="Sagstrin" href="Sag(7)/Sagstrin">
      <m:inline>
        <feed>
          <entry>
            <content type="application/xml">
              <m:properties><d:id m:type="Edm.Int32">70</d:id></m:properties>
            </content>
          </entry>
          <entry>
            <content type="application/xml">
              <m:properties><d:id m:type="Edm.Int32">71</d:id></m:properties>
            </content>
          </entry>
        </feed>
      </m:inline>
    </link>
    <link rel="http://schemas.microsoft.com/ado/2007/08/dataservices/related/Periode"
          type="application/atom+xml;type=entry" title="Periode" href="Sag(7)/Periode">
      <m:inline>
        <entry>
          <content type="application/xml">
            <m:properties><d:kode>20241</d:kode></m:properties>
          </content>
        </entry>
      </m:inline>
    </link>
    <link rel="http://schemas.microsoft.com/ado/2007/08/dataservices/related/Fase"
          type="application/atom+xml;type=entry" title="Fase" href="Sag(7)/Fase">
      <m:inline />
    </link>
    <link rel="http://schemas.microsoft.com/ado/2007/08/dataservices/related/Dokument"
          type="application/atom+xml;type=feed" title="Dokument" href="Sag(7)/Dokument" />
    <content type="application/xml">
      <m:properties><d:id m:type="Edm.Int32">7</d:id></m:properties>
    </content>
  </entry>
</feed>"#;

        let page = decode_page(body, ResponseFormat::Atom).unwrap();
        let record = &page.records[0];
        assert_eq!(record["id"], 7);
        assert_eq!(record["Sagstrin"][0]["id"], 70);
        assert_eq!(record["Sagstrin"][1]["id"], 71);
        assert_eq!(record["Periode"]["kode"], "20241");
        assert!(record["Fase"].is_null());
        assert!(!record.contains_key("Dokument"));
    }

    #[test]
    fn test_decode_atom_rejects_non_feed() {
        let body = r#"<entry xmlns="http://www.w3.org/2005/Atom"/>"#;
        assert!(matches!(
            decode_page(body, ResponseFormat::Atom),
            Err(DecodeError::Shape(_))
        ));
    }
}
