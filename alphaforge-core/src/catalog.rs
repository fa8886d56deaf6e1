//! Field catalog client — paginated retrieval of data-field metadata.
//!
//! The platform's `/data-fields` endpoint is paged by offset/limit. The first
//! page reports the total row count, which fixes the remaining offsets; in
//! free-text search mode the count is unreliable, so pages are fetched until
//! one comes back empty (bounded by a page cap). Rows are accumulated in page
//! order, so repeated fetches with identical filters return a stable
//! sequence for a fixed upstream catalog.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{ApiError, SessionManager};
use crate::transport::ApiRequest;

/// Rows per page.
pub const PAGE_LIMIT: usize = 50;

/// Page cap when the server does not report a count (search mode).
const MAX_SEARCH_PAGES: usize = 20;

/// Data-field shape as the platform classifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    Matrix,
    Vector,
    Group,
    Universe,
    #[serde(other)]
    Other,
}

/// One catalogued data field, immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub id: String,
    pub field_type: FieldType,
    pub region: String,
    pub delay: u32,
    pub universe: String,
    pub dataset_id: Option<String>,
}

/// Client-side scope filters for the catalog query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldFilters {
    pub instrument_type: String,
    pub region: String,
    pub delay: u32,
    pub universe: String,
    pub dataset_id: Option<String>,
    pub search: Option<String>,
}

impl Default for FieldFilters {
    fn default() -> Self {
        Self {
            instrument_type: "EQUITY".to_string(),
            region: "USA".to_string(),
            delay: 1,
            universe: "TOP3000".to_string(),
            dataset_id: None,
            search: None,
        }
    }
}

/// Catalog retrieval failures — fatal to the fetch.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("catalog request failed (HTTP {status}): {body}")]
    Http { status: u16, body: String },

    #[error("unexpected catalog response shape: {0}")]
    Shape(String),
}

/// Wire shape of one catalog row.
#[derive(Debug, Deserialize)]
struct FieldRow {
    id: String,
    #[serde(rename = "type")]
    field_type: FieldType,
    dataset: Option<DatasetRef>,
}

#[derive(Debug, Deserialize)]
struct DatasetRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FieldPage {
    count: Option<u64>,
    #[serde(default)]
    results: Vec<FieldRow>,
}

/// Fetch all catalog pages matching `filters` into one ordered sequence.
pub fn fetch_fields(
    session: &SessionManager,
    filters: &FieldFilters,
) -> Result<Vec<FieldDescriptor>, CatalogError> {
    let first = fetch_page(session, filters, 0)?;
    let mut fields: Vec<FieldDescriptor> = Vec::new();
    append_rows(&mut fields, first.results, filters);

    if filters.search.is_some() {
        // Search mode: no trustworthy count, walk pages until one is empty.
        for page_index in 1..MAX_SEARCH_PAGES {
            let page = fetch_page(session, filters, page_index * PAGE_LIMIT)?;
            if page.results.is_empty() {
                break;
            }
            append_rows(&mut fields, page.results, filters);
        }
    } else {
        let count = first.count.unwrap_or(0) as usize;
        let mut offset = PAGE_LIMIT;
        while offset < count {
            let page = fetch_page(session, filters, offset)?;
            if page.results.is_empty() {
                break;
            }
            append_rows(&mut fields, page.results, filters);
            offset += PAGE_LIMIT;
        }
    }

    Ok(fields)
}

fn fetch_page(
    session: &SessionManager,
    filters: &FieldFilters,
    offset: usize,
) -> Result<FieldPage, CatalogError> {
    let mut request = ApiRequest::get("/data-fields")
        .with_query("instrumentType", &filters.instrument_type)
        .with_query("region", &filters.region)
        .with_query("delay", filters.delay)
        .with_query("universe", &filters.universe)
        .with_query("limit", PAGE_LIMIT)
        .with_query("offset", offset);
    if let Some(dataset_id) = &filters.dataset_id {
        request = request.with_query("dataset.id", dataset_id);
    }
    if let Some(search) = &filters.search {
        request = request.with_query("search", search);
    }

    let resp = session.call(&request)?;
    if !resp.is_success() {
        return Err(CatalogError::Http {
            status: resp.status,
            body: resp.body_excerpt(),
        });
    }

    serde_json::from_value(resp.body).map_err(|e| CatalogError::Shape(e.to_string()))
}

fn append_rows(fields: &mut Vec<FieldDescriptor>, rows: Vec<FieldRow>, filters: &FieldFilters) {
    for row in rows {
        fields.push(FieldDescriptor {
            id: row.id,
            field_type: row.field_type,
            region: filters.region.clone(),
            delay: filters.delay,
            universe: filters.universe.clone(),
            dataset_id: row.dataset.map(|d| d.id),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::session::{Credentials, SessionConfig};
    use crate::testing::StubTransport;
    use crate::transport::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn session_with(transport: Arc<StubTransport>) -> SessionManager {
        SessionManager::login(
            transport,
            Credentials::new("u", "p"),
            SessionConfig {
                retry: RetryPolicy::immediate(2),
                ..SessionConfig::default()
            },
        )
        .unwrap()
    }

    fn row(id: &str, ty: &str) -> serde_json::Value {
        json!({"id": id, "type": ty, "dataset": {"id": "fundamental6"}})
    }

    #[test]
    fn single_page_fetch() {
        let transport = Arc::new(StubTransport::new());
        transport.push(
            Method::Get,
            "/data-fields",
            StubTransport::ok(json!({"count": 2, "results": [row("assets", "MATRIX"), row("news_vec", "VECTOR")]})),
        );
        let session = session_with(transport);

        let fields = fetch_fields(&session, &FieldFilters::default()).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].id, "assets");
        assert_eq!(fields[0].field_type, FieldType::Matrix);
        assert_eq!(fields[0].region, "USA");
        assert_eq!(fields[0].dataset_id.as_deref(), Some("fundamental6"));
        assert_eq!(fields[1].field_type, FieldType::Vector);
    }

    #[test]
    fn paginates_by_reported_count() {
        let transport = Arc::new(StubTransport::new());
        let page1: Vec<_> = (0..50).map(|i| row(&format!("f{i}"), "MATRIX")).collect();
        let page2: Vec<_> = (50..70).map(|i| row(&format!("f{i}"), "MATRIX")).collect();
        transport.push(
            Method::Get,
            "/data-fields",
            StubTransport::ok(json!({"count": 70, "results": page1})),
        );
        transport.push(
            Method::Get,
            "/data-fields",
            StubTransport::ok(json!({"count": 70, "results": page2})),
        );
        let session = session_with(transport.clone());

        let fields = fetch_fields(&session, &FieldFilters::default()).unwrap();
        assert_eq!(fields.len(), 70);
        assert_eq!(fields[0].id, "f0");
        assert_eq!(fields[69].id, "f69");

        // Second request carried offset=50.
        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1]
            .query
            .iter()
            .any(|(k, v)| k == "offset" && v == "50"));
    }

    #[test]
    fn search_mode_stops_at_empty_page() {
        let transport = Arc::new(StubTransport::new());
        transport.push(
            Method::Get,
            "/data-fields",
            StubTransport::ok(json!({"results": [row("close", "MATRIX")]})),
        );
        transport.push(
            Method::Get,
            "/data-fields",
            StubTransport::ok(json!({"results": []})),
        );
        let session = session_with(transport.clone());

        let filters = FieldFilters {
            search: Some("close".to_string()),
            ..FieldFilters::default()
        };
        let fields = fetch_fields(&session, &filters).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn dataset_filter_is_sent() {
        let transport = Arc::new(StubTransport::new());
        transport.push(
            Method::Get,
            "/data-fields",
            StubTransport::ok(json!({"count": 0, "results": []})),
        );
        let session = session_with(transport.clone());

        let filters = FieldFilters {
            dataset_id: Some("fundamental6".to_string()),
            ..FieldFilters::default()
        };
        fetch_fields(&session, &filters).unwrap();

        let requests = transport.requests();
        assert!(requests[0]
            .query
            .iter()
            .any(|(k, v)| k == "dataset.id" && v == "fundamental6"));
    }

    #[test]
    fn http_error_is_catalog_error() {
        let transport = Arc::new(StubTransport::new());
        transport.push(
            Method::Get,
            "/data-fields",
            StubTransport::status(403, json!({"detail": "forbidden"})),
        );
        let session = session_with(transport);

        let err = fetch_fields(&session, &FieldFilters::default()).unwrap_err();
        assert!(matches!(err, CatalogError::Http { status: 403, .. }));
    }

    #[test]
    fn malformed_body_is_shape_error() {
        let transport = Arc::new(StubTransport::new());
        transport.push(
            Method::Get,
            "/data-fields",
            StubTransport::ok(json!({"count": "not-a-number", "results": []})),
        );
        let session = session_with(transport);

        let err = fetch_fields(&session, &FieldFilters::default()).unwrap_err();
        assert!(matches!(err, CatalogError::Shape(_)));
    }

    #[test]
    fn unknown_field_type_maps_to_other() {
        let transport = Arc::new(StubTransport::new());
        transport.push(
            Method::Get,
            "/data-fields",
            StubTransport::ok(json!({"count": 1, "results": [row("weird", "TENSOR")]})),
        );
        let session = session_with(transport);

        let fields = fetch_fields(&session, &FieldFilters::default()).unwrap();
        assert_eq!(fields[0].field_type, FieldType::Other);
    }
}
