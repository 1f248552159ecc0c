//! Stateless request builder and response parser for one remote collection.
//!
//! # Design
//! `CollectionEndpoint` holds only its `CollectionConfig`. Each operation is
//! split into a `build_*` method that produces an `HttpRequest` and a
//! `parse_*` method that consumes an `HttpResponse`; the caller executes the
//! round-trip in between. Nothing is cached here and nothing is retried.
//!
//! Responses are decoded against a typed envelope. A missing `items` or
//! `hasMore`, a record without the configured key field, or two records with
//! the same key in one page all fail as `ApiError::Deserialization`. Record
//! identity is always the value of the configured key field.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::CollectionConfig;
use crate::error::{ApiError, WriteOperation};
use crate::http::{json_headers, status_text, HttpMethod, HttpRequest, HttpResponse};
use crate::types::{FetchRequest, Page, Record};

/// Wire shape of a page: `{ items, totalSize, hasMore }`.
#[derive(Debug, Deserialize)]
struct PageEnvelope {
    items: Vec<Value>,
    #[serde(rename = "totalSize", default = "unknown_total")]
    total_size: i64,
    #[serde(rename = "hasMore")]
    has_more: bool,
}

fn unknown_total() -> i64 {
    -1
}

/// Endpoint adapter for a collection of `R` records.
#[derive(Debug)]
pub struct CollectionEndpoint<R> {
    config: Arc<CollectionConfig>,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for CollectionEndpoint<R> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            _record: PhantomData,
        }
    }
}

impl<R: Record> CollectionEndpoint<R> {
    pub fn new(config: Arc<CollectionConfig>) -> Self {
        Self {
            config,
            _record: PhantomData,
        }
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Key of `record` under the configured key field.
    pub fn key_of(&self, record: &R) -> Option<R::Key> {
        record.key(self.config.key_field())
    }

    /// `GET {base}?limit={size}&offset={offset}[&{field}={filter}]*`
    ///
    /// Every filterable field receives the same filter text; an empty or
    /// absent filter adds no field parameters at all.
    pub fn build_fetch(&self, request: &FetchRequest) -> Result<HttpRequest, ApiError> {
        if request.size == 0 {
            return Err(ApiError::InvalidRequest("page size must be positive".to_string()));
        }

        let mut url = self.config.base_url().clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("limit", &request.size.to_string())
                .append_pair("offset", &request.offset.to_string());
            if let Some(text) = request.filter() {
                for field in self.config.filterable_fields() {
                    query.append_pair(field, text);
                }
            }
        }

        debug!(url = %url, "built fetch request");
        Ok(HttpRequest {
            method: HttpMethod::Get,
            path: url.into(),
            headers: Vec::new(),
            body: None,
        })
    }

    pub fn parse_fetch(&self, response: HttpResponse) -> Result<Page<R>, ApiError> {
        check_fetch_status(&response)?;
        let envelope: PageEnvelope = serde_json::from_str(&response.body)
            .map_err(|e| ApiError::deserialization(e, &response.body))?;

        let mut seen = HashSet::with_capacity(envelope.items.len());
        let mut data = Vec::with_capacity(envelope.items.len());
        for (index, value) in envelope.items.into_iter().enumerate() {
            let (key, record) = self
                .decode_record(value)
                .map_err(|e| ApiError::deserialization(format!("items[{index}]: {e}"), &response.body))?;
            if !seen.insert(key.clone()) {
                return Err(ApiError::deserialization(
                    format!("items[{index}]: duplicate key {key}"),
                    &response.body,
                ));
            }
            data.push(record);
        }

        debug!(
            rows = data.len(),
            total_size = envelope.total_size,
            has_more = envelope.has_more,
            "parsed page"
        );
        Ok(Page {
            data,
            total_size: envelope.total_size,
            has_more: envelope.has_more,
        })
    }

    /// `POST {base}` with the new record's fields.
    pub fn build_create<B: Serialize>(&self, body: &B) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, self.config.base_url().clone(), body)
    }

    /// Accepts 200 or 201 and returns the record with its server-assigned key.
    pub fn parse_create(&self, response: HttpResponse) -> Result<R, ApiError> {
        check_write_status(&response, WriteOperation::Create, &[200, 201])?;
        self.decode_body(&response)
    }

    /// `PUT {base}{key}` with the updated fields.
    pub fn build_update<B: Serialize>(&self, key: &R::Key, body: &B) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Put, self.record_url(key)?, body)
    }

    pub fn parse_update(&self, response: HttpResponse) -> Result<R, ApiError> {
        check_write_status(&response, WriteOperation::Update, &[200])?;
        self.decode_body(&response)
    }

    /// `DELETE {base}{key}`
    pub fn build_delete(&self, key: &R::Key) -> Result<HttpRequest, ApiError> {
        let url = self.record_url(key)?;
        debug!(url = %url, "built delete request");
        Ok(HttpRequest {
            method: HttpMethod::Delete,
            path: url.into(),
            headers: Vec::new(),
            body: None,
        })
    }

    /// Only 200 counts as a successful delete.
    pub fn parse_delete(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_write_status(&response, WriteOperation::Delete, &[200])
    }

    fn json_request<B: Serialize>(&self, method: HttpMethod, url: Url, body: &B) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(body).map_err(|e| ApiError::Serialization(e.to_string()))?;
        debug!(method = method.as_str(), url = %url, "built write request");
        Ok(HttpRequest {
            method,
            path: url.into(),
            headers: json_headers(),
            body: Some(body),
        })
    }

    fn record_url(&self, key: &R::Key) -> Result<Url, ApiError> {
        let segment = key.to_string();
        if segment.is_empty() || segment.contains(['/', '?', '#']) || segment == "." || segment == ".." {
            return Err(ApiError::InvalidRequest(format!("key {segment:?} is not a path segment")));
        }
        self.config
            .base_url()
            .join(&segment)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))
    }

    fn decode_body(&self, response: &HttpResponse) -> Result<R, ApiError> {
        let value: Value =
            serde_json::from_str(&response.body).map_err(|e| ApiError::deserialization(e, &response.body))?;
        self.decode_record(value)
            .map(|(_, record)| record)
            .map_err(|e| ApiError::deserialization(e, &response.body))
    }

    fn decode_record(&self, value: Value) -> Result<(R::Key, R), String> {
        let key_field = self.config.key_field();
        if matches!(value.get(key_field), None | Some(Value::Null)) {
            return Err(format!("missing key field `{key_field}`"));
        }
        let record: R = serde_json::from_value(value).map_err(|e| e.to_string())?;
        match self.key_of(&record) {
            Some(key) => Ok((key, record)),
            None => Err(format!("record type has no key field `{key_field}`")),
        }
    }
}

fn check_fetch_status(response: &HttpResponse) -> Result<(), ApiError> {
    match response.status {
        200 => Ok(()),
        404 => Err(ApiError::NotFound),
        status => Err(ApiError::HttpError {
            status,
            status_text: status_text(status).to_string(),
            body: response.body.clone(),
        }),
    }
}

fn check_write_status(response: &HttpResponse, operation: WriteOperation, accepted: &[u16]) -> Result<(), ApiError> {
    if accepted.contains(&response.status) {
        return Ok(());
    }
    Err(ApiError::WriteRejected {
        operation,
        status: response.status,
        status_text: status_text(response.status).to_string(),
        body: response.body.clone(),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::testing::Product;
    use crate::types::{Item, ItemDraft, NewItem};

    fn endpoint() -> CollectionEndpoint<Item> {
        let config = CollectionConfig::new("http://localhost:3000/activities/3/items/")
            .unwrap()
            .with_filterable_fields(["name"]);
        CollectionEndpoint::new(Arc::new(config))
    }

    #[test]
    fn build_fetch_sets_limit_and_offset() {
        let req = endpoint().build_fetch(&FetchRequest::new(20, 10)).unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "http://localhost:3000/activities/3/items/?limit=10&offset=20");
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn build_fetch_passes_filter_to_every_field() {
        let config = CollectionConfig::new("http://localhost:3000/items/")
            .unwrap()
            .with_filterable_fields(["name", "short_desc"]);
        let endpoint: CollectionEndpoint<Item> = CollectionEndpoint::new(Arc::new(config));
        let req = endpoint
            .build_fetch(&FetchRequest::new(0, 5).with_filter("X"))
            .unwrap();
        assert_eq!(
            req.path,
            "http://localhost:3000/items/?limit=5&offset=0&name=X&short_desc=X"
        );
    }

    #[test]
    fn build_fetch_omits_empty_filter() {
        let req = endpoint()
            .build_fetch(&FetchRequest::new(0, 5).with_filter(""))
            .unwrap();
        assert!(!req.path.contains("name="));
    }

    #[test]
    fn build_fetch_rejects_zero_size() {
        let err = endpoint().build_fetch(&FetchRequest::new(0, 0)).unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }

    #[test]
    fn parse_fetch_empty_collection() {
        let response = HttpResponse::new(200, r#"{"items":[],"totalSize":0,"hasMore":false}"#);
        let page = endpoint().parse_fetch(response).unwrap();
        assert_eq!(page, Page::empty());
    }

    #[test]
    fn parse_fetch_reads_envelope() {
        let response = HttpResponse::new(
            200,
            r#"{"items":[{"id":1,"name":"Skis"},{"id":2,"name":"Boots"}],"totalSize":7,"hasMore":true}"#,
        );
        let page = endpoint().parse_fetch(response).unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[1].name, "Boots");
        assert_eq!(page.total_size, 7);
        assert!(page.has_more);
    }

    #[test]
    fn parse_fetch_defaults_unknown_total() {
        let response = HttpResponse::new(200, r#"{"items":[],"hasMore":false}"#);
        assert_eq!(endpoint().parse_fetch(response).unwrap().total_size, -1);
    }

    #[test]
    fn parse_fetch_rejects_shape_mismatch() {
        let response = HttpResponse::new(200, r#"{"rows":[],"totalSize":0}"#);
        let err = endpoint().parse_fetch(response).unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn parse_fetch_rejects_missing_key() {
        let response = HttpResponse::new(200, r#"{"items":[{"name":"Keyless"}],"totalSize":1,"hasMore":false}"#);
        let err = endpoint().parse_fetch(response).unwrap_err();
        assert!(err.to_string().contains("missing key field `id`"), "{err}");
    }

    #[test]
    fn parse_fetch_rejects_duplicate_keys() {
        let response = HttpResponse::new(
            200,
            r#"{"items":[{"id":1,"name":"a"},{"id":1,"name":"b"}],"totalSize":2,"hasMore":false}"#,
        );
        assert!(matches!(
            endpoint().parse_fetch(response),
            Err(ApiError::Deserialization { .. })
        ));
    }

    #[test]
    fn parse_fetch_keys_by_configured_field() {
        let config = CollectionConfig::new("http://localhost:3000/products/")
            .unwrap()
            .with_key_field("code");
        let endpoint: CollectionEndpoint<Product> = CollectionEndpoint::new(Arc::new(config));

        let shared_id = HttpResponse::new(
            200,
            r#"{"items":[{"code":"a","id":1},{"code":"b","id":1}],"totalSize":2,"hasMore":false}"#,
        );
        let page = endpoint.parse_fetch(shared_id).unwrap();
        let keys: Vec<String> = page.data.iter().filter_map(|p| endpoint.key_of(p)).collect();
        assert_eq!(keys, vec!["a", "b"]);

        let shared_code = HttpResponse::new(
            200,
            r#"{"items":[{"code":"a","id":1},{"code":"a","id":2}],"totalSize":2,"hasMore":false}"#,
        );
        let err = endpoint.parse_fetch(shared_code).unwrap_err();
        assert!(err.to_string().contains("duplicate key a"), "{err}");
    }

    #[test]
    fn parse_fetch_rejects_key_field_the_record_lacks() {
        let config = CollectionConfig::new("http://localhost:3000/items/")
            .unwrap()
            .with_key_field("itemId");
        let endpoint: CollectionEndpoint<Item> = CollectionEndpoint::new(Arc::new(config));
        let response = HttpResponse::new(
            200,
            r#"{"items":[{"id":1,"itemId":7,"name":"a"}],"totalSize":1,"hasMore":false}"#,
        );
        let err = endpoint.parse_fetch(response).unwrap_err();
        assert!(err.to_string().contains("no key field `itemId`"), "{err}");
    }

    #[test]
    fn parse_fetch_bad_json() {
        let err = endpoint().parse_fetch(HttpResponse::new(200, "not json")).unwrap_err();
        assert!(matches!(err, ApiError::Deserialization { .. }));
    }

    #[test]
    fn parse_fetch_status_errors() {
        assert!(matches!(
            endpoint().parse_fetch(HttpResponse::new(404, "")),
            Err(ApiError::NotFound)
        ));
        assert!(matches!(
            endpoint().parse_fetch(HttpResponse::new(500, "boom")),
            Err(ApiError::HttpError { status: 500, .. })
        ));
    }

    #[test]
    fn build_create_posts_json_to_base() {
        let body = NewItem::from_draft(
            ItemDraft {
                name: "Widget".to_string(),
                price: 9.99,
                quantity_instock: 5,
                ..ItemDraft::default()
            },
            3,
        );
        let req = endpoint().build_create(&body).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:3000/activities/3/items/");
        assert_eq!(req.headers, json_headers());
        let sent: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent["name"], "Widget");
        assert_eq!(sent["quantity"], 5);
    }

    #[test]
    fn parse_create_accepts_200_and_201() {
        let body = r#"{"id":42,"name":"Widget","price":9.99}"#;
        assert_eq!(endpoint().parse_create(HttpResponse::new(201, body)).unwrap().id, 42);
        assert_eq!(endpoint().parse_create(HttpResponse::new(200, body)).unwrap().id, 42);
    }

    #[test]
    fn parse_create_rejects_other_status() {
        let err = endpoint()
            .parse_create(HttpResponse::new(500, "internal error"))
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::WriteRejected {
                operation: WriteOperation::Create,
                status: 500,
                ..
            }
        ));
    }

    #[test]
    fn build_update_and_delete_target_record_url() {
        let update = endpoint().build_update(&42, &serde_json::json!({"name": "x"})).unwrap();
        assert_eq!(update.method, HttpMethod::Put);
        assert_eq!(update.path, "http://localhost:3000/activities/3/items/42");

        let delete = endpoint().build_delete(&42).unwrap();
        assert_eq!(delete.method, HttpMethod::Delete);
        assert_eq!(delete.path, "http://localhost:3000/activities/3/items/42");
        assert!(delete.body.is_none());
    }

    #[test]
    fn parse_delete_only_accepts_200() {
        assert!(endpoint().parse_delete(HttpResponse::new(200, "")).is_ok());
        let err = endpoint().parse_delete(HttpResponse::new(204, "")).unwrap_err();
        assert_eq!(err.status(), Some(204));
        let err = endpoint().parse_delete(HttpResponse::new(404, "")).unwrap_err();
        assert_eq!(err.to_string(), "Delete failed with status 404 : Not Found");
    }
}
