// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use erpgrid_app::{
    FieldValue, OutcomePayload, Page, Rejection, ResourceSchema, RowId, RowPatch,
    UpdateDispatcher, patch_from_json, rows_from_json,
};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const CSRF_HEADER: &str = "X-CSRF-TOKEN";

const LOGGED_BODY_LIMIT: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub per_page: u32,
    pub search: Option<String>,
    pub filters: Vec<(String, String)>,
}

impl ListQuery {
    pub fn page(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
            search: None,
            filters: Vec::new(),
        }
    }

    pub fn with_search(mut self, search: &str) -> Self {
        let trimmed = search.trim();
        self.search = (!trimmed.is_empty()).then(|| trimmed.to_owned());
        self
    }

    pub fn with_filter(mut self, key: &str, value: &str) -> Self {
        self.filters.push((key.to_owned(), value.to_owned()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    timeout: Duration,
    http: HttpClient,
    csrf_token: Option<String>,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            bail!("server.base_url must not be empty");
        }
        let base_url = Url::parse(trimmed).with_context(|| {
            format!("parse server.base_url {trimmed:?} -- use a full http(s) URL")
        })?;
        if base_url.cannot_be_a_base() {
            bail!("server.base_url {trimmed:?} cannot hold resource paths");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            http,
            csrf_token: None,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    pub fn set_csrf_token(&mut self, token: &str) {
        let trimmed = token.trim();
        self.csrf_token = (!trimmed.is_empty()).then(|| trimmed.to_owned());
    }

    pub fn with_csrf_token(mut self, token: &str) -> Self {
        self.set_csrf_token(token);
        self
    }

    /// Loads an HTML page and keeps the token from its `csrf-token` meta tag
    /// for every later mutating request.
    pub fn fetch_csrf_token(&mut self, path: &str) -> Result<String> {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .get(url.clone())
            .send()
            .map_err(|error| connection_error(url.as_str(), error))?;

        let status = response.status();
        let body = response.text().unwrap_or_default();
        if !status.is_success() {
            return Err(clean_error_response(status, &body));
        }

        let token = extract_csrf_token(&body).ok_or_else(|| {
            anyhow!("no csrf-token meta tag at {url} -- set server.csrf_page to a page with one")
        })?;
        self.csrf_token = Some(token.clone());
        tracing::debug!(%url, "loaded csrf token");
        Ok(token)
    }

    pub fn list(&self, schema: &ResourceSchema, query: &ListQuery) -> Result<Page> {
        let mut url = self.endpoint(&schema.path)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("page", &query.page.to_string());
            pairs.append_pair("per_page", &query.per_page.to_string());
            if let Some(search) = &query.search {
                pairs.append_pair("search", search);
            }
            for (key, value) in &query.filters {
                pairs.append_pair(key, value);
            }
        }

        let response = self
            .http
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|error| connection_error(url.as_str(), error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }

        let body: Value = response
            .json()
            .with_context(|| format!("decode {} list", schema.name))?;
        let records = match body.get("data").unwrap_or(&body) {
            Value::Array(records) => records.as_slice(),
            _ => bail!("{} list response has no `data` array", schema.name),
        };
        let total = body
            .get("total")
            .or_else(|| body.get("meta").and_then(|meta| meta.get("total")))
            .and_then(Value::as_u64)
            .unwrap_or(records.len() as u64);
        let rows = rows_from_json(schema, records)
            .with_context(|| format!("adapt {} rows", schema.name))?;

        Ok(Page {
            rows,
            total,
            page: query.page,
            per_page: query.per_page,
        })
    }

    /// Creates a record from the full field set. A commit carries the
    /// created row, including its new id.
    pub fn create(&self, schema: &ResourceSchema, body: &Value) -> OutcomePayload {
        self.mutate(schema, Method::POST, None, Some(body))
    }

    pub fn update_field(
        &self,
        schema: &ResourceSchema,
        row_id: RowId,
        field: &str,
        value: &FieldValue,
    ) -> OutcomePayload {
        let mut body = serde_json::Map::new();
        body.insert("id".to_owned(), Value::from(row_id.get()));
        body.insert(field.to_owned(), value.to_json());
        self.mutate(schema, Method::PUT, Some(row_id), Some(&Value::Object(body)))
    }

    pub fn delete(&self, schema: &ResourceSchema, row_id: RowId) -> OutcomePayload {
        self.mutate(schema, Method::DELETE, Some(row_id), None)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| anyhow!("{} cannot hold resource paths", self.base_url))?;
            segments.pop_if_empty();
            for segment in path.split('/').filter(|segment| !segment.is_empty()) {
                segments.push(segment);
            }
        }
        Ok(url)
    }

    fn mutate(
        &self,
        schema: &ResourceSchema,
        method: Method,
        row_id: Option<RowId>,
        body: Option<&Value>,
    ) -> OutcomePayload {
        let path = match row_id {
            Some(id) => format!("{}/{id}", schema.path),
            None => schema.path.clone(),
        };
        let url = match self.endpoint(&path) {
            Ok(url) => url,
            Err(error) => {
                tracing::error!(resource = %schema.name, error = %error, "build request URL");
                return OutcomePayload::Rejected(Rejection::network(
                    "cannot build the request URL -- check server.base_url",
                ));
            }
        };

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(ACCEPT, "application/json");
        if let Some(token) = &self.csrf_token {
            request = request.header(CSRF_HEADER, token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!(%method, %url, "sending request");
        match request.send() {
            Ok(response) => outcome_from_response(schema, response),
            Err(error) => {
                tracing::warn!(%method, %url, error = %error, "request failed");
                OutcomePayload::Rejected(Rejection::network(network_message(&error)))
            }
        }
    }
}

/// Sends inline edits for one resource through a shared [`Client`].
#[derive(Debug, Clone)]
pub struct ResourceDispatcher {
    client: Arc<Client>,
    schema: ResourceSchema,
}

impl ResourceDispatcher {
    pub fn new(client: Arc<Client>, schema: ResourceSchema) -> Self {
        Self { client, schema }
    }
}

impl UpdateDispatcher for ResourceDispatcher {
    fn dispatch(&self, row_id: RowId, field: &str, value: &FieldValue) -> OutcomePayload {
        self.client.update_field(&self.schema, row_id, field, value)
    }
}

/// Reads `<meta name="csrf-token" content="...">` from an HTML page.
pub fn extract_csrf_token(html: &str) -> Option<String> {
    html.match_indices("<meta").find_map(|(start, _)| {
        let rest = &html[start..];
        let tag = &rest[..rest.find('>').unwrap_or(rest.len())];
        if attribute(tag, "name")? != "csrf-token" {
            return None;
        }
        let token = attribute(tag, "content")?.trim();
        (!token.is_empty()).then(|| token.to_owned())
    })
}

fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{name}=");
    tag.match_indices(&needle).find_map(|(index, _)| {
        let preceded_by_space = tag[..index]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        if !preceded_by_space {
            return None;
        }
        let rest = &tag[index + needle.len()..];
        let quote = rest.chars().next().filter(|ch| *ch == '"' || *ch == '\'')?;
        let value = &rest[1..];
        value.find(quote).map(|end| &value[..end])
    })
}

fn outcome_from_response(schema: &ResourceSchema, response: Response) -> OutcomePayload {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    outcome_from_parts(schema, status, &body)
}

/// Maps a backend response onto an outcome. 2xx commits; 422, or any 4xx
/// carrying an `errors` object, is a validation rejection; anything else is
/// a server rejection.
pub fn outcome_from_parts(
    schema: &ResourceSchema,
    status: StatusCode,
    body: &str,
) -> OutcomePayload {
    if status.is_success() {
        if body.trim().is_empty() {
            return OutcomePayload::Committed(RowPatch::default());
        }
        return match serde_json::from_str::<Value>(body) {
            Ok(value) => {
                let record = value
                    .get("data")
                    .filter(|data| data.is_object())
                    .unwrap_or(&value);
                OutcomePayload::Committed(patch_from_json(schema, record))
            }
            Err(error) => {
                tracing::debug!(resource = %schema.name, error = %error, "non-JSON success body");
                OutcomePayload::Committed(RowPatch::default())
            }
        };
    }

    if status.is_client_error() {
        let rejection = client_rejection(status, body);
        tracing::debug!(
            resource = %schema.name,
            status = status.as_u16(),
            message = %rejection.message,
            "request rejected"
        );
        return OutcomePayload::Rejected(rejection);
    }

    tracing::warn!(
        resource = %schema.name,
        status = status.as_u16(),
        body = %truncate(body, LOGGED_BODY_LIMIT),
        "server error"
    );
    OutcomePayload::Rejected(Rejection::server(format!(
        "server error ({}) -- try again later",
        status.as_u16()
    )))
}

fn client_rejection(status: StatusCode, body: &str) -> Rejection {
    let envelope = serde_json::from_str::<ValidationEnvelope>(body).unwrap_or_default();
    let field_errors = envelope
        .errors
        .into_iter()
        .map(|(field, messages)| (field, messages.into_vec()))
        .filter(|(_, messages)| !messages.is_empty())
        .collect::<BTreeMap<_, _>>();

    let message = envelope
        .message
        .filter(|message| !message.trim().is_empty())
        .or_else(|| {
            field_errors
                .values()
                .next()
                .and_then(|messages| messages.first().cloned())
        })
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty() && trimmed.len() < 100 && !trimmed.contains('{'))
                .then(|| trimmed.to_owned())
        })
        .unwrap_or_else(|| format!("request rejected ({})", status.as_u16()));

    if status != StatusCode::UNPROCESSABLE_ENTITY && field_errors.is_empty() {
        return Rejection::server(message);
    }
    let mut rejection = Rejection::validation(message);
    rejection.field_errors = field_errors;
    rejection
}

fn network_message(error: &reqwest::Error) -> &'static str {
    if error.is_timeout() {
        "request timed out -- check the connection and retry"
    } else {
        "cannot reach the server -- check the connection and retry"
    }
}

fn connection_error(url: &str, error: reqwest::Error) -> anyhow::Error {
    anyhow!(
        "cannot reach {} -- check server.base_url and that the backend is running ({})",
        url,
        error
    )
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<ValidationEnvelope>(body)
        && let Some(message) = parsed.message
        && !message.is_empty()
    {
        return anyhow!("server error ({}): {}", status.as_u16(), message);
    }

    if body.len() < 100 && !body.contains('{') && !body.trim().is_empty() {
        return anyhow!("server error ({}): {}", status.as_u16(), body.trim());
    }

    anyhow!("server returned {}", status.as_u16())
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[derive(Debug, Default, Deserialize)]
struct ValidationEnvelope {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: BTreeMap<String, FieldMessages>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FieldMessages {
    One(String),
    Many(Vec<String>),
}

impl FieldMessages {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(message) => vec![message],
            Self::Many(messages) => messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Client, ListQuery, extract_csrf_token, outcome_from_parts, truncate};
    use erpgrid_app::{
        EnumOption, FieldKind, FieldSpec, FieldValue, OutcomePayload, RejectionKind,
        ResourceSchema, RowId,
    };
    use reqwest::StatusCode;
    use std::time::Duration;

    fn schema() -> ResourceSchema {
        ResourceSchema::new("letters", "Letters", "/letters")
            .field(FieldSpec::new("subject", "Subject", FieldKind::Text))
            .field(
                FieldSpec::new("status", "Status", FieldKind::Status).with_options(vec![
                    EnumOption::status("received", "Received"),
                    EnumOption::status("closed", "Closed"),
                ]),
            )
    }

    #[test]
    fn csrf_token_is_read_from_meta_tag() {
        let html = r#"<html><head>
            <meta charset="utf-8">
            <meta name="viewport" content="width=device-width">
            <meta name="csrf-token" content="abc123">
        </head></html>"#;
        assert_eq!(extract_csrf_token(html), Some("abc123".to_owned()));
        assert_eq!(
            extract_csrf_token("<meta content='xyz' name='csrf-token'/>"),
            Some("xyz".to_owned())
        );
        assert_eq!(
            extract_csrf_token(r#"<meta data-name="csrf-token" content="no">"#),
            None
        );
        assert_eq!(extract_csrf_token("<p>no tags</p>"), None);
    }

    #[test]
    fn success_bodies_become_patches() {
        let wrapped = outcome_from_parts(
            &schema(),
            StatusCode::OK,
            r#"{"data":{"id":4,"status":"closed"}}"#,
        );
        let OutcomePayload::Committed(patch) = wrapped else {
            panic!("expected commit");
        };
        assert_eq!(patch.id, Some(RowId::new(4)));
        assert_eq!(
            patch.fields.get("status"),
            Some(&FieldValue::Status("closed".to_owned()))
        );

        let bare = outcome_from_parts(&schema(), StatusCode::OK, r#"{"subject":"Tender"}"#);
        assert!(matches!(bare, OutcomePayload::Committed(patch) if patch.fields.len() == 1));

        let empty = outcome_from_parts(&schema(), StatusCode::NO_CONTENT, "");
        assert!(matches!(empty, OutcomePayload::Committed(patch) if patch.is_empty()));
    }

    #[test]
    fn validation_body_carries_field_errors() {
        let outcome = outcome_from_parts(
            &schema(),
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"The subject field is required.","errors":{"subject":["The subject field is required."],"status":"Invalid status."}}"#,
        );
        let OutcomePayload::Rejected(rejection) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.kind, RejectionKind::Validation);
        assert_eq!(rejection.message, "The subject field is required.");
        assert_eq!(rejection.field_errors.len(), 2);
        assert_eq!(
            rejection.field_errors.get("status"),
            Some(&vec!["Invalid status.".to_owned()])
        );
    }

    #[test]
    fn only_unprocessable_or_field_errors_validate() {
        let expired = StatusCode::from_u16(419).expect("valid status");
        let OutcomePayload::Rejected(plain) =
            outcome_from_parts(&schema(), expired, "CSRF token mismatch")
        else {
            panic!("expected rejection");
        };
        assert_eq!(plain.kind, RejectionKind::Server);
        assert_eq!(plain.message, "CSRF token mismatch");

        let OutcomePayload::Rejected(forbidden) = outcome_from_parts(
            &schema(),
            StatusCode::FORBIDDEN,
            r#"{"errors":{"status":["Only managers may close works."]}}"#,
        ) else {
            panic!("expected rejection");
        };
        assert_eq!(forbidden.kind, RejectionKind::Validation);
        assert_eq!(forbidden.field_errors.len(), 1);

        let OutcomePayload::Rejected(errors_only) = outcome_from_parts(
            &schema(),
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"errors":{"status":["Pick a status."]}}"#,
        ) else {
            panic!("expected rejection");
        };
        assert_eq!(errors_only.kind, RejectionKind::Validation);
        assert_eq!(errors_only.message, "Pick a status.");

        let OutcomePayload::Rejected(opaque) =
            outcome_from_parts(&schema(), StatusCode::NOT_FOUND, "<html>{}</html>")
        else {
            panic!("expected rejection");
        };
        assert_eq!(opaque.kind, RejectionKind::Server);
        assert_eq!(opaque.message, "request rejected (404)");
    }

    #[test]
    fn server_errors_hide_detail() {
        let OutcomePayload::Rejected(rejection) = outcome_from_parts(
            &schema(),
            StatusCode::INTERNAL_SERVER_ERROR,
            "SQLSTATE[23000]: Integrity constraint violation",
        ) else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.kind, RejectionKind::Server);
        assert!(!rejection.message.contains("SQLSTATE"));
    }

    #[test]
    fn endpoints_join_under_base_path() {
        let client = Client::new("http://localhost:8000/api/", Duration::from_secs(1))
            .expect("client should initialize");
        let url = client.endpoint("/daily-works/7").expect("endpoint");
        assert_eq!(url.as_str(), "http://localhost:8000/api/daily-works/7");
    }

    #[test]
    fn invalid_base_urls_are_refused() {
        assert!(Client::new("", Duration::from_secs(1)).is_err());
        assert!(Client::new("localhost:8000", Duration::from_secs(1)).is_err());
        assert!(Client::new("mailto:ops@example.com", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn csrf_token_setter_ignores_blank_tokens() {
        let client = Client::new("http://localhost", Duration::from_secs(1))
            .expect("client should initialize")
            .with_csrf_token("  ");
        assert!(client.csrf_token().is_none());
        let client = client.with_csrf_token(" t0k ");
        assert_eq!(client.csrf_token(), Some("t0k"));
    }

    #[test]
    fn list_query_normalizes_input() {
        let query = ListQuery::page(0, 0).with_search("   ");
        assert_eq!(query.page, 1);
        assert_eq!(query.per_page, 1);
        assert!(query.search.is_none());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
