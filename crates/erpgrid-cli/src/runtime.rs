// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use erpgrid_app::{OutcomePayload, Page, ResourceSchema, RowId};
use erpgrid_http::{Client, ListQuery, ResourceDispatcher};
use serde_json::Value;
use std::sync::Arc;

use crate::config::Config;

pub struct HttpRuntime {
    client: Arc<Client>,
    resources: Vec<ResourceSchema>,
}

impl HttpRuntime {
    pub fn new(client: Client, resources: Vec<ResourceSchema>) -> Self {
        Self {
            client: Arc::new(client),
            resources,
        }
    }

    /// Builds the client from `[server]` and, when `csrf_page` is set, reads
    /// the session token before any edit is sent.
    pub fn connect(config: &Config, resources: Vec<ResourceSchema>) -> Result<Self> {
        let mut client = Client::new(config.base_url(), config.timeout()?)
            .context("invalid [server] config; fix base_url/timeout values")?;
        if let Some(page) = config.csrf_page() {
            client.fetch_csrf_token(page).with_context(|| {
                format!("read CSRF token from {page} -- check server.csrf_page or remove it")
            })?;
        }
        Ok(Self::new(client, resources))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl erpgrid_tui::AppRuntime for HttpRuntime {
    type Dispatcher = ResourceDispatcher;

    fn resources(&self) -> &[ResourceSchema] {
        &self.resources
    }

    fn load_page(&mut self, schema: &ResourceSchema, page: u32, per_page: u32) -> Result<Page> {
        let loaded = self.client.list(schema, &ListQuery::page(page, per_page))?;
        tracing::debug!(
            resource = %schema.name,
            page,
            per_page,
            rows = loaded.rows.len(),
            total = loaded.total,
            "page loaded"
        );
        Ok(loaded)
    }

    fn dispatcher(&mut self, schema: &ResourceSchema) -> Result<Arc<ResourceDispatcher>> {
        Ok(Arc::new(ResourceDispatcher::new(
            Arc::clone(&self.client),
            schema.clone(),
        )))
    }

    fn create(&mut self, schema: &ResourceSchema, body: &Value) -> OutcomePayload {
        self.client.create(schema, body)
    }

    fn delete(&mut self, schema: &ResourceSchema, row_id: RowId) -> OutcomePayload {
        self.client.delete(schema, row_id)
    }
}

#[cfg(test)]
mod tests {
    use super::HttpRuntime;
    use crate::config::Config;
    use anyhow::{Result, anyhow};
    use erpgrid_app::{
        FieldValue, OutcomePayload, RowId, TableController, UpdateDispatcher, builtin_resources,
        daily_works,
    };
    use erpgrid_testkit::{ErpFaker, RecordingSink, page_body};
    use erpgrid_tui::AppRuntime;
    use serde_json::json;
    use std::thread;
    use std::time::Duration;
    use tiny_http::{Header, Response, Server};

    fn json_response(body: &serde_json::Value) -> Response<std::io::Cursor<Vec<u8>>> {
        Response::from_string(body.to_string()).with_header(
            Header::from_bytes("Content-Type", "application/json")
                .expect("valid content type header"),
        )
    }

    fn config_for(addr: &str, extra: &str) -> Result<(tempfile::TempDir, Config)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            format!("version = 1\n[server]\nbase_url = \"{addr}\"\ntimeout = \"1s\"\n{extra}"),
        )?;
        let config = Config::load(&path)?;
        Ok((temp, config))
    }

    #[test]
    fn connect_reads_csrf_token_and_pages_load() -> Result<()> {
        let server =
            Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
        let addr = format!("http://{}", server.server_addr());
        let records = ErpFaker::new(12).daily_works(2);
        let body = page_body(&records, 1, 25, 2);

        let handle = thread::spawn(move || {
            let page = server.recv().expect("page request expected");
            assert_eq!(page.url(), "/dashboard");
            page.respond(Response::from_string(
                r#"<head><meta name="csrf-token" content="abc123"></head>"#,
            ))
            .expect("response should succeed");

            let list = server.recv().expect("list request expected");
            assert_eq!(list.url(), "/daily-works?page=1&per_page=25");
            list.respond(json_response(&body))
                .expect("response should succeed");
        });

        let (_temp, config) = config_for(&addr, "csrf_page = \"/dashboard\"\n")?;
        let mut runtime = HttpRuntime::connect(&config, config.resources()?)?;
        assert_eq!(runtime.client().csrf_token(), Some("abc123"));

        let schema = daily_works();
        let page = runtime.load_page(&schema, 1, 25)?;
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.page_count(), 1);

        handle.join().expect("server thread should join");
        Ok(())
    }

    #[test]
    fn missing_csrf_meta_fails_connect_with_hint() -> Result<()> {
        let server =
            Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
        let addr = format!("http://{}", server.server_addr());

        let handle = thread::spawn(move || {
            let page = server.recv().expect("page request expected");
            page.respond(Response::from_string("<html></html>"))
                .expect("response should succeed");
        });

        let (_temp, config) = config_for(&addr, "csrf_page = \"/login\"\n")?;
        let error = HttpRuntime::connect(&config, builtin_resources())
            .err()
            .expect("connect should fail without a token");
        assert!(format!("{error:#}").contains("server.csrf_page"));

        handle.join().expect("server thread should join");
        Ok(())
    }

    #[test]
    fn dispatcher_sends_edits_for_its_resource() -> Result<()> {
        let server =
            Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
        let addr = format!("http://{}", server.server_addr());

        let handle = thread::spawn(move || {
            let request = server.recv().expect("update request expected");
            assert_eq!(request.url(), "/daily-works/4");
            request
                .respond(json_response(&json!({ "data": { "id": 4, "status": "completed" } })))
                .expect("response should succeed");
        });

        let (_temp, config) = config_for(&addr, "")?;
        let mut runtime = HttpRuntime::connect(&config, builtin_resources())?;
        let schema = daily_works();
        let dispatcher = runtime.dispatcher(&schema)?;
        let outcome = dispatcher.dispatch(
            RowId::new(4),
            "status",
            &FieldValue::Status("completed".to_owned()),
        );
        assert!(matches!(outcome, OutcomePayload::Committed(_)));

        handle.join().expect("server thread should join");
        Ok(())
    }

    #[test]
    fn unreachable_server_rolls_edit_back() -> Result<()> {
        let (_temp, config) = config_for("http://127.0.0.1:1", "")?;
        let mut runtime = HttpRuntime::connect(&config, builtin_resources())?;
        let schema = daily_works();
        let rows = erpgrid_testkit::rows_for(&schema, &ErpFaker::new(3).daily_works(1))?;
        let before = rows[0].clone();

        let sink = RecordingSink::new();
        let dispatcher = runtime.dispatcher(&schema)?;
        let mut controller = TableController::new(schema, dispatcher, sink.clone());
        controller.replace_rows(rows)?;
        controller.submit(erpgrid_app::FieldEdit {
            row_id: before.id(),
            field: "location".to_owned(),
            value: FieldValue::Text("K30+000".to_owned()),
        })?;
        controller.wait_idle(Duration::from_secs(5));

        assert_eq!(controller.rows()[0], before);
        assert_eq!(sink.messages().len(), 1);
        Ok(())
    }
}
