// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use erpgrid_app::{
    DEFAULT_PAGE_SIZE, DEFAULT_RESOURCE, EnumOption, FieldDependency, FieldKind, FieldSpec,
    MAX_PAGE_SIZE, ResourceSchema, Theme, builtin_resources,
};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "erpgrid";

const CONFIG_VERSION: i64 = 1;
const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
const DEFAULT_TIMEOUT: &str = "10s";
const DEFAULT_LOG_LEVEL: &str = "info";
const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            server: Server::default(),
            ui: Ui::default(),
            log: Log::default(),
            resources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Server {
    pub base_url: Option<String>,
    pub timeout: Option<String>,
    pub csrf_page: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ui {
    pub theme: Option<String>,
    pub page_size: Option<u32>,
    pub resource: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Log {
    pub level: Option<String>,
}

/// Extra resource declared in the config file. A name matching a built-in
/// resource replaces it.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    pub label: Option<String>,
    pub path: Option<String>,
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub dependencies: Vec<DependencyConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    pub label: Option<String>,
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub options: Vec<OptionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptionConfig {
    pub value: OptionValue,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Id(i64),
    Text(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct DependencyConfig {
    pub parent: String,
    pub clears: Vec<String>,
}

impl ResourceConfig {
    fn to_schema(&self) -> Result<ResourceSchema> {
        let label = self.label.clone().unwrap_or_else(|| self.name.clone());
        let path = self
            .path
            .clone()
            .unwrap_or_else(|| format!("/{}", self.name));
        let mut schema = ResourceSchema::new(&self.name, &label, &path);

        for field in &self.fields {
            let kind = FieldKind::parse(&field.kind).ok_or_else(|| {
                anyhow!(
                    "resource `{}` field `{}` has unknown kind {:?}; use one of: text, long_text, integer, decimal, boolean, date, status, reference",
                    self.name,
                    field.name,
                    field.kind
                )
            })?;
            let label = field.label.clone().unwrap_or_else(|| field.name.clone());
            let mut spec = FieldSpec::new(&field.name, &label, kind);
            if field.required {
                spec = spec.required();
            }
            if field.read_only {
                spec = spec.read_only();
            }
            let selectable = matches!(kind, FieldKind::Status | FieldKind::Reference);
            if selectable && field.options.is_empty() && !field.read_only {
                bail!(
                    "resource `{}` field `{}` is a {} with no options; add `options = [{{ value = ..., label = \"...\" }}]` or mark it read_only",
                    self.name,
                    field.name,
                    field.kind
                );
            }
            if !field.options.is_empty() {
                let options = field
                    .options
                    .iter()
                    .map(|option| option_for(kind, option, &self.name, &field.name))
                    .collect::<Result<Vec<_>>>()?;
                spec = spec.with_options(options);
            }
            schema = schema.field(spec);
        }

        for dependency in &self.dependencies {
            let clears = dependency
                .clears
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>();
            schema = schema.dependency(FieldDependency::new(&dependency.parent, &clears));
        }

        schema
            .validate()
            .with_context(|| format!("invalid [[resources]] entry `{}`", self.name))?;
        Ok(schema)
    }
}

fn option_for(
    kind: FieldKind,
    option: &OptionConfig,
    resource: &str,
    field: &str,
) -> Result<EnumOption> {
    match (kind, &option.value) {
        (FieldKind::Status, OptionValue::Text(value)) => {
            Ok(EnumOption::status(value, &option.label))
        }
        (FieldKind::Reference, OptionValue::Id(id)) => {
            Ok(EnumOption::reference(*id, &option.label))
        }
        (FieldKind::Status, OptionValue::Id(_)) => bail!(
            "resource `{resource}` field `{field}` is a status; option values must be strings"
        ),
        (FieldKind::Reference, OptionValue::Text(_)) => bail!(
            "resource `{resource}` field `{field}` is a reference; option values must be integer ids"
        ),
        _ => bail!(
            "resource `{resource}` field `{field}` declares options but only status and reference fields take them"
        ),
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("ERPGRID_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set ERPGRID_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} has no `version`; add `version = 1` and keep values under [server], [ui], and [log]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.version != CONFIG_VERSION {
            bail!(
                "config {} has version {}; expected 1",
                path.display(),
                self.version
            );
        }

        if let Some(base_url) = &self.server.base_url
            && !(base_url.starts_with("http://") || base_url.starts_with("https://"))
        {
            bail!(
                "server.base_url in {} must start with http:// or https://, got {:?}",
                path.display(),
                base_url
            );
        }

        if let Some(timeout) = &self.server.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "server.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        if let Some(theme) = &self.ui.theme
            && Theme::parse(theme).is_none()
        {
            bail!(
                "ui.theme in {} must be \"light\" or \"dark\", got {:?}",
                path.display(),
                theme
            );
        }

        if let Some(page_size) = self.ui.page_size
            && !(1..=MAX_PAGE_SIZE).contains(&page_size)
        {
            bail!(
                "ui.page_size in {} must be between 1 and {MAX_PAGE_SIZE}, got {page_size}",
                path.display()
            );
        }

        if let Some(level) = &self.log.level
            && !LOG_LEVELS.contains(&level.as_str())
        {
            bail!(
                "log.level in {} must be one of {}, got {:?}",
                path.display(),
                LOG_LEVELS.join(", "),
                level
            );
        }

        let resources = self
            .resources()
            .with_context(|| format!("check [[resources]] in {}", path.display()))?;
        if let Some(resource) = &self.ui.resource
            && !resources.iter().any(|schema| schema.name == *resource)
        {
            bail!(
                "ui.resource in {} names unknown resource {:?}; run `erpgrid --list-resources`",
                path.display(),
                resource
            );
        }

        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.server
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn timeout(&self) -> Result<Duration> {
        parse_duration(self.server.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT))
    }

    pub fn csrf_page(&self) -> Option<&str> {
        self.server
            .csrf_page
            .as_deref()
            .filter(|page| !page.trim().is_empty())
    }

    pub fn theme(&self) -> Theme {
        self.ui
            .theme
            .as_deref()
            .and_then(Theme::parse)
            .unwrap_or(Theme::Dark)
    }

    pub fn page_size(&self) -> u32 {
        self.ui.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn resource(&self) -> &str {
        self.ui.resource.as_deref().unwrap_or(DEFAULT_RESOURCE)
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Built-in resources followed by the configured ones; a configured
    /// resource replaces a built-in of the same name in place.
    pub fn resources(&self) -> Result<Vec<ResourceSchema>> {
        let mut resources = builtin_resources();
        for declared in &self.resources {
            let schema = declared.to_schema()?;
            match resources.iter_mut().find(|known| known.name == schema.name) {
                Some(known) => *known = schema,
                None => resources.push(schema),
            }
        }
        Ok(resources)
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# erpgrid config\n# Place this file at: {}\n\nversion = 1\n\n[server]\nbase_url = \"{}\"\ntimeout = \"{}\"\n# Page whose <meta name=\"csrf-token\"> is read before editing.\n# csrf_page = \"/dashboard\"\n\n[ui]\ntheme = \"dark\"\npage_size = {}\nresource = \"{}\"\n\n[log]\n# Overridden by ERPGRID_LOG.\nlevel = \"{}\"\n\n# Extra resources. Reusing a built-in name replaces it.\n# [[resources]]\n# name = \"sites\"\n# label = \"Sites\"\n# path = \"/sites\"\n# fields = [\n#   {{ name = \"title\", kind = \"text\", required = true }},\n#   {{ name = \"state\", kind = \"status\", options = [{{ value = \"open\", label = \"Open\" }}] }},\n#   {{ name = \"manager\", kind = \"reference\", options = [{{ value = 21, label = \"Avery Rahman\" }}] }},\n# ]\n# dependencies = [{{ parent = \"state\", clears = [\"manager\"] }}]\n",
            path.display(),
            DEFAULT_BASE_URL,
            DEFAULT_TIMEOUT,
            DEFAULT_PAGE_SIZE,
            DEFAULT_RESOURCE,
            DEFAULT_LOG_LEVEL,
        )
    }
}

/// Directory for the log file and saved preferences.
pub fn data_dir() -> Result<PathBuf> {
    if let Some(override_dir) = env::var_os("ERPGRID_DATA_DIR") {
        let dir = PathBuf::from(override_dir);
        fs::create_dir_all(&dir)
            .with_context(|| format!("create data directory {}", dir.display()))?;
        return Ok(dir);
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set ERPGRID_DATA_DIR to a writable directory")
    })?;
    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir)
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 10s)")
}

#[cfg(test)]
mod tests {
    use super::{Config, data_dir, parse_duration};
    use anyhow::Result;
    use erpgrid_app::{FieldKind, FieldValue, Theme};
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content)?;
        Ok((temp, path))
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn missing_config_uses_defaults() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert_eq!(config.base_url(), "http://localhost:8000/api");
        assert_eq!(config.timeout()?, Duration::from_secs(10));
        assert_eq!(config.theme(), Theme::Dark);
        assert_eq!(config.page_size(), 25);
        assert_eq!(config.resource(), "daily-works");
        assert_eq!(config.log_level(), "info");
        assert!(config.csrf_page().is_none());
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[server]\nbase_url = \"http://erp.local/api\"\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[server], [ui], and [log]"));
        Ok(())
    }

    #[test]
    fn full_config_parses() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[server]\nbase_url = \"https://erp.example.com/api///\"\ntimeout = \"1500ms\"\ncsrf_page = \"/dashboard\"\n[ui]\ntheme = \"light\"\npage_size = 50\nresource = \"employees\"\n[log]\nlevel = \"debug\"\n",
        )?;
        let config = Config::load(&path)?;
        assert_eq!(config.base_url(), "https://erp.example.com/api");
        assert_eq!(config.timeout()?, Duration::from_millis(1500));
        assert_eq!(config.csrf_page(), Some("/dashboard"));
        assert_eq!(config.theme(), Theme::Light);
        assert_eq!(config.page_size(), 50);
        assert_eq!(config.resource(), "employees");
        assert_eq!(config.log_level(), "debug");
        Ok(())
    }

    #[test]
    fn malformed_config_returns_parse_error() -> Result<()> {
        let (_temp, path) = write_config("{{not toml")?;
        let error = Config::load(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("parse TOML config"));
        Ok(())
    }

    #[test]
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 2\n")?;
        let error = Config::load(&path).expect_err("v2 config should fail");
        assert!(error.to_string().contains("unsupported config version 2"));
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected() -> Result<()> {
        let cases = [
            ("[server]\nbase_url = \"erp.local\"\n", "http:// or https://"),
            ("[server]\ntimeout = \"0s\"\n", "must be positive"),
            ("[ui]\ntheme = \"solarized\"\n", "\"light\" or \"dark\""),
            ("[ui]\npage_size = 0\n", "between 1 and 200"),
            ("[ui]\nresource = \"invoices\"\n", "--list-resources"),
            ("[log]\nlevel = \"loud\"\n", "log.level"),
        ];
        for (body, expected) in cases {
            let (_temp, path) = write_config(&format!("version = 1\n{body}"))?;
            let error = Config::load(&path).expect_err("invalid value should fail");
            let message = format!("{error:#}");
            assert!(message.contains(expected), "{body}: {message}");
        }
        Ok(())
    }

    #[test]
    fn declared_resources_extend_and_replace_builtins() -> Result<()> {
        let (_temp, path) = write_config(
            r#"version = 1

[ui]
resource = "sites"

[[resources]]
name = "sites"
label = "Sites"
fields = [
  { name = "title", kind = "text", required = true },
  { name = "state", kind = "status", options = [{ value = "open", label = "Open" }] },
  { name = "manager", kind = "reference", options = [{ value = 21, label = "Avery Rahman" }] },
]
dependencies = [{ parent = "state", clears = ["manager"] }]

[[resources]]
name = "holidays"
path = "/calendar/holidays"
fields = [{ name = "title", kind = "text" }]
"#,
        )?;
        let config = Config::load(&path)?;
        let resources = config.resources()?;

        let sites = resources
            .iter()
            .find(|schema| schema.name == "sites")
            .expect("sites declared");
        assert_eq!(sites.path, "/sites");
        assert_eq!(sites.dependents_of("state"), vec!["manager"]);
        let manager = sites.spec("manager").expect("manager field");
        assert_eq!(manager.kind, FieldKind::Reference);
        assert_eq!(manager.option_label(&FieldValue::Reference(21)), Some("Avery Rahman"));

        let holidays = resources
            .iter()
            .filter(|schema| schema.name == "holidays")
            .collect::<Vec<_>>();
        assert_eq!(holidays.len(), 1);
        assert_eq!(holidays[0].path, "/calendar/holidays");
        assert_eq!(holidays[0].fields.len(), 1);
        Ok(())
    }

    #[test]
    fn declared_resource_errors_name_the_problem() -> Result<()> {
        let cases = [
            (
                "fields = [{ name = \"a\", kind = \"money\" }]",
                "unknown kind",
            ),
            (
                "fields = [{ name = \"a\", kind = \"status\", options = [{ value = 1, label = \"One\" }] }]",
                "must be strings",
            ),
            (
                "fields = [{ name = \"a\", kind = \"reference\" }]",
                "no options",
            ),
            (
                "fields = [{ name = \"a\", kind = \"text\" }]\ndependencies = [{ parent = \"a\", clears = [\"b\"] }]",
                "unknown field `b`",
            ),
        ];
        for (body, expected) in cases {
            let (_temp, path) =
                write_config(&format!("version = 1\n[[resources]]\nname = \"x\"\n{body}\n"))?;
            let error = Config::load(&path).expect_err("bad resource should fail");
            let message = format!("{error:#}");
            assert!(message.contains(expected), "{body}: {message}");
        }
        Ok(())
    }

    #[test]
    fn read_only_select_fields_may_omit_options() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[[resources]]\nname = \"x\"\nfields = [{ name = \"owner\", kind = \"reference\", read_only = true }]\n",
        )?;
        let resources = Config::load(&path)?.resources()?;
        let owner = resources
            .iter()
            .find(|schema| schema.name == "x")
            .and_then(|schema| schema.spec("owner"))
            .expect("owner declared");
        assert!(!owner.editable);
        assert!(owner.options.is_empty());
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("ERPGRID_CONFIG_PATH", &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("ERPGRID_CONFIG_PATH");
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn data_dir_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_dir = temp.path().join("state");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("ERPGRID_DATA_DIR", &override_dir);
        }
        let resolved = data_dir()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("ERPGRID_DATA_DIR");
        }
        assert_eq!(resolved, override_dir);
        assert!(override_dir.is_dir());
        Ok(())
    }

    #[test]
    fn durations_parse_ms_seconds_and_minutes() -> Result<()> {
        assert_eq!(parse_duration("500ms")?, Duration::from_millis(500));
        assert_eq!(parse_duration("5s")?, Duration::from_secs(5));
        assert_eq!(parse_duration("2m")?, Duration::from_secs(120));
        let error = parse_duration("soon").expect_err("invalid duration should fail");
        assert!(error.to_string().contains("invalid"));
        Ok(())
    }

    #[test]
    fn example_config_loads_cleanly() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, Config::example_config(&path))?;
        let config = Config::load(&path)?;
        assert_eq!(config.resource(), "daily-works");
        assert_eq!(config.resources()?.len(), 4);
        Ok(())
    }
}
