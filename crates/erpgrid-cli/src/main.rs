// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod logging;
mod prefs;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use config::Config;
use erpgrid_app::{ResourceSchema, UiState, UiStore, find_resource};
use erpgrid_tui::AppRuntime;
use prefs::Prefs;
use runtime::HttpRuntime;
use std::env;
use std::path::PathBuf;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `erpgrid --print-example-config` to generate a v1 template",
            options.config_path.display()
        )
    })?;
    let resources = config.resources()?;

    if options.list_resources {
        print!("{}", resource_listing(&resources));
        return Ok(());
    }

    if let Some(name) = &options.resource
        && find_resource(&resources, name).is_none()
    {
        bail!("unknown resource {name:?}; run `erpgrid --list-resources` to see the choices");
    }

    let data_dir = config::data_dir()?;
    logging::init(config.log_level(), &data_dir.join(logging::LOG_FILE))?;
    let mut runtime = HttpRuntime::connect(&config, resources)?;
    tracing::info!(
        base_url = runtime.client().base_url(),
        resources = runtime.resources().len(),
        csrf = runtime.client().csrf_token().is_some(),
        "connected"
    );

    let prefs_path = data_dir.join(prefs::PREFS_FILE);
    let mut state = initial_state(&config, &Prefs::load(&prefs_path)?, options.resource);
    if find_resource(runtime.resources(), &state.resource).is_none() {
        tracing::warn!(resource = %state.resource, "saved resource no longer exists");
        state.resource = config.resource().to_owned();
    }

    if options.check_only {
        let schema = find_resource(runtime.resources(), &state.resource)
            .cloned()
            .ok_or_else(|| anyhow!("unknown resource {:?}", state.resource))?;
        runtime.load_page(&schema, 1, 1).with_context(|| {
            format!(
                "list {} at {} -- check server.base_url and that the backend is running",
                schema.label,
                config.base_url()
            )
        })?;
        return Ok(());
    }

    let mut store = UiStore::new(state);
    prefs::persist_on_change(&mut store, prefs_path);
    erpgrid_tui::run_app(&mut store, &mut runtime)
}

/// Config defaults, then saved preferences, then the `--resource` flag.
fn initial_state(config: &Config, saved: &Prefs, resource: Option<String>) -> UiState {
    let mut state = UiState {
        theme: config.theme(),
        page_size: config.page_size(),
        resource: config.resource().to_owned(),
        ..UiState::default()
    };
    saved.apply(&mut state);
    if let Some(resource) = resource {
        state.resource = resource;
    }
    state
}

fn resource_listing(resources: &[ResourceSchema]) -> String {
    let width = resources
        .iter()
        .map(|schema| schema.name.len())
        .max()
        .unwrap_or(0);
    resources
        .iter()
        .map(|schema| {
            format!(
                "{:<width$}  {}  ({}, {} fields)\n",
                schema.name,
                schema.label,
                schema.path,
                schema.fields.len()
            )
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    resource: Option<String>,
    print_config_path: bool,
    print_example: bool,
    list_resources: bool,
    check_only: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        resource: None,
        print_config_path: false,
        print_example: false,
        list_resources: false,
        check_only: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--resource" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--resource requires a resource name"))?;
                options.resource = Some(value.as_ref().to_owned());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--list-resources" => {
                options.list_resources = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("erpgrid");
    println!("  --config <path>          Use a specific config path");
    println!("  --resource <name>        Open this resource first");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a v1 config template");
    println!("  --list-resources         List built-in and configured resources");
    println!("  --check                  Validate config and reach the backend, then exit");
    println!("  --help                   Show this help");
}
