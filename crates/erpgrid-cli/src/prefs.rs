// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use erpgrid_app::{MAX_PAGE_SIZE, Theme, UiEvent, UiState, UiStore};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const PREFS_FILE: &str = "prefs.toml";

/// UI choices remembered between sessions. Unlike the config file this is
/// written by the app itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefs {
    pub theme: Option<Theme>,
    pub page_size: Option<u32>,
    pub resource: Option<String>,
}

impl Prefs {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read preferences {}", path.display()))?;
        toml::from_str(&raw).with_context(|| {
            format!(
                "parse preferences {} -- delete the file to reset",
                path.display()
            )
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = toml::to_string(self).context("encode preferences")?;
        fs::write(path, raw).with_context(|| format!("write preferences {}", path.display()))
    }

    pub fn from_state(state: &UiState) -> Self {
        Self {
            theme: Some(state.theme),
            page_size: Some(state.page_size),
            resource: Some(state.resource.clone()).filter(|name| !name.is_empty()),
        }
    }

    pub fn apply(&self, state: &mut UiState) {
        if let Some(theme) = self.theme {
            state.theme = theme;
        }
        if let Some(page_size) = self.page_size
            && (1..=MAX_PAGE_SIZE).contains(&page_size)
        {
            state.page_size = page_size;
        }
        if let Some(resource) = &self.resource {
            state.resource = resource.clone();
        }
    }
}

/// Saves preferences whenever the theme, page size, or resource changes.
/// Write failures are logged; they never interrupt the UI.
pub fn persist_on_change(store: &mut UiStore, path: PathBuf) {
    store.subscribe(move |state, event| {
        let relevant = matches!(
            event,
            UiEvent::ThemeChanged(_) | UiEvent::PageSizeChanged(_) | UiEvent::ResourceChanged(_)
        );
        if !relevant {
            return;
        }
        if let Err(error) = Prefs::from_state(state).save(&path) {
            tracing::warn!(
                path = %path.display(),
                error = %format!("{error:#}"),
                "preferences not saved"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::{Prefs, persist_on_change};
    use anyhow::Result;
    use erpgrid_app::{Theme, UiCommand, UiState, UiStore};

    #[test]
    fn missing_file_yields_empty_prefs() -> Result<()> {
        let temp = tempfile::tempdir()?;
        assert_eq!(Prefs::load(&temp.path().join("prefs.toml"))?, Prefs::default());
        Ok(())
    }

    #[test]
    fn apply_overrides_only_saved_values() {
        let mut state = UiState {
            resource: "daily-works".to_owned(),
            ..UiState::default()
        };
        Prefs {
            theme: Some(Theme::Light),
            page_size: Some(500),
            resource: None,
        }
        .apply(&mut state);
        assert_eq!(state.theme, Theme::Light);
        assert_eq!(state.page_size, 25);
        assert_eq!(state.resource, "daily-works");
    }

    #[test]
    fn store_changes_are_written_and_reloaded() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("prefs.toml");
        let mut store = UiStore::default();
        persist_on_change(&mut store, path.clone());

        store.dispatch(UiCommand::SelectResource("employees".to_owned()));
        store.dispatch(UiCommand::ToggleTheme);
        store.dispatch(UiCommand::SetPageSize(40));

        let saved = Prefs::load(&path)?;
        assert_eq!(
            saved,
            Prefs {
                theme: Some(Theme::Light),
                page_size: Some(40),
                resource: Some("employees".to_owned()),
            }
        );
        Ok(())
    }

    #[test]
    fn unrelated_events_do_not_write() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("prefs.toml");
        let mut store = UiStore::default();
        persist_on_change(&mut store, path.clone());

        store.dispatch(UiCommand::SetStatus("saved".to_owned()));
        store.dispatch(UiCommand::EnterEditMode);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn corrupt_file_points_at_reset() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("prefs.toml");
        std::fs::write(&path, "theme = 3")?;
        let error = Prefs::load(&path).expect_err("corrupt prefs should fail");
        assert!(error.to_string().contains("delete the file"));
        Ok(())
    }
}
