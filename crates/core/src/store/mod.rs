use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use crate::{effects::EffectMode, Result};

const LAST_EFFECT_KEY: &str = "last_effect";

/// Small key-value file that survives restarts. Only the last selected
/// effect mode is kept in it.
#[derive(Debug, Default)]
pub struct StateStore {
    path: Option<PathBuf>,
    values: BTreeMap<String, String>,
}

impl StateStore {
    /// Store that never touches the disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the store at `path`. A missing file is an empty store; a
    /// malformed one is logged and replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match Self::read(&path) {
            Ok(values) => values,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "ignoring unreadable state file");
                BTreeMap::new()
            }
        };
        Self {
            path: Some(path),
            values,
        }
    }

    fn read(path: &Path) -> Result<BTreeMap<String, String>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Sets a value and writes the whole store back.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        self.values.insert(key.to_string(), value.into());
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(&self.values)?)?;
        Ok(())
    }

    /// Effect mode chosen in an earlier session, if it can still be parsed.
    pub fn last_effect(&self) -> Option<EffectMode> {
        self.get(LAST_EFFECT_KEY)?.parse().ok()
    }

    pub fn set_last_effect(&mut self, mode: EffectMode) -> Result<()> {
        self.set(LAST_EFFECT_KEY, mode.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_the_last_effect_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("show.json");

        let mut store = StateStore::open(&path);
        assert_eq!(store.last_effect(), None);
        store.set_last_effect(EffectMode::Heart).unwrap();

        let reopened = StateStore::open(&path);
        assert_eq!(reopened.last_effect(), Some(EffectMode::Heart));
    }

    #[test]
    fn malformed_files_are_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("show.json");
        fs::write(&path, "not json").unwrap();

        let mut store = StateStore::open(&path);
        assert_eq!(store.last_effect(), None);
        store.set_last_effect(EffectMode::Spectrum).unwrap();
        assert_eq!(
            StateStore::open(&path).last_effect(),
            Some(EffectMode::Spectrum)
        );
    }

    #[test]
    fn unknown_values_are_ignored() {
        let mut store = StateStore::in_memory();
        store.set(LAST_EFFECT_KEY, "strobe").unwrap();
        assert_eq!(store.last_effect(), None);
    }
}
