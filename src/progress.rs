//! flag-table persistence: pretty RON under `saves/` (localStorage on wasm)
//!
//! Failures here are never fatal. Callers log them, surface a notice to the
//! player, and keep the in-memory table as it was.

use std::collections::HashMap;
#[cfg(not(target_arch = "wasm32"))]
use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

#[cfg(not(target_arch = "wasm32"))]
const SAVE_DIR: &str = "saves";
#[cfg(target_arch = "wasm32")]
const STORAGE_PREFIX: &str = "storyline";

/// On-disk shape of one save slot.
#[derive(Serialize, Deserialize)]
struct SaveBlob {
    flags: HashMap<String, bool>,
}

/// Load the flag table saved under `slot`. A missing save is `Ok(None)`,
/// not an error; a corrupt or unreadable one is `Err`.
pub(crate) fn load(slot: &str) -> Result<Option<HashMap<String, bool>>, String> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        load_from(&slot_path(slot))
    }
    #[cfg(target_arch = "wasm32")]
    {
        let Some(content) = storage_read(&storage_key(slot))? else {
            return Ok(None);
        };
        parse(&content, &storage_key(slot)).map(Some)
    }
}

/// Save the flag table under `slot`, backing up the previous save first.
pub(crate) fn save(slot: &str, flags: &HashMap<String, bool>) -> Result<(), String> {
    let content = encode(flags)?;

    #[cfg(not(target_arch = "wasm32"))]
    {
        save_to(&slot_path(slot), &content)
    }
    #[cfg(target_arch = "wasm32")]
    {
        storage_write(&storage_key(slot), &content)
    }
}

fn encode(flags: &HashMap<String, bool>) -> Result<String, String> {
    let blob = SaveBlob {
        flags: flags.clone(),
    };
    ron::ser::to_string_pretty(&blob, ron::ser::PrettyConfig::new())
        .map_err(|error| format!("failed to serialize progress to RON: {error}"))
}

fn parse(content: &str, location: &str) -> Result<HashMap<String, bool>, String> {
    ron::from_str::<SaveBlob>(content)
        .map(|blob| blob.flags)
        .map_err(|error| format!("failed to parse '{location}' as progress RON: {error}"))
}

#[cfg(not(target_arch = "wasm32"))]
fn slot_path(slot: &str) -> PathBuf {
    Path::new(SAVE_DIR).join(format!("{slot}.ron"))
}

#[cfg(not(target_arch = "wasm32"))]
fn load_from(path: &Path) -> Result<Option<HashMap<String, bool>>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .map_err(|error| format!("failed to read '{}': {}", path.display(), error))?;
    parse(&content, &path.display().to_string()).map(Some)
}

#[cfg(not(target_arch = "wasm32"))]
fn save_to(path: &Path, content: &str) -> Result<(), String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|error| {
            format!(
                "failed to create save directory '{}': {}",
                parent.display(),
                error
            )
        })?;
    }

    // keep the previous save around in case this write goes bad
    if path.exists() {
        let backup = backup_path(path);
        fs::copy(path, &backup).map_err(|error| {
            format!("failed to back up '{}': {}", backup.display(), error)
        })?;
    }

    fs::write(path, content)
        .map_err(|error| format!("failed to write save file '{}': {}", path.display(), error))
}

#[cfg(not(target_arch = "wasm32"))]
fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

#[cfg(target_arch = "wasm32")]
fn storage_key(slot: &str) -> String {
    format!("{STORAGE_PREFIX}.{slot}")
}

#[cfg(target_arch = "wasm32")]
fn storage_read(key: &str) -> Result<Option<String>, String> {
    let Some(window) = web_sys::window() else {
        return Ok(None);
    };
    let Ok(Some(storage)) = window.local_storage() else {
        return Ok(None);
    };

    storage
        .get_item(key)
        .map_err(|error| format!("failed to read progress from localStorage: {error:?}"))
}

#[cfg(target_arch = "wasm32")]
fn storage_write(key: &str, content: &str) -> Result<(), String> {
    let Some(window) = web_sys::window() else {
        return Err("failed to access browser window for progress persistence".to_string());
    };
    let Ok(Some(storage)) = window.local_storage() else {
        return Err("failed to access browser localStorage for progress persistence".to_string());
    };

    // keep the previous save around in case this write goes bad
    if let Ok(Some(previous)) = storage.get_item(key) {
        storage
            .set_item(&format!("{key}.bak"), &previous)
            .map_err(|error| format!("failed to back up progress in localStorage: {error:?}"))?;
    }

    storage
        .set_item(key, content)
        .map_err(|error| format!("failed to write progress to localStorage: {error:?}"))
}
