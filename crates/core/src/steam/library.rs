//! Steam install root and library folder discovery.

use super::vdf::{self, VdfValue};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A folder holding a `steamapps` directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub path: String,
    pub label: String,
}

/// One entry of `libraryfolders.vdf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryFolder {
    pub path: String,
    pub label: String,
}

/// Whether `path` looks like a Steam install.
pub fn is_steam_root(path: &Path) -> bool {
    if !path.join("steamapps").is_dir() {
        return false;
    }
    if cfg!(target_os = "windows") {
        path.join("steam.exe").is_file()
    } else {
        true
    }
}

/// Places Steam may be installed, most trusted first: the path saved by a
/// previous scan, the registry, well-known folders, then `STEAM_PATH`.
pub fn candidate_roots(saved: Option<&Path>) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(saved) = saved.filter(|p| !p.as_os_str().is_empty()) {
        roots.push(saved.to_path_buf());
    }
    roots.extend(registry_roots());
    roots.extend(default_roots());
    if let Some(env) = std::env::var_os("STEAM_PATH").filter(|v| !v.is_empty()) {
        roots.push(PathBuf::from(env));
    }
    roots
}

/// First candidate that is a Steam install.
pub fn first_steam_root(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|p| {
            let ok = is_steam_root(p);
            debug!(path = %p.display(), ok, "Checked Steam location");
            ok
        })
        .cloned()
}

/// Locate the Steam install.
pub fn find_steam_root(saved: Option<&Path>) -> Result<PathBuf> {
    let candidates = candidate_roots(saved);
    let root = first_steam_root(&candidates).ok_or_else(|| {
        Error::Steam(format!(
            "Steam installation not found ({} locations checked)",
            candidates.len()
        ))
    })?;
    info!(path = %root.display(), "Steam found");
    Ok(root)
}

#[cfg(target_os = "windows")]
fn registry_roots() -> Vec<PathBuf> {
    use winreg::enums::{HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE};
    use winreg::RegKey;

    let mut roots = Vec::new();
    let mut push = |value: std::io::Result<String>| {
        if let Ok(value) = value.map(|v| v.replace('/', "\\")) {
            if !value.is_empty() {
                roots.push(PathBuf::from(value));
            }
        }
    };

    if let Ok(key) = RegKey::predef(HKEY_CURRENT_USER).open_subkey(r"Software\Valve\Steam") {
        push(key.get_value("SteamPath"));
        push(key.get_value("InstallPath"));
    }
    if let Ok(key) =
        RegKey::predef(HKEY_LOCAL_MACHINE).open_subkey(r"SOFTWARE\WOW6432Node\Valve\Steam")
    {
        push(key.get_value("InstallPath"));
    }
    roots
}

#[cfg(not(target_os = "windows"))]
fn registry_roots() -> Vec<PathBuf> {
    Vec::new()
}

#[cfg(target_os = "windows")]
fn default_roots() -> Vec<PathBuf> {
    [
        r"C:\Program Files (x86)\Steam",
        r"C:\Program Files\Steam",
        r"D:\Steam",
        r"E:\Steam",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

#[cfg(not(target_os = "windows"))]
fn default_roots() -> Vec<PathBuf> {
    let Some(home) = std::env::var_os("HOME").map(PathBuf::from) else {
        return Vec::new();
    };
    vec![
        home.join(".steam").join("steam"),
        home.join(".local").join("share").join("Steam"),
    ]
}

/// Parse the library list out of `libraryfolders.vdf`.
///
/// Handles both the current layout (numbered blocks with a `path` key) and
/// the older one where each numbered key maps straight to a path.
pub fn parse_library_folders(text: &str) -> Result<Vec<LibraryFolder>> {
    let root = vdf::parse(text)?;
    let folders = root
        .get_map("libraryfolders")
        .ok_or_else(|| Error::Steam("no \"libraryfolders\" block".to_string()))?;

    let mut out = Vec::new();
    for (key, value) in folders.iter() {
        // non-numeric keys are metadata such as "contentstatsid"
        if key.parse::<u32>().is_err() {
            continue;
        }
        match value {
            VdfValue::Str(path) => out.push(LibraryFolder {
                path: path.clone(),
                label: String::new(),
            }),
            VdfValue::Map(block) => {
                if let Some(path) = block.get_str("path") {
                    out.push(LibraryFolder {
                        path: path.to_string(),
                        label: block.get_str("label").unwrap_or_default().to_string(),
                    });
                }
            }
        }
    }
    Ok(out)
}

/// Every library of the install at `root`, the install itself first.
///
/// A missing or unreadable `libraryfolders.vdf` is not an error: the main
/// library is still returned. Folders without a `steamapps` directory
/// (unplugged drives) are skipped.
pub fn discover_libraries(root: &Path) -> Vec<Library> {
    let root_str = root.display().to_string();
    let mut seen = vec![normalize(&root_str)];
    let mut libraries = vec![Library {
        path: root_str,
        label: "Main".to_string(),
    }];

    let vdf_path = root.join("steamapps").join("libraryfolders.vdf");
    let folders = match std::fs::read_to_string(&vdf_path)
        .map_err(Error::from)
        .and_then(|text| parse_library_folders(&text))
    {
        Ok(folders) => folders,
        Err(e) => {
            warn!(path = %vdf_path.display(), error = %e, "Could not read library folders");
            return libraries;
        }
    };

    for folder in folders {
        if folder.path.is_empty() {
            continue;
        }
        let key = normalize(&folder.path);
        if seen.contains(&key) {
            continue;
        }
        if !Path::new(&folder.path).join("steamapps").is_dir() {
            warn!(path = %folder.path, "Skipping inaccessible library");
            continue;
        }
        seen.push(key);

        let label = if folder.label.is_empty() {
            default_label(&folder.path)
        } else {
            folder.label
        };
        libraries.push(Library {
            path: folder.path,
            label,
        });
    }

    debug!(count = libraries.len(), "Steam libraries discovered");
    libraries
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_end_matches('/').to_lowercase()
}

fn default_label(path: &str) -> String {
    let mut chars = path.chars();
    match (chars.next(), chars.next()) {
        (Some(drive), Some(':')) if drive.is_ascii_alphabetic() => {
            format!("Drive {}", drive.to_ascii_uppercase())
        }
        _ => "External".to_string(),
    }
}
