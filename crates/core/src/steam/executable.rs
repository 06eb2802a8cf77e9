//! Guess which executable inside an install folder is the game itself.
//!
//! Three passes, first hit wins: names derived from the game title in the
//! usual binary folders, a scored walk over every `.exe`, then the largest
//! executable that is not an installer or helper.

use std::collections::HashMap;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

const SEARCH_DIRS: &[&str] = &[
    "",
    "Binaries/Win64",
    "bin",
    "x64",
    "Game/Binaries/Win64",
    "Shipping/Binaries/Win64",
];

const GENERIC_NAMES: &[&str] = &["game.exe", "main.exe", "launcher.exe"];

const NAME_SUFFIXES: &[&str] = &["game", "client", "main"];

const COMMON_WORDS: &[&str] = &[
    "the", "of", "and", "for", "in", "on", "at", "to", "a", "an", "with", "edition",
];

/// Substrings of helper binaries. The size fallback only honours the first
/// [`FALLBACK_SKIP`] of them.
const SKIP_MARKERS: &[&str] = &[
    "unins",
    "setup",
    "install",
    "update",
    "crash",
    "report",
    "redist",
    "vcredist",
    "directx",
    "dotnet",
    "unity",
    "ue4",
    "ue5",
    "prerequisites",
    "support",
    "helper",
    "service",
    "daemon",
    "config",
    "settings",
    "options",
    "benchmark",
    "test",
];

const FALLBACK_SKIP: usize = 11;

const MIN_FALLBACK_SIZE: u64 = 100 * 1024;

const MAX_DEPTH: usize = 6;

/// File name of the most likely game executable under `install_dir`.
pub fn find_game_executable(install_dir: &Path, game_name: &str) -> Option<String> {
    let patterns = name_patterns(game_name);

    if let Some(exe) = exact_match(install_dir, &patterns) {
        debug!(game = game_name, exe = %exe, "Executable matched by name");
        return Some(exe);
    }
    if let Some(exe) = best_scored(install_dir, game_name, &patterns) {
        debug!(game = game_name, exe = %exe, "Executable matched by score");
        return Some(exe);
    }
    let exe = largest_executable(install_dir);
    if let Some(exe) = &exe {
        debug!(game = game_name, exe = %exe, "Executable picked by size");
    }
    exe
}

/// Lowercase `.exe` names a game titled `name` is likely to ship.
pub fn name_patterns(name: &str) -> Vec<String> {
    let lower = name.trim().to_lowercase();
    let cleaned = clean(&lower);
    let compact: String = cleaned.split_whitespace().collect();

    let mut stems = vec![
        lower.clone(),
        lower.replace(' ', "_"),
        lower.replace(' ', ""),
        compact.clone(),
    ];

    if let Some(first) = lower.split_whitespace().next() {
        let first = first.trim_matches(|c| matches!(c, ':' | ';' | '-'));
        if first.chars().count() > 2 {
            stems.push(first.to_string());
        }
    }

    let acronym = acronym(&cleaned);
    if acronym.chars().count() >= 2 {
        stems.push(acronym);
    }

    if !compact.is_empty() {
        stems.push(format!("{compact}win64"));
        stems.push(format!("{compact}-win64"));
        for suffix in NAME_SUFFIXES {
            stems.push(format!("{compact}{suffix}"));
        }
    }

    let mut out: Vec<String> = Vec::new();
    for stem in stems {
        if stem.is_empty() {
            continue;
        }
        let exe = format!("{stem}.exe");
        if !out.contains(&exe) {
            out.push(exe);
        }
    }
    out
}

/// Letters and digits only, words separated by single spaces.
fn clean(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First letter of each significant word; numbers are kept whole, so
/// "dark souls 3" gives "ds3".
fn acronym(cleaned: &str) -> String {
    cleaned
        .split_whitespace()
        .filter(|w| !COMMON_WORDS.contains(w))
        .filter_map(|w| {
            if w.chars().all(|c| c.is_ascii_digit()) {
                Some(w.to_string())
            } else {
                w.chars().next().map(String::from)
            }
        })
        .collect()
}

fn significant_words(game_name: &str) -> Vec<String> {
    clean(&game_name.to_lowercase())
        .split_whitespace()
        .filter(|w| w.chars().count() > 2 && !COMMON_WORDS.contains(w))
        .map(String::from)
        .collect()
}

fn is_helper(stem: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| stem.contains(m))
}

fn is_exe(name: &str) -> bool {
    name.to_lowercase().ends_with(".exe")
}

fn exact_match(install_dir: &Path, patterns: &[String]) -> Option<String> {
    for sub in SEARCH_DIRS {
        let dir = if sub.is_empty() {
            install_dir.to_path_buf()
        } else {
            install_dir.join(sub)
        };
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };

        // lowercase name -> name on disk
        let exes: HashMap<String, String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| is_exe(n))
            .map(|n| (n.to_lowercase(), n))
            .collect();

        let wanted = patterns
            .iter()
            .map(String::as_str)
            .chain(GENERIC_NAMES.iter().copied());
        for pattern in wanted {
            if let Some(found) = exes.get(pattern) {
                return Some(found.clone());
            }
        }
    }
    None
}

/// Score one executable stem (lowercase, no extension) against the title.
pub fn score_executable(stem: &str, game_name: &str, patterns: &[String]) -> i32 {
    let compact: String = clean(&game_name.to_lowercase()).split_whitespace().collect();
    let mut score = 0;

    if patterns.iter().any(|p| p.strip_suffix(".exe") == Some(stem)) {
        score += 1000;
    } else if stem == compact {
        score += 900;
    }

    let words = significant_words(game_name);
    let mut found = 0;
    for word in &words {
        if stem.contains(word.as_str()) {
            found += 1;
            score += word.chars().count() as i32 * 10;
        }
    }
    if !words.is_empty() && found == words.len() {
        score += 800;
    }

    if let Some(first) = words.first() {
        if stem.starts_with(first.as_str()) {
            score += 100;
        }
    }
    if stem.chars().count() < 4 {
        score -= 50;
    }
    score
}

fn best_scored(install_dir: &Path, game_name: &str, patterns: &[String]) -> Option<String> {
    let mut best: Option<(i32, String)> = None;

    for entry in WalkDir::new(install_dir)
        .max_depth(MAX_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !is_exe(name) {
            continue;
        }
        let lower = name.to_lowercase();
        let stem = lower.trim_end_matches(".exe");
        if is_helper(stem, SKIP_MARKERS) {
            continue;
        }

        let score = score_executable(stem, game_name, patterns);
        if score > 0 && best.as_ref().map_or(true, |(s, _)| score > *s) {
            best = Some((score, name.to_string()));
        }
    }
    best.map(|(_, name)| name)
}

fn largest_executable(install_dir: &Path) -> Option<String> {
    WalkDir::new(install_dir)
        .max_depth(MAX_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            if !is_exe(&name) {
                return None;
            }
            let lower = name.to_lowercase();
            if is_helper(lower.trim_end_matches(".exe"), &SKIP_MARKERS[..FALLBACK_SKIP]) {
                return None;
            }
            let size = e.metadata().ok()?.len();
            (size >= MIN_FALLBACK_SIZE).then_some((size, name))
        })
        .fold(None, |best: Option<(u64, String)>, (size, name)| match best {
            Some((b, _)) if b >= size => best,
            _ => Some((size, name)),
        })
        .map(|(_, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str, size: usize) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![0u8; size]).unwrap();
    }

    #[test]
    fn patterns_from_title() {
        let p = name_patterns("Dark Souls 3");
        for want in ["dark souls 3.exe", "dark_souls_3.exe", "darksouls3.exe", "dark.exe", "ds3.exe"] {
            assert!(p.contains(&want.to_string()), "{want} missing from {p:?}");
        }
        assert!(p.contains(&"darksouls3game.exe".to_string()));
        assert!(p.contains(&"darksouls3win64.exe".to_string()));

        let p = name_patterns("Hunt: Showdown 1896");
        assert!(p.contains(&"hunt.exe".to_string()));
        assert!(p.contains(&"huntshowdown1896.exe".to_string()));

        let p = name_patterns("Ori and the Will of the Wisps");
        assert!(p.contains(&"oww.exe".to_string()));
    }

    #[test]
    fn short_first_word_is_not_a_pattern() {
        assert!(!name_patterns("XO Arena").contains(&"xo.exe".to_string()));
        assert!(name_patterns("Grand Theft Auto V").contains(&"gtav.exe".to_string()));
    }

    #[test]
    fn scores_prefer_the_real_binary() {
        let name = "Elden Ring";
        let patterns = name_patterns(name);
        let real = score_executable("eldenring", name, &patterns);
        let other = score_executable("start_protected_game", name, &patterns);
        let partial = score_executable("ringtool", name, &patterns);
        assert!(real > partial, "{real} vs {partial}");
        assert!(partial > other);
        assert_eq!(other, 0);
        assert!(score_executable("x", name, &patterns) < 0);
    }

    #[test]
    fn exact_name_in_binary_folder() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Binaries/Win64/DeepRockGalactic.exe", 10);
        touch(dir.path(), "Binaries/Win64/CrashReportClient.exe", 10);
        touch(dir.path(), "FSD.exe", 10);
        assert_eq!(
            find_game_executable(dir.path(), "Deep Rock Galactic").as_deref(),
            Some("DeepRockGalactic.exe")
        );
    }

    #[test]
    fn scored_walk_skips_helpers() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Game/eldenring.exe", 10);
        touch(dir.path(), "Game/start_protected_game.exe", 10);
        touch(dir.path(), "unins000.exe", 10);
        assert_eq!(
            find_game_executable(dir.path(), "ELDEN RING").as_deref(),
            Some("eldenring.exe")
        );

        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "bin/HuntGame.exe", 10);
        touch(dir.path(), "bin/crashhandler.exe", 10);
        assert_eq!(
            find_game_executable(dir.path(), "Hunt: Showdown 1896").as_deref(),
            Some("HuntGame.exe")
        );
    }

    #[test]
    fn largest_binary_as_last_resort() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "engine/r5.exe", 200 * 1024);
        touch(dir.path(), "engine/crashpad.exe", 400 * 1024);
        touch(dir.path(), "tiny.exe", 1024);
        assert_eq!(
            find_game_executable(dir.path(), "Zyx Qwv").as_deref(),
            Some("r5.exe")
        );
    }

    #[test]
    fn nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "readme.txt", 10);
        touch(dir.path(), "setup.exe", 500 * 1024);
        assert_eq!(find_game_executable(dir.path(), "Zyx Qwv"), None);
        assert_eq!(find_game_executable(&dir.path().join("missing"), "Zyx"), None);
    }
}
