//! Installed-game discovery from `appmanifest_*.acf` files.

use super::executable::find_game_executable;
use super::library::Library;
use super::vdf;
use crate::config::DetectedGame;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MIB: u64 = 1024 * 1024;

/// The fields of an app manifest the scanner needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppManifest {
    pub app_id: String,
    pub name: String,
    pub install_dir: String,
    pub size_on_disk: u64,
}

/// Parse one `appmanifest_<appid>.acf`. `appid`, `name` and `installdir`
/// are required.
pub fn parse_app_manifest(text: &str) -> Result<AppManifest> {
    let root = vdf::parse(text)?;
    let state = root
        .get_map("AppState")
        .ok_or_else(|| Error::Steam("no \"AppState\" block".to_string()))?;

    let field = |key: &str| -> Result<String> {
        state
            .get_str(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .ok_or_else(|| Error::Steam(format!("app manifest is missing \"{key}\"")))
    };

    Ok(AppManifest {
        app_id: field("appid")?,
        name: field("name")?,
        install_dir: field("installdir")?,
        size_on_disk: state
            .get_str("SizeOnDisk")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0),
    })
}

fn manifest_paths(steamapps: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(steamapps)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| {
                    let n = n.to_lowercase();
                    n.starts_with("appmanifest_") && n.ends_with(".acf")
                })
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Every installed game of one library whose executable can be found.
///
/// Manifests that fail to parse, and games whose install folder is missing,
/// are skipped with a log line. Only an unreadable `steamapps` folder fails
/// the whole library.
pub fn scan_library(library: &Library) -> Result<Vec<DetectedGame>> {
    let steamapps = Path::new(&library.path).join("steamapps");
    let mut games = Vec::new();

    for manifest_path in manifest_paths(&steamapps)? {
        let manifest = match std::fs::read_to_string(&manifest_path)
            .map_err(Error::from)
            .and_then(|text| parse_app_manifest(&text))
        {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %manifest_path.display(), error = %e, "Skipping app manifest");
                continue;
            }
        };

        let install_path = steamapps.join("common").join(&manifest.install_dir);
        if !install_path.is_dir() {
            debug!(game = %manifest.name, path = %install_path.display(), "Install folder missing");
            continue;
        }

        let Some(executable) = find_game_executable(&install_path, &manifest.name) else {
            debug!(game = %manifest.name, "No executable found");
            continue;
        };

        games.push(DetectedGame {
            name: manifest.name,
            executable,
            app_id: manifest.app_id,
            install_path: install_path.display().to_string(),
            library: library.label.clone(),
            size_mb: manifest.size_on_disk / MIB,
            extra: Default::default(),
        });
    }

    info!(library = %library.label, games = games.len(), "Library scanned");
    Ok(games)
}

/// Scan every library on its own thread and return the games sorted by name.
/// A library that cannot be read is logged and left out.
pub fn scan_libraries(libraries: &[Library]) -> Vec<DetectedGame> {
    let mut games: Vec<DetectedGame> = std::thread::scope(|scope| {
        let workers: Vec<_> = libraries
            .iter()
            .map(|library| (library, scope.spawn(move || scan_library(library))))
            .collect();

        workers
            .into_iter()
            .flat_map(|(library, worker)| match worker.join() {
                Ok(Ok(games)) => games,
                Ok(Err(e)) => {
                    warn!(library = %library.path, error = %e, "Library scan failed");
                    Vec::new()
                }
                Err(_) => {
                    warn!(library = %library.path, "Library scan panicked");
                    Vec::new()
                }
            })
            .collect()
    });

    games.sort_by_key(|g| g.name.to_lowercase());
    games
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const ELDEN_RING: &str = r#"
"AppState"
{
	"appid"		"1245620"
	"Universe"		"1"
	"name"		"ELDEN RING"
	"StateFlags"		"4"
	"installdir"		"ELDEN RING"
	"SizeOnDisk"		"52301224110"
	"UserConfig"
	{
		"language"		"english"
	}
}
"#;

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn manifest(app_id: &str, name: &str, dir: &str) -> String {
        format!(
            "\"AppState\"\n{{\n\t\"appid\" \"{app_id}\"\n\t\"name\" \"{name}\"\n\t\"installdir\" \"{dir}\"\n}}\n"
        )
    }

    fn library(path: &Path, label: &str) -> Library {
        Library {
            path: path.display().to_string(),
            label: label.to_string(),
        }
    }

    #[test]
    fn parses_manifest_fields() {
        let m = parse_app_manifest(ELDEN_RING).unwrap();
        assert_eq!(m.app_id, "1245620");
        assert_eq!(m.name, "ELDEN RING");
        assert_eq!(m.install_dir, "ELDEN RING");
        assert_eq!(m.size_on_disk, 52_301_224_110);
        assert_eq!(m.size_on_disk / MIB, 49_878);
    }

    #[test]
    fn manifest_requires_core_fields() {
        let no_dir = "\"AppState\" { \"appid\" \"1\" \"name\" \"Game\" }";
        let err = parse_app_manifest(no_dir).unwrap_err();
        assert!(err.to_string().contains("installdir"), "{err}");

        let blank_name = "\"AppState\" { \"appid\" \"1\" \"name\" \" \" \"installdir\" \"g\" }";
        assert!(parse_app_manifest(blank_name).is_err());
        assert!(parse_app_manifest("\"Other\" { }").is_err());

        let m = parse_app_manifest(&manifest("7", "Game", "g")).unwrap();
        assert_eq!(m.size_on_disk, 0);
    }

    #[test]
    fn scans_one_library() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "steamapps/appmanifest_1245620.acf", ELDEN_RING.as_bytes());
        write(root, "steamapps/common/ELDEN RING/Game/eldenring.exe", b"MZ");
        write(root, "steamapps/common/ELDEN RING/Game/start_protected_game.exe", b"MZ");
        write(root, "steamapps/common/ELDEN RING/unins000.exe", b"MZ");

        // not installed
        let gone = manifest("10", "Gone", "Gone");
        write(root, "steamapps/appmanifest_10.acf", gone.as_bytes());
        // installed, but no executable
        let tool = manifest("20", "Tool", "Tool");
        write(root, "steamapps/appmanifest_20.acf", tool.as_bytes());
        write(root, "steamapps/common/Tool/readme.txt", b"hi");
        // broken manifest
        write(root, "steamapps/appmanifest_30.acf", b"\"AppState\" {");
        write(root, "steamapps/libraryfolders.vdf", b"\"libraryfolders\" { }");

        let games = scan_library(&library(root, "Main")).unwrap();
        assert_eq!(games.len(), 1);
        let game = &games[0];
        assert_eq!(game.name, "ELDEN RING");
        assert_eq!(game.executable, "eldenring.exe");
        assert_eq!(game.app_id, "1245620");
        assert_eq!(game.library, "Main");
        assert_eq!(game.size_mb, 49_878);
        assert!(game.install_path.ends_with("ELDEN RING"));
    }

    #[test]
    fn missing_steamapps_fails_the_library() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_library(&library(dir.path(), "Main")).is_err());
    }

    #[test]
    fn scans_libraries_in_parallel_and_sorts() {
        let main = tempfile::tempdir().unwrap();
        let extra = tempfile::tempdir().unwrap();
        let hunt = manifest("594650", "Hunt: Showdown 1896", "Hunt Showdown");
        write(main.path(), "steamapps/appmanifest_594650.acf", hunt.as_bytes());
        write(main.path(), "steamapps/common/Hunt Showdown/bin/HuntGame.exe", b"MZ");

        let cs2 = manifest("730", "Counter-Strike 2", "Counter-Strike Global Offensive");
        write(extra.path(), "steamapps/appmanifest_730.acf", cs2.as_bytes());
        write(
            extra.path(),
            "steamapps/common/Counter-Strike Global Offensive/game/bin/win64/cs2.exe",
            b"MZ",
        );

        let gone = library(&main.path().join("unplugged"), "Drive X");
        let games = scan_libraries(&[
            library(main.path(), "Main"),
            gone,
            library(extra.path(), "Drive D"),
        ]);

        let names: Vec<&str> = games.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Counter-Strike 2", "Hunt: Showdown 1896"]);
        assert_eq!(games[0].executable, "cs2.exe");
        assert_eq!(games[0].library, "Drive D");
        assert_eq!(games[1].executable, "HuntGame.exe");
    }
}
