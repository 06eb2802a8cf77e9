//! Steam library scanning: find the install, its library folders, and the
//! executables of installed games.

pub mod executable;
pub mod library;
pub mod scan;
pub mod vdf;

pub use library::{discover_libraries, find_steam_root, Library};
pub use scan::{scan_libraries, scan_library};

use crate::config::DetectedGame;
use crate::error::Result;
use std::path::{Path, PathBuf};

/// Result of one full scan.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub install_path: PathBuf,
    pub libraries: Vec<Library>,
    pub games: Vec<DetectedGame>,
}

/// Locate Steam (trying `saved` first) and scan every library it knows.
pub fn scan(saved: Option<&Path>) -> Result<ScanReport> {
    let install_path = find_steam_root(saved)?;
    Ok(scan_install(&install_path))
}

/// Scan the libraries of a known install.
pub fn scan_install(install_path: &Path) -> ScanReport {
    let libraries = discover_libraries(install_path);
    let games = scan_libraries(&libraries);
    ScanReport {
        install_path: install_path.to_path_buf(),
        libraries,
        games,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn scans_a_whole_install() {
        let steam = tempfile::tempdir().unwrap();
        let extra = tempfile::tempdir().unwrap();
        write(steam.path(), "steam.exe", b"MZ");
        write(
            steam.path(),
            "steamapps/libraryfolders.vdf",
            format!(
                "\"libraryfolders\"\n{{\n\t\"0\" {{ \"path\" \"{}\" }}\n\t\"1\" {{ \"path\" \"{}\" \"label\" \"\" }}\n}}\n",
                steam.path().display().to_string().replace('\\', "\\\\"),
                extra.path().display().to_string().replace('\\', "\\\\"),
            )
            .as_bytes(),
        );
        write(
            extra.path(),
            "steamapps/appmanifest_1245620.acf",
            b"\"AppState\" { \"appid\" \"1245620\" \"name\" \"ELDEN RING\" \"installdir\" \"ELDEN RING\" }",
        );
        write(extra.path(), "steamapps/common/ELDEN RING/Game/eldenring.exe", b"MZ");

        let report = scan(Some(steam.path())).unwrap();
        assert_eq!(report.install_path, steam.path());
        assert_eq!(report.libraries.len(), 2);
        assert_eq!(report.games.len(), 1);
        assert_eq!(report.games[0].executable, "eldenring.exe");
        assert_eq!(report.games[0].library, report.libraries[1].label);
    }
}
