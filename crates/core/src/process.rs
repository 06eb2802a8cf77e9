//! Running-process snapshots.

use crate::error::{Error, Result};
use std::collections::HashSet;
use tracing::trace;

/// Executable names running at one instant, compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSnapshot {
    names: HashSet<String>,
}

impl ProcessSnapshot {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.to_lowercase())
    }

    /// First of `wanted` present in the snapshot.
    pub fn first_match<'a>(&self, wanted: &'a [String]) -> Option<&'a str> {
        wanted
            .iter()
            .find(|g| self.contains(g))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Source of process snapshots.
pub trait ProcessSampler: Send {
    fn sample(&mut self) -> Result<ProcessSnapshot>;
}

/// Samples the live OS process table.
#[derive(Debug, Default)]
pub struct SystemProcessSampler;

impl SystemProcessSampler {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessSampler for SystemProcessSampler {
    fn sample(&mut self) -> Result<ProcessSnapshot> {
        let names = list_process_names()?;
        trace!(count = names.len(), "Sampled processes");
        Ok(ProcessSnapshot::new(names))
    }
}

#[cfg(target_os = "windows")]
fn list_process_names() -> Result<Vec<String>> {
    use std::mem;
    use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
    use winapi::um::tlhelp32::{
        CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
        TH32CS_SNAPPROCESS,
    };

    let mut names = Vec::new();

    // SAFETY: snapshot handle is checked before use and closed before return;
    // entry is a correctly sized out parameter.
    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0);
        if snapshot == INVALID_HANDLE_VALUE {
            return Err(Error::ProcessListUnavailable(format!(
                "CreateToolhelp32Snapshot: {}",
                std::io::Error::last_os_error()
            )));
        }

        let mut entry: PROCESSENTRY32W = mem::zeroed();
        entry.dwSize = mem::size_of::<PROCESSENTRY32W>() as u32;

        if Process32FirstW(snapshot, &mut entry) != 0 {
            loop {
                names.push(wide_to_string(&entry.szExeFile));

                if Process32NextW(snapshot, &mut entry) == 0 {
                    break;
                }
            }
        }

        CloseHandle(snapshot);
    }

    Ok(names)
}

/// UTF-16 buffer up to its first NUL.
#[cfg(any(target_os = "windows", test))]
fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}

#[cfg(target_os = "linux")]
fn list_process_names() -> Result<Vec<String>> {
    let proc_dir = std::fs::read_dir("/proc")
        .map_err(|e| Error::ProcessListUnavailable(format!("/proc: {e}")))?;

    let mut names = Vec::new();
    for entry in proc_dir.flatten() {
        let path = entry.path();
        let is_pid = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.bytes().all(|b| b.is_ascii_digit()));
        if !is_pid {
            continue;
        }
        // processes may exit between read_dir and read
        if let Ok(comm) = std::fs::read_to_string(path.join("comm")) {
            names.push(comm.trim().to_string());
        }
    }
    Ok(names)
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
fn list_process_names() -> Result<Vec<String>> {
    Err(Error::ProcessListUnavailable(
        "process listing is not implemented on this platform".to_string(),
    ))
}
