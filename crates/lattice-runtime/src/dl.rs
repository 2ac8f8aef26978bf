//! Native dynamic library loading.
//!
//! Each module that declares `library="true"` owns one [`Library`] value. The
//! loader scans the module's library directory for a file matching the
//! platform's decorated name and opens it with lazy binding and global symbol
//! resolution, so that plugin code can resolve symbols from the libraries of
//! the modules it requires.
//!
//! Decorated names, matched against directory entries as full-string regexes:
//!
//! | Platform | Pattern |
//! |----------|---------|
//! | Linux    | `lib<name>\.so[0-9\.]*` |
//! | macOS    | `lib<name>[0-9\.]*\.dylib` |
//! | Windows  | `<name>\.dll` |

use std::path::{Path, PathBuf};

use libloading::Symbol;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

/// Errors raised by the dynamic library loader.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// No directory entry matched the decorated library name.
    #[error("no file matching '{pattern}' in '{search_path}'")]
    NotFound {
        /// The decorated-name pattern that was searched for.
        pattern: String,
        /// The directory that was scanned.
        search_path: PathBuf,
    },

    /// The platform loader rejected the candidate file.
    #[error("failed to open '{path}': {detail}")]
    Open {
        /// The file handed to the loader.
        path: PathBuf,
        /// Loader diagnostic.
        detail: String,
    },

    /// Releasing the handle failed.
    #[error("failed to unload library: {0}")]
    Close(String),

    /// A symbol was not found in the loaded library.
    #[error("symbol '{symbol}' not found: {detail}")]
    Symbol {
        /// The requested symbol name.
        symbol: String,
        /// Loader diagnostic.
        detail: String,
    },

    /// A symbol was requested while no library is loaded.
    #[error("library '{0}' is not loaded")]
    NotLoaded(String),
}

/// Builds the platform-decorated name pattern for a library base name.
pub fn native_name_pattern(name: &str) -> String {
    let escaped = regex::escape(name);
    if cfg!(target_os = "macos") {
        format!("lib{escaped}[0-9\\.]*\\.dylib")
    } else if cfg!(windows) {
        format!("{escaped}\\.dll")
    } else {
        format!("lib{escaped}\\.so[0-9\\.]*")
    }
}

/// A module's native dynamic library.
///
/// Holds at most one handle; [`load`](Library::load) while loaded is a no-op
/// and [`unload`](Library::unload) is idempotent.
pub struct Library {
    name: String,
    search_path: PathBuf,
    handle: Option<libloading::Library>,
}

impl Library {
    /// Creates an unloaded library with the given base name.
    pub fn new(name: impl Into<String>) -> Self {
        Library {
            name: name.into(),
            search_path: PathBuf::new(),
            handle: None,
        }
    }

    /// The undecorated library name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records the directory that will be scanned by [`load`](Library::load).
    pub fn set_search_path(&mut self, directory: impl Into<PathBuf>) {
        self.search_path = directory.into();
    }

    /// The directory scanned for the decorated file.
    pub fn search_path(&self) -> &Path {
        &self.search_path
    }

    /// Returns `true` while a handle is held.
    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    /// Scans the search path and returns the first entry matching the
    /// decorated name.
    ///
    /// Entries are visited in lexicographic order so resolution is
    /// deterministic across platforms.
    pub fn locate(&self) -> Result<PathBuf, LibraryError> {
        let pattern = native_name_pattern(&self.name);
        let regex = Regex::new(&format!("^{pattern}$")).expect("decorated name pattern is valid");

        let not_found = || LibraryError::NotFound {
            pattern: pattern.clone(),
            search_path: self.search_path.clone(),
        };

        let mut entries: Vec<PathBuf> = std::fs::read_dir(&self.search_path)
            .map_err(|_| not_found())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        entries
            .into_iter()
            .find(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| regex.is_match(n))
            })
            .ok_or_else(not_found)
    }

    /// Opens the library, resolving the decorated file name first.
    ///
    /// Uses lazy binding with global symbol resolution on unix platforms.
    /// Calling `load` while a handle is held does nothing.
    pub fn load(&mut self) -> Result<(), LibraryError> {
        if self.handle.is_some() {
            return Ok(());
        }

        let path = self.locate()?;
        debug!(library = %self.name, path = %path.display(), "Loading native library");

        let handle = open_lazy_global(&path).map_err(|e| LibraryError::Open {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Releases the handle. Idempotent; a close failure is reported but the
    /// handle is dropped either way.
    pub fn unload(&mut self) -> Result<(), LibraryError> {
        if let Some(handle) = self.handle.take() {
            handle.close().map_err(|e| LibraryError::Close(e.to_string()))?;
        }
        Ok(())
    }

    /// Resolves a symbol from the loaded library.
    ///
    /// # Safety
    ///
    /// The caller must supply the symbol's true type `T`; a mismatch is
    /// undefined behavior, as with any raw dynamic symbol lookup.
    pub unsafe fn get<T>(&self, symbol: &[u8]) -> Result<Symbol<'_, T>, LibraryError> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| LibraryError::NotLoaded(self.name.clone()))?;
        unsafe {
            handle.get(symbol).map_err(|e| LibraryError::Symbol {
                symbol: String::from_utf8_lossy(symbol).into_owned(),
                detail: e.to_string(),
            })
        }
    }
}

#[cfg(unix)]
fn open_lazy_global(path: &Path) -> Result<libloading::Library, libloading::Error> {
    use libloading::os::unix;
    unsafe {
        unix::Library::open(Some(path), unix::RTLD_LAZY | unix::RTLD_GLOBAL).map(Into::into)
    }
}

#[cfg(not(unix))]
fn open_lazy_global(path: &Path) -> Result<libloading::Library, libloading::Error> {
    unsafe { libloading::Library::new(path) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, candidate: &str) -> bool {
        Regex::new(&format!("^{pattern}$")).unwrap().is_match(candidate)
    }

    #[test]
    fn linux_pattern_matches_versioned_sonames() {
        let pattern = "libfoo_bar\\.so[0-9\\.]*";
        assert!(matches(pattern, "libfoo_bar.so"));
        assert!(matches(pattern, "libfoo_bar.so.1"));
        assert!(matches(pattern, "libfoo_bar.so.1.2.3"));
        assert!(!matches(pattern, "libfoo_bar.so.debug.tar"));
        assert!(!matches(pattern, "libfoo_baz.so"));
    }

    #[test]
    fn name_is_regex_escaped() {
        let pattern = native_name_pattern("foo+bar");
        assert!(pattern.contains("foo\\+bar"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn locate_picks_first_match_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["libdemo.so.2", "libdemo.so", "libdemo.so.debug.tar", "readme.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let mut library = Library::new("demo");
        library.set_search_path(dir.path());
        let path = library.locate().unwrap();
        assert_eq!(path.file_name().unwrap(), "libdemo.so");
    }

    #[test]
    fn locate_fails_on_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut library = Library::new("demo");
        library.set_search_path(dir.path());
        assert!(matches!(library.locate(), Err(LibraryError::NotFound { .. })));
    }

    #[test]
    fn unload_without_load_is_a_no_op() {
        let mut library = Library::new("demo");
        assert!(!library.is_loaded());
        assert!(library.unload().is_ok());
    }
}
