use sortjig_core::{Error, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Accept/reject membership lists.
///
/// Loaded once at startup from two operator-supplied files and immutable
/// for the process lifetime; swapping lists requires a restart. Entries are
/// newline or comma separated serials; whitespace is trimmed and matching
/// is case-insensitive (everything is folded to uppercase, same as scan
/// normalization).
#[derive(Debug, Clone)]
pub struct ReferenceSets {
    accept: HashSet<String>,
    reject: HashSet<String>,
}

impl ReferenceSets {
    /// Load both lists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if either file cannot be read. An
    /// unreadable list at startup means the station cannot classify
    /// anything, so the process must not proceed to listening.
    pub fn load(accept_path: impl AsRef<Path>, reject_path: impl AsRef<Path>) -> Result<Self> {
        let accept = Self::load_list(accept_path.as_ref())?;
        let reject = Self::load_list(reject_path.as_ref())?;
        info!(
            accept = accept.len(),
            reject = reject.len(),
            "reference lists loaded"
        );
        Ok(Self { accept, reject })
    }

    /// Build sets directly from iterators, for tests and embedding.
    pub fn from_entries<I, J, S>(accept: I, reject: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            accept: Self::fold_entries(accept),
            reject: Self::fold_entries(reject),
        }
    }

    fn fold_entries<S: AsRef<str>>(entries: impl IntoIterator<Item = S>) -> HashSet<String> {
        entries
            .into_iter()
            .map(|s| s.as_ref().trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn load_list(path: &Path) -> Result<HashSet<String>> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "cannot read reference list {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(raw
            .split(|c: char| c == '\n' || c == ',')
            .map(|entry| entry.trim().to_uppercase())
            .filter(|entry| !entry.is_empty())
            .collect())
    }

    /// Whether `code` is on the accept list.
    #[must_use]
    pub fn contains_accept(&self, code: &str) -> bool {
        self.accept.contains(code)
    }

    /// Whether `code` is on the reject list.
    #[must_use]
    pub fn contains_reject(&self, code: &str) -> bool {
        self.reject.contains(code)
    }

    /// Number of accept entries.
    #[must_use]
    pub fn accept_len(&self) -> usize {
        self.accept.len()
    }

    /// Number of reject entries.
    #[must_use]
    pub fn reject_len(&self) -> usize {
        self.reject.len()
    }
}
