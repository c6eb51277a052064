use crate::error::MangleError;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::io;
use std::path::Path;

/// Candidate class tokens, each with the files it was extracted from.
///
/// Tokens loaded from a cache or an inventory file carry no attribution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenInventory {
    tokens: IndexMap<String, BTreeSet<String>>,
}

impl TokenInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `token`, optionally attributed to `file`.
    pub fn insert(&mut self, token: impl Into<String>, file: Option<&str>) {
        let files = self.tokens.entry(token.into()).or_default();
        if let Some(file) = file.filter(|file| !file.is_empty()) {
            files.insert(file.to_owned());
        }
    }

    /// Record every token of one source file.
    pub fn extend_file<I, S>(&mut self, file: &str, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for token in tokens {
            self.insert(token, Some(file));
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains_key(token)
    }

    /// Tokens in first-seen order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.tokens.keys().map(String::as_str)
    }

    /// Files `token` was extracted from; empty when unattributed.
    pub fn files_of(&self, token: &str) -> impl Iterator<Item = &str> {
        self.tokens
            .get(token)
            .into_iter()
            .flat_map(|files| files.iter().map(String::as_str))
    }

    /// Drop attributions to files rejected by `keep`, and tokens left with none.
    ///
    /// Unattributed tokens are kept. The result is the token set a cache entry must hold for a
    /// later hit to allocate exactly what this run allocates.
    pub fn retain_files(&self, keep: impl Fn(&str) -> bool) -> Self {
        let mut retained = Self::new();
        for (token, files) in &self.tokens {
            if files.is_empty() {
                retained.insert(token.as_str(), None);
                continue;
            }
            let kept: BTreeSet<String> = files
                .iter()
                .filter(|file| keep(file.as_str()))
                .cloned()
                .collect();
            if !kept.is_empty() {
                retained.tokens.insert(token.clone(), kept);
            }
        }
        retained
    }

    /// Tokens by descending length, ties broken lexicographically. This is allocation order.
    pub fn sorted_by_length(&self) -> Vec<&str> {
        let mut sorted: Vec<&str> = self.tokens().collect();
        sorted.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        sorted
    }

    /// Read a JSON array of tokens. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>, MangleError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let tokens: Vec<String> =
            serde_json::from_slice(&bytes).map_err(|err| MangleError::Inventory {
                path: path.to_path_buf(),
                message: format!(
                    "expected a JSON array of strings (line {} column {})",
                    err.line(),
                    err.column()
                ),
            })?;
        Ok(Some(tokens.into_iter().collect()))
    }

    /// Write the tokens as a JSON array, atomically.
    pub fn save(&self, path: &Path) -> Result<(), MangleError> {
        let tokens: Vec<&str> = self.tokens().collect();
        let bytes = serde_json::to_vec_pretty(&tokens).map_err(|err| MangleError::Inventory {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        twm_cache::atomic_write(path, &bytes)?;
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for TokenInventory {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut inventory = Self::new();
        for token in iter {
            inventory.insert(token, None);
        }
        inventory
    }
}
