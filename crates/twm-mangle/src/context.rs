use crate::allocator::{GeneratedName, NameAllocator};
use crate::inventory::TokenInventory;
use crate::mapping::{MappingCallback, MappingPlan, MappingRecord};
use std::borrow::Cow;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

/// Original token to generated name, fixed once the [`MangleContext`] is built.
#[derive(Clone, Debug, Default)]
pub struct ReplaceMap {
    map: HashMap<String, String>,
}

impl ReplaceMap {
    fn from_allocator(allocator: &NameAllocator) -> Self {
        Self {
            map: allocator
                .iter()
                .map(|(token, generated)| (token.to_owned(), generated.name.clone()))
                .collect(),
        }
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.map.get(token).map(String::as_str)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.map.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map
            .iter()
            .map(|(token, name)| (token.as_str(), name.as_str()))
    }

    /// Replace every mapped class token in `text`, in a single left-to-right pass.
    ///
    /// Tokens are the maximal runs between whitespace, quotes and the ends of the input; only a
    /// whole run that is mapped gets replaced, so `p-1` never matches inside `p-10` or `sp-1`.
    /// Replacement output is never rescanned.
    pub fn substitute<'t>(&self, text: &'t str) -> Cow<'t, str> {
        if self.map.is_empty() {
            return Cow::Borrowed(text);
        }

        let mut out: Option<String> = None;
        let mut copied = 0;
        for (start, end) in token_spans(text) {
            if let Some(name) = self.map.get(&text[start..end]) {
                let buf = out.get_or_insert_with(|| String::with_capacity(text.len()));
                buf.push_str(&text[copied..start]);
                buf.push_str(name);
                copied = end;
            }
        }

        match out {
            Some(mut buf) => {
                buf.push_str(&text[copied..]);
                Cow::Owned(buf)
            }
            None => Cow::Borrowed(text),
        }
    }
}

fn is_token_boundary(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '"' | '\'' | '`')
}

/// Byte ranges of the class-token candidates in `text`.
fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (idx, ch) in text.char_indices() {
        if is_token_boundary(ch) {
            if let Some(begin) = start.take() {
                spans.push((begin, idx));
            }
        } else if start.is_none() {
            start = Some(idx);
        }
    }
    if let Some(begin) = start {
        spans.push((begin, text.len()));
    }
    spans
}

/// Outcome of a mapping report dump. Failures are logged, never returned as errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DumpStatus {
    Skipped,
    Written { records: usize },
    Failed,
}

/// A token inventory turned into a ready-to-use [`ReplaceMap`], plus usage bookkeeping.
#[derive(Debug)]
pub struct MangleContext {
    allocator: NameAllocator,
    replace_map: ReplaceMap,
}

impl MangleContext {
    /// Allocate names for every eligible token, longest token first.
    ///
    /// A token is skipped when the allocator rejects its name, or when every file it was
    /// attributed to is filtered out. Unattributed tokens are always considered.
    pub fn new(mut allocator: NameAllocator, inventory: &TokenInventory) -> Self {
        let eligible = inventory.retain_files(|file| allocator.is_file_included(file));
        let mut skipped = inventory.len() - eligible.len();
        for token in eligible.sorted_by_length() {
            if !allocator.should_mangle(token) {
                skipped += 1;
                continue;
            }

            allocator.generate(token);
            for file in eligible.files_of(token) {
                allocator.record_usage(token, file);
            }
        }

        let replace_map = ReplaceMap::from_allocator(&allocator);
        tracing::debug!(
            target: "twm.mangle",
            candidates = inventory.len(),
            mangled = replace_map.len(),
            skipped,
            "mangle context initialised"
        );

        Self {
            allocator,
            replace_map,
        }
    }

    pub fn replace_map(&self) -> &ReplaceMap {
        &self.replace_map
    }

    pub fn allocator(&self) -> &NameAllocator {
        &self.allocator
    }

    pub fn get(&self, token: &str) -> Option<&GeneratedName> {
        self.allocator.get(token)
    }

    pub fn transform_if_mapped<'a>(&'a self, raw: &'a str) -> &'a str {
        self.allocator.transform_if_mapped(raw)
    }

    /// Attribute `token` to `file`; a no-op for unmapped tokens or a missing file id.
    pub fn record_usage(&mut self, token: &str, file: Option<&str>) {
        if let Some(file) = file {
            self.allocator.record_usage(token, file);
        }
    }

    /// Mapping report rows in allocation order.
    pub fn records(&self) -> Vec<MappingRecord> {
        self.allocator
            .iter()
            .map(|(token, generated)| MappingRecord {
                original: token.to_owned(),
                mangled: generated.name.clone(),
                used_by: generated.used_by.iter().cloned().collect(),
            })
            .collect()
    }

    /// Emit the mapping report. Async callbacks need [`dump_async`](Self::dump_async).
    pub fn dump(&self, plan: &MappingPlan) -> DumpStatus {
        match plan {
            MappingPlan::Disabled => DumpStatus::Skipped,
            MappingPlan::File(path) => {
                let records = self.records();
                let outcome = encode_records(&records).and_then(|bytes| {
                    twm_cache::atomic_write(path, &bytes).map_err(anyhow::Error::from)
                });
                file_status(path, records.len(), outcome)
            }
            MappingPlan::Callback(MappingCallback::Sync(callback)) => {
                let records = self.records();
                let outcome = catch_unwind(AssertUnwindSafe(|| callback(&records)));
                callback_status(records.len(), flatten_panic(outcome))
            }
            MappingPlan::Callback(MappingCallback::Async(_)) => {
                tracing::warn!(
                    target: "twm.mangle",
                    "async mapping callback cannot run from a synchronous dump; use dump_async"
                );
                DumpStatus::Failed
            }
        }
    }

    pub async fn dump_async(&self, plan: &MappingPlan) -> DumpStatus {
        match plan {
            MappingPlan::Callback(MappingCallback::Async(callback)) => {
                let records = self.records();
                let count = records.len();
                let outcome = match tokio::spawn(callback(records)).await {
                    Ok(result) => result,
                    Err(err) => Err(anyhow::anyhow!("mapping callback panicked: {err}")),
                };
                callback_status(count, outcome)
            }
            MappingPlan::File(path) => {
                let records = self.records();
                let outcome = match encode_records(&records) {
                    Ok(bytes) => twm_cache::atomic_write_async(path, &bytes)
                        .await
                        .map_err(anyhow::Error::from),
                    Err(err) => Err(err),
                };
                file_status(path, records.len(), outcome)
            }
            _ => self.dump(plan),
        }
    }
}

fn encode_records(records: &[MappingRecord]) -> anyhow::Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(records)?)
}

fn flatten_panic(
    outcome: std::thread::Result<anyhow::Result<()>>,
) -> anyhow::Result<()> {
    match outcome {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_owned());
            Err(anyhow::anyhow!("mapping callback panicked: {message}"))
        }
    }
}

fn file_status(path: &Path, records: usize, outcome: anyhow::Result<()>) -> DumpStatus {
    match outcome {
        Ok(()) => {
            tracing::debug!(
                target: "twm.mangle",
                path = %path.display(),
                records,
                "wrote mapping report"
            );
            DumpStatus::Written { records }
        }
        Err(err) => {
            tracing::warn!(
                target: "twm.mangle",
                path = %path.display(),
                error = %format_args!("{err:#}"),
                "failed to write mapping report"
            );
            DumpStatus::Failed
        }
    }
}

fn callback_status(records: usize, outcome: anyhow::Result<()>) -> DumpStatus {
    match outcome {
        Ok(()) => DumpStatus::Written { records },
        Err(err) => {
            tracing::warn!(
                target: "twm.mangle",
                error = %format_args!("{err:#}"),
                "mapping callback failed"
            );
            DumpStatus::Failed
        }
    }
}
