use crate::error::MangleError;
use crate::escape::strip_escapes;
use globset::{Glob, GlobSet, GlobSetBuilder};
use indexmap::IndexMap;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use twm_config::MangleConfig;

const ALPHABET: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";

/// A short name assigned to one class token, plus the files it was seen in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedName {
    pub name: String,
    pub used_by: BTreeSet<String>,
}

/// Allocation settings. Patterns are compiled by [`NameAllocator::new`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocatorOptions {
    pub class_prefix: String,
    pub reserved: Vec<String>,
    pub reserved_patterns: Vec<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub class_name_pattern: Option<String>,
    pub ignore_class: Vec<String>,
    pub ignore_class_patterns: Vec<String>,
    pub verbose: bool,
}

impl AllocatorOptions {
    pub fn from_config(config: &MangleConfig) -> Self {
        Self {
            class_prefix: config.class_prefix.clone(),
            reserved: config.reserved.clone(),
            reserved_patterns: config.reserved_patterns.clone(),
            include: config.include.clone(),
            exclude: config.exclude.clone(),
            class_name_pattern: config.class_name_pattern.clone(),
            ignore_class: config.ignore_class.clone(),
            ignore_class_patterns: config.ignore_class_patterns.clone(),
            verbose: config.verbose,
        }
    }
}

impl Default for AllocatorOptions {
    fn default() -> Self {
        Self::from_config(&MangleConfig::default())
    }
}

/// Scratch state handed to a custom generator on every call; lives as long as the allocator.
#[derive(Clone, Debug, Default)]
pub struct GeneratorContext {
    /// Free-form counter for generators that enumerate their own names.
    pub counter: u64,
    /// Free-form memo table.
    pub memo: HashMap<String, String>,
}

/// Replaces the default enumeration. Returning `None` falls back to it.
///
/// Names returned here skip reservation checks; the generator owns their uniqueness.
pub type CustomGenerator =
    Box<dyn FnMut(&str, &AllocatorOptions, &mut GeneratorContext) -> Option<String> + Send>;

/// Deterministic, collision-free short-name assignment for class tokens.
pub struct NameAllocator {
    options: AllocatorOptions,
    reserved: HashSet<String>,
    reserved_patterns: Vec<Regex>,
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
    class_name_pattern: Option<Regex>,
    ignore_class: HashSet<String>,
    ignore_class_patterns: Vec<Regex>,
    generator: Option<CustomGenerator>,
    generator_context: GeneratorContext,
    map: IndexMap<String, GeneratedName>,
    taken: HashSet<String>,
    new_count: usize,
}

impl fmt::Debug for NameAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameAllocator")
            .field("options", &self.options)
            .field("custom_generator", &self.generator.is_some())
            .field("allocated", &self.map.len())
            .field("new_count", &self.new_count)
            .finish()
    }
}

impl NameAllocator {
    /// Compile `options`. Malformed globs or regexes fail here, not on first use.
    pub fn new(options: AllocatorOptions) -> Result<Self, MangleError> {
        Ok(Self {
            reserved: options.reserved.iter().cloned().collect(),
            reserved_patterns: compile_regexes("reserved_patterns", &options.reserved_patterns)?,
            include: compile_globs("include", &options.include)?,
            exclude: compile_globs("exclude", &options.exclude)?,
            class_name_pattern: options
                .class_name_pattern
                .as_deref()
                .map(|pattern| compile_regex("class_name_pattern", pattern))
                .transpose()?,
            ignore_class: options.ignore_class.iter().cloned().collect(),
            ignore_class_patterns: compile_regexes(
                "ignore_class_patterns",
                &options.ignore_class_patterns,
            )?,
            generator: None,
            generator_context: GeneratorContext::default(),
            map: IndexMap::new(),
            taken: HashSet::new(),
            new_count: 0,
            options,
        })
    }

    pub fn with_generator(
        options: AllocatorOptions,
        generator: CustomGenerator,
    ) -> Result<Self, MangleError> {
        let mut allocator = Self::new(options)?;
        allocator.generator = Some(generator);
        Ok(allocator)
    }

    pub fn options(&self) -> &AllocatorOptions {
        &self.options
    }

    /// Enumeration cursor: how many default candidates have been consumed, skipped ones included.
    pub fn new_count(&self) -> usize {
        self.new_count
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The name for `token`, allocating one on first sight.
    pub fn generate(&mut self, token: &str) -> &GeneratedName {
        if !self.map.contains_key(token) {
            let name = self.next_name(token);
            if self.options.verbose {
                tracing::debug!(target: "twm.mangle", original = token, mangled = %name, "allocated");
            }
            self.taken.insert(name.clone());
            self.map.insert(
                token.to_owned(),
                GeneratedName {
                    name,
                    used_by: BTreeSet::new(),
                },
            );
        }
        &self.map[token]
    }

    fn next_name(&mut self, token: &str) -> String {
        if let Some(generator) = self.generator.as_mut() {
            if let Some(name) = generator(token, &self.options, &mut self.generator_context) {
                return name;
            }
        }

        loop {
            let candidate = format!("{}{}", self.options.class_prefix, short_name(self.new_count));
            self.new_count += 1;
            if self.is_reserved(&candidate) {
                if self.options.verbose {
                    tracing::debug!(target: "twm.mangle", name = %candidate, "skipped reserved name");
                }
                continue;
            }
            // A custom generator may already have handed this name out.
            if self.taken.contains(&candidate) {
                continue;
            }
            return candidate;
        }
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name) || self.reserved_patterns.iter().any(|re| re.is_match(name))
    }

    /// `included(path) && !excluded(path)`. An empty include list includes everything.
    pub fn is_file_included(&self, path: &str) -> bool {
        let included = self.include.as_ref().map_or(true, |set| set.is_match(path));
        let excluded = self.exclude.as_ref().is_some_and(|set| set.is_match(path));
        included && !excluded
    }

    /// Whether `token` looks like a parameterised utility class.
    pub fn is_class_name(&self, token: &str) -> bool {
        match &self.class_name_pattern {
            Some(re) => re.is_match(token),
            None => token.contains('-') || token.contains(':'),
        }
    }

    /// Tokens that must keep their original name.
    pub fn is_ignored(&self, token: &str) -> bool {
        self.ignore_class.contains(token)
            || self.ignore_class_patterns.iter().any(|re| re.is_match(token))
    }

    pub fn should_mangle(&self, token: &str) -> bool {
        self.is_class_name(token) && !self.is_ignored(token)
    }

    pub fn get(&self, token: &str) -> Option<&GeneratedName> {
        self.map.get(token)
    }

    /// Generated name for a possibly escaped identifier, or the input when unmapped.
    pub fn transform_if_mapped<'a>(&'a self, raw: &'a str) -> &'a str {
        match self.map.get(strip_escapes(raw).as_ref()) {
            Some(generated) => &generated.name,
            None => raw,
        }
    }

    /// Attribute `token` to `file`. Unallocated tokens and empty file ids are ignored.
    pub fn record_usage(&mut self, token: &str, file: &str) {
        if file.is_empty() {
            return;
        }
        if let Some(generated) = self.map.get_mut(token) {
            generated.used_by.insert(file.to_owned());
        }
    }

    /// Allocations in the order they were made.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &GeneratedName)> {
        self.map.iter().map(|(token, generated)| (token.as_str(), generated))
    }
}

/// The `n`th default short name: `a`..`z`, then `aa`, `ba`, .. `za`, `ab`, .. `zz`, `aaa`, ...
///
/// The first letter cycles fastest; the remaining letters are the bijective base-26 digits of
/// `n / 26`, least significant first. Every length is exhausted before the next one starts.
pub fn short_name(n: usize) -> String {
    let mut out = String::new();
    out.push(ALPHABET[n % 26] as char);
    let mut rest = n / 26;
    while rest > 0 {
        rest -= 1;
        out.push(ALPHABET[rest % 26] as char);
        rest /= 26;
    }
    out
}

fn compile_regex(kind: &'static str, pattern: &str) -> Result<Regex, MangleError> {
    Regex::new(pattern).map_err(|err| MangleError::InvalidPattern {
        kind,
        pattern: pattern.to_owned(),
        message: err.to_string(),
    })
}

fn compile_regexes(kind: &'static str, patterns: &[String]) -> Result<Vec<Regex>, MangleError> {
    patterns
        .iter()
        .map(|pattern| compile_regex(kind, pattern))
        .collect()
}

fn compile_globs(kind: &'static str, patterns: &[String]) -> Result<Option<GlobSet>, MangleError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|err| MangleError::InvalidPattern {
            kind,
            pattern: pattern.clone(),
            message: err.to_string(),
        })?;
        builder.add(glob);
    }
    let set = builder.build().map_err(|err| MangleError::InvalidPattern {
        kind,
        pattern: patterns.join(", "),
        message: err.to_string(),
    })?;
    Ok(Some(set))
}
