//! Utility-class name mangling.
//!
//! A [`NameAllocator`] hands out short, collision-free names (`tw-a`, `tw-b`, ..) for the class
//! tokens of a project. [`MangleContext`] runs the allocator over a [`TokenInventory`] once,
//! longest token first, and exposes the frozen [`ReplaceMap`] used to rewrite markup, scripts
//! and stylesheets. [`pipeline::prepare`] wires this to the fingerprinted token cache from
//! `twm-cache` so unchanged projects skip re-extraction.

mod allocator;
mod context;
mod error;
mod escape;
mod inventory;
mod mapping;
pub mod pipeline;
mod upstream;

pub use allocator::{
    short_name, AllocatorOptions, CustomGenerator, GeneratedName, GeneratorContext, NameAllocator,
};
pub use context::{DumpStatus, MangleContext, ReplaceMap};
pub use error::{MangleError, Result};
pub use escape::strip_escapes;
pub use inventory::TokenInventory;
pub use mapping::{
    BoxFuture, MappingCallback, MappingOutput, MappingPlan, MappingRecord, DEFAULT_MAPPING_FILE,
};
pub use pipeline::{
    prepare, prepare_with_allocator, ClassExtractor, PipelineInputs, Prepared, TokenSource,
};
pub use upstream::UpstreamPackage;
