use schemars::schema::RootSchema;
use schemars::schema_for;

use crate::TwmConfig;

/// JSON schema for `twm.toml`, for editor tooling and CI validation.
#[must_use]
pub fn json_schema() -> RootSchema {
    let mut schema = schema_for!(TwmConfig);
    let metadata = schema.schema.metadata();
    metadata.title = Some("twm.toml".to_owned());
    metadata.description =
        Some("Class mangling, token cache, and logging configuration.".to_owned());
    schema
}
