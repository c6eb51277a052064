mod discovery;
mod schema;
