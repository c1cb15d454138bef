//! Shared bodies of the operator binaries; each `src/bin` file parses its
//! arguments and hands off to one of these.
pub mod embeddings;
pub mod import;
