pub mod errors;
pub mod model;
mod reader;
pub mod sources;

pub use errors::ParserError;
pub use model::{ColumnKind, ParsedExport};
pub use reader::{infer_kind, parse_export, read_export_file};
pub use sources::{builtin_sources, SourceDefinition, PRIMARY_SOURCE};
