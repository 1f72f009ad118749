mod host;
mod query;

pub use host::{read_query_file, FsHost};
pub use query::{RegisteredFunction, XQuery};

pub use xylem_interpreter::value::ValueType;
pub use xylem_interpreter::xml::{parse_document, Document, NodeEntry};
pub use xylem_interpreter::{
    CallbackAction, CompiledXQuery, Error, ErrorCode, FeatureFlags, HostEnvironment, Result,
    SearchOutcome, XPathVal,
};
