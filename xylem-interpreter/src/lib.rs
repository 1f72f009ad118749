pub mod arena;
pub mod axis;
pub mod compile;
pub mod context;
pub mod error;
pub mod eval;
mod library;
pub mod modules;
pub mod regex;
pub mod schema;
pub mod sequence_type;
pub mod value;
pub mod xml;

pub use compile::{resolve_uri, CompiledXQuery, FeatureFlags, HostEnvironment, NullHost};
pub use error::{Error, ErrorCode, Result};
pub use eval::{CallbackAction, Evaluator, SearchOutcome};
pub use value::{format_double, parse_double, MapKey, NodeSet, ValueType, XPathArray, XPathMap, XPathVal};
