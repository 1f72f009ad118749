pub mod ast;
pub mod error;
pub mod parser;
pub mod prolog;

pub use ast::{
    AttributeValuePart, BinaryOperationKind, ConstructorAttribute, ConstructorInfo, GroupKeyInfo,
    LookupSpecifier, LookupSpecifierKind, MapEntry, NodeKind, OrderSpecOptions, TypeswitchCaseInfo,
    UnaryOperationKind, XPathNode,
};
pub use error::{ParseError, ParseErrors};
pub use parser::{parse_query, ParsedQuery, Parser};
pub use prolog::{
    BoundarySpace, ConstructionMode, CopyNamespaces, DecimalFormat, EmptyOrder, ExportValidation,
    ModuleImport, OrderingMode, Prolog, XQueryFunction, XQueryVariable,
};
