//! Syntax model for the Alchemy language.
//!
//! The parser materializes every node into a single densely-packed array
//! addressed by 16-bit indices (index 0 is reserved for "absent"). The
//! semantic crates only ever read that array; walking it is a matter of
//! following `next` indices and tag-switching on [`NodeKind`].

pub mod lexer;
pub mod node;
pub mod nodes;
pub mod parser;
pub mod parse_types;
pub mod tree;

pub use node::{NodeIndex, RawNodeIndex, TokenRange};
pub use nodes::{AstNode, NodeData, NodeKind};
pub use parse_types::{
    AssignmentOp, BinaryOp, BuiltInType, LiteralData, Modifiers, PassBy, StorageClass, UnaryOp,
};
pub use parser::{AlchemyParser, ParseError, ParseResult, SourceParser};
pub use tree::{LineColumn, SyntaxTree};
