//! MEW Parser
//!
//! Lexes and parses MEW source text into the typed AST the kernel consumes.
//! Two entry surfaces exist: runtime statements (`parse_stmt`, `parse_stmts`)
//! and ontology declarations (`parse_ontology`).

mod ast;
mod display;
mod error;
mod lexer;
mod parser;

pub use ast::*;
pub use display::{render_expr, render_ontology_items};
pub use error::{ParseError, ParseResult};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::{parse_ontology, parse_stmt, parse_stmts};
