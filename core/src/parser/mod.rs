//! Recursive-descent parser (spec.md §4.4 "Parser (C4)").

pub mod grammar;
pub mod tree;

pub use grammar::{parse_script, parse_script_path};
pub use tree::{ModList, ModUse, OpId, ParseEvent, ParseOperator, ParseTree, TimeSpec};
