//! Conventional action constants shared by grammars and tests.
//!
//! Grammars are free to define their own [`Action`] values; this set only
//! provides a common vocabulary so independent grammars and formatters can
//! agree on the usual categories.

use super::Action;

pub const TEXT: Action = Action::new("Text");
pub const WHITESPACE: Action = Action::new("Whitespace");
pub const KEYWORD: Action = Action::new("Keyword");
pub const NAME: Action = Action::new("Name");
pub const LITERAL: Action = Action::new("Literal");
pub const NUMBER: Action = Action::new("Number");
pub const STRING: Action = Action::new("String");
pub const COMMENT: Action = Action::new("Comment");
pub const DELIMITER: Action = Action::new("Delimiter");
pub const OPERATOR: Action = Action::new("Operator");
pub const ESCAPE: Action = Action::new("Escape");
pub const ERROR: Action = Action::new("Error");
