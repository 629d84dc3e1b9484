// Parsing: lenient HTML tree plus the headline extraction pass over it.

pub mod headline_parser;
pub mod tree;

pub use headline_parser::HeadlinePattern;
pub use tree::{ParsedTree, TreeNode};
