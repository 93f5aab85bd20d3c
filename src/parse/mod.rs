pub mod braces;
pub mod split;
pub mod tokenize;
pub mod types;

pub use braces::expand_braces;
pub use split::{split_chains, split_groups, split_pipeline};
pub use tokenize::{Quoting, Token, is_operator, split_words, tokenize};
pub use types::{
    Chain, Connector, ErrorTarget, Group, Operator, OutputTarget, RedirectKind, Redirections,
    Stage,
};
