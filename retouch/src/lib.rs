pub mod action;
pub mod fallback;
pub mod models;

pub use action::{validate, Action, ActionKind};
pub use fallback::simple_parse;
