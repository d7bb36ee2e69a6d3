//! CLI command implementations

mod each;

pub use each::EachCommand;
