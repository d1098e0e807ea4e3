pub mod logging;
pub mod tree;
