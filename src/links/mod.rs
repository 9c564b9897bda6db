pub mod extract;
pub mod pattern;
