pub mod decode;
pub mod output;
pub mod payload;
pub mod pdf;
