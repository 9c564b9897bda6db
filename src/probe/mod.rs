pub mod classify;
pub mod headers;
pub mod prober;
