//! Document link rewriting: UTM tagging of existing links and item-number hyperlinking.

pub mod engine;
pub mod utm;
