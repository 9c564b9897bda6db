pub mod check_links_tool;
pub mod find_items_tool;
pub mod input;
pub mod rewrite_links_tool;
