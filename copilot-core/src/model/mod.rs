pub mod entry;
pub mod project;
pub mod record;
