pub mod document;
pub mod markdown;
pub mod outline;
pub mod position;
pub mod source_map;
