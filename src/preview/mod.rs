//! The rendering side of the sync channel: an isolated surface that parses
//! rendered HTML, indexes its line tags and reports user activity back

pub mod dom;
pub mod host;
pub mod surface;
pub mod translator;
