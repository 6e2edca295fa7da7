//! Message channel between the controller and the rendering context

pub mod link;
pub mod protocol;
pub mod transport;
