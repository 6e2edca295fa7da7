//! Document synchronization and persistence engine for a source editor with
//! a live rendered preview.
//!
//! The [`app::DocumentController`] owns the document text. Renders flow to
//! an isolated preview through [`sync`], edits and cursor moves flow back,
//! and unsaved changes are shadowed into the [`store`], which is checked by
//! its integrity guard before anything reads it.

pub mod app;
pub mod config;
pub mod config_io;
pub mod model;
pub mod preview;
pub mod services;
pub mod store;
pub mod sync;
