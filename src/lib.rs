//! Terminal map of pickup-sports venues.
//!
//! [`session::MapSession`] owns the single map canvas through
//! [`map::resource::MapResourceManager`], keeps venue markers in step with
//! the venue list and runs the drop-a-pin flow for adding venues. The
//! [`app`] and [`ui`] modules host it in a ratatui terminal.

pub mod app;
pub mod braille;
pub mod config;
pub mod data;
pub mod error;
pub mod geo;
pub mod map;
pub mod paths;
pub mod services;
pub mod session;
pub mod ui;
pub mod venue;

pub use error::{MapError, Result};
