//! Picshare - view-model and data access for a photo-sharing app
//!
//! This library holds the client-side logic of a photo-sharing application:
//! accounts, profiles, posts with likes and search, follow-based feeds and
//! comments, over a pluggable remote gateway.

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod mappers;
pub mod navigation;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{PicshareError, Result};
pub use navigation::{NavArgStore, Route};
pub use service::PicshareService;
pub use types::{Comment, Post, User};
