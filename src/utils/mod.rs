//! Utility functions for ryt-cipher

pub mod cache;
pub mod url;

pub use self::cache::*;
pub use self::url::*;
