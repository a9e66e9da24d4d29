//! Player script access and signature resolution

pub mod cipher;
pub mod client;
pub mod script_store;

pub use cipher::*;
pub use client::*;
pub use script_store::*;
