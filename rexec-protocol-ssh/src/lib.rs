mod client;
mod common;
mod keys;
mod request;
mod server;
pub mod terminal_modes;

pub use client::*;
pub use common::*;
pub use keys::*;
pub use request::*;
pub use server::*;
