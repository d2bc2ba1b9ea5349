//! Transport layer for the terminal client

pub mod cli;

pub use cli::{ActiveReveal, ChatArgs, ChatCommand};
