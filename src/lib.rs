//! tutor: terminal client for the CCNA tutor backend
//!
//! This library provides:
//! - Mode-aware routing of questions to the backend's models
//! - The active conversation with windowed history and progressive reveal
//! - Session persistence in a single JSON file
//! - An HTTP client for the tutor inference service

pub mod config;
pub mod core;
pub mod llm;
pub mod services;
pub mod storage;
pub mod transport;

pub use config::Config;
pub use services::ChatService;
pub use storage::{ChatSession, JsonSessionStore};
