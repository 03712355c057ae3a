//! anychat: a terminal client for AnythingLLM workspaces.

pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod exchange;
pub mod llm;
pub mod logging;
pub mod session;
pub mod storage;
pub mod streaming;
pub mod ui;
