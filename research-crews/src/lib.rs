//! research-crews: multi-agent research runs with push and database delivery.
//!
//! A crew is a list of agents (role, goal, tools) and the tasks they work on
//! in order. The components here are what the agents' tools call into:
//! - Notification dispatch over Pushover, chunked to the 1024-char limit
//! - Research record store on SQLite or remote libSQL (Turso)
//! - Web search via Serper

pub mod chunk;
pub mod config;
pub mod crew;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod notify;
pub mod schema;
pub mod search;
pub mod store;
pub mod tools;
