pub mod backend;
pub mod catalog;
pub mod chat;
pub mod classifier;
pub mod config;
pub mod conversation;
pub mod interaction_log;
pub mod persona;
pub mod session;
pub mod web_server;
