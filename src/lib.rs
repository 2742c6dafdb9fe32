//! # Fabric SQL MCP Server
//!
//! A Model Context Protocol (MCP) server that answers natural-language
//! questions against Microsoft Fabric and Azure SQL endpoints.
//!
//! This crate provides:
//! - **Schema discovery**: tables, columns, keys and relationships from `INFORMATION_SCHEMA`
//! - **Schema caching**: one snapshot per configured server/database
//! - **SQL generation**: schema-grounded prompts for a chat-completions model
//! - **Tools**: the six assistant operations exposed over stdio
//!
//! ## Architecture
//!
//! The assistant core (schema model, discovery, cache, relevance matching,
//! prompt rendering and the SQL lint) talks to its collaborators through
//! traits: [`database::QueryRunner`], [`database::TokenProvider`] and
//! [`oracle::TextOracle`].

pub mod assistant;
pub mod cache;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod fallback;
pub mod handlers;
pub mod lint;
pub mod oracle;
pub mod prompts;
pub mod schema;
pub mod security;
pub mod server;
pub mod state;
pub mod tools;

pub use assistant::Assistant;
pub use config::Config;
pub use error::ServerError;
pub use server::FabricSqlServer;
