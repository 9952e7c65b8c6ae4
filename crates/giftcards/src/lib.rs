//! Wildflower gift-card engine library.
//!
//! This crate provides the gift-card lifecycle and wallet ledger engine
//! as a library, allowing it to be tested and embedded. The binary in
//! `main.rs` wires it to `PostgreSQL` and serves the HTTP surface.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
