//! # API Layer
//!
//! HTTP adapter for the identity façade (spec.md §6). `routes` wires URL
//! patterns to `handlers`; `handlers` validate via `dto` and delegate to
//! the composed engine services in [`crate::AppState`].

pub mod dto;
pub mod handlers;
pub mod routes;
