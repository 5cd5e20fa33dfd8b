//! # Infrastructure Layer
//!
//! Adapters for external systems.
//! Implements the chat traits defined in the Domain layer.

pub mod matrix;
