//! Baton Core
//!
//! Core types shared by the Baton server client and the worker runtime.
//!
//! This crate contains:
//! - Domain types: tasks leased from the server and the results reported back
//! - DTOs: request shapes used when talking to the server
pub mod domain;
pub mod dto;
