//! Query-and-cache client for the Danish Parliament open data API (oda.ft.dk)
//!
//! The [`api`] module is the library proper; [`config`] and [`cli`] back the
//! `oda-cli` binary.

pub mod api;
pub mod cli;
pub mod config;
