//! Dump Scrambler Core Library
//!
//! Describes, per table column, how a database dump should be scrambled,
//! and reconciles that description with the live schema.

pub mod adapter;
pub mod config;
pub mod domain;
pub mod env;
pub mod error;
pub mod schema;

pub use adapter::SchemaSource;
pub use config::Config;
pub use domain::{Column, Directive, ScrambleMethod, Table};
pub use env::{Env, ProcessEnv};
pub use error::{CoreError, Result};
pub use schema::StaticSchema;
