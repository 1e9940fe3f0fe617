extern crate serde;

#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate serde_json;

pub use stacks_ingest_types as types;

pub mod bns;
#[cfg(feature = "cli")]
pub mod cli;
pub mod codec;
pub mod config;
pub mod ingestion;
pub mod observer;
pub mod store;
pub mod tsv;
pub mod utils;
