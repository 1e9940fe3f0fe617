extern crate serde;

#[macro_use]
extern crate serde_derive;

pub mod events;
pub mod names;
mod records;
mod updates;

pub use records::*;
pub use updates::*;

/// Hash value the node reports for an anchor block that confirms no
/// microblock stream.
pub const EMPTY_MICROBLOCK_HASH: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";
