//! Sources backed by the birdwatcher JSON API in front of BIRD

pub mod client;
pub mod multi_table;
pub mod parsers;
pub mod types;

pub use client::{Client, HttpTransport, Transport};
pub use multi_table::{MultiTableBirdwatcher, ALL_ROUTES_KEY};
