#![deny(dead_code)]
#![deny(unused_imports)]

pub mod config;
pub mod data;
pub mod design;
pub mod estimate;
pub mod model;
pub mod pipeline;
pub mod schema;
pub mod store;
pub mod types;

#[cfg(test)]
mod test_fixtures;
