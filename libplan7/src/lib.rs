pub mod align;
pub mod alphabet;
pub mod config;
pub mod dispatch;
pub mod pipeline;
pub mod structs;
pub mod util;

#[cfg(test)]
pub(crate) mod fixtures;
