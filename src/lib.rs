#![doc = include_str!("../README.md")]

pub mod analytics;
pub mod logger;
pub mod platform;

#[cfg(test)]
pub(crate) mod test_support;
