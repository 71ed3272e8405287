//! On-disk state for the relay. Only configuration for now; users live in
//! the config file and in memory.

pub mod config;
