pub mod client;

pub use client::{
    ClientConfig, ConfigError, ScanClient, ScanClientFactory, SeedCookie, TransportError,
};
