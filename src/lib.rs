pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod manifest;
pub mod reference;
pub mod registry;
pub mod service;
pub mod swarm;
pub mod transport;

pub use client::Client;
pub use error::{ClientError, Result};
pub use service::{ServiceCreateError, ServiceSubmitter};
pub use swarm::{ServiceCreateOptions, ServiceCreateResponse, ServiceSpec};
