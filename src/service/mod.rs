//! Service layer for submitting swarm services
//!
//! This module holds the submission flow: validating a spec, pinning its
//! image to a registry digest, recording the platforms the image supports and
//! posting the result to the daemon.

pub mod create;
pub mod platform;

pub use create::{digest_warning, image_with_digest, ServiceCreateError, ServiceSubmitter};
pub use platform::update_service_platforms;
