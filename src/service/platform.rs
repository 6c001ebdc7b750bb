//! Platform annotation
//!
//! Records which platforms a service's image supports so the orchestrator
//! only schedules its tasks on compatible nodes.

use crate::manifest::DistributionInspect;
use crate::swarm::{Placement, Platform};

/// Append every platform reported for the image to `placement`, creating the
/// placement if the spec had none. Existing entries are kept, in order, and
/// nothing is de-duplicated.
pub fn update_service_platforms(
    placement: Option<Placement>,
    inspect: &DistributionInspect,
) -> Placement {
    let mut placement = placement.unwrap_or_default();
    placement
        .platforms
        .extend(inspect.platforms.iter().map(|p| Platform {
            architecture: p.architecture.clone(),
            os: p.os.clone(),
        }));
    placement
}
