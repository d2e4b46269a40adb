use tracing::info;

use crate::action::Action;
use crate::error::DeployError;
use crate::resolve::ImageResolver;

use super::{Target, Transition};

/// Builds the transition for `rollback`.
///
/// With `--image` the fleet is rolled forward to that image like any update.
/// Without it every replica swaps back to its own retained backup, which
/// avoids a registry pull but lets replicas briefly disagree on what they
/// run; the ledger records the resolved previous image as the target.
pub fn select(
    resolver: &ImageResolver<'_>,
    environment: &str,
    explicit: Option<&str>,
) -> Result<Transition, DeployError> {
    let image = resolver.resolve(environment, Action::Rollback, explicit)?;

    let target = match explicit {
        Some(_) => Target::Image(image),
        None => Target::LocalBackups { nominal: image },
    };

    info!(
        "Rollback target for {}: {:?}",
        environment, target
    );

    Ok(Transition {
        environment: environment.to_string(),
        target,
        action: Action::Rollback,
    })
}
