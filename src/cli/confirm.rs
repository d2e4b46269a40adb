use dialoguer::Confirm;

use crate::action::Action;
use crate::config::PRODUCTION;
use crate::error::DeployError;

pub fn needs_confirmation(environment: &str, action: Action, assume_yes: bool) -> bool {
    environment == PRODUCTION && action.is_destructive() && !assume_yes
}

/// Asks before destructive actions against production. Declining, or having
/// no terminal to ask on, aborts before anything runs.
pub fn confirm(environment: &str, action: Action, assume_yes: bool) -> Result<(), DeployError> {
    if !needs_confirmation(environment, action, assume_yes) {
        return Ok(());
    }

    let required = || DeployError::ConfirmationRequired {
        environment: environment.to_string(),
        action: action.to_string(),
    };

    if !console::Term::stderr().is_term() {
        return Err(required());
    }

    let confirmed = Confirm::new()
        .with_prompt(format!("Run '{}' against {}?", action, environment))
        .default(false)
        .interact()
        .map_err(|_| required())?;

    if confirmed {
        Ok(())
    } else {
        Err(required())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_destructive_production_actions_ask() {
        assert!(needs_confirmation("prod", Action::Destroy, false));
        assert!(needs_confirmation("prod", Action::Rollback, false));
        assert!(needs_confirmation("prod", Action::Apply, false));
        assert!(!needs_confirmation("prod", Action::Plan, false));
        assert!(!needs_confirmation("prod", Action::Destroy, true));
        assert!(!needs_confirmation("dev", Action::Destroy, false));
    }

    #[test]
    fn non_destructive_actions_pass_without_prompt() {
        assert!(confirm("prod", Action::Plan, false).is_ok());
        assert!(confirm("staging", Action::Destroy, false).is_ok());
    }
}
