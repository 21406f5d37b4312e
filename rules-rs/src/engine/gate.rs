//! Out-of-Office eligibility gate
//!
//! Decides, per incoming message, whether a rule may be evaluated given the
//! mailbox's OOF state at evaluation time. The extension bits are honored
//! only when the corresponding capability is enabled in configuration.

use crate::config::ProcessingConfig;
use crate::rules::types::RuleState;

/// Whether the rule is an Out-of-Office rule under the active configuration.
pub fn is_oof_rule(state: RuleState, config: &ProcessingConfig) -> bool {
    state.contains(RuleState::ONLY_WHEN_OOF)
        || (config.alias_only_when_oof && state.contains(RuleState::ALIAS_ONLY_WHEN_OOF))
}

/// Whether a rule is eligible for evaluation given the current OOF state.
///
/// | rule flags                         | OOF off | OOF on |
/// |------------------------------------|---------|--------|
/// | neither OOF flag                   | yes     | yes    |
/// | only-when-OOF                      | no      | yes    |
/// | only-when-OOF + disable extension  | no      | no     |
pub fn is_eligible(state: RuleState, oof_enabled: bool, config: &ProcessingConfig) -> bool {
    if !is_oof_rule(state, config) {
        return true;
    }
    if !oof_enabled {
        return false;
    }
    !(config.honor_disable_oof_bit && state.contains(RuleState::DISABLE_SPECIFIC_OOF_RULE))
}
