//! Provenance of the active fitting options.
//!
//! The state machine: `Unset → FromUpstream → UserOverride`, with
//! `UserOverride → UserOverride` on re-edits. Only `Unset` auto-adopts
//! options arriving with upstream data; after that, upstream arrivals are
//! recorded but ignored until an explicit reload, which re-adopts
//! unconditionally. Nothing returns to `Unset` short of a full node reset.

use crate::fit::options::FittingOptions;

/// Where the currently active options came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provenance {
    /// No options chosen yet; upstream options may be auto-adopted.
    #[default]
    Unset,
    /// Adopted from upstream data (automatically or via explicit reload).
    FromUpstream,
    /// Explicitly chosen or edited by the user.
    UserOverride,
}

/// The active options together with their provenance and the most recently
/// seen upstream options (kept so an explicit reload works even after the
/// user has overridden them).
#[derive(Debug, Clone, Default)]
pub struct OptionsState {
    current: Option<FittingOptions>,
    provenance: Provenance,
    upstream: Option<FittingOptions>,
}

impl OptionsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&FittingOptions> {
        self.current.as_ref()
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Remember the latest upstream-supplied options without touching the
    /// active ones.
    pub fn record_upstream(&mut self, options: FittingOptions) {
        self.upstream = Some(options);
    }

    /// Auto-adopt upstream options. Permitted only from `Unset`; from any
    /// other state this records them and returns `false`.
    pub fn try_adopt_upstream(&mut self, options: FittingOptions) -> bool {
        self.upstream = Some(options.clone());
        if self.provenance != Provenance::Unset {
            return false;
        }
        self.current = Some(options);
        self.provenance = Provenance::FromUpstream;
        true
    }

    /// Replace the active options with a user choice.
    pub fn set_user(&mut self, options: FittingOptions) {
        self.current = Some(options);
        self.provenance = Provenance::UserOverride;
    }

    /// Re-adopt the recorded upstream options unconditionally.
    ///
    /// Returns `false` when no upstream options have ever been seen.
    pub fn reload_upstream(&mut self) -> bool {
        match self.upstream.clone() {
            Some(options) => {
                self.current = Some(options);
                self.provenance = Provenance::FromUpstream;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::options::default_options;
    use crate::models::load_builtin_unit;

    fn options_for(name: &str) -> FittingOptions {
        let model = load_builtin_unit("generic")
            .unwrap()
            .into_iter()
            .find(|m| m.name() == name)
            .unwrap();
        default_options(&model)
    }

    #[test]
    fn only_unset_auto_adopts() {
        let mut state = OptionsState::new();
        assert_eq!(state.provenance(), Provenance::Unset);

        assert!(state.try_adopt_upstream(options_for("Linear")));
        assert_eq!(state.provenance(), Provenance::FromUpstream);

        // A second upstream arrival is recorded but not adopted.
        assert!(!state.try_adopt_upstream(options_for("Exponential")));
        assert_eq!(state.current().unwrap().model.name(), "Linear");
    }

    #[test]
    fn user_override_sticks_until_explicit_reload() {
        let mut state = OptionsState::new();
        assert!(state.try_adopt_upstream(options_for("Linear")));

        state.set_user(options_for("Quadratic"));
        assert_eq!(state.provenance(), Provenance::UserOverride);

        // Upstream keeps arriving with different content; active options
        // must not move.
        assert!(!state.try_adopt_upstream(options_for("Exponential")));
        assert_eq!(state.current().unwrap().model.name(), "Quadratic");

        // Explicit reload re-adopts the latest upstream options.
        assert!(state.reload_upstream());
        assert_eq!(state.provenance(), Provenance::FromUpstream);
        assert_eq!(state.current().unwrap().model.name(), "Exponential");
    }

    #[test]
    fn reload_without_upstream_is_a_no_op() {
        let mut state = OptionsState::new();
        assert!(!state.reload_upstream());
        assert!(state.current().is_none());

        state.set_user(options_for("Linear"));
        assert!(!state.reload_upstream());
        assert_eq!(state.provenance(), Provenance::UserOverride);
    }
}
