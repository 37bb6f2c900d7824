//! Data-producing modules and their capability interface.
//!
//! A module owns one or more elements in the renderer's arena (held by
//! id), refreshes their content in `update`, and reacts to dispatched
//! clicks in `handle_event`. Update pacing is composed, not inherited:
//! every module embeds a [`Cadence`] value the scheduler consults.

pub mod battery;
pub mod clock;

use std::time::Instant;

use crate::element::{Dispatch, ElementSet};
use crate::error::Error;

pub use battery::BatteryModule;
pub use clock::ClockModule;

/// What a module wants done after handling a click.
#[derive(Debug, Clone, Copy)]
pub struct EventResponse {
    /// Refresh content right away.
    pub update: bool,
    /// Repaint the bar once routing finishes.
    pub render: bool,
}

impl Default for EventResponse {
    fn default() -> Self {
        Self { update: true, render: true }
    }
}

/// Update-pacing bookkeeping owned by each module.
#[derive(Debug, Clone)]
pub struct Cadence {
    update_per_iteration: bool,
    seconds_per_update: u64,
    auto_update: bool,
    needs_update: bool,
    last_update: Option<Instant>,
}

impl Cadence {
    /// Refresh on every scheduler wake-up.
    pub fn every_iteration() -> Self {
        Self {
            update_per_iteration: true,
            seconds_per_update: 1,
            auto_update: true,
            needs_update: true,
            last_update: None,
        }
    }

    /// Refresh at most once per `seconds`.
    pub fn every_seconds(seconds: u64) -> Self {
        Self {
            update_per_iteration: false,
            seconds_per_update: seconds,
            auto_update: true,
            needs_update: true,
            last_update: None,
        }
    }

    pub fn should_update(&self, now: Instant) -> bool {
        if !self.auto_update {
            return false;
        }
        if self.needs_update || self.update_per_iteration {
            return true;
        }
        match self.last_update {
            None => true,
            Some(last) => now.duration_since(last).as_secs() >= self.seconds_per_update,
        }
    }

    pub fn mark_for_update(&mut self) {
        self.needs_update = true;
    }

    pub fn mark_updated(&mut self, now: Instant) {
        self.needs_update = false;
        self.last_update = Some(now);
    }

    pub fn set_seconds_per_update(&mut self, seconds: u64) {
        self.seconds_per_update = seconds;
    }

    pub fn set_auto_update(&mut self, enabled: bool) {
        self.auto_update = enabled;
    }
}

/// Capability interface every module implements. `update` is mandatory;
/// the rest defaults.
pub trait Module {
    fn name(&self) -> &'static str;

    /// The module's pacing state, consulted and advanced by the scheduler.
    fn cadence_mut(&mut self) -> &mut Cadence;

    /// One-time setup: create the module's elements in the arena and keep
    /// their ids.
    fn initialize(&mut self, _elements: &mut ElementSet) -> Result<(), Error> {
        Ok(())
    }

    /// Refresh element content. Runs on the scheduler's cadence and after
    /// clicks that request it.
    fn update(&mut self, elements: &mut ElementSet);

    /// React to a click or scroll dispatched to one of this module's
    /// elements.
    fn handle_event(&mut self, _elements: &mut ElementSet, _event: &Dispatch) -> EventResponse {
        EventResponse::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fresh_cadence_wants_an_update() {
        let cadence = Cadence::every_seconds(60);
        assert!(cadence.should_update(Instant::now()));
    }

    #[test]
    fn interval_gates_until_elapsed() {
        let mut cadence = Cadence::every_seconds(5);
        let now = Instant::now();
        cadence.mark_updated(now);

        assert!(!cadence.should_update(now + Duration::from_secs(1)));
        assert!(cadence.should_update(now + Duration::from_secs(5)));
    }

    #[test]
    fn forced_update_overrides_the_interval() {
        let mut cadence = Cadence::every_seconds(60);
        let now = Instant::now();
        cadence.mark_updated(now);

        cadence.mark_for_update();
        assert!(cadence.should_update(now));

        cadence.mark_updated(now);
        assert!(!cadence.should_update(now));
    }

    #[test]
    fn auto_update_master_switch_wins() {
        let mut cadence = Cadence::every_iteration();
        cadence.set_auto_update(false);
        assert!(!cadence.should_update(Instant::now()));
    }
}
