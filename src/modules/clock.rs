//! Clock module: one right-aligned element. A left click toggles between
//! date+time (refreshed every second) and date only (every minute).

use chrono::Local;

use crate::element::{Alignment, BarElement, Dispatch, ElementId, ElementSet, EventMask, InputKind};
use crate::error::Error;
use crate::modules::{Cadence, EventResponse, Module};

const MODULE_NAME: &str = "clock";

pub struct ClockModule {
    cadence: Cadence,
    element: Option<ElementId>,
    show_time: bool,
}

impl ClockModule {
    pub fn new() -> Self {
        Self { cadence: Cadence::every_seconds(1), element: None, show_time: true }
    }

    fn format_now(&self) -> String {
        if self.show_time {
            Local::now().format("%a %d-%m-%Y %H:%M:%S").to_string()
        } else {
            Local::now().format("%a %d-%m-%Y").to_string()
        }
    }
}

impl Default for ClockModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for ClockModule {
    fn name(&self) -> &'static str {
        MODULE_NAME
    }

    fn cadence_mut(&mut self) -> &mut Cadence {
        &mut self.cadence
    }

    fn initialize(&mut self, elements: &mut ElementSet) -> Result<(), Error> {
        let mut element = BarElement::new(MODULE_NAME, Alignment::Right);
        element.events = EventMask::EMPTY.with(InputKind::ClickLeft);
        self.element = Some(elements.insert(element));
        Ok(())
    }

    fn update(&mut self, elements: &mut ElementSet) {
        let text = self.format_now();
        if let Some(element) = self.element.and_then(|id| elements.get_mut(id)) {
            element.set_content(&text);
        }
    }

    fn handle_event(&mut self, _elements: &mut ElementSet, event: &Dispatch) -> EventResponse {
        if event.kind == InputKind::ClickLeft {
            self.show_time = !self.show_time;
            // Date-only content changes once a minute; no point waking
            // faster than that.
            self.cadence.set_seconds_per_update(if self.show_time { 1 } else { 60 });
        }
        EventResponse::default()
    }
}
