//! Battery module: two left-aligned elements sharing the module name, a
//! Nerd Font icon and a text readout, fed from
//! `/sys/class/power_supply/BAT0`.

use std::fs;
use std::path::Path;

use crate::color::Color;
use crate::element::{Alignment, BarElement, ElementId, ElementSet};
use crate::error::Error;
use crate::modules::{Cadence, Module};

const MODULE_NAME: &str = "battery";

const SUPPLY_DIR: &str = "/sys/class/power_supply/BAT0";

const ALERT_COLOR: &str = "#FF6B6B";

const ICONS_CHARGING: [&str; 11] = [
    "\u{f089f}", "\u{f089c}", "\u{f0086}", "\u{f0087}", "\u{f0088}", "\u{f089d}", "\u{f0089}",
    "\u{f089e}", "\u{f008a}", "\u{f008b}", "\u{f0085}",
];

const ICONS_DISCHARGING: [&str; 11] = [
    "\u{f008e}", "\u{f007a}", "\u{f007b}", "\u{f007c}", "\u{f007d}", "\u{f007e}", "\u{f007f}",
    "\u{f0080}", "\u{f0081}", "\u{f0082}", "\u{f0079}",
];

pub struct BatteryModule {
    cadence: Cadence,
    icon: Option<ElementId>,
    text: Option<ElementId>,
}

#[derive(Debug, Default, PartialEq)]
struct BatteryReading {
    percentage: f32,
    charging: bool,
    /// Hours until empty (discharging) or full (charging), when the
    /// supply reports a current draw.
    hours_left: Option<f32>,
}

impl BatteryModule {
    pub fn new() -> Self {
        Self { cadence: Cadence::every_seconds(5), icon: None, text: None }
    }

    fn read_supply(dir: &Path) -> BatteryReading {
        let now = read_scalar(dir, "energy_now").or_else(|| read_scalar(dir, "charge_now"));
        let full = read_scalar(dir, "energy_full").or_else(|| read_scalar(dir, "charge_full"));
        let power = read_scalar(dir, "power_now").or_else(|| read_scalar(dir, "current_now"));
        let status = fs::read_to_string(dir.join("status")).unwrap_or_default();
        let status = status.trim();

        let mut reading = BatteryReading {
            charging: status == "Charging",
            ..BatteryReading::default()
        };

        let (Some(now), Some(full)) = (now, full) else { return reading };
        if full > 0 {
            reading.percentage = now as f32 / full as f32 * 100.0;
        }

        if let Some(power) = power.filter(|&p| p > 0) {
            reading.hours_left = match status {
                "Discharging" => Some(now as f32 / power as f32),
                "Charging" => Some((full - now) as f32 / power as f32),
                _ => None,
            };
        }

        reading
    }
}

impl Default for BatteryModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for BatteryModule {
    fn name(&self) -> &'static str {
        MODULE_NAME
    }

    fn cadence_mut(&mut self) -> &mut Cadence {
        &mut self.cadence
    }

    fn initialize(&mut self, elements: &mut ElementSet) -> Result<(), Error> {
        self.icon = Some(elements.insert(BarElement::new(MODULE_NAME, Alignment::Left)));
        self.text = Some(elements.insert(BarElement::new(MODULE_NAME, Alignment::Left)));
        Ok(())
    }

    fn update(&mut self, elements: &mut ElementSet) {
        let reading = Self::read_supply(Path::new(SUPPLY_DIR));
        let icon = battery_icon(reading.percentage, reading.charging);
        let low = reading.percentage < 10.0 && !reading.charging;

        if let Some(element) = self.icon.and_then(|id| elements.get_mut(id)) {
            element.set_content(&format!("{icon} "));
            element.foreground = if low {
                Color::parse(Some(ALERT_COLOR), Color::UNSET)
            } else {
                Color::UNSET
            };
        }
        if let Some(element) = self.text.and_then(|id| elements.get_mut(id)) {
            element.set_content(&format_reading(&reading));
        }
    }
}

/// Decile icon for the current charge, from the charging or discharging
/// ramp.
fn battery_icon(percentage: f32, charging: bool) -> &'static str {
    let decile = ((percentage / 10.0).round() as usize).min(10);
    if charging {
        ICONS_CHARGING[decile]
    } else {
        ICONS_DISCHARGING[decile]
    }
}

fn format_reading(reading: &BatteryReading) -> String {
    match reading.hours_left {
        Some(hours) => {
            let whole = hours as u32;
            let minutes = ((hours - whole as f32) * 60.0) as u32;
            format!("{:.1}% {:02}:{:02}", reading.percentage, whole, minutes)
        }
        None => format!("{:.1}%", reading.percentage),
    }
}

fn read_scalar(dir: &Path, name: &str) -> Option<i64> {
    fs::read_to_string(dir.join(name)).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icon_buckets_round_to_the_nearest_decile() {
        assert_eq!(battery_icon(0.0, false), ICONS_DISCHARGING[0]);
        assert_eq!(battery_icon(4.9, false), ICONS_DISCHARGING[0]);
        assert_eq!(battery_icon(5.0, false), ICONS_DISCHARGING[1]);
        assert_eq!(battery_icon(96.0, false), ICONS_DISCHARGING[10]);
        assert_eq!(battery_icon(100.0, false), ICONS_DISCHARGING[10]);
        // Out-of-range readings clamp instead of panicking.
        assert_eq!(battery_icon(130.0, false), ICONS_DISCHARGING[10]);
    }

    #[test]
    fn charging_uses_the_charging_ramp() {
        assert_eq!(battery_icon(50.0, true), ICONS_CHARGING[5]);
    }

    #[test]
    fn readout_includes_time_only_when_known() {
        let with_time = BatteryReading {
            percentage: 87.5,
            charging: false,
            hours_left: Some(1.5),
        };
        assert_eq!(format_reading(&with_time), "87.5% 01:30");

        let without = BatteryReading { percentage: 87.5, charging: false, hours_left: None };
        assert_eq!(format_reading(&without), "87.5%");
    }
}
