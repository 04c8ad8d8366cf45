//! C2 — digital I/O and analog abstraction.
//!
//! The specification treats GPIO register bit-banging and ADC DMA sampling as
//! external collaborators (`SPEC_FULL.md` §1); this module is the contract
//! the core consumes instead of touching registers itself. A board
//! integration implements [`VehicleIo`] once, against whatever peripheral
//! drivers it has, and hands `&mut dyn VehicleIo` (or a concrete generic) to
//! the scheduler.
//!
//! Reads and writes here are assumed O(1) and non-blocking per §5; the trait
//! is deliberately infallible rather than `embedded-hal`'s `Result`-returning
//! digital traits; see `DESIGN.md` for why.

/// Named hardware surface the LVDU core drives or samples.
///
/// All `set_*` calls pass the *logical* assert value; electrical polarity
/// (e.g. `vacuum_pump_out` is active-low, `heater_contactor_out`'s sense
/// varies by board revision) is the implementor's concern.
pub trait VehicleIo {
    fn ignition_in(&mut self) -> bool;
    fn ready_safety_in(&mut self) -> bool;
    fn dc_power_supply_raw(&mut self) -> u16;

    fn set_led_out(&mut self, on: bool);
    fn set_tesla_coolant_valve_1_out(&mut self, on: bool);
    fn set_tesla_coolant_valve_2_out(&mut self, on: bool);
    fn set_tesla_coolant_pump_out(&mut self, on: bool);
    fn set_ready_out(&mut self, on: bool);
    fn set_condition_out(&mut self, on: bool);
    fn set_vcu_out(&mut self, on: bool);

    fn set_vacuum_pump_out(&mut self, on: bool);
    fn vacuum_sensor_in(&mut self) -> bool;

    fn set_heater_contactor_out(&mut self, on: bool);
    fn heater_contactor_feedback_in(&mut self) -> bool;
    fn heater_thermal_switch_in(&mut self) -> bool;
    fn heater_flap_raw(&mut self) -> u16;

    fn set_servo_pump_out(&mut self, on: bool);
    fn set_eps_quick_spoolup_out(&mut self, on: bool);
    fn set_eps_ignition_on_out(&mut self, on: bool);
}

/// Fixed divider ratio for the 12 V rail's analog sense input (§6).
pub const DC_POWER_SUPPLY_DIVIDER_RATIO: f32 = 0.004559;

/// Converts a raw ADC reading of the 12 V rail sense input into volts.
pub fn raw_to_volts(raw: u16) -> f32 {
    raw as f32 * DC_POWER_SUPPLY_DIVIDER_RATIO
}

/// Pets the hardware watchdog once per 1 ms tick (§5). Kept separate from
/// [`VehicleIo`] since it has nothing to do with vehicle signals.
pub trait Watchdog {
    fn kick(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divider_ratio_matches_specification() {
        // 200.0V / 0.004559 ≈ 43868 raw counts
        let raw = (200.0 / DC_POWER_SUPPLY_DIVIDER_RATIO).round() as u16;
        let volts = raw_to_volts(raw);
        assert!((volts - 200.0).abs() < 0.1);
    }
}
