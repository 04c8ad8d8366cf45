//! C6 — heater controller.
//!
//! Drives the comfort/battery heater contactor with a thermal-switch on-delay
//! and three independent latched diagnoses: contactor feedback mismatch,
//! thermal switch stuck closed, thermal switch stuck open. Ticks at 10 ms.
//! Grounded on `original_source/include/heater.h`'s `Task10Ms`, generalized
//! to this crate's parameter-store / journal contract.

use crate::journal::Journal;
use crate::param::{ParamId, ParamStore};
use crate::vehicle::VehicleState;

/// 20 ms debounce on the contactor-feedback diagnosis, expressed in 10 ms
/// ticks.
pub const CONTACTOR_FAULT_DEBOUNCE_TICKS: u32 = 2;

#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContactorFault {
    None = 0,
    NoFeedback = 1,
    Welded = 2,
}

pub struct HeaterInputs {
    pub vehicle_state: VehicleState,
    pub hv_comfort_functions_allowed: bool,
    pub thermal_switch_closed: bool,
    pub contactor_feedback_closed: bool,
    pub flap_raw: u16,
    pub flap_threshold: u16,
    pub manual_override: bool,
}

impl HeaterInputs {
    fn heater_allowed_state(&self) -> bool {
        matches!(
            self.vehicle_state,
            VehicleState::Ready
                | VehicleState::Conditioning
                | VehicleState::Drive
                | VehicleState::Charge
                | VehicleState::LimpHome
        )
    }

    fn demand(&self) -> bool {
        self.manual_override || self.flap_raw > self.flap_threshold
    }
}

pub struct Heater {
    commanded_on: bool,
    contactor_fault: ContactorFault,
    thermal_switch_boot_fault: bool,
    thermal_switch_does_not_open_fault: bool,
    thermal_switch_overheat_fault: bool,
    on_delay_ticks: u32,
    prev_thermal_closed: bool,
    mismatch_ticks: u32,
    thermal_closed_ticks: u32,
    thermal_open_ticks: u32,
    booted: bool,
}

impl Heater {
    pub fn new() -> Self {
        Heater {
            commanded_on: false,
            contactor_fault: ContactorFault::None,
            thermal_switch_boot_fault: false,
            thermal_switch_does_not_open_fault: false,
            thermal_switch_overheat_fault: false,
            on_delay_ticks: 0,
            prev_thermal_closed: false,
            mismatch_ticks: 0,
            thermal_closed_ticks: 0,
            thermal_open_ticks: 0,
            booted: false,
        }
    }

    fn any_fault(&self) -> bool {
        self.contactor_fault != ContactorFault::None
            || self.thermal_switch_boot_fault
            || self.thermal_switch_does_not_open_fault
            || self.thermal_switch_overheat_fault
    }

    /// Advances by one 10 ms tick. `on_delay_ms`, `open_timeout_s`,
    /// `close_timeout_s` are read from the parameter store by the caller.
    pub fn update(
        &mut self,
        inputs: &HeaterInputs,
        on_delay_ms: i32,
        open_timeout_s: i32,
        close_timeout_s: i32,
        _journal: &mut Journal,
        _tick_ms: u32,
    ) {
        if !self.booted {
            self.booted = true;
            if !inputs.thermal_switch_closed {
                self.thermal_switch_boot_fault = true;
            }
            self.prev_thermal_closed = inputs.thermal_switch_closed;
        }

        // on-delay: resets whenever the thermal switch reads open
        if !inputs.thermal_switch_closed {
            self.on_delay_ticks = 0;
        } else {
            self.on_delay_ticks = self.on_delay_ticks.saturating_add(10);
        }

        let on_delay_elapsed = (self.on_delay_ticks as i64) >= (on_delay_ms.max(0) as i64);

        let should_run = inputs.heater_allowed_state()
            && inputs.hv_comfort_functions_allowed
            && !self.any_fault()
            && inputs.demand()
            && inputs.thermal_switch_closed
            && on_delay_elapsed;

        self.commanded_on = should_run;

        // diagnosis 1: contactor feedback, 20 ms debounce
        let mismatch = (self.commanded_on
            && !inputs.contactor_feedback_closed
            && inputs.thermal_switch_closed)
            || (!self.commanded_on && inputs.contactor_feedback_closed);
        if mismatch {
            self.mismatch_ticks += 1;
            if self.mismatch_ticks >= CONTACTOR_FAULT_DEBOUNCE_TICKS
                && self.contactor_fault == ContactorFault::None
            {
                self.contactor_fault = if self.commanded_on {
                    ContactorFault::NoFeedback
                } else {
                    ContactorFault::Welded
                };
            }
        } else {
            self.mismatch_ticks = 0;
        }

        // diagnosis 2 & 3: thermal switch timeouts
        if self.commanded_on && inputs.thermal_switch_closed {
            self.thermal_closed_ticks = self.thermal_closed_ticks.saturating_add(10);
            self.thermal_open_ticks = 0;
            if self.thermal_closed_ticks >= open_timeout_s.max(0) as u32 * 1000 {
                self.thermal_switch_does_not_open_fault = true;
            }
        } else if !self.commanded_on && !inputs.thermal_switch_closed {
            self.thermal_open_ticks = self.thermal_open_ticks.saturating_add(10);
            self.thermal_closed_ticks = 0;
            if self.thermal_open_ticks >= close_timeout_s.max(0) as u32 * 1000 {
                self.thermal_switch_overheat_fault = true;
            }
        } else {
            self.thermal_closed_ticks = 0;
            self.thermal_open_ticks = 0;
        }

        if self.any_fault() {
            self.commanded_on = false;
        }

        self.prev_thermal_closed = inputs.thermal_switch_closed;
    }

    pub fn commanded_on(&self) -> bool {
        self.commanded_on
    }

    pub fn contactor_fault(&self) -> ContactorFault {
        self.contactor_fault
    }

    pub fn drive_outputs(&self, io: &mut dyn crate::io::VehicleIo) {
        io.set_heater_contactor_out(self.commanded_on);
    }

    /// Publishes heater diagnostics and the `heater_off_confirmed` flag C4
    /// reads for its `CONNECTED_STOP_CONSUMERS` exit condition.
    pub fn publish(&self, params: &mut ParamStore, feedback_closed: bool) {
        params.set_bool(ParamId::HeaterActive, self.commanded_on);
        params.set_bool(ParamId::HeaterContactorOut, self.commanded_on);
        params.set_int(ParamId::HeaterContactorFault, self.contactor_fault as i32);
        params.set_bool(
            ParamId::HeaterThermalSwitchBootFault,
            self.thermal_switch_boot_fault,
        );
        params.set_bool(
            ParamId::HeaterThermalSwitchDoesNotOpenFault,
            self.thermal_switch_does_not_open_fault,
        );
        params.set_bool(
            ParamId::HeaterThermalSwitchOverheatFault,
            self.thermal_switch_overheat_fault,
        );
        params.set_bool(ParamId::HeaterFault, self.any_fault());
        params.set_bool(
            ParamId::HeaterOffConfirmed,
            !self.commanded_on && !feedback_closed,
        );
    }
}

impl Default for Heater {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> HeaterInputs {
        HeaterInputs {
            vehicle_state: VehicleState::Ready,
            hv_comfort_functions_allowed: true,
            thermal_switch_closed: true,
            contactor_feedback_closed: false,
            flap_raw: 0,
            flap_threshold: 1000,
            manual_override: true,
        }
    }

    #[test]
    fn boot_fault_latched_when_thermal_switch_open_at_boot() {
        let mut heater = Heater::new();
        let mut journal = Journal::new();
        let mut inputs = base_inputs();
        inputs.thermal_switch_closed = false;
        heater.update(&inputs, 2000, 2, 5, &mut journal, 0);
        assert!(heater.any_fault());
    }

    #[test]
    fn contactor_asserts_after_on_delay() {
        let mut heater = Heater::new();
        let mut journal = Journal::new();
        let inputs = base_inputs();
        let on_delay_ms = 50;
        let ticks_needed = on_delay_ms / 10;
        for t in 0..ticks_needed - 1 {
            heater.update(&inputs, on_delay_ms, 2, 5, &mut journal, (t * 10) as u32);
            assert!(!heater.commanded_on(), "tick {t} should still be delayed");
        }
        heater.update(&inputs, on_delay_ms, 2, 5, &mut journal, (ticks_needed * 10) as u32);
        assert!(heater.commanded_on());
    }

    #[test]
    fn welded_contactor_detected_when_feedback_closed_while_commanded_off() {
        let mut heater = Heater::new();
        let mut journal = Journal::new();
        let mut inputs = base_inputs();
        inputs.manual_override = false; // no demand -> never commanded on
        inputs.contactor_feedback_closed = true;
        for t in 0..3 {
            heater.update(&inputs, 0, 2, 5, &mut journal, t * 10);
        }
        assert_eq!(heater.contactor_fault(), ContactorFault::Welded);
        assert!(!heater.commanded_on());
    }

    #[test]
    fn thermal_switch_falling_edge_resets_on_delay() {
        let mut heater = Heater::new();
        let mut journal = Journal::new();
        let mut inputs = base_inputs();
        heater.update(&inputs, 100, 2, 5, &mut journal, 0);
        heater.update(&inputs, 100, 2, 5, &mut journal, 10);
        inputs.thermal_switch_closed = false;
        heater.update(&inputs, 100, 2, 5, &mut journal, 20);
        inputs.thermal_switch_closed = true;
        for t in 0..9 {
            heater.update(&inputs, 100, 2, 5, &mut journal, 30 + t * 10);
            assert!(!heater.commanded_on());
        }
        heater.update(&inputs, 100, 2, 5, &mut journal, 120);
        assert!(heater.commanded_on());
    }
}
