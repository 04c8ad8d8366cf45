//! C8 — vacuum pump controller.
//!
//! Hysteretic bang-bang on a vacuum-ok sensor, with an independent
//! insufficient-vacuum warning latch. Ticks at 10 ms. Grounded on
//! `original_source/include/vacuum_pump.h`.

use crate::journal::{ErrorCode, Journal};
use crate::param::{ParamId, ParamStore};
use crate::vehicle::VehicleState;

fn pump_allowed(state: VehicleState) -> bool {
    matches!(
        state,
        VehicleState::Ready | VehicleState::Drive | VehicleState::LimpHome
    )
}

pub struct VacuumPump {
    pump_on: bool,
    hysteresis_ticks: u32,
    insufficient_ticks: u32,
    warning_latched: bool,
}

impl VacuumPump {
    pub fn new() -> Self {
        VacuumPump {
            pump_on: false,
            hysteresis_ticks: 0,
            insufficient_ticks: 0,
            warning_latched: false,
        }
    }

    pub fn pump_on(&self) -> bool {
        self.pump_on
    }

    pub fn warning_latched(&self) -> bool {
        self.warning_latched
    }

    /// Advances by one 10 ms tick. `vacuum_ok` is already sensor-polarity
    /// normalized (`true` == sufficient vacuum) by the caller.
    pub fn update(
        &mut self,
        vehicle_state: VehicleState,
        vacuum_ok: bool,
        hysteresis_ms: i32,
        warning_delay_ms: i32,
        journal: &mut Journal,
        tick_ms: u32,
    ) {
        if !pump_allowed(vehicle_state) {
            self.pump_on = false;
            self.hysteresis_ticks = 0;
            self.insufficient_ticks = 0;
            self.warning_latched = false;
            return;
        }

        if !vacuum_ok {
            self.pump_on = true;
            self.hysteresis_ticks = 0;
        } else if self.pump_on {
            self.hysteresis_ticks = self.hysteresis_ticks.saturating_add(10);
            if self.hysteresis_ticks >= hysteresis_ms.max(0) as u32 {
                self.pump_on = false;
            }
        }

        if !vacuum_ok {
            self.insufficient_ticks = self.insufficient_ticks.saturating_add(10);
            if self.insufficient_ticks >= warning_delay_ms.max(0) as u32 && !self.warning_latched {
                self.warning_latched = true;
                journal.post(ErrorCode::VacuumInsufficient, tick_ms);
            }
        } else {
            self.insufficient_ticks = 0;
            self.warning_latched = false;
        }
    }

    pub fn drive_outputs(&self, io: &mut dyn crate::io::VehicleIo) {
        io.set_vacuum_pump_out(self.pump_on);
    }

    pub fn publish(&self, params: &mut ParamStore) {
        params.set_bool(ParamId::VacuumPumpOut, self.pump_on);
        params.set_bool(ParamId::VacuumPumpInsufficient, self.warning_latched);
    }
}

impl Default for VacuumPump {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pump_off_outside_allowed_states() {
        let mut pump = VacuumPump::new();
        let mut journal = Journal::new();
        pump.update(VehicleState::Standby, false, 500, 2000, &mut journal, 0);
        assert!(!pump.pump_on());
    }

    #[test]
    fn pump_asserts_immediately_when_vacuum_not_ok() {
        let mut pump = VacuumPump::new();
        let mut journal = Journal::new();
        pump.update(VehicleState::Drive, false, 500, 2000, &mut journal, 0);
        assert!(pump.pump_on());
    }

    #[test]
    fn hysteresis_holds_pump_on_for_exact_window() {
        let mut pump = VacuumPump::new();
        let mut journal = Journal::new();
        pump.update(VehicleState::Drive, false, 500, 2000, &mut journal, 0);
        assert!(pump.pump_on());

        // vacuum becomes ok; pump should stay on for 500ms / 10ms = 50 ticks
        for t in 0..49 {
            pump.update(VehicleState::Drive, true, 500, 2000, &mut journal, t * 10);
            assert!(pump.pump_on(), "tick {t} should still be on");
        }
        pump.update(VehicleState::Drive, true, 500, 2000, &mut journal, 500);
        assert!(!pump.pump_on());
    }

    #[test]
    fn insufficient_warning_latches_and_clears_on_recovery() {
        let mut pump = VacuumPump::new();
        let mut journal = Journal::new();
        let warning_delay_ms = 100;
        let ticks = warning_delay_ms / 10;
        for t in 0..ticks {
            pump.update(
                VehicleState::Drive,
                false,
                500,
                warning_delay_ms,
                &mut journal,
                (t * 10) as u32,
            );
        }
        assert!(pump.warning_latched());
        assert!(journal.contains(ErrorCode::VacuumInsufficient));

        pump.update(VehicleState::Drive, true, 500, warning_delay_ms, &mut journal, 9999);
        assert!(!pump.warning_latched());
    }
}
