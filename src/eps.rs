//! C7 — Electric Power Steering controller.
//!
//! Two-step ignition-then-spoolup enable, gated on vehicle state and DC/DC
//! health. Ticks at 100 ms alongside the vehicle state machine (C5), which
//! runs first in the slot so EPS observes the state just computed
//! (`SPEC_FULL.md` §5).

use crate::journal::{ErrorCode, Journal};
use crate::param::{ParamId, ParamStore};
use crate::vehicle::VehicleState;

#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EpsState {
    Off = 0,
    SpoolUp = 1,
    On = 2,
    Fault = 3,
}

impl EpsState {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Off),
            1 => Some(Self::SpoolUp),
            2 => Some(Self::On),
            3 => Some(Self::Fault),
            _ => None,
        }
    }
}

impl Default for EpsState {
    fn default() -> Self {
        EpsState::Off
    }
}

pub struct EpsInputs {
    pub vehicle_state: VehicleState,
    pub dcdc_fault_any: bool,
    pub dcdc_output_voltage: f32,
}

impl EpsInputs {
    fn active_condition(&self) -> bool {
        matches!(
            self.vehicle_state,
            VehicleState::Ready | VehicleState::Drive | VehicleState::LimpHome
        ) && !self.dcdc_fault_any
            && self.dcdc_output_voltage > 9.0
    }
}

pub struct Eps {
    state: EpsState,
    spoolup_ticks: u32,
    fault_posted_this_cycle: bool,
}

impl Eps {
    pub fn new() -> Self {
        Eps {
            state: EpsState::Off,
            spoolup_ticks: 0,
            fault_posted_this_cycle: false,
        }
    }

    pub fn state(&self) -> EpsState {
        self.state
    }

    /// Advances by one 100 ms tick. `spoolup_delay_ms` is read from
    /// `eps_spoolup_delay` by the caller.
    pub fn update(
        &mut self,
        inputs: &EpsInputs,
        spoolup_delay_ms: i32,
        journal: &mut Journal,
        tick_ms: u32,
    ) {
        let active = inputs.active_condition();

        match self.state {
            EpsState::Off => {
                self.fault_posted_this_cycle = false;
                if active {
                    self.state = EpsState::SpoolUp;
                    self.spoolup_ticks = 0;
                }
            }
            EpsState::SpoolUp => {
                if !active {
                    if inputs.dcdc_fault_any && !self.fault_posted_this_cycle {
                        journal.post(ErrorCode::EpsStartupDcdcFault, tick_ms);
                        self.fault_posted_this_cycle = true;
                    }
                    self.state = EpsState::Off;
                    self.spoolup_ticks = 0;
                    return;
                }
                self.spoolup_ticks = self.spoolup_ticks.saturating_add(100);
                let delay = spoolup_delay_ms.max(0) as u32;
                if self.spoolup_ticks >= delay {
                    self.state = EpsState::On;
                }
            }
            EpsState::On => {
                if !active {
                    if inputs.dcdc_fault_any && !self.fault_posted_this_cycle {
                        journal.post(ErrorCode::EpsStartupDcdcFault, tick_ms);
                        self.fault_posted_this_cycle = true;
                    }
                    self.state = EpsState::Off;
                    self.spoolup_ticks = 0;
                }
            }
            EpsState::Fault => {}
        }
    }

    /// Publishes `eps_state`, `eps_ignition_out`, `eps_startup_out`.
    pub fn publish(&self, params: &mut ParamStore) {
        let (ignition_on, quick_spoolup) = match self.state {
            EpsState::Off | EpsState::Fault => (false, false),
            EpsState::SpoolUp => (true, false),
            EpsState::On => (true, true),
        };
        params.set_int(ParamId::EpsState, self.state as i32);
        params.set_bool(ParamId::EpsIgnitionOut, ignition_on);
        params.set_bool(ParamId::EpsStartupOut, quick_spoolup);
    }

    pub fn drive_outputs(&self, io: &mut dyn crate::io::VehicleIo) {
        let (ignition_on, quick_spoolup) = match self.state {
            EpsState::Off | EpsState::Fault => (false, false),
            EpsState::SpoolUp => (true, false),
            EpsState::On => (true, true),
        };
        io.set_eps_ignition_on_out(ignition_on);
        io.set_eps_quick_spoolup_out(quick_spoolup);
    }
}

impl Default for Eps {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_inputs() -> EpsInputs {
        EpsInputs {
            vehicle_state: VehicleState::Ready,
            dcdc_fault_any: false,
            dcdc_output_voltage: 12.0,
        }
    }

    #[test]
    fn eps_state_roundtrip() {
        for raw in 0..=3u8 {
            assert_eq!(EpsState::from_u8(raw).unwrap() as u8, raw);
        }
        assert!(EpsState::from_u8(4).is_none());
    }

    #[test]
    fn spools_up_then_turns_on_after_delay() {
        let mut eps = Eps::new();
        let mut journal = Journal::new();
        let inputs = active_inputs();

        eps.update(&inputs, 500, &mut journal, 0);
        assert_eq!(eps.state(), EpsState::SpoolUp);

        for t in 1..5 {
            eps.update(&inputs, 500, &mut journal, t * 100);
            assert_eq!(eps.state(), EpsState::SpoolUp);
        }
        eps.update(&inputs, 500, &mut journal, 500);
        assert_eq!(eps.state(), EpsState::On);
    }

    #[test]
    fn loses_active_condition_returns_to_off() {
        let mut eps = Eps::new();
        let mut journal = Journal::new();
        let mut inputs = active_inputs();
        eps.update(&inputs, 500, &mut journal, 0);
        eps.update(&inputs, 500, &mut journal, 100);
        eps.update(&inputs, 500, &mut journal, 200);
        eps.update(&inputs, 500, &mut journal, 300);
        eps.update(&inputs, 500, &mut journal, 400);
        eps.update(&inputs, 500, &mut journal, 500);
        assert_eq!(eps.state(), EpsState::On);

        inputs.vehicle_state = VehicleState::Conditioning;
        eps.update(&inputs, 500, &mut journal, 600);
        assert_eq!(eps.state(), EpsState::Off);
    }

    #[test]
    fn dcdc_fault_during_spoolup_posts_once() {
        let mut eps = Eps::new();
        let mut journal = Journal::new();
        let mut inputs = active_inputs();
        eps.update(&inputs, 500, &mut journal, 0);
        assert_eq!(eps.state(), EpsState::SpoolUp);

        inputs.dcdc_fault_any = true;
        eps.update(&inputs, 500, &mut journal, 100);
        assert_eq!(eps.state(), EpsState::Off);
        assert_eq!(journal.len(), 1);

        // re-entering and losing active condition again without a fresh
        // dcdc fault does not post a second time
        inputs.dcdc_fault_any = false;
        eps.update(&inputs, 500, &mut journal, 200);
        assert_eq!(eps.state(), EpsState::SpoolUp);
    }
}
