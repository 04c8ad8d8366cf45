//! C4 — HV Contactor Manager.
//!
//! Six-state sub-machine that drives the request line to the BMS and waits
//! for contactor-closed / contactor-open feedback, each wait bounded by a
//! 10 s timeout. Owned and driven once per 100 ms tick from inside the
//! vehicle state machine (C5), per `SPEC_FULL.md` §4.1 / §5.

use crate::journal::{ErrorCode, Journal};
use crate::param::{ParamId, ParamStore};

/// Ticks (at the HVCM's 100 ms period) before a REQUESTED/STOP_CONSUMERS/
/// OPEN_CONTACTORS substate gives up and faults. 10 s / 100 ms = 100.
pub const HVCM_TIMEOUT_TICKS: u16 = 100;

#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HvState {
    Disconnected = 0,
    Requested = 1,
    Connected = 2,
    ConnectedStopConsumers = 3,
    OpenContactors = 4,
    Fault = 5,
}

impl HvState {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Disconnected),
            1 => Some(Self::Requested),
            2 => Some(Self::Connected),
            3 => Some(Self::ConnectedStopConsumers),
            4 => Some(Self::OpenContactors),
            5 => Some(Self::Fault),
            _ => None,
        }
    }

    /// True while the HVCM is asserting `to_bms_request` (§4.1's table).
    pub fn is_requesting(self) -> bool {
        matches!(
            self,
            HvState::Requested | HvState::Connected | HvState::ConnectedStopConsumers
        )
    }
}

impl Default for HvState {
    fn default() -> Self {
        HvState::Disconnected
    }
}

/// Inputs the HVCM reads each `update()`, sampled from the parameter store
/// by the caller so the sub-machine itself stays free of I/O concerns.
pub struct HvcmInputs {
    pub bms_data_valid: bool,
    pub bms_cont_state: i32,
    pub dcdc_input_power_off_confirmed: bool,
    pub heater_off_confirmed: bool,
}

impl HvcmInputs {
    fn hv_closed(&self) -> bool {
        self.bms_data_valid && self.bms_cont_state == 4
    }

    fn hv_open(&self) -> bool {
        self.bms_data_valid && self.bms_cont_state == 1
    }
}

/// The HV Contactor Manager.
pub struct Hvcm {
    state: HvState,
    requested: bool,
    timeout_ticks: u16,
}

impl Hvcm {
    pub fn new() -> Self {
        Hvcm {
            state: HvState::Disconnected,
            requested: false,
            timeout_ticks: 0,
        }
    }

    pub fn state(&self) -> HvState {
        self.state
    }

    /// Idempotent: repeated calls with the same value are no-ops.
    pub fn set_hv_request(&mut self, request: bool) {
        self.requested = request;
    }

    fn set_state(&mut self, new_state: HvState) {
        self.state = new_state;
        self.timeout_ticks = 0;
    }

    /// Advances the sub-machine by one 100 ms tick.
    pub fn update(&mut self, inputs: &HvcmInputs, journal: &mut Journal, tick_ms: u32) {
        match self.state {
            HvState::Disconnected => {
                if self.requested {
                    self.set_state(HvState::Requested);
                }
            }
            HvState::Requested => {
                if inputs.hv_closed() {
                    self.set_state(HvState::Connected);
                } else {
                    self.timeout_ticks += 1;
                    if self.timeout_ticks >= HVCM_TIMEOUT_TICKS {
                        journal.post(ErrorCode::HvContactorTimeoutClosing, tick_ms);
                        self.set_state(HvState::Fault);
                    }
                }
            }
            HvState::Connected => {
                if !self.requested {
                    self.set_state(HvState::ConnectedStopConsumers);
                }
            }
            HvState::ConnectedStopConsumers => {
                if inputs.dcdc_input_power_off_confirmed && inputs.heater_off_confirmed {
                    self.set_state(HvState::OpenContactors);
                } else {
                    self.timeout_ticks += 1;
                    if self.timeout_ticks >= HVCM_TIMEOUT_TICKS {
                        journal.post(ErrorCode::HvContactorTimeoutStopConsumers, tick_ms);
                        self.set_state(HvState::Fault);
                    }
                }
            }
            HvState::OpenContactors => {
                if inputs.hv_open() {
                    self.set_state(HvState::Disconnected);
                } else {
                    self.timeout_ticks += 1;
                    if self.timeout_ticks >= HVCM_TIMEOUT_TICKS {
                        journal.post(ErrorCode::HvContactorTimeoutOpening, tick_ms);
                        self.set_state(HvState::Fault);
                    }
                }
            }
            HvState::Fault => {
                // terminal; cleared only by power cycle
            }
        }
    }

    /// Publishes `HVCM_state` and `HVCM_to_bms_hv_request` (§4.1 contract).
    pub fn publish(&self, params: &mut ParamStore) {
        params.set_int(ParamId::HvcmState, self.state as i32);
        params.set_bool(ParamId::HvcmToBmsHvRequest, self.state.is_requesting());
    }
}

impl Default for Hvcm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs_disconnected() -> HvcmInputs {
        HvcmInputs {
            bms_data_valid: true,
            bms_cont_state: 1,
            dcdc_input_power_off_confirmed: true,
            heater_off_confirmed: true,
        }
    }

    #[test]
    fn hv_state_roundtrip() {
        for raw in 0..=5u8 {
            assert_eq!(HvState::from_u8(raw).unwrap() as u8, raw);
        }
        assert!(HvState::from_u8(6).is_none());
    }

    #[test]
    fn closes_on_request_and_bms_ack() {
        let mut hvcm = Hvcm::new();
        let mut journal = Journal::new();
        hvcm.set_hv_request(true);
        let mut inputs = inputs_disconnected();
        hvcm.update(&inputs, &mut journal, 0);
        assert_eq!(hvcm.state(), HvState::Requested);

        inputs.bms_cont_state = 4;
        hvcm.update(&inputs, &mut journal, 100);
        assert_eq!(hvcm.state(), HvState::Connected);
        assert!(journal.is_empty());
    }

    #[test]
    fn close_timeout_faults_after_100_ticks() {
        let mut hvcm = Hvcm::new();
        let mut journal = Journal::new();
        hvcm.set_hv_request(true);
        let inputs = inputs_disconnected(); // cont_state stays 1, never closes
        hvcm.update(&inputs, &mut journal, 0); // -> Requested
        for t in 1..HVCM_TIMEOUT_TICKS {
            hvcm.update(&inputs, &mut journal, t as u32 * 100);
            assert_eq!(hvcm.state(), HvState::Requested);
        }
        hvcm.update(&inputs, &mut journal, 10_100);
        assert_eq!(hvcm.state(), HvState::Fault);
        assert!(journal.contains(ErrorCode::HvContactorTimeoutClosing));
    }

    #[test]
    fn full_close_then_open_cycle() {
        let mut hvcm = Hvcm::new();
        let mut journal = Journal::new();
        let mut inputs = inputs_disconnected();

        hvcm.set_hv_request(true);
        hvcm.update(&inputs, &mut journal, 0);
        inputs.bms_cont_state = 4;
        hvcm.update(&inputs, &mut journal, 100);
        assert_eq!(hvcm.state(), HvState::Connected);

        hvcm.set_hv_request(false);
        hvcm.update(&inputs, &mut journal, 200);
        assert_eq!(hvcm.state(), HvState::ConnectedStopConsumers);

        hvcm.update(&inputs, &mut journal, 300);
        assert_eq!(hvcm.state(), HvState::OpenContactors);

        inputs.bms_cont_state = 1;
        hvcm.update(&inputs, &mut journal, 400);
        assert_eq!(hvcm.state(), HvState::Disconnected);
    }

    #[test]
    fn fault_is_terminal() {
        let mut hvcm = Hvcm::new();
        let mut journal = Journal::new();
        hvcm.set_hv_request(true);
        let inputs = inputs_disconnected();
        hvcm.update(&inputs, &mut journal, 0);
        for t in 1..=HVCM_TIMEOUT_TICKS {
            hvcm.update(&inputs, &mut journal, t as u32 * 100);
        }
        assert_eq!(hvcm.state(), HvState::Fault);
        hvcm.set_hv_request(false);
        hvcm.update(&inputs, &mut journal, 99_999);
        assert_eq!(hvcm.state(), HvState::Fault);
    }
}
