//! C5 — the vehicle state machine (the LVDU core proper).
//!
//! Ten-state top-level machine. Owns the diagnose/force-standby/force-sleep/
//! standby-idle timers and the ready-relay diagnosis, and drives the HV
//! Contactor Manager (C4) through its handshake. Ticks at 100 ms; see
//! `SPEC_FULL.md` §4.2 for the full transition table this mirrors.

use crate::hvcm::{Hvcm, HvState, HvcmInputs};
use crate::io::{raw_to_volts, VehicleIo};
use crate::journal::{ErrorCode, Journal};
use crate::param::{ParamId, ParamStore};

/// 10 s standby-idle window, in 100 ms ticks.
const STANDBY_IDLE_TICKS: u32 = 100;
/// 20 s under-voltage force-degrade window, in 100 ms ticks.
const UNDER_VOLTAGE_TICKS: u32 = 200;
/// 4 s diagnose window, in 100 ms ticks.
const DIAGNOSE_TICKS: u32 = 40;
/// 200 ms diagnose cooldown, in 100 ms ticks.
const DIAGNOSE_COOLDOWN_TICKS: u32 = 2;
/// 2 s ready-not-set-on-ignition debounce, in 100 ms ticks.
const READY_NOT_SET_TICKS: u32 = 20;
/// 500 ms ready-safety-low debounce gating HV_DISCONNECTING(STANDBY), in 100 ms ticks.
const READY_SAFETY_LOW_TICKS: u32 = 5;

#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VehicleState {
    Invalid = 0,
    Sleep = 1,
    Standby = 2,
    HvConnecting = 3,
    HvDisconnecting = 4,
    Ready = 5,
    Conditioning = 6,
    Drive = 7,
    Charge = 8,
    Error = 9,
    LimpHome = 10,
}

impl VehicleState {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Invalid),
            1 => Some(Self::Sleep),
            2 => Some(Self::Standby),
            3 => Some(Self::HvConnecting),
            4 => Some(Self::HvDisconnecting),
            5 => Some(Self::Ready),
            6 => Some(Self::Conditioning),
            7 => Some(Self::Drive),
            8 => Some(Self::Charge),
            9 => Some(Self::Error),
            10 => Some(Self::LimpHome),
            _ => None,
        }
    }

    /// True for states in which the vehicle wants HV closed (drives the
    /// request the HVCM is given). `HV_CONNECTING` counts — that is the
    /// mid-handshake state working towards HV closed. `HV_DISCONNECTING`
    /// does not — it is working towards open.
    fn requires_hv(self) -> bool {
        matches!(
            self,
            VehicleState::HvConnecting
                | VehicleState::Ready
                | VehicleState::Conditioning
                | VehicleState::Drive
                | VehicleState::Charge
                | VehicleState::LimpHome
        )
    }

}

impl Default for VehicleState {
    fn default() -> Self {
        VehicleState::Sleep
    }
}

#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TriggerEvent {
    None = 0,
    WokeFromSleep = 1,
    ManualStandby = 2,
    IgnitionOn = 3,
    RemotePrecondition = 4,
    PluggedIn = 5,
    StandbyIdleTimeout = 6,
    StandbyBalancingLoss = 7,
    HvConnected = 8,
    HvFault = 9,
    HvDisconnected = 10,
    IgnitionOff = 11,
    DriveRequested = 12,
    PluggedWhileReady = 13,
    CriticalFault = 14,
    ThermalDoneReadyDropped = 15,
    DegradedFault = 16,
    ChargeFinished = 17,
    PlugRemovedWhileCharging = 18,
    ErrorIgnitionOff = 19,
    HvTooLow = 20,
    LvTooLow = 21,
}

impl Default for TriggerEvent {
    fn default() -> Self {
        TriggerEvent::None
    }
}

/// Inputs sampled once per 100 ms tick (§4.2).
pub struct VehicleInputs {
    pub bms_data_valid: bool,
    pub bms_cont_state: i32,
    pub bms_pack_voltage: f32,
    pub bms_balancing_active: bool,
    pub bms_actual_current: f32,
    pub dcdc_input_power_off_confirmed: bool,
    pub charger_plug_status: i32,
    pub charger_plug_override: bool,
    pub manual_standby_mode: bool,
    pub remote_precondition_request: bool,
    pub drive_request: bool,
    pub critical_fault: bool,
    pub degraded_fault: bool,
    pub thermal_task_completed: bool,
    pub lv_low_threshold: f32,
    pub hv_low_threshold: f32,
    pub charge_done_current: f32,
    pub charge_done_delay_s: i32,
}

impl VehicleInputs {
    fn charger_plugged(&self) -> bool {
        self.charger_plug_status > 1 && !self.charger_plug_override
    }
}

pub struct Lvdu {
    state: VehicleState,
    prev: VehicleState,
    prev_prev: VehicleState,
    queued_state: VehicleState,
    trigger: TriggerEvent,
    prev_trigger: TriggerEvent,

    hvcm: Hvcm,

    standby_idle_ticks: u32,
    hv_too_low_ticks: u32,
    lv_too_low_ticks: u32,

    diagnose_pending: bool,
    diagnose_ticks: u32,
    diagnose_cooldown_ticks: Option<u32>,
    ready_not_set_ticks: u32,
    ready_safety_low_ticks: u32,

    charge_finished_latched: bool,
    charge_done_ticks: u32,

    ignition: bool,
    ready_safety_in: bool,
}

impl Lvdu {
    pub fn new() -> Self {
        Lvdu {
            state: VehicleState::Sleep,
            prev: VehicleState::Invalid,
            prev_prev: VehicleState::Invalid,
            queued_state: VehicleState::Invalid,
            trigger: TriggerEvent::None,
            prev_trigger: TriggerEvent::None,
            hvcm: Hvcm::new(),
            standby_idle_ticks: 0,
            hv_too_low_ticks: 0,
            lv_too_low_ticks: 0,
            diagnose_pending: false,
            diagnose_ticks: 0,
            diagnose_cooldown_ticks: None,
            ready_not_set_ticks: 0,
            ready_safety_low_ticks: 0,
            charge_finished_latched: false,
            charge_done_ticks: 0,
            ignition: false,
            ready_safety_in: false,
        }
    }

    pub fn state(&self) -> VehicleState {
        self.state
    }

    pub fn queued_state(&self) -> VehicleState {
        self.queued_state
    }

    pub fn hv_state(&self) -> HvState {
        self.hvcm.state()
    }

    fn goto(&mut self, to: VehicleState, trigger: TriggerEvent, queued: VehicleState) {
        if to == VehicleState::Conditioning && self.state == VehicleState::Ready {
            self.diagnose_pending = true;
            self.diagnose_ticks = 0;
            self.diagnose_cooldown_ticks = None;
        }
        self.prev_prev = self.prev;
        self.prev = self.state;
        self.state = to;
        self.prev_trigger = self.trigger;
        self.trigger = trigger;
        self.queued_state = queued;
    }

    fn goto_direct(&mut self, to: VehicleState, trigger: TriggerEvent) {
        self.goto(to, trigger, VehicleState::Invalid);
    }

    fn goto_via_hv_connecting(&mut self, target: VehicleState, trigger: TriggerEvent) {
        self.goto(VehicleState::HvConnecting, trigger, target);
    }

    fn goto_via_hv_disconnecting(&mut self, target: VehicleState, trigger: TriggerEvent) {
        self.goto(VehicleState::HvDisconnecting, trigger, target);
    }

    /// Routes to `target`, going through whichever HV handshake direction is
    /// needed, or directly if `target` and the current state agree on HV
    /// demand (e.g. SLEEP -> STANDBY, neither of which wants HV).
    fn route_to(&mut self, target: VehicleState, trigger: TriggerEvent) {
        let wants_hv = target.requires_hv();
        let has_hv = self.state.requires_hv();
        if wants_hv == has_hv {
            self.goto_direct(target, trigger);
        } else if wants_hv {
            self.goto_via_hv_connecting(target, trigger);
        } else {
            self.goto_via_hv_disconnecting(target, trigger);
        }
    }

    fn charge_finished(&self, inputs: &VehicleInputs) -> bool {
        if inputs.charge_done_delay_s <= 0 {
            return true;
        }
        let ticks_needed = inputs.charge_done_delay_s as u32 * 10;
        self.charge_done_ticks >= ticks_needed
    }

    /// Advances the whole C4+C5 coupling by one 100 ms tick.
    pub fn task_100ms(&mut self, io: &mut dyn VehicleIo, params: &mut ParamStore, journal: &mut Journal, tick_ms: u32) {
        // (a) sample inputs
        self.ignition = io.ignition_in();
        self.ready_safety_in = io.ready_safety_in();
        let voltage_12v = raw_to_volts(io.dc_power_supply_raw());
        params.set_float(ParamId::Lvdu12vBatteryVoltage, voltage_12v);
        params.set_bool(ParamId::LvduIgnitionIn, self.ignition);
        params.set_bool(ParamId::LvduReadySafetyIn, self.ready_safety_in);

        let inputs = VehicleInputs {
            bms_data_valid: params.get_bool(ParamId::BmsDataValid),
            bms_cont_state: params.get_int(ParamId::BmsContState),
            bms_pack_voltage: params.get_float(ParamId::BmsPackVoltage),
            bms_balancing_active: params.get_bool(ParamId::BmsBalancingActive),
            bms_actual_current: params.get_float(ParamId::BmsActualCurrent),
            dcdc_input_power_off_confirmed: params.get_bool(ParamId::DcdcInputPowerOffConfirmed),
            charger_plug_status: params.get_int(ParamId::ChargerPlugStatus),
            charger_plug_override: params.get_bool(ParamId::ChargerPlugOverride),
            manual_standby_mode: params.get_bool(ParamId::ManualStandbyMode),
            remote_precondition_request: params.get_bool(ParamId::RemotePreconditionRequest),
            drive_request: params.get_bool(ParamId::DriveRequest),
            critical_fault: params.get_bool(ParamId::CriticalFault),
            degraded_fault: params.get_bool(ParamId::DegradedFault),
            thermal_task_completed: params.get_bool(ParamId::ThermalTaskCompleted),
            lv_low_threshold: params.get_float(ParamId::Lvdu12vLowThreshold),
            hv_low_threshold: params.get_float(ParamId::LvduHvLowThreshold),
            charge_done_current: params.get_float(ParamId::ChargeDoneCurrent),
            charge_done_delay_s: params.get_int(ParamId::ChargeDoneDelay),
        };

        let hv_too_low = inputs.bms_data_valid && inputs.bms_pack_voltage < inputs.hv_low_threshold;
        let lv_too_low = voltage_12v < inputs.lv_low_threshold;
        let charger_plugged = inputs.charger_plugged();

        if hv_too_low {
            self.hv_too_low_ticks = self.hv_too_low_ticks.saturating_add(1);
        } else {
            self.hv_too_low_ticks = 0;
        }
        if lv_too_low {
            self.lv_too_low_ticks = self.lv_too_low_ticks.saturating_add(1);
        } else {
            self.lv_too_low_ticks = 0;
        }
        if !charger_plugged {
            self.charge_finished_latched = false;
        }
        if inputs.bms_actual_current.abs() < inputs.charge_done_current {
            self.charge_done_ticks = self.charge_done_ticks.saturating_add(1);
        } else {
            self.charge_done_ticks = 0;
        }
        if self.ignition && !self.ready_safety_in {
            self.ready_not_set_ticks = self.ready_not_set_ticks.saturating_add(1);
        } else {
            self.ready_not_set_ticks = 0;
        }
        if !self.ready_safety_in {
            self.ready_safety_low_ticks = self.ready_safety_low_ticks.saturating_add(1);
        } else {
            self.ready_safety_low_ticks = 0;
        }

        // (b) drive the HV handshake, then evaluate the state machine
        self.hvcm.set_hv_request(self.state.requires_hv());
        let hvcm_inputs = HvcmInputs {
            bms_data_valid: inputs.bms_data_valid,
            bms_cont_state: inputs.bms_cont_state,
            dcdc_input_power_off_confirmed: inputs.dcdc_input_power_off_confirmed,
            heater_off_confirmed: params.get_bool(ParamId::HeaterOffConfirmed),
        };
        self.hvcm.update(&hvcm_inputs, journal, tick_ms);

        self.evaluate_transitions(&inputs, hv_too_low, lv_too_low, charger_plugged);

        // (c) ready-relay diagnosis
        self.run_ready_diagnosis(journal, tick_ms);

        // (d) drive outputs
        self.drive_outputs(io);

        // (e) publish observables
        self.publish(params);
    }

    fn evaluate_transitions(
        &mut self,
        inputs: &VehicleInputs,
        hv_too_low: bool,
        lv_too_low: bool,
        charger_plugged: bool,
    ) {
        if inputs.manual_standby_mode
            && !matches!(self.state, VehicleState::Standby | VehicleState::HvDisconnecting)
        {
            self.route_to(VehicleState::Standby, TriggerEvent::ManualStandby);
            return;
        }

        match self.state {
            VehicleState::Sleep => {
                self.goto_direct(VehicleState::Standby, TriggerEvent::WokeFromSleep);
            }
            VehicleState::Standby => {
                if self.ignition && !charger_plugged {
                    self.standby_idle_ticks = 0;
                    self.goto_via_hv_connecting(VehicleState::Ready, TriggerEvent::IgnitionOn);
                } else if inputs.remote_precondition_request {
                    self.standby_idle_ticks = 0;
                    self.goto_via_hv_connecting(VehicleState::Conditioning, TriggerEvent::RemotePrecondition);
                } else if charger_plugged {
                    self.standby_idle_ticks = 0;
                    self.goto_via_hv_connecting(VehicleState::Charge, TriggerEvent::PluggedIn);
                } else {
                    self.standby_idle_ticks = self.standby_idle_ticks.saturating_add(1);
                    if self.standby_idle_ticks >= STANDBY_IDLE_TICKS && !inputs.bms_balancing_active {
                        self.goto_direct(VehicleState::Sleep, TriggerEvent::StandbyIdleTimeout);
                    } else if inputs.bms_balancing_active
                        && (!inputs.bms_data_valid || lv_too_low)
                    {
                        self.goto_direct(VehicleState::Sleep, TriggerEvent::StandbyBalancingLoss);
                    } else if lv_too_low && self.lv_too_low_ticks >= UNDER_VOLTAGE_TICKS {
                        self.goto_direct(VehicleState::Sleep, TriggerEvent::LvTooLow);
                    }
                }
            }
            VehicleState::HvConnecting => match self.hvcm.state() {
                HvState::Connected => {
                    let target = self.queued_state;
                    self.goto_direct(target, TriggerEvent::HvConnected);
                }
                HvState::Fault => self.goto_direct(VehicleState::Error, TriggerEvent::HvFault),
                _ => {}
            },
            VehicleState::HvDisconnecting => match self.hvcm.state() {
                HvState::Disconnected => {
                    let target = self.queued_state;
                    self.goto_direct(target, TriggerEvent::HvDisconnected);
                }
                HvState::Fault => self.goto_direct(VehicleState::Error, TriggerEvent::HvFault),
                _ => {}
            },
            VehicleState::Ready => {
                if !self.ignition {
                    self.goto_direct(VehicleState::Conditioning, TriggerEvent::IgnitionOff);
                } else if inputs.drive_request {
                    self.goto_direct(VehicleState::Drive, TriggerEvent::DriveRequested);
                } else if charger_plugged {
                    self.goto_direct(VehicleState::Charge, TriggerEvent::PluggedWhileReady);
                } else if inputs.critical_fault {
                    self.goto_via_hv_disconnecting(VehicleState::Error, TriggerEvent::CriticalFault);
                } else if hv_too_low && self.hv_too_low_ticks >= UNDER_VOLTAGE_TICKS {
                    self.goto_via_hv_disconnecting(VehicleState::Standby, TriggerEvent::HvTooLow);
                }
            }
            VehicleState::Conditioning => {
                let thermal_done = inputs.thermal_task_completed;
                if inputs.critical_fault {
                    self.goto_via_hv_disconnecting(VehicleState::Error, TriggerEvent::CriticalFault);
                } else if self.ignition {
                    self.goto_direct(VehicleState::Ready, TriggerEvent::IgnitionOn);
                } else if charger_plugged && !self.charge_finished_latched {
                    self.goto_direct(VehicleState::Charge, TriggerEvent::PluggedIn);
                } else if thermal_done
                    && !self.diagnose_pending
                    && self.ready_safety_low_ticks >= READY_SAFETY_LOW_TICKS
                {
                    self.goto_via_hv_disconnecting(VehicleState::Standby, TriggerEvent::ThermalDoneReadyDropped);
                } else if hv_too_low && self.hv_too_low_ticks >= UNDER_VOLTAGE_TICKS {
                    self.goto_via_hv_disconnecting(VehicleState::Standby, TriggerEvent::HvTooLow);
                }
            }
            VehicleState::Drive => {
                if !self.ignition {
                    self.goto_direct(VehicleState::Conditioning, TriggerEvent::IgnitionOff);
                } else if charger_plugged {
                    self.goto_direct(VehicleState::Charge, TriggerEvent::PluggedWhileReady);
                } else if inputs.degraded_fault {
                    self.goto_direct(VehicleState::LimpHome, TriggerEvent::DegradedFault);
                }
            }
            VehicleState::Charge => {
                if inputs.critical_fault {
                    self.goto_via_hv_disconnecting(VehicleState::Error, TriggerEvent::CriticalFault);
                } else if !charger_plugged && self.ignition {
                    self.goto_direct(VehicleState::Ready, TriggerEvent::IgnitionOn);
                } else if self.charge_finished(inputs) && !self.ignition {
                    self.charge_finished_latched = true;
                    self.goto_direct(VehicleState::Conditioning, TriggerEvent::ChargeFinished);
                }
            }
            VehicleState::LimpHome => {
                if !self.ignition {
                    self.goto_direct(VehicleState::Conditioning, TriggerEvent::IgnitionOff);
                } else if charger_plugged {
                    self.goto_direct(VehicleState::Charge, TriggerEvent::PluggedIn);
                }
            }
            VehicleState::Error => {
                if !self.ignition {
                    self.goto_via_hv_disconnecting(VehicleState::Sleep, TriggerEvent::ErrorIgnitionOff);
                } else if lv_too_low && self.lv_too_low_ticks >= UNDER_VOLTAGE_TICKS {
                    self.goto_direct(VehicleState::Sleep, TriggerEvent::LvTooLow);
                }
            }
            VehicleState::Invalid => {
                self.goto_direct(VehicleState::Sleep, TriggerEvent::None);
            }
        }
    }

    fn run_ready_diagnosis(&mut self, journal: &mut Journal, tick_ms: u32) {
        if self.diagnose_pending {
            if !self.ready_safety_in {
                journal.post(ErrorCode::ReadyDroppedDuringDiagnose, tick_ms);
            }
            self.diagnose_ticks += 1;
            if self.diagnose_ticks >= DIAGNOSE_TICKS {
                self.diagnose_pending = false;
                self.diagnose_cooldown_ticks = Some(0);
            }
        } else if let Some(cooldown) = self.diagnose_cooldown_ticks {
            let cooldown = cooldown + 1;
            if cooldown >= DIAGNOSE_COOLDOWN_TICKS {
                if self.ready_safety_in && !self.ignition {
                    journal.post(ErrorCode::ReadyStuckOnIgnitionOff, tick_ms);
                }
                self.diagnose_cooldown_ticks = None;
            } else {
                self.diagnose_cooldown_ticks = Some(cooldown);
            }
        }

        if self.ready_not_set_ticks >= READY_NOT_SET_TICKS {
            journal.post(ErrorCode::ReadyNotSetOnIgnition, tick_ms);
        }
    }

    fn output_pins(&self) -> (bool, bool, bool) {
        match self.state {
            VehicleState::Sleep => (false, false, false),
            VehicleState::Standby => (true, false, false),
            VehicleState::HvConnecting | VehicleState::HvDisconnecting => (true, true, false),
            VehicleState::Ready => (true, true, true),
            VehicleState::Conditioning => (true, true, self.diagnose_pending),
            VehicleState::Drive => (true, true, true),
            VehicleState::Charge => (true, true, false),
            VehicleState::Error => (true, false, false),
            VehicleState::LimpHome => (true, true, true),
            VehicleState::Invalid => (false, false, false),
        }
    }

    fn drive_outputs(&self, io: &mut dyn VehicleIo) {
        let (vcu, condition, ready) = self.output_pins();
        io.set_vcu_out(vcu);
        io.set_condition_out(condition);
        io.set_ready_out(ready);
    }

    fn publish(&self, params: &mut ParamStore) {
        params.set_int(ParamId::LvduVehicleState, self.state as i32);
        params.set_int(ParamId::LvduQueuedState, self.queued_state as i32);
        params.set_int(ParamId::LvduTriggerEvent, self.trigger as i32);
        params.set_int(ParamId::LvduPrevTriggerEvent, self.prev_trigger as i32);
        params.set_bool(
            ParamId::HvComfortFunctionsAllowed,
            self.hvcm.state() == HvState::Connected,
        );
        params.set_bool(ParamId::LvduDiagnosePending, self.diagnose_pending);
        let (vcu, condition, ready) = self.output_pins();
        params.set_bool(ParamId::LvduVcuOut, vcu);
        params.set_bool(ParamId::LvduConditionOut, condition);
        params.set_bool(ParamId::LvduReadyOut, ready);
        self.hvcm.publish(params);
    }
}

impl Default for Lvdu {
    fn default() -> Self {
        Self::new()
    }
}
