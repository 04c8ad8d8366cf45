//! C9 — the scheduler.
//!
//! Invokes the 1 ms / 10 ms / 100 ms tasks of C4 through C8 (via C5) and
//! C11 from a hardware timer, in the fixed order `SPEC_FULL.md` §5
//! specifies: HVCM and EPS run inside the LVDU's 100 ms slot, after LVDU has
//! published; heater and vacuum run on the 10 ms slot; the BMS frame encode
//! runs last in the 100 ms slot.

use crate::can::BmsFrameEncoder;
use crate::eps::{Eps, EpsInputs};
use crate::heater::{Heater, HeaterInputs};
use crate::io::{VehicleIo, Watchdog};
use crate::journal::{ErrorCode, Journal};
use crate::param::{ParamId, ParamStore};
use crate::vacuum::VacuumPump;
use crate::vehicle::Lvdu;

/// 3 missed 100 ms ticks (300 ms) before the BMS link is declared stale,
/// matching the reference BMS decoder's `BMS_TIMEOUT_TICKS`.
const BMS_TIMEOUT_TICKS: u8 = 3;

/// Owns every stateful component and threads ticks through them.
pub struct Scheduler {
    lvdu: Lvdu,
    eps: Eps,
    heater: Heater,
    vacuum: VacuumPump,
    can_encoder: BmsFrameEncoder,
    bms_missed_ticks: u8,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            lvdu: Lvdu::new(),
            eps: Eps::new(),
            heater: Heater::new(),
            vacuum: VacuumPump::new(),
            can_encoder: BmsFrameEncoder::new(),
            bms_missed_ticks: 0,
        }
    }

    pub fn lvdu(&self) -> &Lvdu {
        &self.lvdu
    }

    pub fn eps(&self) -> &Eps {
        &self.eps
    }

    pub fn heater(&self) -> &Heater {
        &self.heater
    }

    pub fn vacuum(&self) -> &VacuumPump {
        &self.vacuum
    }

    /// 1 ms slot: only the watchdog runs at this rate.
    pub fn task_1ms(&mut self, watchdog: &mut dyn Watchdog) {
        watchdog.kick();
    }

    /// 10 ms slot: heater then vacuum.
    pub fn task_10ms(&mut self, io: &mut dyn VehicleIo, params: &mut ParamStore, journal: &mut Journal, tick_ms: u32) {
        let heater_inputs = HeaterInputs {
            vehicle_state: crate::vehicle::VehicleState::from_u8(
                params.get_int(ParamId::LvduVehicleState) as u8,
            )
            .unwrap_or_default(),
            hv_comfort_functions_allowed: params.get_bool(ParamId::HvComfortFunctionsAllowed),
            thermal_switch_closed: io.heater_thermal_switch_in(),
            contactor_feedback_closed: io.heater_contactor_feedback_in(),
            flap_raw: io.heater_flap_raw(),
            flap_threshold: params.get_int(ParamId::HeaterFlapThreshold).max(0) as u16,
            manual_override: params.get_bool(ParamId::HeaterActiveManual),
        };
        self.heater.update(
            &heater_inputs,
            params.get_int(ParamId::HeaterContactorOnDelay),
            params.get_int(ParamId::HeaterThermalOpenTimeout),
            params.get_int(ParamId::HeaterThermalCloseTimeout),
            journal,
            tick_ms,
        );
        self.heater.drive_outputs(io);
        self.heater.publish(params, io.heater_contactor_feedback_in());

        let vehicle_state = crate::vehicle::VehicleState::from_u8(
            params.get_int(ParamId::LvduVehicleState) as u8,
        )
        .unwrap_or_default();
        let vacuum_ok = io.vacuum_sensor_in();
        params.set_bool(ParamId::VacuumSensor, vacuum_ok);
        self.vacuum.update(
            vehicle_state,
            vacuum_ok,
            params.get_int(ParamId::VacuumHysteresis),
            params.get_int(ParamId::VacuumWarningDelay),
            journal,
            tick_ms,
        );
        self.vacuum.drive_outputs(io);
        self.vacuum.publish(params);
    }

    /// 100 ms slot: LVDU (driving HVCM), then EPS, then BMS liveness
    /// aggregation, then the outgoing CAN frame.
    pub fn task_100ms(
        &mut self,
        io: &mut dyn VehicleIo,
        params: &mut ParamStore,
        journal: &mut Journal,
        tick_ms: u32,
    ) -> [u8; 8] {
        self.lvdu.task_100ms(io, params, journal, tick_ms);

        let eps_inputs = EpsInputs {
            vehicle_state: self.lvdu.state(),
            dcdc_fault_any: params.get_bool(ParamId::DcdcFaultAny),
            dcdc_output_voltage: params.get_float(ParamId::DcdcOutputVoltage),
        };
        self.eps
            .update(&eps_inputs, params.get_int(ParamId::EpsSpoolupDelay), journal, tick_ms);
        self.eps.drive_outputs(io);
        self.eps.publish(params);

        self.aggregate_bms_liveness(params, journal, tick_ms);

        self.can_encoder.encode(
            params.get_int(ParamId::LvduVehicleState) as u8,
            params.get_bool(ParamId::LvduForcedVcusShutdown),
            params.get_bool(ParamId::HvcmToBmsHvRequest),
        )
    }

    /// §6 "BMS liveness aggregation": freshness watchdog plus direct fault
    /// pass-through, grounded on `original_source/src/teensyBMS.cpp`'s
    /// `Task100Ms`.
    fn aggregate_bms_liveness(&mut self, params: &mut ParamStore, journal: &mut Journal, tick_ms: u32) {
        let data_valid = params.get_bool(ParamId::BmsDataValid);
        if data_valid {
            self.bms_missed_ticks = 0;
        } else {
            self.bms_missed_ticks = self.bms_missed_ticks.saturating_add(1);
            if self.bms_missed_ticks == BMS_TIMEOUT_TICKS {
                journal.post(ErrorCode::BmsTimeout, tick_ms);
            }
        }

        if params.get_bool(ParamId::BmsFault) {
            journal.post(ErrorCode::BmsFault, tick_ms);
        }
        if params.get_bool(ParamId::BmsContactorFault) {
            journal.post(ErrorCode::BmsContactorFault, tick_ms);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
