//! Register names and value encodings shared by transports and the core.
//!
//! Full channel names are `<prefix><SUFFIX>`. A cavity prefix looks like
//! `ACCL:L0B:0110:`; the stepper and SSA live under `<cavity>STEP:` and
//! `<cavity>SSA:`.

/// Cavity-level registers.
pub mod cavity {
    pub const TUNE_CONFIG: &str = "TUNE_CONFIG";
    pub const HW_MODE: &str = "HWMODE";
    pub const DETUNE_BEST: &str = "DFBEST";
    pub const DF_COLD: &str = "DF_COLD";
    pub const PARK: &str = "PARK";
    pub const CHIRP_START: &str = "CHIRP:FREQ_START";
    pub const CHIRP_STOP: &str = "CHIRP:FREQ_STOP";
    pub const RF_CTRL: &str = "RFCTRL";
    pub const RF_STATE: &str = "RFSTATE";
    pub const RF_MODE_CTRL: &str = "RFMODECTRL";
    pub const RF_MODE: &str = "RFMODE";
}

/// Stepper tuner registers (under the `STEP:` prefix).
pub mod stepper {
    pub const NSTEPS_PARK: &str = "NSTEPS_PARK";
    pub const NSTEPS_COLD: &str = "NSTEPS_COLD";
    pub const STEP_TOTAL: &str = "REG_TOTABS";
    pub const STEP_SIGNED: &str = "REG_TOTSGN";
    pub const RESET_SIGNED: &str = "TOTSGN_RESET";
    pub const ABORT: &str = "ABORT_REQ";
    pub const NSTEPS: &str = "NSTEPS";
    pub const MAX_SPEED: &str = "VMAX";
    pub const MOVE_POS: &str = "MOV_REQ_POS";
    pub const MOVE_NEG: &str = "MOV_REQ_NEG";
    pub const MOTION_STATE: &str = "STAT_MOV";
}

/// Solid-state amplifier registers (under the `SSA:` prefix).
pub mod ssa {
    pub const POWER_ON: &str = "PowerOn";
    pub const POWER_OFF: &str = "PowerOff";
    pub const STATUS: &str = "StatusMessage";
}

/// Numeric encodings of enumerated registers.
pub mod codes {
    pub const TUNE_RESONANCE: f64 = 0.0;
    pub const TUNE_COLD: f64 = 1.0;
    pub const TUNE_PARKED: f64 = 2.0;
    pub const TUNE_OTHER: f64 = 3.0;

    pub const HW_ONLINE: f64 = 0.0;
    pub const HW_MAINTENANCE: f64 = 1.0;
    pub const HW_OFFLINE: f64 = 2.0;
    pub const HW_MAINTENANCE_DONE: f64 = 3.0;
    pub const HW_READY: f64 = 4.0;

    pub const RF_MODE_CHIRP: f64 = 4.0;
    pub const RF_ON: f64 = 1.0;
    pub const RF_OFF: f64 = 0.0;

    pub const SSA_ON: f64 = 3.0;
    pub const SSA_OFF: f64 = 1.0;

    pub const MOTION_IDLE: f64 = 0.0;
    pub const MOTION_MOVING: f64 = 1.0;
}

/// `ACCL:<linac>:<cm><cavity>0:`
pub fn cavity_prefix(linac: &str, cryomodule: &str, cavity: u8) -> String {
    format!("ACCL:{linac}:{cryomodule}{cavity}0:")
}

pub fn stepper_prefix(cavity_prefix: &str) -> String {
    format!("{cavity_prefix}STEP:")
}

pub fn ssa_prefix(cavity_prefix: &str) -> String {
    format!("{cavity_prefix}SSA:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_follow_naming_scheme() {
        let cav = cavity_prefix("L0B", "01", 1);
        assert_eq!(cav, "ACCL:L0B:0110:");
        assert_eq!(stepper_prefix(&cav), "ACCL:L0B:0110:STEP:");
        assert_eq!(ssa_prefix(&cav), "ACCL:L0B:0110:SSA:");
        assert_eq!(cavity_prefix("L1B", "H2", 8), "ACCL:L1B:H280:");
    }
}
