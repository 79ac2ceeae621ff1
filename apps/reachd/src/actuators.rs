//! 仿真执行器
//!
//! 真实 GPIO/PWM 驱动属于板级支持包；守护进程默认挂仿真执行器，
//! 把每次硬件调用记入日志，计时行为与真实硬件一致（蜂鸣器在
//! 音调持续期间阻塞）。

use reach_driver::{ActuationError, ArmActuator, BuzzerActuator, LedActuator};
use reach_protocol::{LedCommand, ToneSpec};
use std::time::Duration;
use tracing::{debug, info, trace};

pub struct SimArm;

impl ArmActuator for SimArm {
    fn drive_segment(&mut self, angles: &[f64; 3]) -> Result<(), ActuationError> {
        trace!(j1 = angles[0], j2 = angles[1], j3 = angles[2], "drive segment");
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), ActuationError> {
        info!(enabled, "motor enable");
        Ok(())
    }

    fn halt(&mut self) -> Result<(), ActuationError> {
        info!("halt");
        Ok(())
    }
}

pub struct SimLed;

impl LedActuator for SimLed {
    fn set_led(&mut self, command: &LedCommand) -> Result<(), ActuationError> {
        debug!(mode = ?command.mode, rgb = ?command.rgb, "set led");
        Ok(())
    }
}

pub struct SimBuzzer;

impl BuzzerActuator for SimBuzzer {
    fn play_tone(&mut self, tone: &ToneSpec) -> Result<(), ActuationError> {
        debug!(freq = tone.frequency_hz, ms = tone.duration_ms, "play tone");
        if tone.frequency_hz > 0 && tone.duration_ms > 0 {
            std::thread::sleep(Duration::from_millis(tone.duration_ms));
        }
        Ok(())
    }
}
