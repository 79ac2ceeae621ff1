//! 域工作线程
//!
//! 每个域一条专属线程，在自己的队列上循环：
//! 取件 → 校验 → 执行 → 上报恰好一条终态反馈。
//!
//! Arm 线程串行消费 Move / Calibrate / Load / Relax，天然互斥了
//! 标定与运动的并发；执行运动时按细粒度插值段推进，段间比较
//! 停止纪元（见 [`ArmContext::stop_epoch`]），发现变化立即放弃。
//!
//! 任何硬件故障都上报 `ERR` 反馈后恢复到取件状态，线程不退出。

use crate::JOINT_COUNT;
use crate::actuator::{ArmActuator, BuzzerActuator, LedActuator};
use crate::calibration::{CalibrationProfile, ProfileStore};
use crate::config::{DriverConfig, MotionConfig};
use crate::error::DriverError;
use crate::kinematics::to_joint_angles;
use crate::state::{ArmContext, ArmState};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use reach_protocol::{
    CalibrateRequest, Command, CommandClass, CommandKind, FeedbackEvent, MoveTarget, SystemCommand,
    ToneSpec,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 空闲时轮询退出标志的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Arm 域工作线程
pub struct ArmWorker<A: ArmActuator, S: ProfileStore> {
    ctx: Arc<ArmContext>,
    feedback_tx: Sender<FeedbackEvent>,
    actuator: A,
    store: S,
    config: DriverConfig,
}

impl<A: ArmActuator, S: ProfileStore> ArmWorker<A, S> {
    pub fn new(
        ctx: Arc<ArmContext>,
        feedback_tx: Sender<FeedbackEvent>,
        actuator: A,
        store: S,
        config: DriverConfig,
    ) -> Self {
        Self {
            ctx,
            feedback_tx,
            actuator,
            store,
            config,
        }
    }

    /// 消费循环，直到上下文关停或队列关闭
    pub fn run(mut self, rx: Receiver<Command>) {
        info!("Arm worker started");
        while self.ctx.is_running() {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!("Arm worker stopped");
    }

    /// 处理一条命令，保证恰好产生一条反馈
    pub fn handle(&mut self, command: Command) {
        let seq = command.seq;
        let class = command.kind.class();
        let event = match command.kind {
            CommandKind::Move(target) => self.handle_move(seq, &target),
            CommandKind::Calibrate(request) => self.handle_calibrate(seq, &request),
            CommandKind::System(SystemCommand::Load) => self.set_motors(seq, true),
            CommandKind::System(SystemCommand::Relax) => self.set_motors(seq, false),
            other => {
                // stop/status 在路由器直通，LED/蜂鸣器走各自队列
                warn!(seq, kind = ?other, "Misrouted command on action queue");
                FeedbackEvent::rejected(seq, class, "misrouted command")
            },
        };
        self.emit(event);
    }

    fn handle_move(&mut self, seq: u64, target: &MoveTarget) -> FeedbackEvent {
        let state = self.ctx.arm_state();
        if !state.motors_enabled {
            return FeedbackEvent::rejected(seq, CommandClass::Move, "motors relaxed, load first");
        }

        match self.resolve_target(&state, target) {
            Ok(angles) => self.execute_motion(seq, state, angles),
            Err(e) => {
                debug!(seq, error = %e, "Move rejected before actuation");
                FeedbackEvent::rejected(seq, CommandClass::Move, e.to_string())
            },
        }
    }

    /// 运动学换算 + 安全校验；任一失败都在触碰硬件前拒绝
    fn resolve_target(
        &self,
        state: &ArmState,
        target: &MoveTarget,
    ) -> Result<[f64; JOINT_COUNT], DriverError> {
        let profile = self.ctx.profile();
        let angles = to_joint_angles(target, &profile, &self.config.geometry)?;
        self.config.limits.validate(&state.joint_angles_deg, &angles)?;
        Ok(angles)
    }

    /// 插值执行运动；段间检查停止纪元
    fn execute_motion(
        &mut self,
        seq: u64,
        state: ArmState,
        target: [f64; JOINT_COUNT],
    ) -> FeedbackEvent {
        let epoch = self.ctx.stop_epoch();
        let from = state.joint_angles_deg;
        let interval = Duration::from_micros(self.config.motion.segment_interval_us);

        self.ctx.set_arm_state(ArmState {
            motion_in_progress: true,
            ..state
        });

        let mut reached = from;
        let mut outcome = None;
        for segment in plan_segments(&from, &target, &self.config.motion) {
            if self.ctx.stop_epoch() != epoch {
                debug!(seq, "Motion interrupted by stop");
                self.halt_best_effort();
                outcome = Some(FeedbackEvent::rejected(
                    seq,
                    CommandClass::Move,
                    "interrupted by stop",
                ));
                break;
            }
            if let Err(e) = self.actuator.drive_segment(&segment) {
                error!(seq, error = %e, "Actuator fault during motion");
                self.halt_best_effort();
                outcome = Some(FeedbackEvent::error(seq, CommandClass::Move, e.to_string()));
                break;
            }
            reached = segment;
            spin_sleep::sleep(interval);
        }

        // 状态反映实际到达的角度，无论成功、被停止还是故障
        self.ctx.set_arm_state(ArmState {
            motion_in_progress: false,
            ..ArmState::at_angles(reached, &self.config.geometry)
        });

        outcome.unwrap_or_else(|| {
            let end = self.ctx.arm_state().cartesian;
            FeedbackEvent::ok(
                seq,
                CommandClass::Move,
                format!("reached X{:.1} Y{:.1} Z{:.1}", end.x, end.y, end.z),
            )
        })
    }

    /// 标定：先持久化，成功后才换档（失败保留原档案）
    fn handle_calibrate(&mut self, seq: u64, request: &CalibrateRequest) -> FeedbackEvent {
        match self.apply_calibration(request) {
            Ok(next) => {
                self.ctx.swap_profile(next);
                info!(seq, "Calibration profile updated");
                FeedbackEvent::ok(seq, CommandClass::Calibrate, "calibration saved")
            },
            // 数据非法是拒绝；持久化失败是故障，两者都不换档
            Err(e @ DriverError::Calibration(_)) => {
                debug!(seq, error = %e, "Calibration rejected");
                FeedbackEvent::rejected(seq, CommandClass::Calibrate, e.to_string())
            },
            Err(e) => {
                error!(seq, error = %e, "Calibration persistence failed, profile unchanged");
                FeedbackEvent::error(seq, CommandClass::Calibrate, e.to_string())
            },
        }
    }

    fn apply_calibration(&self, request: &CalibrateRequest) -> Result<CalibrationProfile, DriverError> {
        let next = self.ctx.profile().apply(request)?;
        self.store.save(&next)?;
        Ok(next)
    }

    fn set_motors(&mut self, seq: u64, enabled: bool) -> FeedbackEvent {
        if let Err(e) = self.actuator.set_enabled(enabled) {
            error!(seq, enabled, error = %e, "Motor enable switch failed");
            return FeedbackEvent::error(seq, CommandClass::System, e.to_string());
        }
        let state = self.ctx.arm_state();
        self.ctx.set_arm_state(ArmState {
            motors_enabled: enabled,
            ..state
        });
        let detail = if enabled { "motors loaded" } else { "motors relaxed" };
        FeedbackEvent::ok(seq, CommandClass::System, detail)
    }

    fn halt_best_effort(&mut self) {
        if let Err(e) = self.actuator.halt() {
            warn!(error = %e, "Halt failed after motion abort");
        }
    }

    fn emit(&self, event: FeedbackEvent) {
        if self.feedback_tx.send(event).is_err() {
            warn!("Feedback channel closed, event dropped");
        }
    }
}

/// 关节空间线性插值
///
/// 段数由角变化最大的关节与 `step_deg` 决定，最后一段精确落在
/// 目标角上。起点即目标时返回单段（仍触发一次硬件调用，保证
/// 执行器与软件状态一致）。
fn plan_segments(
    from: &[f64; JOINT_COUNT],
    to: &[f64; JOINT_COUNT],
    motion: &MotionConfig,
) -> Vec<[f64; JOINT_COUNT]> {
    let max_delta = from
        .iter()
        .zip(to.iter())
        .map(|(a, b)| (b - a).abs())
        .fold(0.0f64, f64::max);
    let count = ((max_delta / motion.step_deg).ceil() as usize).max(1);

    (1..=count)
        .map(|i| {
            // 末段直接取目标角，消除插值的浮点残差
            if i == count {
                return *to;
            }
            let t = i as f64 / count as f64;
            [
                from[0] + (to[0] - from[0]) * t,
                from[1] + (to[1] - from[1]) * t,
                from[2] + (to[2] - from[2]) * t,
            ]
        })
        .collect()
}

/// LED 域工作线程
pub struct LedWorker<L: LedActuator> {
    ctx: Arc<ArmContext>,
    feedback_tx: Sender<FeedbackEvent>,
    actuator: L,
}

impl<L: LedActuator> LedWorker<L> {
    pub fn new(ctx: Arc<ArmContext>, feedback_tx: Sender<FeedbackEvent>, actuator: L) -> Self {
        Self {
            ctx,
            feedback_tx,
            actuator,
        }
    }

    pub fn run(mut self, rx: Receiver<Command>) {
        info!("LED worker started");
        while self.ctx.is_running() {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!("LED worker stopped");
    }

    pub fn handle(&mut self, command: Command) {
        let seq = command.seq;
        let event = match &command.kind {
            CommandKind::Led(led) => match self.actuator.set_led(led) {
                Ok(()) => FeedbackEvent::ok(
                    seq,
                    CommandClass::Led,
                    format!("led mode {:?}", led.mode),
                ),
                Err(e) => {
                    error!(seq, error = %e, "LED actuator fault");
                    FeedbackEvent::error(seq, CommandClass::Led, e.to_string())
                },
            },
            _ => {
                warn!(seq, "Misrouted command on led queue");
                FeedbackEvent::rejected(seq, command.kind.class(), "misrouted command")
            },
        };
        if self.feedback_tx.send(event).is_err() {
            warn!("Feedback channel closed, event dropped");
        }
    }
}

/// 蜂鸣器域工作线程
///
/// `play_tone` 在音调持续期间阻塞，期间后续蜂鸣命令在队列中排队。
pub struct BuzzerWorker<B: BuzzerActuator> {
    ctx: Arc<ArmContext>,
    feedback_tx: Sender<FeedbackEvent>,
    actuator: B,
}

impl<B: BuzzerActuator> BuzzerWorker<B> {
    pub fn new(ctx: Arc<ArmContext>, feedback_tx: Sender<FeedbackEvent>, actuator: B) -> Self {
        Self {
            ctx,
            feedback_tx,
            actuator,
        }
    }

    pub fn run(mut self, rx: Receiver<Command>) {
        info!("Buzzer worker started");
        while self.ctx.is_running() {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!("Buzzer worker stopped");
    }

    pub fn handle(&mut self, command: Command) {
        let seq = command.seq;
        let event = match &command.kind {
            CommandKind::Buzzer(tone) => match self.actuator.play_tone(tone) {
                Ok(()) => FeedbackEvent::ok(seq, CommandClass::Buzzer, tone_detail(tone)),
                Err(e) => {
                    error!(seq, error = %e, "Buzzer actuator fault");
                    FeedbackEvent::error(seq, CommandClass::Buzzer, e.to_string())
                },
            },
            _ => {
                warn!(seq, "Misrouted command on buzzer queue");
                FeedbackEvent::rejected(seq, command.kind.class(), "misrouted command")
            },
        };
        if self.feedback_tx.send(event).is_err() {
            warn!("Feedback channel closed, event dropped");
        }
    }
}

fn tone_detail(tone: &ToneSpec) -> String {
    if tone.frequency_hz == 0 {
        "buzzer off".to_string()
    } else {
        format!("tone {}Hz {}ms", tone.frequency_hz, tone.duration_ms)
    }
}
