//! 共享运行时状态
//!
//! 工作线程、路由器与状态查询通过 [`ArmContext`] 共享数据：
//! - 标定档案与臂状态用 `ArcSwap` 保存，读取无锁（`ArcSwap::load`），
//!   写入以完整快照原子替换——档案替换的全有或全无由此保证；
//! - 急停用单调递增的 `stop_epoch` 表示：Arm 线程在运动开始时记下
//!   纪元，在插值段之间比较，发现变化即放弃剩余运动。用纪元而不是
//!   布尔标志，消除了 stop 到达时线程尚空闲导致的清标志竞争。

use crate::JOINT_COUNT;
use crate::calibration::CalibrationProfile;
use crate::kinematics::{ArmGeometry, forward};
use arc_swap::ArcSwap;
use reach_protocol::CartesianPoint;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// 臂状态快照
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmState {
    /// 当前关节角（度）
    pub joint_angles_deg: [f64; JOINT_COUNT],
    /// 由正运动学得到的末端位置（臂坐标系）
    pub cartesian: CartesianPoint,
    /// Arm 线程是否正在执行运动
    pub motion_in_progress: bool,
    /// 电机是否使能（relax 后为 false）
    pub motors_enabled: bool,
}

impl ArmState {
    /// 按给定几何从关节角构造快照
    pub fn at_angles(angles: [f64; JOINT_COUNT], geometry: &ArmGeometry) -> Self {
        Self {
            joint_angles_deg: angles,
            cartesian: forward(&angles, geometry),
            motion_in_progress: false,
            motors_enabled: true,
        }
    }

    /// 状态行文本（status 命令的反馈 detail）
    pub fn summary(&self) -> String {
        format!(
            "J1={:.2} J2={:.2} J3={:.2} X={:.1} Y={:.1} Z={:.1} motion={} motors={}",
            self.joint_angles_deg[0],
            self.joint_angles_deg[1],
            self.joint_angles_deg[2],
            self.cartesian.x,
            self.cartesian.y,
            self.cartesian.z,
            if self.motion_in_progress { "moving" } else { "idle" },
            if self.motors_enabled { "loaded" } else { "relaxed" },
        )
    }
}

/// 共享运行时上下文
///
/// 克隆 `Arc<ArmContext>` 分发给路由器和各工作线程。
pub struct ArmContext {
    profile: ArcSwap<CalibrationProfile>,
    arm_state: ArcSwap<ArmState>,
    stop_epoch: AtomicU64,
    is_running: AtomicBool,
}

impl ArmContext {
    pub fn new(profile: CalibrationProfile, initial_state: ArmState) -> Arc<Self> {
        Arc::new(Self {
            profile: ArcSwap::from_pointee(profile),
            arm_state: ArcSwap::from_pointee(initial_state),
            stop_epoch: AtomicU64::new(0),
            is_running: AtomicBool::new(true),
        })
    }

    /// 当前标定档案（无锁读取）
    pub fn profile(&self) -> Arc<CalibrationProfile> {
        self.profile.load_full()
    }

    /// 原子替换标定档案（持久化成功后才调用）
    pub fn swap_profile(&self, profile: CalibrationProfile) {
        self.profile.store(Arc::new(profile));
    }

    /// 当前臂状态快照（无锁读取）
    pub fn arm_state(&self) -> ArmState {
        **self.arm_state.load()
    }

    /// 替换臂状态快照（仅 Arm 线程调用）
    pub fn set_arm_state(&self, state: ArmState) {
        self.arm_state.store(Arc::new(state));
    }

    /// 请求急停：推进纪元，使在途运动在下一个段边界放弃
    pub fn request_stop(&self) {
        self.stop_epoch.fetch_add(1, Ordering::Release);
    }

    /// 当前停止纪元（运动开始时快照）
    pub fn stop_epoch(&self) -> u64 {
        self.stop_epoch.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// 通知全部工作线程退出
    pub fn shutdown(&self) {
        self.is_running.store(false, Ordering::Release);
    }
}
