//! 驱动层模块
//!
//! 本模块提供 Reach 机械臂控制器的并发调度核心，包括：
//! - 三条独立命令队列（Action / LED / Buzzer，有界 FIFO）
//! - 域工作线程（消费-校验-执行-上报循环）
//! - 运动学与标定引擎（ArcSwap 快照读取，标定原子换档）
//! - 安全校验器（限位 + 单次运动最大增量）
//! - 消息路由器（序列号分配、命令分类、系统命令直通）
//!
//! # 使用场景
//!
//! 连接管理器（TCP 守护进程）将原始命令行交给 [`Router`]，
//! 反馈事件经共享通道汇聚到单一串行写出点。

pub mod actuator;
pub mod calibration;
pub mod config;
mod error;
pub mod kinematics;
pub mod queue;
pub mod router;
pub mod safety;
pub mod state;
pub mod worker;

pub use actuator::{ActuationError, ArmActuator, BuzzerActuator, LedActuator};
pub use calibration::{CalibrationError, CalibrationProfile, PlaneCalibration, ProfileStore, StoreError};
pub use config::{DriverConfig, FullPolicy, MotionConfig};
pub use error::DriverError;
pub use kinematics::{ArmGeometry, KinematicsError, forward, to_joint_angles};
pub use queue::{CommandQueues, Domain, EnqueueError, QueueReceivers};
pub use router::Router;
pub use safety::{JointLimit, SafetyError, SafetyLimits};
pub use state::{ArmContext, ArmState};
pub use worker::{ArmWorker, BuzzerWorker, LedWorker};

/// 机械臂关节数（基座偏航 + 肩 + 肘）
pub const JOINT_COUNT: usize = 3;
