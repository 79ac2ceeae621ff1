//! 安全校验器
//!
//! 对逆解得到的目标关节角做两项强制检查：
//! - 逐关节限位 `[min, max]`
//! - 单次运动的最大角度增量（间接限制速度/加速度）
//!
//! 任何命令种类都不能绕过本检查，包括标定来源的命名点目标。

use crate::JOINT_COUNT;
use thiserror::Error;

/// 单关节限位（度）
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JointLimit {
    pub min_deg: f64,
    pub max_deg: f64,
}

/// 安全校验错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SafetyError {
    /// 关节角超出限位
    #[error("Joint {joint} out of range: {angle:.2}° not in [{min:.2}, {max:.2}]°")]
    OutOfRange {
        joint: usize,
        angle: f64,
        min: f64,
        max: f64,
    },

    /// 单次运动增量过大
    #[error("Joint {joint} delta too large: {delta:.2}° > {max:.2}°")]
    ExcessiveDelta { joint: usize, delta: f64, max: f64 },
}

/// 安全限值配置
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SafetyLimits {
    /// 逐关节限位
    pub joints: [JointLimit; JOINT_COUNT],
    /// 单次运动允许的最大关节角增量（度）
    pub max_delta_deg: f64,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            joints: [
                // 基座偏航
                JointLimit {
                    min_deg: -90.0,
                    max_deg: 90.0,
                },
                // 肩（低位目标需要负角，肩关节可下探到水平面以下）
                JointLimit {
                    min_deg: -90.0,
                    max_deg: 180.0,
                },
                // 肘
                JointLimit {
                    min_deg: 0.0,
                    max_deg: 180.0,
                },
            ],
            max_delta_deg: 120.0,
        }
    }
}

impl SafetyLimits {
    /// 校验目标关节角
    ///
    /// 先查限位再查增量；返回第一个违例。通过才允许触碰硬件。
    pub fn validate(
        &self,
        current: &[f64; JOINT_COUNT],
        target: &[f64; JOINT_COUNT],
    ) -> Result<(), SafetyError> {
        for (joint, (&angle, limit)) in target.iter().zip(self.joints.iter()).enumerate() {
            if angle < limit.min_deg || angle > limit.max_deg {
                return Err(SafetyError::OutOfRange {
                    joint,
                    angle,
                    min: limit.min_deg,
                    max: limit.max_deg,
                });
            }
        }
        for (joint, (&from, &to)) in current.iter().zip(target.iter()).enumerate() {
            let delta = (to - from).abs();
            if delta > self.max_delta_deg {
                return Err(SafetyError::ExcessiveDelta {
                    joint,
                    delta,
                    max: self.max_delta_deg,
                });
            }
        }
        Ok(())
    }
}
