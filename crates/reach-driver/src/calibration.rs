//! 标定档案与原子换档
//!
//! `CalibrationProfile` 是进程内唯一被两条路径共享的可变资源：
//! 标定命令写、每次 Move 的运动学换算读。读取方通过
//! `ArcSwap`（见 [`crate::state::ArmContext`]）一次性取快照，
//! 写入方构建完整替换档案后整体交换——不存在部分更新。
//!
//! 持久化是外部协作者能力：核心只依赖 [`ProfileStore`] 的
//! `load()` / `save()`，格式与位置由实现方决定。

use reach_protocol::{CalibrateRequest, CartesianPoint, PlaneKind, PlaneSample};
use std::collections::BTreeMap;
use thiserror::Error;

/// 标定数据错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// 平面采样点退化（两点沿轴位置相同，无法确定斜率）
    #[error("Degenerate plane samples: both at {along}")]
    DegenerateSamples { along: f64 },
}

/// 档案持久化错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Profile IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Profile format error: {0}")]
    Format(String),
}

/// 档案持久化能力（外部协作者边界）
///
/// 进程启动时 `load()`，每次标定成功后 `save()`。
pub trait ProfileStore: Send {
    fn load(&self) -> Result<CalibrationProfile, StoreError>;
    fn save(&self, profile: &CalibrationProfile) -> Result<(), StoreError>;
}

/// 参考平面的线性修正
///
/// 由两个采样点确定：`correction(along) = slope * (along - anchor)`，
/// 其中 anchor 是原点（home）在该轴上的分量，由调用方在求值时扣除。
/// 机械安装的非理想倾斜在工作范围内近似线性。
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlaneCalibration {
    /// 高度随沿轴位置的变化率（mm/mm）
    pub slope: f64,
    /// 采样基准高度偏移（mm），在 home 处取零
    pub offset: f64,
}

impl PlaneCalibration {
    /// 理想平面（无修正）
    pub const fn identity() -> Self {
        Self {
            slope: 0.0,
            offset: 0.0,
        }
    }

    /// 从两个采样点重算线性修正
    pub fn from_samples(samples: &[PlaneSample; 2]) -> Result<Self, CalibrationError> {
        let d_along = samples[1].along - samples[0].along;
        if d_along.abs() < f64::EPSILON {
            return Err(CalibrationError::DegenerateSamples {
                along: samples[0].along,
            });
        }
        let slope = (samples[1].height - samples[0].height) / d_along;
        // offset 取第一个采样点外推到 along=0 处的高度
        let offset = samples[0].height - slope * samples[0].along;
        Ok(Self { slope, offset })
    }

    /// 在沿轴位置 `along`（相对 home）处的高度修正量
    pub fn correction(&self, along: f64) -> f64 {
        self.slope * along
    }
}

impl Default for PlaneCalibration {
    fn default() -> Self {
        Self::identity()
    }
}

/// 标定档案
///
/// 进程启动时加载，仅通过显式标定命令变更，变更即持久化。
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CalibrationProfile {
    /// 原点（home point），笛卡尔修正的参考系原点
    pub home: CartesianPoint,
    /// XZ 参考平面修正（沿 X 轴）
    pub plane_xz: PlaneCalibration,
    /// YZ 参考平面修正（沿 Y 轴）
    pub plane_yz: PlaneCalibration,
    /// 传感器中心（2D）
    pub sensor_center: [f64; 2],
    /// 命名点 → 关节角（度）
    pub points: BTreeMap<String, [f64; 3]>,
}

impl Default for CalibrationProfile {
    fn default() -> Self {
        Self {
            // 出厂原点：正前方 200mm、高 40mm（与原始硬件一致的量级）
            home: CartesianPoint::new(0.0, 200.0, 40.0),
            plane_xz: PlaneCalibration::identity(),
            plane_yz: PlaneCalibration::identity(),
            sensor_center: [0.0, 0.0],
            points: BTreeMap::new(),
        }
    }
}

impl CalibrationProfile {
    /// 应用一次标定请求，返回完整的替换档案
    ///
    /// 全有或全无：任何错误都返回 `Err`，调用方保留原档案不换档。
    pub fn apply(&self, request: &CalibrateRequest) -> Result<CalibrationProfile, CalibrationError> {
        let mut next = self.clone();
        match request {
            CalibrateRequest::Home(point) => {
                next.home = *point;
            },
            CalibrateRequest::Plane { plane, samples } => {
                let calibration = PlaneCalibration::from_samples(samples)?;
                match plane {
                    PlaneKind::Xz => next.plane_xz = calibration,
                    PlaneKind::Yz => next.plane_yz = calibration,
                }
            },
            CalibrateRequest::Sensor { u, v } => {
                next.sensor_center = [*u, *v];
            },
            CalibrateRequest::Point { name, angles } => {
                next.points.insert(name.clone(), *angles);
            },
        }
        Ok(next)
    }

    /// 查询命名点的关节角
    pub fn named_point(&self, name: &str) -> Option<[f64; 3]> {
        self.points.get(name).copied()
    }
}
