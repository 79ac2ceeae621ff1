//! 运动学引擎
//!
//! 三关节构型：基座偏航 + 肩 + 肘（两连杆平面臂）。
//! 笛卡尔目标先按标定档案做高度修正（参考平面的线性倾斜补偿，
//! 以 home 为修正原点），再在 reach/height 平面内用余弦定理求逆解。
//! 命名点直接查档案表，不经过逆解。
//!
//! 所有关节角单位为度；坐标单位为毫米。

use crate::calibration::CalibrationProfile;
use reach_protocol::{CartesianPoint, MoveTarget};
use thiserror::Error;

/// 机械几何参数（连杆长度、基座高度）
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ArmGeometry {
    /// 大臂长度（mm）
    pub link1_mm: f64,
    /// 小臂长度（mm）
    pub link2_mm: f64,
    /// 肩关节离工作面高度（mm）
    pub base_height_mm: f64,
}

impl Default for ArmGeometry {
    fn default() -> Self {
        Self {
            link1_mm: 150.0,
            link2_mm: 150.0,
            base_height_mm: 80.0,
        }
    }
}

/// 运动学错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KinematicsError {
    /// 目标超出工作空间（两连杆无法到达）
    #[error("Target out of workspace: distance {distance:.1}mm, reach [{min:.1}, {max:.1}]mm")]
    OutOfWorkspace { distance: f64, min: f64, max: f64 },

    /// 未标定的命名点
    #[error("Unknown named point: {name}")]
    UnknownPoint { name: String },
}

/// 逆运动学：移动目标 → 关节角
///
/// - 笛卡尔目标：先做平面修正（`z' = z - 修正(x - home.x) - 修正(y - home.y)`），
///   再求逆解；不可达时返回 [`KinematicsError::OutOfWorkspace`]。
/// - 命名点：查档案表；未标定返回 [`KinematicsError::UnknownPoint`]。
///
/// 返回的角度仍须通过安全校验器，本函数不做限位检查。
pub fn to_joint_angles(
    target: &MoveTarget,
    profile: &CalibrationProfile,
    geometry: &ArmGeometry,
) -> Result<[f64; 3], KinematicsError> {
    match target {
        MoveTarget::Named(name) => profile
            .named_point(name)
            .ok_or_else(|| KinematicsError::UnknownPoint { name: name.clone() }),
        MoveTarget::Cartesian(point) => {
            // 平面倾斜补偿，以 home 为修正原点
            let corrected_z = point.z
                - profile.plane_xz.correction(point.x - profile.home.x)
                - profile.plane_yz.correction(point.y - profile.home.y);
            inverse(point.x, point.y, corrected_z, geometry)
        },
    }
}

/// 平面两连杆逆解
fn inverse(x: f64, y: f64, z: f64, geometry: &ArmGeometry) -> Result<[f64; 3], KinematicsError> {
    let l1 = geometry.link1_mm;
    let l2 = geometry.link2_mm;

    let base_rad = y.atan2(x);
    let r = (x * x + y * y).sqrt();
    let dz = z - geometry.base_height_mm;
    let d = (r * r + dz * dz).sqrt();

    let max = l1 + l2;
    let min = (l1 - l2).abs();
    if d > max || d < min {
        return Err(KinematicsError::OutOfWorkspace {
            distance: d,
            min,
            max,
        });
    }

    // 余弦定理。d 在 [min, max] 内时 cos 参数必在 [-1, 1]，
    // clamp 只吸收浮点边界噪声。
    let cos_elbow = ((l1 * l1 + l2 * l2 - d * d) / (2.0 * l1 * l2)).clamp(-1.0, 1.0);
    let elbow_rad = cos_elbow.acos();

    let cos_inner = ((l1 * l1 + d * d - l2 * l2) / (2.0 * l1 * d)).clamp(-1.0, 1.0);
    let shoulder_rad = dz.atan2(r) + cos_inner.acos();

    Ok([
        base_rad.to_degrees(),
        shoulder_rad.to_degrees(),
        elbow_rad.to_degrees(),
    ])
}

/// 正运动学：关节角 → 末端笛卡尔位置（臂坐标系，不含标定修正）
///
/// 用于状态上报和逆解的回环验证。
pub fn forward(angles: &[f64; 3], geometry: &ArmGeometry) -> CartesianPoint {
    let base_rad = angles[0].to_radians();
    let shoulder_rad = angles[1].to_radians();
    let elbow_rad = angles[2].to_radians();

    let l1 = geometry.link1_mm;
    let l2 = geometry.link2_mm;

    // 小臂相对水平面的角度 = 肩角 - (π - 肘角)
    let fore_rad = shoulder_rad - (std::f64::consts::PI - elbow_rad);
    let r = l1 * shoulder_rad.cos() + l2 * fore_rad.cos();
    let dz = l1 * shoulder_rad.sin() + l2 * fore_rad.sin();

    CartesianPoint::new(
        r * base_rad.cos(),
        r * base_rad.sin(),
        dz + geometry.base_height_mm,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use reach_protocol::CartesianPoint;

    const TOLERANCE_MM: f64 = 1e-6;

    fn cartesian(x: f64, y: f64, z: f64) -> MoveTarget {
        MoveTarget::Cartesian(CartesianPoint::new(x, y, z))
    }

    #[test]
    fn test_inverse_forward_round_trip() {
        let geometry = ArmGeometry::default();
        let profile = CalibrationProfile::default();

        for &(x, y, z) in &[
            (150.0, 0.0, 80.0),
            (100.0, 100.0, 120.0),
            (0.0, 200.0, 40.0),
            (-50.0, 180.0, 100.0),
        ] {
            let angles = to_joint_angles(&cartesian(x, y, z), &profile, &geometry).unwrap();
            let back = forward(&angles, &geometry);
            assert!(
                (back.x - x).abs() < TOLERANCE_MM
                    && (back.y - y).abs() < TOLERANCE_MM
                    && (back.z - z).abs() < TOLERANCE_MM,
                "round trip failed for ({x}, {y}, {z}): got ({}, {}, {})",
                back.x,
                back.y,
                back.z
            );
        }
    }

    #[test]
    fn test_out_of_workspace_too_far() {
        let geometry = ArmGeometry::default();
        let profile = CalibrationProfile::default();
        let err = to_joint_angles(&cartesian(-999.0, 0.0, 0.0), &profile, &geometry).unwrap_err();
        assert!(matches!(err, KinematicsError::OutOfWorkspace { .. }));
    }

    #[test]
    fn test_out_of_workspace_too_close() {
        let geometry = ArmGeometry {
            link1_mm: 200.0,
            link2_mm: 100.0,
            base_height_mm: 0.0,
        };
        let profile = CalibrationProfile::default();
        // 距离 50 < |l1 - l2| = 100，内侧死区
        let err = to_joint_angles(&cartesian(50.0, 0.0, 0.0), &profile, &geometry).unwrap_err();
        assert!(matches!(err, KinematicsError::OutOfWorkspace { .. }));
    }

    #[test]
    fn test_named_point_lookup() {
        let geometry = ArmGeometry::default();
        let mut profile = CalibrationProfile::default();
        profile.points.insert("park".to_string(), [0.0, 90.0, 90.0]);

        let angles =
            to_joint_angles(&MoveTarget::Named("park".to_string()), &profile, &geometry).unwrap();
        assert_eq!(angles, [0.0, 90.0, 90.0]);

        let err = to_joint_angles(&MoveTarget::Named("nope".to_string()), &profile, &geometry)
            .unwrap_err();
        assert_eq!(
            err,
            KinematicsError::UnknownPoint {
                name: "nope".to_string(),
            }
        );
    }

    #[test]
    fn test_plane_correction_applied() {
        let geometry = ArmGeometry::default();
        let mut profile = CalibrationProfile::default();
        // 工作面沿 X 每 mm 升高 0.01mm
        profile.plane_xz.slope = 0.01;

        let home = profile.home;
        // 在 home 处修正为零：两种档案给出相同解
        let at_home = cartesian(home.x, home.y, home.z);
        let ideal = to_joint_angles(&at_home, &CalibrationProfile::default(), &geometry).unwrap();
        let corrected = to_joint_angles(&at_home, &profile, &geometry).unwrap();
        for (a, b) in ideal.iter().zip(corrected.iter()) {
            assert!((a - b).abs() < 1e-9);
        }

        // 偏离 home 100mm 处，修正后的 z 低 1mm，等价于理想档案下 z-1
        let off_home = cartesian(home.x + 100.0, home.y, home.z);
        let shifted = cartesian(home.x + 100.0, home.y, home.z - 1.0);
        let corrected = to_joint_angles(&off_home, &profile, &geometry).unwrap();
        let expected =
            to_joint_angles(&shifted, &CalibrationProfile::default(), &geometry).unwrap();
        for (a, b) in corrected.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_home_round_trip_after_calibration() {
        // 标定 home 后移动到 home 点，得到的关节角与标定时一致
        let geometry = ArmGeometry::default();
        let profile = CalibrationProfile::default();
        let home_target = cartesian(profile.home.x, profile.home.y, profile.home.z);

        let at_calibration = to_joint_angles(&home_target, &profile, &geometry).unwrap();
        let at_move = to_joint_angles(&home_target, &profile, &geometry).unwrap();
        for (a, b) in at_calibration.iter().zip(at_move.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
