//! 点集刚体对齐（加权 Kabsch）
//!
//! 求解使 Σ wᵢ‖R·pᵢ + t − qᵢ‖² 最小的旋转 R（可选平移 t）。
//! 协方差与 SVD 在 f64 下计算，结果转换回 glam f32。

use glam::{Quat, Vec3};
use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

/// 奇异值整体过小视为无有效点对
const SINGULAR_EPSILON: f64 = 1e-12;
/// 第二奇异值相对第一奇异值的秩亏阈值
const RANK_EPSILON: f64 = 1e-6;

// ============================================================================
// 刚体增量
// ============================================================================

/// 刚体变换增量
///
/// 旋转绕点集原点（即求解骨骼的锚点）进行，平移在根空间下表示。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RigidDelta {
    pub rotation: Quat,
    pub translation: Vec3,
}

impl Default for RigidDelta {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl RigidDelta {
    pub const IDENTITY: Self = Self {
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
    };

    #[inline]
    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            translation: Vec3::ZERO,
        }
    }

    #[inline]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation * point + self.translation
    }
}

// ============================================================================
// 对齐接口
// ============================================================================

/// 点集对齐原语
///
/// 输入为长度相同的当前点、目标点与权重；空输入或全零权重时实现应返回单位增量。
pub trait PointSetAligner {
    fn align(
        &self,
        current_points: &[Vec3],
        target_points: &[Vec3],
        weights: &[f32],
        allow_translation: bool,
    ) -> RigidDelta;
}

/// 基于 SVD 的加权 Kabsch 对齐
#[derive(Clone, Copy, Debug, Default)]
pub struct KabschAligner;

impl PointSetAligner for KabschAligner {
    fn align(
        &self,
        current_points: &[Vec3],
        target_points: &[Vec3],
        weights: &[f32],
        allow_translation: bool,
    ) -> RigidDelta {
        debug_assert_eq!(current_points.len(), target_points.len());
        debug_assert_eq!(current_points.len(), weights.len());

        let count = current_points.len().min(target_points.len()).min(weights.len());
        let total_weight: f64 = weights[..count].iter().map(|&w| w.max(0.0) as f64).sum();
        if count == 0 || total_weight <= SINGULAR_EPSILON {
            return RigidDelta::IDENTITY;
        }

        // 1. 加权质心（不允许平移时固定在原点）
        let (mu_current, mu_target) = if allow_translation {
            let mut mc = Vector3::zeros();
            let mut mt = Vector3::zeros();
            for i in 0..count {
                let w = weights[i].max(0.0) as f64;
                mc += to_na(current_points[i]) * w;
                mt += to_na(target_points[i]) * w;
            }
            (mc / total_weight, mt / total_weight)
        } else {
            (Vector3::zeros(), Vector3::zeros())
        };

        // 2. 协方差 H = Σ w · p · qᵀ
        let mut h = Matrix3::<f64>::zeros();
        for i in 0..count {
            let w = weights[i].max(0.0) as f64;
            let p = to_na(current_points[i]) - mu_current;
            let q = to_na(target_points[i]) - mu_target;
            h += p * q.transpose() * w;
        }

        // 3. 旋转
        let rotation = rotation_from_covariance(&h);

        // 4. 平移 t = μq − R·μp
        let translation = if allow_translation {
            let r = to_na_quat(rotation);
            to_glam(mu_target - r * mu_current)
        } else {
            Vec3::ZERO
        };

        RigidDelta { rotation, translation }
    }
}

/// 由协方差矩阵求最优旋转 R = V · diag(1, 1, d) · Uᵀ
fn rotation_from_covariance(h: &Matrix3<f64>) -> Quat {
    let svd = h.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Quat::IDENTITY;
    };
    let s = svd.singular_values;

    if s[0] <= SINGULAR_EPSILON {
        return Quat::IDENTITY;
    }

    // 秩为 1：所有点对共线，绕该线的旋转不确定，取两主方向间的最短弧
    if s[1] <= s[0] * RANK_EPSILON {
        let from = u.column(0);
        let to = v_t.row(0);
        let from = Vec3::new(from[0] as f32, from[1] as f32, from[2] as f32).normalize_or_zero();
        let to = Vec3::new(to[0] as f32, to[1] as f32, to[2] as f32).normalize_or_zero();
        if from == Vec3::ZERO || to == Vec3::ZERO {
            return Quat::IDENTITY;
        }
        return Quat::from_rotation_arc(from, to);
    }

    let v = v_t.transpose();
    let mut correction = Matrix3::<f64>::identity();
    if (v * u.transpose()).determinant() < 0.0 {
        // 反射修正
        correction[(2, 2)] = -1.0;
    }
    let r = v * correction * u.transpose();
    let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    Quat::from_xyzw(q.i as f32, q.j as f32, q.k as f32, q.w as f32).normalize()
}

#[inline]
fn to_na(v: Vec3) -> Vector3<f64> {
    Vector3::new(v.x as f64, v.y as f64, v.z as f64)
}

#[inline]
fn to_glam(v: Vector3<f64>) -> Vec3 {
    Vec3::new(v.x as f32, v.y as f32, v.z as f32)
}

#[inline]
fn to_na_quat(q: Quat) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
        q.w as f64, q.x as f64, q.y as f64, q.z as f64,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::rotation_angle;

    fn basis_points(rotation: Quat) -> Vec<Vec3> {
        vec![rotation * Vec3::X, rotation * Vec3::Y, rotation * Vec3::Z]
    }

    #[test]
    fn test_recovers_rotation() {
        let r = Quat::from_euler(glam::EulerRot::XYZ, 0.3, -0.8, 1.1);
        let current = vec![
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(0.5, 0.5, 3.0),
            Vec3::new(-1.0, 0.2, 0.1),
        ];
        let target: Vec<Vec3> = current.iter().map(|&p| r * p).collect();
        let delta = KabschAligner.align(&current, &target, &[1.0; 4], false);

        assert!(rotation_angle(delta.rotation, r) < 1e-4);
        assert_eq!(delta.translation, Vec3::ZERO);
    }

    #[test]
    fn test_recovers_translation() {
        let r = Quat::from_rotation_y(0.4);
        let t = Vec3::new(1.0, -2.0, 0.5);
        let current = vec![Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(1.0, 1.0, 1.0)];
        let target: Vec<Vec3> = current.iter().map(|&p| r * p + t).collect();
        let delta = KabschAligner.align(&current, &target, &[1.0, 2.0, 1.0, 0.5], true);

        assert!(rotation_angle(delta.rotation, r) < 1e-4);
        assert!((delta.translation - t).length() < 1e-4);
    }

    #[test]
    fn test_no_reflection() {
        // 镜像点集：结果仍须为正常旋转
        let current = basis_points(Quat::IDENTITY);
        let target = vec![-Vec3::X, Vec3::Y, Vec3::Z];
        let delta = KabschAligner.align(&current, &target, &[1.0; 3], false);
        assert!((delta.rotation.length() - 1.0).abs() < 1e-5);
        let m = glam::Mat3::from_quat(delta.rotation);
        assert!(m.determinant() > 0.0);
    }

    #[test]
    fn test_single_pair_uses_shortest_arc() {
        let delta = KabschAligner.align(&[Vec3::Y * 2.0], &[Vec3::X * 2.0], &[1.0], false);
        assert!((delta.rotation * Vec3::Y - Vec3::X).length() < 1e-5);
        // 最短弧不应绕骨骼自身轴扭转
        let expected = Quat::from_rotation_arc(Vec3::Y, Vec3::X);
        assert!(rotation_angle(delta.rotation, expected) < 1e-4);
    }

    #[test]
    fn test_degenerate_input_is_identity() {
        assert_eq!(KabschAligner.align(&[], &[], &[], false), RigidDelta::IDENTITY);
        let delta = KabschAligner.align(&[Vec3::X], &[Vec3::Y], &[0.0], false);
        assert_eq!(delta, RigidDelta::IDENTITY);
    }
}
