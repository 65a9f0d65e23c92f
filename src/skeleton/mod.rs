//! 骨骼系统 - 参考 nphysics Multibody 设计
//!
//! 核心设计思想：
//! - BoneLink: 类似 nphysics MultibodyLink，表示单个骨骼节点
//! - BoneSet: 类似 nphysics Multibody，管理骨骼层次结构
//! - BoneMut: 单根骨骼的可写视图，写入后立即刷新子树的根空间变换

mod bone_link;
mod bone_set;

pub use bone_link::{BoneFlags, BoneLink};
pub use bone_set::{BoneMut, BoneSet};

use glam::{Mat4, Quat, Vec3};

// ============================================================================
// 公共类型定义
// ============================================================================

/// 骨骼变换数据（平移 + 旋转 + 缩放）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for BoneTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl BoneTransform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// 仅平移 + 旋转
    #[inline]
    pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale: Vec3::ONE,
        }
    }

    /// 转换为 4x4 矩阵
    #[inline]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// 从矩阵分解
    #[inline]
    pub fn from_matrix(m: Mat4) -> Self {
        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        Self { translation, rotation, scale }
    }

    /// 变换点：translation + rotation * (scale * p)
    #[inline]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.translation + self.rotation * (self.scale * point)
    }

    /// 变换方向（不含平移与缩放）
    #[inline]
    pub fn transform_direction(&self, direction: Vec3) -> Vec3 {
        self.rotation * direction
    }

    /// 组合：self 为父空间，local 为相对父空间的本地变换
    ///
    /// 缩放按分量相乘，非均匀缩放下为近似。
    #[inline]
    pub fn mul_transform(&self, local: &BoneTransform) -> BoneTransform {
        BoneTransform {
            translation: self.transform_point(local.translation),
            rotation: (self.rotation * local.rotation).normalize(),
            scale: self.scale * local.scale,
        }
    }
}

// ============================================================================
// 类型别名
// ============================================================================

/// Bone 别名
pub type Bone = BoneLink;

/// Skeleton 别名
pub type Skeleton = BoneSet;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::rotation_angle;

    #[test]
    fn test_compose_transform() {
        let parent = BoneTransform::from_rotation_translation(
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::new(1.0, 0.0, 0.0),
        );
        let local = BoneTransform::from_rotation_translation(Quat::IDENTITY, Vec3::new(1.0, 0.0, 0.0));
        let root = parent.mul_transform(&local);

        // 父骨骼绕 Z 转 90°，子骨骼的 +X 偏移变为 +Y
        assert!((root.translation - Vec3::new(1.0, 1.0, 0.0)).length() < 1e-5);
        assert!(rotation_angle(root.rotation, parent.rotation) < 1e-5);
    }

    #[test]
    fn test_matrix_roundtrip() {
        let t = BoneTransform {
            translation: Vec3::new(0.5, -2.0, 3.0),
            rotation: Quat::from_rotation_y(0.7),
            scale: Vec3::splat(2.0),
        };
        let back = BoneTransform::from_matrix(t.to_matrix());
        assert!((back.translation - t.translation).length() < 1e-5);
        assert!(rotation_angle(back.rotation, t.rotation) < 1e-4);
        assert!((back.scale - t.scale).length() < 1e-5);
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert!((t.to_matrix().transform_point3(p) - t.transform_point(p)).length() < 1e-4);
    }
}
