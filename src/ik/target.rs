//! IK 目标

use glam::{Quat, Vec3};

/// 绑定到单根骨骼的加权位置/朝向目标
///
/// 目标切片按 `bone_index` 原地升序排序，调用方不应依赖调用前的顺序。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IkTarget {
    /// 目标骨骼索引
    pub bone_index: usize,
    /// 根空间目标朝向
    pub root_relative_rotation: Quat,
    /// 根空间目标位置
    pub root_relative_position: Vec3,
    /// 骨骼本地空间中与目标位置对齐的偏移点
    pub bone_local_position_offset: Vec3,
    /// 朝向权重（>= 0，0 表示不约束朝向）
    pub rotation_weight: f32,
    /// 位置权重（>= 0，0 表示不约束位置）
    pub position_weight: f32,
    /// 调用方自定义标识
    pub target_user_id: u32,
}

impl IkTarget {
    /// 仅位置目标
    pub fn position(bone_index: usize, position: Vec3) -> Self {
        Self {
            bone_index,
            root_relative_rotation: Quat::IDENTITY,
            root_relative_position: position,
            bone_local_position_offset: Vec3::ZERO,
            rotation_weight: 0.0,
            position_weight: 1.0,
            target_user_id: 0,
        }
    }

    /// 位置 + 朝向目标
    pub fn pose(bone_index: usize, position: Vec3, rotation: Quat) -> Self {
        Self {
            root_relative_rotation: rotation,
            rotation_weight: 1.0,
            ..Self::position(bone_index, position)
        }
    }

    pub fn with_offset(mut self, offset: Vec3) -> Self {
        self.bone_local_position_offset = offset;
        self
    }

    pub fn with_weights(mut self, position_weight: f32, rotation_weight: f32) -> Self {
        self.position_weight = position_weight;
        self.rotation_weight = rotation_weight;
        self
    }

    pub fn with_user_id(mut self, id: u32) -> Self {
        self.target_user_id = id;
        self
    }

    /// 是否不产生任何点对
    #[inline]
    pub fn is_inert(&self) -> bool {
        self.position_weight <= 0.0 && self.rotation_weight <= 0.0
    }
}
