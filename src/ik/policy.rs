//! 约束策略接口与单骨骼求解状态

use glam::Vec3;

use crate::skeleton::{BoneLink, BoneMut, BoneSet};

use super::align::RigidDelta;
use super::target::IkTarget;

// ============================================================================
// 约束策略
// ============================================================================

/// 约束策略
///
/// 决定哪些骨骼固定、是否允许平移、何时结束迭代，并且是姿态修改的唯一来源。
/// 若 `needs_skeleton_iteration` 永不返回 false，求解循环不会结束。
pub trait ConstraintPolicy {
    /// 构建调度时每根骨骼查询一次；返回 true 则该骨骼不直接求解
    fn is_fixed_to_parent(&mut self, bone: &BoneLink) -> bool;

    /// 每轮开始前查询一次
    fn needs_skeleton_iteration(
        &mut self,
        skeleton: &BoneSet,
        sorted_targets: &[IkTarget],
        iterations_so_far: u32,
    ) -> bool;

    /// 每次骨骼求解查询一次
    fn use_translation_in_solve(&mut self, bone: &BoneLink, iterations_so_far_for_bone: u32) -> bool;

    /// 应用对齐结果，返回是否立即重新求解该骨骼
    fn apply_constraints_to_bone(
        &mut self,
        bone: BoneMut<'_>,
        proposed_delta: &RigidDelta,
        state: &BoneSolveState<'_>,
    ) -> bool;
}

// ============================================================================
// 单骨骼求解状态
// ============================================================================

/// 单次骨骼求解的点对与计数
///
/// 点坐标均为根空间方向、以求解骨骼位置为原点。
#[derive(Clone, Copy, Debug)]
pub struct BoneSolveState<'a> {
    current_points: &'a [Vec3],
    target_points: &'a [Vec3],
    weights: &'a [f32],
    /// 本轮中该骨骼已求解次数
    pub bone_iteration: u32,
    /// 已完成的整骨架迭代轮数
    pub skeleton_iteration: u32,
}

impl<'a> BoneSolveState<'a> {
    pub fn new(
        current_points: &'a [Vec3],
        target_points: &'a [Vec3],
        weights: &'a [f32],
        bone_iteration: u32,
        skeleton_iteration: u32,
    ) -> Self {
        debug_assert_eq!(current_points.len(), target_points.len());
        debug_assert_eq!(current_points.len(), weights.len());
        Self {
            current_points,
            target_points,
            weights,
            bone_iteration,
            skeleton_iteration,
        }
    }

    #[inline]
    pub fn current_points(&self) -> &'a [Vec3] {
        self.current_points
    }

    #[inline]
    pub fn target_points(&self) -> &'a [Vec3] {
        self.target_points
    }

    #[inline]
    pub fn weights(&self) -> &'a [f32] {
        self.weights
    }

    /// 假设对当前点施加 `delta` 后的加权均方误差
    pub fn mean_square_distance_from(&self, delta: &RigidDelta) -> f32 {
        let mut sum = 0.0f32;
        let mut total_weight = 0.0f32;
        for ((&current, &target), &weight) in self
            .current_points
            .iter()
            .zip(self.target_points)
            .zip(self.weights)
        {
            sum += weight * (delta.transform_point(current) - target).length_squared();
            total_weight += weight;
        }
        if total_weight > 0.0 {
            sum / total_weight
        } else {
            0.0
        }
    }
}
