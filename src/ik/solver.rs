//! EWBIK 求解循环
//!
//! 设计原则：
//! - 每轮按调度顺序（骨骼索引降序）访问每根可求解骨骼一次
//! - 目标转换为以求解骨骼为原点的点对，统一交给点集对齐
//! - 姿态修改与终止判断全部交给约束策略

use glam::Vec3;

use crate::skeleton::BoneSet;

use super::align::{KabschAligner, PointSetAligner};
use super::policy::{BoneSolveState, ConstraintPolicy};
use super::schedule::build_schedule;
use super::target::IkTarget;

/// 朝向目标转换为点对时使用的本地基向量
const BASIS: [Vec3; 3] = [Vec3::X, Vec3::Y, Vec3::Z];

// ============================================================================
// 求解统计
// ============================================================================

/// 单次求解统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolveStats {
    /// 完成的整骨架迭代轮数
    pub skeleton_iterations: u32,
    /// 骨骼求解次数（含同一轮内的重复求解）
    pub bone_evaluations: u32,
    /// 点集对齐调用次数
    pub alignments: u32,
    /// 约束策略实际写入姿态的次数
    pub bones_changed: u32,
}

// ============================================================================
// 求解器
// ============================================================================

/// EWBIK 求解器
///
/// 不保存跨调用状态；所有临时缓冲在单次调用内分配并释放。
#[derive(Clone, Debug, Default)]
pub struct EwbikSolver<A = KabschAligner> {
    aligner: A,
}

impl EwbikSolver<KabschAligner> {
    /// 使用默认 Kabsch 对齐
    pub fn new() -> Self {
        Self {
            aligner: KabschAligner,
        }
    }
}

impl<A: PointSetAligner> EwbikSolver<A> {
    /// 使用自定义点集对齐
    pub fn with_aligner(aligner: A) -> Self {
        Self { aligner }
    }

    pub fn aligner(&self) -> &A {
        &self.aligner
    }

    /// 求解 IK
    ///
    /// `targets` 会被原地按骨骼索引排序。
    pub fn solve<P: ConstraintPolicy>(
        &self,
        skeleton: &mut BoneSet,
        targets: &mut [IkTarget],
        policy: &mut P,
    ) -> SolveStats {
        let mut stats = SolveStats::default();
        if targets.is_empty() {
            return stats;
        }

        let schedule = build_schedule(skeleton, targets, policy);

        // 每个目标最多产生 1 + 3 个点对
        let capacity = schedule.max_targets_per_entry() * 4;
        let mut current_points: Vec<Vec3> = Vec::with_capacity(capacity);
        let mut target_points: Vec<Vec3> = Vec::with_capacity(capacity);
        let mut weights: Vec<f32> = Vec::with_capacity(capacity);

        let targets: &[IkTarget] = targets;
        let mut skeleton_iteration = 0u32;

        while policy.needs_skeleton_iteration(skeleton, targets, skeleton_iteration) {
            for entry in schedule.entries() {
                let bone_index = entry.bone_index;
                let target_slice = schedule.targets_of(entry);
                let mut bone_iteration = 0u32;

                loop {
                    build_correspondences(
                        skeleton,
                        bone_index,
                        targets,
                        target_slice,
                        &mut current_points,
                        &mut target_points,
                        &mut weights,
                    );
                    if weights.is_empty() {
                        break;
                    }

                    let use_translation =
                        policy.use_translation_in_solve(&skeleton.bones()[bone_index], bone_iteration);
                    let delta = self.aligner.align(
                        &current_points,
                        &target_points,
                        &weights,
                        use_translation,
                    );
                    stats.alignments += 1;
                    stats.bone_evaluations += 1;

                    let state = BoneSolveState::new(
                        &current_points,
                        &target_points,
                        &weights,
                        bone_iteration,
                        skeleton_iteration,
                    );
                    let local_before = skeleton.bones()[bone_index].local_transform();
                    let bone = match skeleton.bone_mut(bone_index) {
                        Ok(bone) => bone,
                        Err(_) => break,
                    };
                    let repeat = policy.apply_constraints_to_bone(bone, &delta, &state);
                    if skeleton.bones()[bone_index].local_transform() != local_before {
                        stats.bones_changed += 1;
                    }

                    log::trace!(
                        "[IK] 轮 {} 骨骼 {} 第 {} 次求解: {} 个点对, 重复={}",
                        skeleton_iteration,
                        bone_index,
                        bone_iteration,
                        weights.len(),
                        repeat
                    );

                    bone_iteration += 1;
                    if !repeat {
                        break;
                    }
                }
            }
            skeleton_iteration += 1;
        }

        stats.skeleton_iterations = skeleton_iteration;
        log::debug!(
            "[IK] 求解完成: {} 轮, {} 次骨骼求解, {} 次姿态写入",
            stats.skeleton_iterations,
            stats.bone_evaluations,
            stats.bones_changed
        );
        stats
    }
}

/// 使用默认 Kabsch 对齐求解
pub fn solve<P: ConstraintPolicy>(
    skeleton: &mut BoneSet,
    targets: &mut [IkTarget],
    policy: &mut P,
) -> SolveStats {
    EwbikSolver::new().solve(skeleton, targets, policy)
}

/// 构建单根骨骼的点对
///
/// 目标骨骼当前姿态下的偏移点对应目标位置；朝向目标额外以三条本地基向量
/// 锚定在同一点上，使朝向误差与位置误差在同一次对齐中求解。
/// 所有点以求解骨骼的根空间位置为原点。
fn build_correspondences(
    skeleton: &BoneSet,
    bone_index: usize,
    targets: &[IkTarget],
    target_slice: &[usize],
    current_points: &mut Vec<Vec3>,
    target_points: &mut Vec<Vec3>,
    weights: &mut Vec<f32>,
) {
    current_points.clear();
    target_points.clear();
    weights.clear();

    let bones = skeleton.bones();
    let anchor = bones[bone_index].position();

    for &target_index in target_slice {
        let target = &targets[target_index];
        if target.is_inert() {
            continue;
        }
        let target_bone = bones[target.bone_index].root_transform();
        let current = target_bone.transform_point(target.bone_local_position_offset) - anchor;
        let goal = target.root_relative_position - anchor;

        if target.position_weight > 0.0 {
            current_points.push(current);
            target_points.push(goal);
            weights.push(target.position_weight);
        }

        if target.rotation_weight > 0.0 {
            for axis in BASIS {
                current_points.push(current + target_bone.transform_direction(axis));
                target_points.push(goal + target.root_relative_rotation * axis);
                weights.push(target.rotation_weight);
            }
        }
    }
}
