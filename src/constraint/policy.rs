//! 椭圆摆动/扭转约束策略
//!
//! 每次骨骼求解：
//! 1. 对齐结果（根空间增量）转换为候选本地旋转
//! 2. 施加关节限制，再限制单次旋转角度
//! 3. 用实际生效的增量重算误差，不优于不动则拒绝
//! 4. 写入骨骼并记录本轮有变化

use glam::Vec3;

use crate::ik::{
    get_config, BoneSolveState, ConstraintPolicy, IkTarget, RigidDelta, SolverConfig,
};
use crate::skeleton::{BoneLink, BoneMut, BoneSet};

use super::rotation_angle;
use super::swing_twist::EllipticalSwingTwistConstraint;

/// 小于此长度的平移视为无平移
const MIN_TRANSLATION: f32 = 1.0e-6;

// ============================================================================
// 单骨骼设置
// ============================================================================

/// 单骨骼约束设置
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoneConstraintSettings {
    /// 固定于父骨骼（不直接求解，目标传递给祖先）
    pub fixed_to_parent: bool,
    /// 允许平移（骨骼还需带 MOVABLE 标志）
    pub allow_translation: bool,
    /// 关节限制，None 表示不限制
    pub joint_limit: Option<EllipticalSwingTwistConstraint>,
}

impl BoneConstraintSettings {
    pub fn fixed() -> Self {
        Self {
            fixed_to_parent: true,
            ..Self::default()
        }
    }

    pub fn limited(joint_limit: EllipticalSwingTwistConstraint) -> Self {
        Self {
            joint_limit: Some(joint_limit),
            ..Self::default()
        }
    }
}

// ============================================================================
// 约束策略
// ============================================================================

/// 椭圆摆动/扭转约束策略
#[derive(Clone, Debug)]
pub struct EllipticalSwingTwistSolver {
    /// 按骨骼索引的设置，超出部分视为无约束
    settings: Vec<BoneConstraintSettings>,
    config: SolverConfig,
    /// 本轮是否有骨骼发生变化
    made_bone_change: bool,
    /// 累计接受的修改次数
    bone_changes: u32,
    /// 最近一次接受修改后的均方误差
    last_accepted_error: f32,
}

impl EllipticalSwingTwistSolver {
    /// 使用全局配置创建
    pub fn new(settings: Vec<BoneConstraintSettings>) -> Self {
        Self::with_config(settings, get_config())
    }

    pub fn with_config(settings: Vec<BoneConstraintSettings>, config: SolverConfig) -> Self {
        Self {
            settings,
            config,
            made_bone_change: false,
            bone_changes: 0,
            last_accepted_error: 0.0,
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// 获取骨骼设置
    pub fn settings(&self, bone_index: usize) -> BoneConstraintSettings {
        self.settings.get(bone_index).copied().unwrap_or_default()
    }

    /// 修改骨骼设置（自动扩展）
    pub fn set_settings(&mut self, bone_index: usize, settings: BoneConstraintSettings) {
        if bone_index >= self.settings.len() {
            self.settings.resize(bone_index + 1, BoneConstraintSettings::default());
        }
        self.settings[bone_index] = settings;
    }

    pub fn made_bone_change(&self) -> bool {
        self.made_bone_change
    }

    pub fn bone_changes(&self) -> u32 {
        self.bone_changes
    }

    pub fn last_accepted_error(&self) -> f32 {
        self.last_accepted_error
    }

    fn translation_allowed(&self, bone: &BoneLink) -> bool {
        bone.is_movable() && self.settings(bone.link_id()).allow_translation
    }
}

impl ConstraintPolicy for EllipticalSwingTwistSolver {
    fn is_fixed_to_parent(&mut self, bone: &BoneLink) -> bool {
        self.settings(bone.link_id()).fixed_to_parent
            || (!bone.is_rotatable() && !self.translation_allowed(bone))
    }

    fn needs_skeleton_iteration(
        &mut self,
        _skeleton: &BoneSet,
        sorted_targets: &[IkTarget],
        iterations_so_far: u32,
    ) -> bool {
        if iterations_so_far == 0 {
            self.made_bone_change = false;
            return !sorted_targets.is_empty() && self.config.max_skeleton_iterations > 0;
        }
        if !self.made_bone_change || iterations_so_far >= self.config.max_skeleton_iterations {
            if self.config.debug_log {
                log::debug!(
                    "[IK] 迭代结束: {} 轮, 最后一轮有变化={}",
                    iterations_so_far,
                    self.made_bone_change
                );
            }
            return false;
        }
        self.made_bone_change = false;
        true
    }

    fn use_translation_in_solve(&mut self, bone: &BoneLink, _iterations_so_far_for_bone: u32) -> bool {
        self.translation_allowed(bone)
    }

    fn apply_constraints_to_bone(
        &mut self,
        mut bone: BoneMut<'_>,
        proposed_delta: &RigidDelta,
        state: &BoneSolveState<'_>,
    ) -> bool {
        let index = bone.index();
        let settings = self.settings(index);
        let parent = bone.parent_root_transform();
        let current_root = bone.root_transform();
        let current_local = bone.local_rotation();

        // 1. 候选本地旋转
        let mut candidate = if bone.link().is_rotatable() {
            let proposed_root = (proposed_delta.rotation * current_root.rotation).normalize();
            (parent.rotation.conjugate() * proposed_root).normalize()
        } else {
            current_local
        };

        // 2. 关节限制
        if let Some(limit) = &settings.joint_limit {
            candidate = limit.apply(candidate);
        }

        // 3. 单次旋转角度上限
        let angle = rotation_angle(current_local, candidate);
        if angle > self.config.max_angle_per_iteration {
            candidate = current_local
                .slerp(candidate, self.config.max_angle_per_iteration / angle)
                .normalize();
            // 插值结果不一定仍在椭圆内
            if let Some(limit) = &settings.joint_limit {
                candidate = limit.apply(candidate);
            }
        }
        let rotation_changed = rotation_angle(current_local, candidate) > self.config.min_angle_change;

        let translation = if self.translation_allowed(bone.link()) {
            proposed_delta.translation
        } else {
            Vec3::ZERO
        };
        let translation_changed = translation.length() > MIN_TRANSLATION;

        if !rotation_changed && !translation_changed {
            return false;
        }
        let candidate = if rotation_changed { candidate } else { current_local };

        // 4. 实际生效的增量不优于不动则拒绝
        let new_root_rotation = parent.rotation * candidate;
        let effective = RigidDelta {
            rotation: (new_root_rotation * current_root.rotation.conjugate()).normalize(),
            translation,
        };
        let before = state.mean_square_distance_from(&RigidDelta::IDENTITY);
        let after = state.mean_square_distance_from(&effective);
        if after >= before {
            if self.config.debug_log {
                log::debug!(
                    "[IK] 骨骼 {} 修改被拒绝: 误差 {:.6} -> {:.6}",
                    index,
                    before,
                    after
                );
            }
            return false;
        }

        // 5. 写入（平移从根空间转换到父骨骼空间）
        let local_translation = if translation_changed {
            let parent_space = parent.rotation.conjugate() * translation;
            bone.local_translation() + parent_space / parent.scale
        } else {
            bone.local_translation()
        };
        bone.set_local_rotation_translation(candidate, local_translation);

        self.made_bone_change = true;
        self.bone_changes += 1;
        self.last_accepted_error = after;

        if self.config.debug_log {
            log::debug!(
                "[IK] 骨骼 {} 第 {} 轮第 {} 次: 误差 {:.6} -> {:.6}",
                index,
                state.skeleton_iteration,
                state.bone_iteration,
                before,
                after
            );
        }

        state.bone_iteration + 1 < self.config.max_bone_iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{SwingTwistOrder, TwistAxis};
    use crate::ik::solve;
    use glam::{Quat, Vec2};

    fn config(iterations: u32) -> SolverConfig {
        SolverConfig {
            max_skeleton_iterations: iterations,
            ..SolverConfig::default()
        }
    }

    fn two_bones() -> BoneSet {
        BoneSet::new(vec![
            BoneLink::new("upper"),
            BoneLink::new("lower").with_parent(0).with_local(Vec3::Y, Quat::IDENTITY),
        ])
        .unwrap()
    }

    #[test]
    fn test_iteration_control() {
        let skeleton = two_bones();
        let targets = [IkTarget::position(1, Vec3::X)];
        let mut policy = EllipticalSwingTwistSolver::with_config(Vec::new(), config(3));

        assert!(policy.needs_skeleton_iteration(&skeleton, &targets, 0));
        // 上一轮无变化：提前结束
        assert!(!policy.needs_skeleton_iteration(&skeleton, &targets, 1));

        policy.made_bone_change = true;
        assert!(policy.needs_skeleton_iteration(&skeleton, &targets, 1));
        assert!(!policy.made_bone_change);

        // 达到上限
        policy.made_bone_change = true;
        assert!(!policy.needs_skeleton_iteration(&skeleton, &targets, 3));

        // 无目标不迭代
        assert!(!policy.needs_skeleton_iteration(&skeleton, &[], 0));
    }

    #[test]
    fn test_fixed_and_rotatable_flags() {
        let skeleton = BoneSet::new(vec![
            BoneLink::new("a"),
            BoneLink::new("b").with_parent(0).with_flags(crate::skeleton::BoneFlags::empty()),
            BoneLink::new("c").with_parent(1),
        ])
        .unwrap();
        let mut policy = EllipticalSwingTwistSolver::with_config(Vec::new(), config(4));
        policy.set_settings(2, BoneConstraintSettings::fixed());

        assert!(!policy.is_fixed_to_parent(&skeleton.bones()[0]));
        assert!(policy.is_fixed_to_parent(&skeleton.bones()[1]));
        assert!(policy.is_fixed_to_parent(&skeleton.bones()[2]));
        assert!(!policy.use_translation_in_solve(&skeleton.bones()[0], 0));
    }

    #[test]
    fn test_rotation_step_is_capped() {
        let mut skeleton = two_bones();
        let mut policy = EllipticalSwingTwistSolver::with_config(
            Vec::new(),
            SolverConfig {
                max_angle_per_iteration: 0.1,
                ..config(1)
            },
        );
        // 目标在 90° 外，单轮只能转 0.1 弧度
        let mut targets = [IkTarget::position(1, Vec3::X)];
        solve(&mut skeleton, &mut targets, &mut policy);

        let angle = rotation_angle(skeleton.bones()[0].local_rotation(), Quat::IDENTITY);
        assert!((angle - 0.1).abs() < 1e-4);
        assert_eq!(policy.bone_changes(), 1);
    }

    #[test]
    fn test_joint_limit_holds_during_solve() {
        let mut skeleton = two_bones();
        let limit = EllipticalSwingTwistConstraint {
            twist_axis: TwistAxis::Y,
            min_twist_angle: -0.2,
            max_twist_angle: 0.2,
            swing_max_sin_half_angle: Vec2::new(20f32.to_radians().sin(), 10f32.to_radians().sin()),
            order: SwingTwistOrder::TwistThenSwing,
            ..EllipticalSwingTwistConstraint::default()
        };
        let mut policy = EllipticalSwingTwistSolver::with_config(
            vec![BoneConstraintSettings::limited(limit)],
            config(20),
        );
        let mut targets = [IkTarget::position(1, Vec3::new(1.0, 0.2, 1.0))];
        let start_error = (skeleton.bones()[1].position() - targets[0].root_relative_position).length();

        solve(&mut skeleton, &mut targets, &mut policy);

        let local = skeleton.bones()[0].local_rotation();
        assert!(limit.is_within_limits(local));
        // 受限但仍向目标靠近
        let end_error = (skeleton.bones()[1].position() - targets[0].root_relative_position).length();
        assert!(end_error < start_error);
    }

    #[test]
    fn test_non_improving_change_rejected() {
        let mut skeleton = two_bones();
        let mut policy = EllipticalSwingTwistSolver::with_config(Vec::new(), config(1));
        policy.needs_skeleton_iteration(&skeleton, &[IkTarget::position(1, Vec3::Y)], 0);

        // 当前点已与目标重合，任何旋转都会增大误差
        let current = [Vec3::Y];
        let target = [Vec3::Y];
        let weights = [1.0];
        let state = BoneSolveState::new(&current, &target, &weights, 0, 0);
        let delta = RigidDelta::from_rotation(Quat::from_rotation_z(0.3));
        let before = skeleton.bones()[0].local_rotation();

        let repeat = policy.apply_constraints_to_bone(skeleton.bone_mut(0).unwrap(), &delta, &state);

        assert!(!repeat);
        assert!(!policy.made_bone_change());
        assert_eq!(skeleton.bones()[0].local_rotation(), before);
    }

    #[test]
    fn test_bone_iterations_repeat_until_limit() {
        let mut skeleton = two_bones();
        let mut policy = EllipticalSwingTwistSolver::with_config(
            Vec::new(),
            SolverConfig {
                max_bone_iterations: 3,
                max_angle_per_iteration: 0.05,
                ..config(1)
            },
        );
        let mut targets = [IkTarget::position(1, Vec3::X)];
        let stats = solve(&mut skeleton, &mut targets, &mut policy);

        // 子骨骼点对退化（自身位置即目标锚点），根骨骼重复求解 3 次
        assert_eq!(policy.bone_changes(), 3);
        let angle = rotation_angle(skeleton.bones()[0].local_rotation(), Quat::IDENTITY);
        assert!((angle - 0.15).abs() < 1e-4);
        assert!(stats.bone_evaluations >= 3);
        assert_eq!(stats.bones_changed, 3);
    }
}
