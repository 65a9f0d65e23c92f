//! 求解调度构建
//!
//! 每次求解调用重建一次：
//! 1. 目标按骨骼索引升序原地排序
//! 2. 逆序遍历骨骼，累加子树目标数量，为可求解骨骼分配连续的目标索引区间
//! 3. 再次逆序遍历，把每根骨骼的目标填入自身区间，并整体转交最近的可求解祖先

use std::ops::Range;

use crate::skeleton::BoneSet;

use super::policy::ConstraintPolicy;
use super::target::IkTarget;

/// 调度项：一根可求解骨骼及其在扁平目标索引缓冲中的区间
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub bone_index: usize,
    start: usize,
    len: usize,
}

impl ScheduleEntry {
    #[inline]
    pub fn target_range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }

    #[inline]
    pub fn target_count(&self) -> usize {
        self.len
    }
}

/// 求解调度（单次调用内的临时数据）
#[derive(Clone, Debug, Default)]
pub struct SolveSchedule {
    /// 求解顺序（骨骼索引降序）
    entries: Vec<ScheduleEntry>,
    /// 扁平目标索引缓冲
    target_indices: Vec<usize>,
}

impl SolveSchedule {
    #[inline]
    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 调度项关联的目标索引（指向排序后的目标切片）
    #[inline]
    pub fn targets_of(&self, entry: &ScheduleEntry) -> &[usize] {
        &self.target_indices[entry.target_range()]
    }

    /// 按骨骼查找调度项
    pub fn entry_for_bone(&self, bone_index: usize) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|e| e.bone_index == bone_index)
    }

    /// 单个调度项的最大目标数
    pub fn max_targets_per_entry(&self) -> usize {
        self.entries.iter().map(|e| e.len).max().unwrap_or(0)
    }
}

/// 构建求解调度
///
/// `targets` 会被原地按 `bone_index` 升序排序。骨骼越界的目标，以及既无调度项
/// 又无可求解祖先的目标，不参与任何求解。
pub fn build_schedule<P: ConstraintPolicy>(
    skeleton: &BoneSet,
    targets: &mut [IkTarget],
    policy: &mut P,
) -> SolveSchedule {
    targets.sort_by_key(|t| t.bone_index);

    let bone_count = skeleton.len();

    // ========================================
    // 每根骨骼直接持有的目标区间（排序后连续）
    // ========================================
    let mut direct_start = vec![0usize; bone_count];
    let mut direct_count = vec![0usize; bone_count];
    for (i, target) in targets.iter().enumerate() {
        debug_assert!(
            target.position_weight >= 0.0 && target.rotation_weight >= 0.0,
            "IK target {} has negative weight",
            target.target_user_id
        );
        if target.bone_index >= bone_count {
            log::warn!(
                "[IK] 目标 {} 引用越界骨骼 {}（骨骼数 {}），忽略",
                target.target_user_id,
                target.bone_index,
                bone_count
            );
            continue;
        }
        if direct_count[target.bone_index] == 0 {
            direct_start[target.bone_index] = i;
        }
        direct_count[target.bone_index] += 1;
    }

    // ========================================
    // 第一遍：累加子树目标数，分配区间
    // ========================================
    let mut accumulated = vec![0usize; bone_count];
    let mut entry_of_bone: Vec<Option<usize>> = vec![None; bone_count];
    let mut entries = Vec::with_capacity(bone_count);
    let mut offset = 0usize;

    for bone in (0..bone_count).rev() {
        accumulated[bone] += direct_count[bone];
        let total = accumulated[bone];
        let fixed = policy.is_fixed_to_parent(&skeleton.bones()[bone]);

        if total > 0 && !fixed {
            entry_of_bone[bone] = Some(entries.len());
            entries.push(ScheduleEntry {
                bone_index: bone,
                start: offset,
                len: total,
            });
            offset += total;
        }

        if let Some(parent) = skeleton.parent_of(bone) {
            debug_assert!(parent < bone, "parent {} of bone {} must precede it", parent, bone);
            accumulated[parent] += total;
        }
    }

    // ========================================
    // 第二遍：填充区间并转交最近的可求解祖先
    // ========================================
    let mut target_indices = vec![0usize; offset];
    let mut fill = vec![0usize; entries.len()];

    for bone in (0..bone_count).rev() {
        let direct = direct_start[bone]..direct_start[bone] + direct_count[bone];
        let ancestor = nearest_solvable_ancestor(skeleton, &entry_of_bone, bone);

        match entry_of_bone[bone] {
            Some(e) => {
                for t in direct {
                    target_indices[entries[e].start + fill[e]] = t;
                    fill[e] += 1;
                }
                // 子孙骨骼编号更大，此时本区间已完整
                debug_assert_eq!(fill[e], entries[e].len);
                if let Some(a) = ancestor {
                    for k in 0..fill[e] {
                        let t = target_indices[entries[e].start + k];
                        target_indices[entries[a].start + fill[a]] = t;
                        fill[a] += 1;
                    }
                }
            }
            None => {
                if let Some(a) = ancestor {
                    for t in direct {
                        target_indices[entries[a].start + fill[a]] = t;
                        fill[a] += 1;
                    }
                }
            }
        }
    }

    log::debug!(
        "[IK] 调度构建完成: {} 个目标, {} 个求解骨骼, {} 个目标索引",
        targets.len(),
        entries.len(),
        target_indices.len()
    );

    SolveSchedule {
        entries,
        target_indices,
    }
}

/// 沿父链查找最近的拥有调度项的祖先
fn nearest_solvable_ancestor(
    skeleton: &BoneSet,
    entry_of_bone: &[Option<usize>],
    bone: usize,
) -> Option<usize> {
    let mut current = skeleton.parent_of(bone);
    while let Some(index) = current {
        if let Some(entry) = entry_of_bone[index] {
            return Some(entry);
        }
        current = skeleton.parent_of(index);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ik::{BoneSolveState, RigidDelta};
    use crate::skeleton::{BoneLink, BoneMut};
    use glam::{Quat, Vec3};

    /// 只负责报告固定骨骼的策略
    struct FixedBones {
        fixed: Vec<usize>,
        queries: Vec<usize>,
    }

    impl FixedBones {
        fn new(fixed: &[usize]) -> Self {
            Self {
                fixed: fixed.to_vec(),
                queries: Vec::new(),
            }
        }
    }

    impl ConstraintPolicy for FixedBones {
        fn is_fixed_to_parent(&mut self, bone: &BoneLink) -> bool {
            self.queries.push(bone.link_id());
            self.fixed.contains(&bone.link_id())
        }

        fn needs_skeleton_iteration(&mut self, _: &BoneSet, _: &[IkTarget], _: u32) -> bool {
            false
        }

        fn use_translation_in_solve(&mut self, _: &BoneLink, _: u32) -> bool {
            false
        }

        fn apply_constraints_to_bone(
            &mut self,
            _: BoneMut<'_>,
            _: &RigidDelta,
            _: &BoneSolveState<'_>,
        ) -> bool {
            false
        }
    }

    fn chain() -> BoneSet {
        BoneSet::new(vec![
            BoneLink::new("root"),
            BoneLink::new("mid").with_parent(0).with_local(Vec3::Y, Quat::IDENTITY),
            BoneLink::new("tip").with_parent(1).with_local(Vec3::Y, Quat::IDENTITY),
        ])
        .unwrap()
    }

    /// 0 ─┬─ 1 ── 2
    ///    └─ 3 ── 4
    fn fork() -> BoneSet {
        BoneSet::new(vec![
            BoneLink::new("hips"),
            BoneLink::new("left_thigh").with_parent(0),
            BoneLink::new("left_foot").with_parent(1),
            BoneLink::new("right_thigh").with_parent(0),
            BoneLink::new("right_foot").with_parent(3),
        ])
        .unwrap()
    }

    #[test]
    fn test_chain_propagation() {
        let skeleton = chain();
        let mut targets = vec![IkTarget::position(2, Vec3::X)];
        let mut policy = FixedBones::new(&[]);
        let schedule = build_schedule(&skeleton, &mut targets, &mut policy);

        let order: Vec<usize> = schedule.entries().iter().map(|e| e.bone_index).collect();
        assert_eq!(order, vec![2, 1, 0]);
        for entry in schedule.entries() {
            assert_eq!(schedule.targets_of(entry), &[0]);
        }
        // 每根骨骼恰好查询一次
        assert_eq!(policy.queries, vec![2, 1, 0]);
        // 调度项缓冲按骨骼数预分配
        assert!(schedule.entries.capacity() >= skeleton.len());
        assert_eq!(schedule.target_indices.len(), 3);
    }

    #[test]
    fn test_fixed_bone_forwards_targets() {
        let skeleton = chain();
        let mut targets = vec![IkTarget::position(2, Vec3::X)];
        let schedule = build_schedule(&skeleton, &mut targets, &mut FixedBones::new(&[1]));

        let order: Vec<usize> = schedule.entries().iter().map(|e| e.bone_index).collect();
        assert_eq!(order, vec![2, 0]);
        assert!(schedule.entry_for_bone(1).is_none());
        assert_eq!(schedule.targets_of(schedule.entry_for_bone(0).unwrap()), &[0]);
    }

    #[test]
    fn test_targets_on_fixed_bone_reach_ancestor() {
        let skeleton = chain();
        let mut targets = vec![IkTarget::position(1, Vec3::X)];
        let schedule = build_schedule(&skeleton, &mut targets, &mut FixedBones::new(&[1]));

        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule.entries()[0].bone_index, 0);
        assert_eq!(schedule.targets_of(&schedule.entries()[0]), &[0]);
    }

    #[test]
    fn test_sorts_targets_and_merges_branches() {
        let skeleton = fork();
        let mut targets = vec![
            IkTarget::position(4, Vec3::X).with_user_id(40),
            IkTarget::position(2, Vec3::X).with_user_id(20),
            IkTarget::position(0, Vec3::X).with_user_id(0),
        ];
        let schedule = build_schedule(&skeleton, &mut targets, &mut FixedBones::new(&[]));

        let bones: Vec<usize> = targets.iter().map(|t| t.bone_index).collect();
        assert_eq!(bones, vec![0, 2, 4]);

        let order: Vec<usize> = schedule.entries().iter().map(|e| e.bone_index).collect();
        assert_eq!(order, vec![4, 3, 2, 1, 0]);

        let mut hips: Vec<usize> = schedule.targets_of(schedule.entry_for_bone(0).unwrap()).to_vec();
        hips.sort_unstable();
        assert_eq!(hips, vec![0, 1, 2]);
        assert_eq!(schedule.targets_of(schedule.entry_for_bone(3).unwrap()), &[2]);
        assert_eq!(schedule.targets_of(schedule.entry_for_bone(1).unwrap()), &[1]);
        assert_eq!(schedule.max_targets_per_entry(), 3);
    }

    #[test]
    fn test_inert_targets() {
        let skeleton = chain();
        // 根骨骼固定：根上的目标既无调度项也无可求解祖先；越界骨骼的目标同样无效
        let mut targets = vec![
            IkTarget::position(0, Vec3::X),
            IkTarget::position(9, Vec3::X),
        ];
        let schedule = build_schedule(&skeleton, &mut targets, &mut FixedBones::new(&[0]));

        assert!(schedule.is_empty());
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn test_no_targets() {
        let skeleton = chain();
        let schedule = build_schedule(&skeleton, &mut [], &mut FixedBones::new(&[]));
        assert!(schedule.is_empty());
        assert_eq!(schedule.max_targets_per_entry(), 0);
    }
}
