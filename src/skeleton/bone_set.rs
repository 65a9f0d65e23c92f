//! 骨骼集合 - 类似 nphysics Multibody
//!
//! 管理骨骼层次结构，负责：
//! - 构建时校验父子索引顺序（父索引 < 子索引）
//! - 缓存子骨骼列表
//! - 本地变换写入后递归刷新子树的根空间变换

use glam::{Quat, Vec3};

use crate::{IkError, Result};

use super::{BoneLink, BoneTransform};

/// 骨骼集合
#[derive(Clone, Debug, Default)]
pub struct BoneSet {
    /// 骨骼列表（索引 0 为根）
    bones: Vec<BoneLink>,
    /// 子骨骼缓存
    children_cache: Vec<Vec<usize>>,
}

impl BoneSet {
    /// 从骨骼列表构建
    ///
    /// 要求每根骨骼的父索引严格小于自身索引，调度构建的逆序遍历依赖此顺序。
    pub fn new(mut bones: Vec<BoneLink>) -> Result<Self> {
        let count = bones.len();
        let mut children_cache = vec![Vec::new(); count];

        for (index, bone) in bones.iter_mut().enumerate() {
            bone.internal_id = index;
            bone.is_leaf = true;
            if bone.parent_index < 0 {
                continue;
            }
            let parent = bone.parent_index as usize;
            if parent >= count {
                return Err(IkError::MissingParent {
                    bone: index,
                    parent: bone.parent_index,
                });
            }
            if parent >= index {
                return Err(IkError::ParentOrder { bone: index, parent });
            }
            children_cache[parent].push(index);
        }

        for (index, children) in children_cache.iter().enumerate() {
            bones[index].is_leaf = children.is_empty();
        }

        let mut set = Self { bones, children_cache };
        set.update_global_transforms();
        log::debug!("[Skeleton] 骨骼集合构建完成: {} 根骨骼", count);
        Ok(set)
    }

    // ========================================
    // 访问器
    // ========================================

    /// 骨骼数量
    #[inline]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// 按索引获取骨骼
    #[inline]
    pub fn get(&self, index: usize) -> Option<&BoneLink> {
        self.bones.get(index)
    }

    /// 按索引获取骨骼（越界返回错误）
    pub fn bone(&self, index: usize) -> Result<&BoneLink> {
        self.bones.get(index).ok_or(IkError::BoneOutOfRange {
            index,
            count: self.bones.len(),
        })
    }

    /// 所有骨骼
    #[inline]
    pub fn bones(&self) -> &[BoneLink] {
        &self.bones
    }

    /// 父骨骼索引
    #[inline]
    pub fn parent_of(&self, index: usize) -> Option<usize> {
        self.bones.get(index).and_then(BoneLink::parent_id)
    }

    /// 子骨骼索引
    #[inline]
    pub fn children_of(&self, index: usize) -> &[usize] {
        self.children_cache
            .get(index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 按名称查找骨骼索引
    pub fn find_bone(&self, name: &str) -> Result<usize> {
        self.bones
            .iter()
            .position(|b| b.name == name)
            .ok_or_else(|| IkError::BoneNotFound(name.to_string()))
    }

    /// 根空间变换
    pub fn root_transform(&self, index: usize) -> Result<BoneTransform> {
        self.bone(index).map(BoneLink::root_transform)
    }

    /// 本地变换
    pub fn local_transform(&self, index: usize) -> Result<BoneTransform> {
        self.bone(index).map(BoneLink::local_transform)
    }

    /// 父骨骼的根空间变换（根骨骼返回单位变换）
    #[inline]
    pub fn parent_root_transform(&self, index: usize) -> BoneTransform {
        self.parent_of(index)
            .map(|p| self.bones[p].root)
            .unwrap_or(BoneTransform::IDENTITY)
    }

    /// 获取单根骨骼的可写视图
    pub fn bone_mut(&mut self, index: usize) -> Result<BoneMut<'_>> {
        if index >= self.bones.len() {
            return Err(IkError::BoneOutOfRange {
                index,
                count: self.bones.len(),
            });
        }
        Ok(BoneMut { set: self, index })
    }

    // ========================================
    // 变换计算
    // ========================================

    /// 按索引顺序刷新全部根空间变换（父索引 < 子索引，一次正序遍历即可）
    pub fn update_global_transforms(&mut self) {
        for idx in 0..self.bones.len() {
            let parent_root = self.parent_root_transform(idx);
            self.bones[idx].root = parent_root.mul_transform(&self.bones[idx].local);
        }
    }

    /// 递归更新全局变换
    pub(crate) fn update_global_transform_recursive(&mut self, idx: usize) {
        if idx >= self.bones.len() {
            return;
        }

        let parent_root = self.parent_root_transform(idx);
        self.bones[idx].root = parent_root.mul_transform(&self.bones[idx].local);

        // 递归更新子骨骼
        for i in 0..self.children_cache[idx].len() {
            let child_idx = self.children_cache[idx][i];
            self.update_global_transform_recursive(child_idx);
        }
    }
}

// ============================================================================
// 单骨骼可写视图
// ============================================================================

/// 单根骨骼的可写视图
///
/// 约束策略只能通过它修改姿态；每次写入都会刷新该骨骼及其子树的根空间变换。
pub struct BoneMut<'a> {
    set: &'a mut BoneSet,
    index: usize,
}

impl<'a> BoneMut<'a> {
    /// 骨骼索引
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// 骨骼数据（只读）
    #[inline]
    pub fn link(&self) -> &BoneLink {
        &self.set.bones[self.index]
    }

    #[inline]
    pub fn local_rotation(&self) -> Quat {
        self.link().local.rotation
    }

    #[inline]
    pub fn local_translation(&self) -> Vec3 {
        self.link().local.translation
    }

    #[inline]
    pub fn root_transform(&self) -> BoneTransform {
        self.link().root
    }

    /// 父骨骼的根空间变换
    #[inline]
    pub fn parent_root_transform(&self) -> BoneTransform {
        self.set.parent_root_transform(self.index)
    }

    /// 写入本地旋转
    pub fn set_local_rotation(&mut self, rotation: Quat) {
        self.set.bones[self.index].local.rotation = rotation.normalize();
        self.set.update_global_transform_recursive(self.index);
    }

    /// 同时写入本地平移与旋转（只刷新一次子树）
    pub fn set_local_rotation_translation(&mut self, rotation: Quat, translation: Vec3) {
        let local = &mut self.set.bones[self.index].local;
        local.rotation = rotation.normalize();
        local.translation = translation;
        self.set.update_global_transform_recursive(self.index);
    }
}
