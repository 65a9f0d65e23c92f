//! 骨骼节点 - 参考 nphysics MultibodyLink 设计
//!
//! BoneLink 是骨骼系统的核心单元，类似于 nphysics 的 MultibodyLink。
//! 每个 BoneLink 代表骨骼层次中的一个节点。

use bitflags::bitflags;
use glam::{Quat, Vec3};

use super::BoneTransform;

// ============================================================================
// 骨骼标志
// ============================================================================

bitflags! {
    /// 骨骼标志位
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct BoneFlags: u32 {
        /// 可旋转（不可旋转的骨骼不参与 IK 直接求解）
        const ROTATABLE = 1 << 0;
        /// 可移动（允许 IK 提出平移）
        const MOVABLE = 1 << 1;
    }
}

impl Default for BoneFlags {
    fn default() -> Self {
        BoneFlags::ROTATABLE
    }
}

// ============================================================================
// 骨骼节点
// ============================================================================

/// 骨骼节点 - 类似 nphysics MultibodyLink
///
/// 设计原则（参考 nphysics）：
/// - 静态数据：骨骼的固有属性（名称、父子关系、标志等）
/// - 动态数据：本地变换（相对父骨骼）与根空间变换
/// - 变换计算：root = parent.root * local
#[derive(Clone, Debug)]
pub struct BoneLink {
    // ========================================
    // 静态数据（初始化后不变）
    // ========================================

    /// 骨骼名称
    pub name: String,

    /// 骨骼内部索引
    pub(crate) internal_id: usize,

    /// 父骨骼索引 (-1 表示根骨骼)
    pub parent_index: i32,

    /// 骨骼标志
    pub flags: BoneFlags,

    // ========================================
    // 动态数据（IK 每次迭代更新）
    // ========================================

    /// 本地变换（相对于父骨骼的根空间变换）
    pub(crate) local: BoneTransform,

    /// 根空间变换（权威姿态）
    pub(crate) root: BoneTransform,

    /// 是否为叶节点
    pub(crate) is_leaf: bool,
}

impl BoneLink {
    /// 创建新骨骼
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            internal_id: 0,
            parent_index: -1,
            flags: BoneFlags::default(),
            local: BoneTransform::IDENTITY,
            root: BoneTransform::IDENTITY,
            is_leaf: true,
        }
    }

    /// 设置父骨骼
    pub fn with_parent(mut self, parent: usize) -> Self {
        self.parent_index = parent as i32;
        self
    }

    /// 设置本地平移与旋转
    pub fn with_local(mut self, translation: Vec3, rotation: Quat) -> Self {
        self.local.translation = translation;
        self.local.rotation = rotation;
        self
    }

    /// 设置本地缩放
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.local.scale = scale;
        self
    }

    /// 设置标志
    pub fn with_flags(mut self, flags: BoneFlags) -> Self {
        self.flags = flags;
        self
    }

    // ========================================
    // 访问器（类似 nphysics MultibodyLink）
    // ========================================

    /// 骨骼索引
    #[inline]
    pub fn link_id(&self) -> usize {
        self.internal_id
    }

    /// 父骨骼索引
    #[inline]
    pub fn parent_id(&self) -> Option<usize> {
        if self.parent_index >= 0 {
            Some(self.parent_index as usize)
        } else {
            None
        }
    }

    /// 是否为根骨骼
    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent_index < 0
    }

    /// 是否为叶节点
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    /// 本地变换
    #[inline]
    pub fn local_transform(&self) -> BoneTransform {
        self.local
    }

    /// 本地旋转
    #[inline]
    pub fn local_rotation(&self) -> Quat {
        self.local.rotation
    }

    /// 本地平移
    #[inline]
    pub fn local_translation(&self) -> Vec3 {
        self.local.translation
    }

    /// 根空间变换
    #[inline]
    pub fn root_transform(&self) -> BoneTransform {
        self.root
    }

    /// 根空间位置
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.root.translation
    }

    /// 根空间旋转
    #[inline]
    pub fn rotation(&self) -> Quat {
        self.root.rotation
    }

    // ========================================
    // 标志检查方法
    // ========================================

    #[inline]
    pub fn is_rotatable(&self) -> bool {
        self.flags.contains(BoneFlags::ROTATABLE)
    }

    #[inline]
    pub fn is_movable(&self) -> bool {
        self.flags.contains(BoneFlags::MOVABLE)
    }
}

impl Default for BoneLink {
    fn default() -> Self {
        Self::new(String::new())
    }
}
