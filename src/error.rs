//! 错误类型

use thiserror::Error;

/// IK 引擎错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IkError {
    /// 父骨骼索引必须小于自身索引
    #[error("bone {bone} has parent {parent}; parents must precede their children")]
    ParentOrder { bone: usize, parent: usize },

    /// 父骨骼索引越界
    #[error("bone {bone} references missing parent {parent}")]
    MissingParent { bone: usize, parent: i32 },

    /// 骨骼索引越界
    #[error("bone index {index} out of range (bone count {count})")]
    BoneOutOfRange { index: usize, count: usize },

    /// 按名称查找骨骼失败
    #[error("bone '{0}' not found")]
    BoneNotFound(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, IkError>;
