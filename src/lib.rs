//! EWBIK 引擎 - 分层多目标 IK 求解器
//!
//! 模块划分：
//! - skeleton: 骨骼容器（BoneLink / BoneSet），提供索引访问与父子遍历
//! - ik: 目标、调度构建、求解循环、点集对齐、约束策略接口
//! - constraint: 椭圆摆动/扭转关节限制（约束策略示例实现）

pub mod constraint;
mod error;
pub mod ik;
pub mod skeleton;

pub use error::{IkError, Result};

pub use constraint::{
    BoneConstraintSettings, EllipticalSwingTwistConstraint, EllipticalSwingTwistSolver,
    SwingTwistOrder, TwistAxis,
};
pub use ik::{
    build_schedule, solve, BoneSolveState, ConstraintPolicy, EwbikSolver, IkTarget,
    KabschAligner, PointSetAligner, RigidDelta, SolveSchedule, SolveStats, SolverConfig,
};
pub use skeleton::{Bone, BoneFlags, BoneLink, BoneMut, BoneSet, BoneTransform, Skeleton};
