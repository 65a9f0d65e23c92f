//! EWBIK 求解器
//!
//! 数据流：
//!
//! ```text
//! IkTarget[] + BoneSet ──► build_schedule ──► EwbikSolver::solve ──► 骨骼姿态
//!                                               │          ▲
//!                                               ▼          │
//!                                       PointSetAligner  ConstraintPolicy
//! ```
//!
//! - 调度：目标按骨骼排序，逐级累加到最近的可求解祖先
//! - 求解：每轮按骨骼索引降序访问调度项，构建点对、对齐、交给约束策略
//! - 终止：完全由约束策略的 `needs_skeleton_iteration` 决定

mod align;
mod config;
mod policy;
mod schedule;
mod solver;
mod target;

pub use align::{KabschAligner, PointSetAligner, RigidDelta};
pub use config::{get_config, reset_config, set_config, SolverConfig};
pub use policy::{BoneSolveState, ConstraintPolicy};
pub use schedule::{build_schedule, ScheduleEntry, SolveSchedule};
pub use solver::{solve, EwbikSolver, SolveStats};
pub use target::IkTarget;
