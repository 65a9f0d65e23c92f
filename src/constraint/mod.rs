//! 约束策略示例实现 - 椭圆摆动/扭转关节限制
//!
//! - EllipticalSwingTwistConstraint: 单关节限制计算
//! - EllipticalSwingTwistSolver: 实现 ConstraintPolicy，负责固定骨骼、单次角度上限、
//!   误差回退检查与迭代终止

mod ellipse;
mod policy;
mod swing_twist;

pub use ellipse::closest_point_on_ellipse;
pub use policy::{BoneConstraintSettings, EllipticalSwingTwistSolver};
pub use swing_twist::{EllipticalSwingTwistConstraint, SwingTwistOrder, TwistAxis};

use glam::Quat;

/// 两个旋转之间的夹角（弧度，[0, π]）
///
/// 用 atan2 计算，小角度下比 acos(dot) 精确。
#[inline]
pub fn rotation_angle(a: Quat, b: Quat) -> f32 {
    let d = a.conjugate() * b;
    2.0 * d.xyz().length().atan2(d.w.abs())
}
