//! 椭圆摆动/扭转关节限制
//!
//! 相对参考旋转把候选本地旋转分解为绕扭转轴的“扭转”和其余两轴的“摆动”：
//! - 扭转角限制在 [min, max]，越界时取角度上更近的边界
//! - 摆动四元数垂直于扭转轴的两个分量（即 sin(半角) 方向分量）限制在轴对齐椭圆内
//! - 按配置顺序重新组合

use std::f32::consts::TAU;

use glam::{Quat, Vec2, Vec3};

use super::ellipse::{closest_point_on_ellipse, is_inside_ellipse};

/// 扭转分量过小视为 180° 摆动奇点
const SINGULARITY_EPSILON: f32 = 1.0e-6;
/// 椭圆边界容差（归一化后）
const BOUNDARY_TOLERANCE: f32 = 1.0e-5;
/// 扭转角边界容差（弧度）
const TWIST_TOLERANCE: f32 = 1.0e-5;
/// 椭圆半轴下限
const MIN_RADIUS: f32 = 1.0e-6;

// ============================================================================
// 轴与顺序
// ============================================================================

/// 扭转轴
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TwistAxis {
    X,
    #[default]
    Y,
    Z,
}

impl TwistAxis {
    #[inline]
    pub fn unit(self) -> Vec3 {
        match self {
            TwistAxis::X => Vec3::X,
            TwistAxis::Y => Vec3::Y,
            TwistAxis::Z => Vec3::Z,
        }
    }

    /// 沿扭转轴的分量
    #[inline]
    fn along(self, v: Vec3) -> f32 {
        match self {
            TwistAxis::X => v.x,
            TwistAxis::Y => v.y,
            TwistAxis::Z => v.z,
        }
    }

    /// 垂直于扭转轴的两个分量（按 X→Y→Z 循环顺序）
    #[inline]
    pub fn swing_components(self, v: Vec3) -> Vec2 {
        match self {
            TwistAxis::X => Vec2::new(v.y, v.z),
            TwistAxis::Y => Vec2::new(v.z, v.x),
            TwistAxis::Z => Vec2::new(v.x, v.y),
        }
    }

    /// `swing_components` 的逆
    #[inline]
    pub fn from_swing_components(self, s: Vec2) -> Vec3 {
        match self {
            TwistAxis::X => Vec3::new(0.0, s.x, s.y),
            TwistAxis::Y => Vec3::new(s.y, 0.0, s.x),
            TwistAxis::Z => Vec3::new(s.x, s.y, 0.0),
        }
    }
}

/// 扭转与摆动的组合顺序
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SwingTwistOrder {
    /// 先扭转后摆动：q = swing * twist
    #[default]
    TwistThenSwing,
    /// 先摆动后扭转：q = twist * swing
    SwingThenTwist,
}

// ============================================================================
// 关节限制
// ============================================================================

/// 椭圆摆动/扭转关节限制
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EllipticalSwingTwistConstraint {
    /// 参考本地旋转（限制的零点）
    pub reference_rotation: Quat,
    /// 扭转轴
    pub twist_axis: TwistAxis,
    /// 扭转角下限（弧度）
    pub min_twist_angle: f32,
    /// 扭转角上限（弧度）
    pub max_twist_angle: f32,
    /// 摆动椭圆半轴：两个垂直分量允许的最大 sin(半角)
    pub swing_max_sin_half_angle: Vec2,
    /// 组合顺序
    pub order: SwingTwistOrder,
}

impl Default for EllipticalSwingTwistConstraint {
    fn default() -> Self {
        Self {
            reference_rotation: Quat::IDENTITY,
            twist_axis: TwistAxis::Y,
            min_twist_angle: -std::f32::consts::PI,
            max_twist_angle: std::f32::consts::PI,
            swing_max_sin_half_angle: Vec2::ONE,
            order: SwingTwistOrder::TwistThenSwing,
        }
    }
}

impl EllipticalSwingTwistConstraint {
    /// 由最大摆动角（弧度）构建
    pub fn from_swing_angles(
        twist_axis: TwistAxis,
        min_twist_angle: f32,
        max_twist_angle: f32,
        max_swing_angles: Vec2,
    ) -> Self {
        Self {
            twist_axis,
            min_twist_angle,
            max_twist_angle,
            swing_max_sin_half_angle: Vec2::new(
                (max_swing_angles.x * 0.5).sin(),
                (max_swing_angles.y * 0.5).sin(),
            ),
            ..Self::default()
        }
    }

    pub fn with_reference(mut self, reference_rotation: Quat) -> Self {
        self.reference_rotation = reference_rotation;
        self
    }

    pub fn with_order(mut self, order: SwingTwistOrder) -> Self {
        self.order = order;
        self
    }

    /// 对候选本地旋转施加关节限制
    ///
    /// 已在限制内时原样返回候选值。
    pub fn apply(&self, candidate_local: Quat) -> Quat {
        let relative = self.reference_rotation.conjugate() * candidate_local;
        let (swing, twist) = self.decompose(relative);

        let twist_angle = self.twist_axis_angle(twist);
        let clamped_twist = self.clamp_twist(twist_angle);

        let swing_xy = self.twist_axis.swing_components(swing.xyz());
        let clamped_swing = self.clamp_swing(swing_xy);

        if clamped_twist == twist_angle && clamped_swing == swing_xy {
            return candidate_local;
        }

        let twist = Quat::from_axis_angle(self.twist_axis.unit(), clamped_twist);
        let swing = if clamped_swing == swing_xy {
            swing
        } else {
            self.swing_from_components(clamped_swing)
        };
        let recomposed = match self.order {
            SwingTwistOrder::TwistThenSwing => swing * twist,
            SwingTwistOrder::SwingThenTwist => twist * swing,
        };
        (self.reference_rotation * recomposed).normalize()
    }

    /// 判断本地旋转是否在限制内
    pub fn is_within_limits(&self, local: Quat) -> bool {
        let relative = self.reference_rotation.conjugate() * local;
        let (swing, twist) = self.decompose(relative);
        let twist_angle = self.twist_axis_angle(twist);
        twist_angle >= self.min_twist_angle - TWIST_TOLERANCE
            && twist_angle <= self.max_twist_angle + TWIST_TOLERANCE
            && is_inside_ellipse(
                self.radii(),
                self.twist_axis.swing_components(swing.xyz()),
                BOUNDARY_TOLERANCE,
            )
    }

    /// 本地旋转的扭转角
    pub fn twist_angle_of(&self, local: Quat) -> f32 {
        let (_, twist) = self.decompose(self.reference_rotation.conjugate() * local);
        self.twist_axis_angle(twist)
    }

    /// 本地旋转的摆动分量（椭圆平面坐标）
    pub fn swing_components_of(&self, local: Quat) -> Vec2 {
        let (swing, _) = self.decompose(self.reference_rotation.conjugate() * local);
        self.twist_axis.swing_components(swing.xyz())
    }

    /// 由椭圆平面坐标构建摆动四元数
    pub fn swing_from_components(&self, components: Vec2) -> Quat {
        let v = self.twist_axis.from_swing_components(components);
        let w = (1.0 - components.length_squared()).max(0.0).sqrt();
        Quat::from_xyzw(v.x, v.y, v.z, w).normalize()
    }

    // ========================================
    // 内部计算
    // ========================================

    /// 分解为 (摆动, 扭转)
    fn decompose(&self, relative: Quat) -> (Quat, Quat) {
        let q = if relative.w < 0.0 { -relative } else { relative };

        let along = self.twist_axis.along(q.xyz());
        let length = (along * along + q.w * q.w).sqrt();
        let twist = if length < SINGULARITY_EPSILON {
            // 180° 摆动：扭转不确定，视为零扭转
            Quat::IDENTITY
        } else {
            let v = self.twist_axis.unit() * (along / length);
            Quat::from_xyzw(v.x, v.y, v.z, q.w / length)
        };

        let swing = match self.order {
            SwingTwistOrder::TwistThenSwing => q * twist.conjugate(),
            SwingTwistOrder::SwingThenTwist => twist.conjugate() * q,
        };
        (swing, twist)
    }

    /// 扭转四元数的有符号角度，范围 [-π, π]
    fn twist_axis_angle(&self, twist: Quat) -> f32 {
        2.0 * self.twist_axis.along(twist.xyz()).atan2(twist.w)
    }

    fn clamp_twist(&self, angle: f32) -> f32 {
        if angle >= self.min_twist_angle && angle <= self.max_twist_angle {
            return angle;
        }
        let to_min = wrapped_distance(angle, self.min_twist_angle);
        let to_max = wrapped_distance(angle, self.max_twist_angle);
        if to_min <= to_max {
            self.min_twist_angle
        } else {
            self.max_twist_angle
        }
    }

    fn clamp_swing(&self, swing: Vec2) -> Vec2 {
        let radii = self.radii();
        if is_inside_ellipse(radii, swing, BOUNDARY_TOLERANCE) {
            swing
        } else {
            closest_point_on_ellipse(radii, swing)
        }
    }

    #[inline]
    fn radii(&self) -> Vec2 {
        self.swing_max_sin_half_angle.clamp(Vec2::splat(MIN_RADIUS), Vec2::ONE)
    }
}

/// 两个角度在圆周上的距离
#[inline]
fn wrapped_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(TAU);
    d.min(TAU - d)
}
