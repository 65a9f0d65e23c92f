//! IK 求解配置
//!
//! 所有参数扁平化，直接在代码中修改默认值即可。

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// IK 求解配置（扁平化，不嵌套）
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    // ========== 迭代 ==========
    /// 整骨架最大迭代轮数，默认 16
    pub max_skeleton_iterations: u32,
    /// 单骨骼每轮最大求解次数，默认 1（不重复求解）
    pub max_bone_iterations: u32,

    // ========== 稳定性 ==========
    /// 单次迭代允许的最大旋转角（弧度），默认 0.5
    /// 与关节限制无关，用于抑制振荡
    pub max_angle_per_iteration: f32,
    /// 小于此角度（弧度）的变化视为无变化，默认 1e-5
    pub min_angle_change: f32,

    // ========== 调试 ==========
    /// 是否输出逐骨骼调试日志，默认 false
    pub debug_log: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            // ====== 迭代 ======
            // 越大 → 多目标冲突时越接近最优，但更慢
            // 一整轮没有任何骨骼变化时会提前结束
            max_skeleton_iterations: 16,
            max_bone_iterations: 1,

            // ====== 稳定性 ======
            // 约 28.6°，过大容易在关节限制边界来回跳动
            max_angle_per_iteration: 0.5,
            min_angle_change: 1.0e-5,

            // ====== 调试 ======
            debug_log: false,
        }
    }
}

/// 全局配置实例
static SOLVER_CONFIG: Lazy<RwLock<SolverConfig>> = Lazy::new(|| {
    RwLock::new(SolverConfig::default())
});

/// 获取当前配置（只读）
pub fn get_config() -> SolverConfig {
    SOLVER_CONFIG.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// 手动设置配置（用于运行时调试）
pub fn set_config(config: SolverConfig) {
    *SOLVER_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config;
}

/// 重置为默认配置
pub fn reset_config() {
    *SOLVER_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = SolverConfig::default();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SolverConfig::default();
        assert_eq!(config.max_skeleton_iterations, 16);
        assert_eq!(config.max_bone_iterations, 1);
        assert!(config.max_angle_per_iteration > 0.0);
        assert!(!config.debug_log);
    }

    #[test]
    fn test_set_and_reset_config() {
        // 其余测试均显式传入配置，不读取全局实例
        set_config(SolverConfig {
            max_skeleton_iterations: 3,
            ..SolverConfig::default()
        });
        assert_eq!(get_config().max_skeleton_iterations, 3);
        reset_config();
        assert_eq!(get_config(), SolverConfig::default());
    }
}
