//! 路由阶段状态机
//!
//! Extracting → Normalizing → Validating → Dispatching → Done，任意阶段可直接跳到 Fallback → Done。
//! 唯一允许的回边是一次参数修复：Validating → Repairing → Validating。

use serde::Serialize;

/// Pipeline 所处阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Routing,
    Extracting,
    Normalizing,
    Validating,
    Repairing,
    Dispatching,
    Fallback,
    Done,
}

/// 请求最终由哪条路径解决
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// 模型路由 + Agent 执行成功
    Routed,
    /// 经过一次参数修复后执行
    Repaired,
    /// 直接由兜底模型回答（或兜底失败）
    Fallback,
    /// Agent 未注册到调用表（配置问题，不走兜底）
    AgentMissing,
}

/// 阶段轨迹：记录已访问阶段并拒绝非法转移
#[derive(Clone, Debug, Default, Serialize)]
pub struct StageTrace {
    stages: Vec<Stage>,
    repaired: bool,
}

impl StageTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Stage> {
        self.stages.last().copied()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn repaired(&self) -> bool {
        self.repaired
    }

    /// 进入下一阶段；非法转移返回 false 且不记录
    pub fn enter(&mut self, next: Stage) -> bool {
        if !self.allows(next) {
            tracing::warn!(from = ?self.current(), to = ?next, "illegal stage transition refused");
            return false;
        }
        if next == Stage::Repairing {
            self.repaired = true;
        }
        tracing::debug!(stage = ?next, "routing stage");
        self.stages.push(next);
        true
    }

    fn allows(&self, next: Stage) -> bool {
        use Stage::*;
        let Some(current) = self.current() else {
            return matches!(next, Routing | Extracting | Normalizing | Validating | Fallback);
        };
        if current == Done {
            return false;
        }
        if next == Fallback {
            return current != Fallback;
        }
        match (current, next) {
            (Routing, Extracting) => true,
            (Extracting, Normalizing) => true,
            (Normalizing, Validating) => true,
            (Validating, Dispatching) => true,
            (Validating, Repairing) => !self.repaired,
            (Repairing, Validating) => true,
            (Dispatching | Fallback, Done) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut trace = StageTrace::new();
        for stage in [
            Stage::Routing,
            Stage::Extracting,
            Stage::Normalizing,
            Stage::Validating,
            Stage::Dispatching,
            Stage::Done,
        ] {
            assert!(trace.enter(stage), "{stage:?} should be allowed");
        }
        assert_eq!(trace.current(), Some(Stage::Done));
    }

    #[test]
    fn test_repair_is_allowed_once() {
        let mut trace = StageTrace::new();
        assert!(trace.enter(Stage::Validating));
        assert!(trace.enter(Stage::Repairing));
        assert!(trace.enter(Stage::Validating));
        assert!(!trace.enter(Stage::Repairing));
        assert!(trace.repaired());
        assert!(trace.enter(Stage::Fallback));
        assert!(trace.enter(Stage::Done));
    }

    #[test]
    fn test_no_revisit_and_done_is_terminal() {
        let mut trace = StageTrace::new();
        assert!(trace.enter(Stage::Extracting));
        assert!(!trace.enter(Stage::Extracting));
        assert!(trace.enter(Stage::Fallback));
        assert!(!trace.enter(Stage::Fallback));
        assert!(trace.enter(Stage::Done));
        assert!(!trace.enter(Stage::Fallback));
    }
}
