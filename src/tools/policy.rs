//! 工具风险策略
//!
//! 风险评估本身是外部策略，引擎只消费 RiskPolicy 给出的分类结果：
//! autonomous（直接执行）/ interactive（总是询问用户）/ confirmation（按风险决定是否确认）。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::ToolsSection;
use crate::react::ToolCall;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    Autonomous,
    Interactive,
    Confirmation,
}

/// 单个工具调用的分类结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToolClassification {
    pub mode: DispatchMode,
    pub risk: RiskLevel,
    pub requires_confirmation: bool,
}

impl ToolClassification {
    pub fn autonomous() -> Self {
        Self {
            mode: DispatchMode::Autonomous,
            risk: RiskLevel::Low,
            requires_confirmation: false,
        }
    }

    pub fn interactive() -> Self {
        Self {
            mode: DispatchMode::Interactive,
            risk: RiskLevel::Low,
            requires_confirmation: false,
        }
    }

    pub fn confirmation(risk: RiskLevel) -> Self {
        Self {
            mode: DispatchMode::Confirmation,
            risk,
            requires_confirmation: risk != RiskLevel::Low,
        }
    }
}

pub trait RiskPolicy: Send + Sync {
    fn classify(&self, call: &ToolCall) -> ToolClassification;
}

/// 基于 [tools] 配置的名单策略
#[derive(Debug, Clone, Default)]
pub struct ConfigRiskPolicy {
    interactive: HashSet<String>,
    medium: HashSet<String>,
    high: HashSet<String>,
    specialist_tool: String,
}

impl ConfigRiskPolicy {
    pub fn from_config(cfg: &ToolsSection) -> Self {
        Self {
            interactive: cfg.interactive_tools.iter().cloned().collect(),
            medium: cfg.medium_risk_tools.iter().cloned().collect(),
            high: cfg.high_risk_tools.iter().cloned().collect(),
            specialist_tool: cfg.specialist_tool.clone(),
        }
    }
}

impl RiskPolicy for ConfigRiskPolicy {
    fn classify(&self, call: &ToolCall) -> ToolClassification {
        let name = call.tool.as_str();
        if self.interactive.contains(name) {
            ToolClassification::interactive()
        } else if self.high.contains(name) {
            ToolClassification::confirmation(RiskLevel::High)
        } else if self.medium.contains(name) || name == self.specialist_tool {
            // 专家调用默认走 confirmation 通道，由专家路径决定是否需要交互
            ToolClassification::confirmation(RiskLevel::Medium)
        } else {
            ToolClassification::autonomous()
        }
    }
}
