//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `QUILL__*` 覆盖（双下划线表示嵌套，如 `QUILL__ENGINE__MAX_ITERATIONS=30`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::tools::{DEFAULT_FINAL_ANSWER_TOOL, DEFAULT_SPECIALIST_TOOL, DEFAULT_SUGGEST_TOOL};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub engine: EngineSection,
    pub context: ContextSection,
    pub tools: ToolsSection,
    pub recovery: RecoverySection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 默认日志过滤，RUST_LOG 优先
    pub log_filter: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            log_filter: "info".to_string(),
        }
    }
}

/// [engine] 段：迭代上限、空计划阈值、历史保留、重复调用窗口
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub max_iterations: usize,
    /// 连续空计划达到此值即判定 Planner 故障
    pub empty_plan_threshold: usize,
    /// 任务之间保留的历史条数
    pub history_retention: usize,
    /// 相同工具 + 相同参数在此窗口内成功过则跳过
    pub duplicate_window_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            empty_plan_threshold: 3,
            history_retention: 200,
            duplicate_window_secs: 30,
        }
    }
}

/// [context] 段：给 Planner 的上下文窗口
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextSection {
    /// 工具结果先按最近 K 轮筛选
    pub turn_window: usize,
    /// 再截取最近 M 条
    pub max_tool_results: usize,
    /// 单条结果渲染的最大字符数
    pub max_result_chars: usize,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            turn_window: 4,
            max_tool_results: 10,
            max_result_chars: 1200,
        }
    }
}

/// [tools] 段：超时、特殊工具名、风险名单
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub final_answer_tool: String,
    pub suggest_tool: String,
    pub specialist_tool: String,
    /// 总是需要用户输入的工具
    pub interactive_tools: Vec<String>,
    pub medium_risk_tools: Vec<String>,
    pub high_risk_tools: Vec<String>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            final_answer_tool: DEFAULT_FINAL_ANSWER_TOOL.to_string(),
            suggest_tool: DEFAULT_SUGGEST_TOOL.to_string(),
            specialist_tool: DEFAULT_SPECIALIST_TOOL.to_string(),
            interactive_tools: vec![
                "ask_user".into(),
                "request_choice".into(),
                "confirm_action".into(),
            ],
            medium_risk_tools: vec!["edit_document".into(), "apply_edits".into()],
            high_risk_tools: vec![
                "delete_document".into(),
                "overwrite_document".into(),
                "publish".into(),
            ],
        }
    }
}

/// [recovery] 段：主动失败规则表（有序、可版本化）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoverySection {
    pub rules_version: u32,
    /// 大小写不敏感的正则；命中任一条即为主动失败，其余一律视为被动中断
    pub active_patterns: Vec<String>,
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self {
            rules_version: 1,
            active_patterns: default_active_patterns(),
        }
    }
}

fn default_active_patterns() -> Vec<String> {
    vec![
        // 业务规则
        r"business rule|rule violation|violates? (the )?(policy|constraint)".into(),
        // 参数缺失 / 格式错误
        r"invalid (argument|parameter|input)|missing (required )?(argument|parameter|field)|malformed (argument|request|parameter)".into(),
        // 权限 / 配置
        r"permission denied|forbidden|unauthori[sz]ed|access denied|configuration error|not configured|invalid api key".into(),
        // 用户拒绝
        r"user (declined|rejected|cancel+ed)|declined by (the )?user|rejected by (the )?user".into(),
        // 专家输出格式错误
        r"invalid specialist output|malformed (specialist )?output|failed to parse (specialist )?output|unexpected output format".into(),
        // 非瞬时的文件系统错误
        r"no such file|file not found|enoent|eacces|is a directory|not a directory|read-only file system|disk full|no space left".into(),
    ]
}

/// 从 config 目录加载配置，环境变量 QUILL__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 QUILL__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("QUILL")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.max_iterations, 20);
        assert_eq!(cfg.engine.empty_plan_threshold, 3);
        assert_eq!(cfg.engine.duplicate_window_secs, 30);
        assert_eq!(cfg.context.turn_window, 4);
        assert_eq!(cfg.context.max_tool_results, 10);
        assert_eq!(cfg.tools.final_answer_tool, "final_answer");
        assert_eq!(cfg.recovery.active_patterns.len(), 6);
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[engine]\nmax_iterations = 7\n\n[context]\nturn_window = 2\n\n[recovery]\nrules_version = 3\nactive_patterns = [\"quota exhausted\"]"
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.engine.max_iterations, 7);
        // 未出现的键保持默认
        assert_eq!(cfg.engine.empty_plan_threshold, 3);
        assert_eq!(cfg.context.turn_window, 2);
        assert_eq!(cfg.context.max_tool_results, 10);
        assert_eq!(cfg.recovery.rules_version, 3);
        assert_eq!(cfg.recovery.active_patterns, vec!["quota exhausted".to_string()]);
    }
}
