//! 引擎构建器：统一的引擎初始化逻辑
//!
//! 所有协作方都可替换；未指定的用默认实现（Mock LLM、内置工具、参考计划运行器、内存会话）。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::orchestrator::EngineParts;
use crate::core::{AgentEngine, AgentError, InterruptionClassifier, PlanRecoveryManager};
use crate::llm::{LlmClient, MockLlmClient};
use crate::memory::{ExecutionRecorder, ToolResultWindow};
use crate::plan::{PlanRunner, ToolPlanRunner};
use crate::react::{HostSink, LlmPlanner, LoopDetector, Planner, ToolDispatcher, TracingSink};
use crate::session::{InMemorySessionStore, SessionSnapshot, SessionStore};
use crate::tools::{
    tool_call_schema_json, ConfigRiskPolicy, EchoTool, FinalAnswerTool, RegistryToolExecutor,
    RiskPolicy, ToolExecutor, ToolNames, ToolRegistry, UserPromptTool,
};

pub struct EngineBuilder {
    config: AppConfig,
    system_prompt: Option<String>,
    llm: Option<Arc<dyn LlmClient>>,
    planner: Option<Arc<dyn Planner>>,
    executor: Option<Arc<dyn ToolExecutor>>,
    runner: Option<Arc<dyn PlanRunner>>,
    store: Option<Arc<dyn SessionStore>>,
    sink: Option<Arc<dyn HostSink>>,
    policy: Option<Arc<dyn RiskPolicy>>,
}

impl EngineBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            system_prompt: None,
            llm: None,
            planner: None,
            executor: None,
            runner: None,
            store: None,
            sink: None,
            policy: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = Some(prompt.to_string());
        self
    }

    /// 从文件加载系统提示词
    pub fn with_system_prompt_from_file(mut self) -> Self {
        self.system_prompt = ["config/prompts/system.md", "../config/prompts/system.md"]
            .into_iter()
            .find_map(|p| std::fs::read_to_string(p).ok());
        self
    }

    /// 默认 LlmPlanner 使用的 LLM
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 直接替换 Planner（优先于 with_llm）
    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_plan_runner(mut self, runner: Arc<dyn PlanRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn HostSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_risk_policy(mut self, policy: Arc<dyn RiskPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// 内置工具：final_answer、配置中的交互类工具与 echo
    pub fn build_tool_registry(&self) -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(FinalAnswerTool::new(&self.config.tools.final_answer_tool));
        for name in &self.config.tools.interactive_tools {
            tools.register(UserPromptTool::new(name));
        }
        tools.register(EchoTool);
        tools
    }

    pub fn tool_names(&self) -> ToolNames {
        ToolNames {
            final_answer: self.config.tools.final_answer_tool.clone(),
            suggest_next_action: self.config.tools.suggest_tool.clone(),
            specialist: self.config.tools.specialist_tool.clone(),
        }
    }

    fn default_system_prompt(registry: Option<&ToolRegistry>) -> String {
        let mut prompt = String::from(
            "You are Quill, a writing assistant that plans before it acts.\n\
             Reply with plain text for a direct answer, or with JSON: a single tool call \
             {\"tool\", \"args\"}, a list {\"response\", \"tool_calls\"}, or a multi-step plan \
             {\"plan\": {\"description\", \"steps\": [{\"specialist\", \"description\", \"input\"}]}}.\n\
             Call final_answer when the task is done.\n\n",
        );
        if let Some(registry) = registry {
            prompt.push_str("## Tools\n");
            prompt.push_str(&registry.to_schema_json());
            prompt.push_str("\n\n");
        }
        prompt.push_str("## Tool call format\n");
        prompt.push_str(&tool_call_schema_json());
        prompt
    }

    /// 组装引擎；只有恢复规则表无法编译时失败
    pub fn build(self) -> Result<AgentEngine, AgentError> {
        let names = self.tool_names();
        let classifier = InterruptionClassifier::from_config(&self.config.recovery)?;
        tracing::info!(
            rules_version = classifier.version(),
            "recovery rules loaded"
        );

        let registry = self.executor.is_none().then(|| self.build_tool_registry());
        let system_prompt = self
            .system_prompt
            .clone()
            .unwrap_or_else(|| Self::default_system_prompt(registry.as_ref()));

        let executor: Arc<dyn ToolExecutor> = match (self.executor, registry) {
            (Some(executor), _) => executor,
            (None, registry) => Arc::new(RegistryToolExecutor::new(
                registry.unwrap_or_default(),
                self.config.tools.tool_timeout_secs,
            )),
        };
        let planner: Arc<dyn Planner> = self.planner.unwrap_or_else(|| {
            let llm = self
                .llm
                .unwrap_or_else(|| Arc::new(MockLlmClient) as Arc<dyn LlmClient>);
            Arc::new(LlmPlanner::new(llm, system_prompt))
        });
        let runner = self
            .runner
            .unwrap_or_else(|| Arc::new(ToolPlanRunner::new(executor.clone())));
        let store = self.store.unwrap_or_else(|| {
            Arc::new(InMemorySessionStore::new(SessionSnapshot::new(
                self.config.app.name.clone(),
            )))
        });
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));
        let policy = self
            .policy
            .unwrap_or_else(|| Arc::new(ConfigRiskPolicy::from_config(&self.config.tools)));

        let dispatcher = ToolDispatcher::new(
            executor,
            policy,
            names.clone(),
            Duration::from_secs(self.config.engine.duplicate_window_secs),
        );

        Ok(AgentEngine::new(EngineParts {
            settings: self.config.engine.clone(),
            planner,
            runner,
            dispatcher,
            recorder: ExecutionRecorder::new(store, names.specialist.clone()),
            recovery: PlanRecoveryManager::new(classifier),
            detector: LoopDetector::new(names.suggest_next_action.clone()),
            window: ToolResultWindow::from_config(&self.config.context),
            sink,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecoverySection;

    #[test]
    fn test_build_with_defaults() {
        let engine = EngineBuilder::new(AppConfig::default()).build().unwrap();
        assert_eq!(engine.state().max_iterations, 20);
        assert!(engine.state().history.is_empty());
    }

    #[test]
    fn test_invalid_rule_fails_build() {
        let mut config = AppConfig::default();
        config.recovery = RecoverySection {
            rules_version: 2,
            active_patterns: vec!["(unclosed".to_string()],
        };
        let err = EngineBuilder::new(config).build().err().unwrap();
        assert!(matches!(err, AgentError::InvalidRule { .. }));
    }

    #[test]
    fn test_registry_has_builtin_tools() {
        let builder = EngineBuilder::new(AppConfig::default());
        let names = builder.build_tool_registry().tool_names();
        assert!(names.contains(&"final_answer".to_string()));
        assert!(names.contains(&"echo".to_string()));
        for interactive in ["ask_user", "request_choice", "confirm_action"] {
            assert!(names.contains(&interactive.to_string()));
        }
    }
}
