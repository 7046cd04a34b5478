//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BEELINE__*` 覆盖（双下划线表示嵌套，如 `BEELINE__LLM__PROVIDER=openai`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub registry: RegistrySection,
    pub context: ContextSection,
    pub agents: AgentsSection,
    pub server: ServerSection,
}

/// [app] 段：应用名、默认话题
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 请求未指定 topic 时使用
    #[serde(default = "default_topic")]
    pub default_topic: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            default_topic: default_topic(),
        }
    }
}

fn default_topic() -> String {
    "general".to_string()
}

/// [llm] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：ollama / openai
    #[serde(default = "default_provider")]
    pub provider: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// 路由决策所用模型
    #[serde(default = "default_routing_model")]
    pub routing_model: String,
    /// 兜底直答所用模型
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
    /// Prompt Agent 所用模型
    #[serde(default = "default_agent_model")]
    pub agent_model: String,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            api_key: None,
            routing_model: default_routing_model(),
            fallback_model: default_fallback_model(),
            agent_model: default_agent_model(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_routing_model() -> String {
    "gemma3:4b".to_string()
}

fn default_fallback_model() -> String {
    "gemma3:12b-it-qat".to_string()
}

fn default_agent_model() -> String {
    "gemma3:4b".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次模型请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

/// [registry] 段：Agent 声明目录
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySection {
    #[serde(default = "default_registry_dir")]
    pub dir: PathBuf,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            dir: default_registry_dir(),
        }
    }
}

fn default_registry_dir() -> PathBuf {
    PathBuf::from("config/agents")
}

/// [context] 段：上下文数据库与读取窗口
#[derive(Debug, Clone, Deserialize)]
pub struct ContextSection {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// 每次读取的最近记录条数
    #[serde(default = "default_window")]
    pub window: usize,
    /// 格式化后上下文的最大字符数
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_exclude_main_model")]
    pub exclude_main_model: bool,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            window: default_window(),
            max_chars: default_max_chars(),
            exclude_main_model: default_exclude_main_model(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("context.db")
}

fn default_window() -> usize {
    10
}

fn default_max_chars() -> usize {
    1000
}

fn default_exclude_main_model() -> bool {
    true
}

/// [agents] 段：Agent 调用超时与远程 Agent 地址
#[derive(Debug, Clone, Deserialize)]
pub struct AgentsSection {
    /// 单次 Agent 调用超时（秒）
    #[serde(default = "default_agent_timeout_secs")]
    pub timeout_secs: u64,
    /// 远程 Agent：名称 -> 完整 URL（如 http://host/tools/law_agent/run）
    #[serde(default)]
    pub remote: HashMap<String, String>,
}

impl Default for AgentsSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_agent_timeout_secs(),
            remote: HashMap::new(),
        }
    }
}

fn default_agent_timeout_secs() -> u64 {
    30
}

/// [server] 段：HTTP 监听地址
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// 从 config 目录加载配置，环境变量 BEELINE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BEELINE__*（双下划线表示嵌套键）
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
        config::Environment::with_prefix("BEELINE")
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
    fn test_defaults_match_backend_contract() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "ollama");
        assert_eq!(cfg.llm.routing_model, "gemma3:4b");
        assert_eq!(cfg.llm.fallback_model, "gemma3:12b-it-qat");
        assert_eq!(cfg.llm.timeouts.request, 30);
        assert_eq!(cfg.context.window, 10);
        assert_eq!(cfg.context.max_chars, 1000);
        assert_eq!(cfg.app.default_topic, "general");
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[llm]\nrouting_model = \"llama3\"\n[agents]\ntimeout_secs = 5\n[agents.remote]\nlaw_agent = \"http://legal:9000/tools/law_agent/run\""
        )
        .unwrap();
        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.routing_model, "llama3");
        assert_eq!(cfg.llm.fallback_model, "gemma3:12b-it-qat");
        assert_eq!(cfg.agents.timeout_secs, 5);
        assert_eq!(
            cfg.agents.remote.get("law_agent").map(String::as_str),
            Some("http://legal:9000/tools/law_agent/run")
        );
    }
}
