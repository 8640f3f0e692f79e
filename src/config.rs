//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MAGPIE__*` 覆盖（双下划线表示嵌套，
//! 如 `MAGPIE__AGENT__POLL_INTERVAL_SECS=10`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub backend: BackendSection,
}

/// [app] 段：应用名、运行用户、本地状态目录
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 托管的用户 ID
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// 本地状态目录（会话持久化文件所在），未设置时用 ./state
    pub state_dir: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            user_id: default_user_id(),
            state_dir: None,
        }
    }
}

fn default_user_id() -> String {
    "demo".to_string()
}

/// [agent] 段：托管窗口与计时参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 默认托管窗口时长（秒）
    pub default_window_secs: u64,
    /// 倒计时刻度周期（秒）
    pub tick_secs: u64,
    /// 对账轮询周期（秒）
    pub poll_interval_secs: u64,
    /// 到期提交每项失败后的立即重试次数
    pub commit_retries: u32,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            default_window_secs: 86_400,
            tick_secs: 1,
            poll_interval_secs: 30,
            commit_retries: 1,
        }
    }
}

/// [backend] 段：后端服务地址与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    pub base_url: String,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8600".to_string(),
            request_timeout_secs: 15,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            agent: AgentSection::default(),
            backend: BackendSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 MAGPIE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MAGPIE__*（双下划线表示嵌套键）
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
        config::Environment::with_prefix("MAGPIE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
