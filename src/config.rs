//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SCREEN_NAV__*` 覆盖（双下划线表示嵌套，
//! 如 `SCREEN_NAV__NAVIGATION__SHOW_TIMEOUT_MS=500`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub navigation: NavigationSection,
    /// 启动时注册的页面
    #[serde(default)]
    pub pages: Vec<PageSpec>,
}

/// [app] 段：应用名、日志过滤
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 默认日志过滤指令，RUST_LOG 优先
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// [navigation] 段：过渡超时、失败回滚、错误总线容量、演示页面耗时
#[derive(Debug, Clone, Deserialize)]
pub struct NavigationSection {
    /// Show 超时（毫秒），0 表示不限
    #[serde(default)]
    pub show_timeout_ms: u64,
    /// Hide 超时（毫秒），0 表示不限
    #[serde(default)]
    pub hide_timeout_ms: u64,
    /// Show 失败后是否恢复原来的栈并重新显示原栈顶
    #[serde(default = "default_rollback_on_failure")]
    pub rollback_on_failure: bool,
    /// PageError 广播缓冲区大小
    #[serde(default = "default_error_capacity")]
    pub error_capacity: usize,
    /// 演示页面的过渡动画耗时（毫秒）
    #[serde(default)]
    pub transition_ms: u64,
    /// 演示加载器的模拟加载耗时（毫秒）
    #[serde(default = "default_load_delay_ms")]
    pub load_delay_ms: u64,
}

fn default_rollback_on_failure() -> bool {
    true
}

fn default_error_capacity() -> usize {
    crate::core::events::DEFAULT_ERROR_CAPACITY
}

fn default_load_delay_ms() -> u64 {
    100
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl NavigationSection {
    pub fn show_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.show_timeout_ms)
    }

    pub fn hide_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.hide_timeout_ms)
    }

    pub fn transition(&self) -> Duration {
        Duration::from_millis(self.transition_ms)
    }

    pub fn load_delay(&self) -> Duration {
        Duration::from_millis(self.load_delay_ms)
    }
}

impl Default for NavigationSection {
    fn default() -> Self {
        Self {
            show_timeout_ms: 0,
            hide_timeout_ms: 0,
            rollback_on_failure: default_rollback_on_failure(),
            error_capacity: default_error_capacity(),
            transition_ms: 0,
            load_delay_ms: default_load_delay_ms(),
        }
    }
}

/// 页面来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PageSource {
    /// 启动时即实例化
    #[default]
    Memory,
    /// 首次导航时通过加载器实例化
    Lazy,
}

/// [[pages]] 条目
#[derive(Debug, Clone, Deserialize)]
pub struct PageSpec {
    pub id: String,
    #[serde(default)]
    pub source: PageSource,
    /// 懒加载资源 key，未设置时使用 id
    pub key: Option<String>,
    /// 懒加载挂载点
    pub parent: Option<String>,
}

impl PageSpec {
    pub fn loader_key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.id)
    }
}

/// 从 config 目录加载配置，环境变量 SCREEN_NAV__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SCREEN_NAV__*（双下划线表示嵌套键）
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
        config::Environment::with_prefix("SCREEN_NAV")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
