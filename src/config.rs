use serde::{Deserialize, Serialize};
use figment::{Figment, providers::{Format, Toml, Env, Serialized}};
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};

/// Default settings file, looked up relative to the working directory
pub const DEFAULT_SETTINGS_FILE: &str = "advisor.toml";

/// Environment variable prefix; `__` separates nested keys
pub const ENV_PREFIX: &str = "AI_ADVISOR_";

/// 主配置结构体
///
/// 应用程序运行设置，从advisor.toml和环境变量加载。
/// 提供商与模型目录单独存放在`catalog_path`指向的文件中。
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Settings {
    /// 提供商目录文件路径
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    /// 对话记录文件路径（追加写入）
    #[serde(default = "default_transcript_path")]
    pub transcript_path: PathBuf,
    /// HTTP控制面配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 出站HTTP客户端配置
    #[serde(default)]
    pub http: HttpClientConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct HttpClientConfig {
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_seconds: u64,
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
}

// Default value functions
fn default_catalog_path() -> PathBuf { PathBuf::from("config/catalog.toml") }
fn default_transcript_path() -> PathBuf { PathBuf::from("log.txt") }
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8765 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "compact".to_string() }
fn default_pool_idle_timeout() -> u64 { 90 }
fn default_pool_max_idle_per_host() -> usize { 4 }

impl Default for Settings {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            transcript_path: default_transcript_path(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            http: HttpClientConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            pool_idle_timeout_seconds: default_pool_idle_timeout(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
        }
    }
}

/// 加载运行设置
///
/// ## 功能说明
/// 依次合并内置默认值、设置文件和以AI_ADVISOR_开头的环境变量，后者覆盖前者
///
/// ## 内部实现逻辑
/// 1. 以`Settings::default()`作为基础层
/// 2. 合并设置文件（文件不存在时该层为空）
/// 3. 合并环境变量，`__`用于表示嵌套字段，例如`AI_ADVISOR_SERVER__PORT`
/// 4. 反序列化并调用validate()校验
///
/// ## 执行例子
/// ```rust,ignore
/// let settings = load_settings(Path::new("advisor.toml"))?;
/// println!("Catalog at {}", settings.catalog_path.display());
/// ```
pub fn load_settings(path: &Path) -> Result<Settings> {
    let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .with_context(|| format!("Failed to load settings from {} or environment variables", path.display()))?;

    settings.validate()
        .context("Settings validation failed")?;

    Ok(settings)
}

impl Settings {
    /// 验证全部设置
    pub fn validate(&self) -> Result<()> {
        if self.catalog_path.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Catalog path cannot be empty"));
        }

        if self.transcript_path.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Transcript path cannot be empty"));
        }

        self.server.validate()
            .context("Server configuration validation failed")?;

        self.logging.validate()
            .context("Logging configuration validation failed")?;

        self.http.validate()
            .context("HTTP client configuration validation failed")?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }

        if self.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        Ok(())
    }
}

impl LoggingConfig {
    /// 验证日志配置参数
    ///
    /// ## 参数验证规则
    /// - `level`: 必须是 "trace", "debug", "info", "warn", "error" 之一
    /// - `format`: 必须是 "json", "pretty", "compact" 之一
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level '{}': must be one of {:?}",
                self.level, valid_levels
            ));
        }

        let valid_formats = ["json", "pretty", "compact"];
        if !valid_formats.contains(&self.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format '{}': must be one of {:?}",
                self.format, valid_formats
            ));
        }

        Ok(())
    }
}

impl HttpClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pool_idle_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Pool idle timeout must be greater than 0"));
        }

        if self.pool_idle_timeout_seconds > 3600 {
            return Err(anyhow::anyhow!("Pool idle timeout cannot exceed 3600 seconds"));
        }

        if self.pool_max_idle_per_host > 1000 {
            return Err(anyhow::anyhow!("Pool max idle per host cannot exceed 1000"));
        }

        Ok(())
    }
}
