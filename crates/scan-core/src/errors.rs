use anyhow::anyhow;
use polars::error::PolarsError;
use rayon::ThreadPoolBuildError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    /// 数据验证错误
    #[error("数据验证失败: {0}")]
    Validation(String),

    /// 数据处理错误
    #[error("数据处理错误: {0}")]
    DataProcessing(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 没有可用策略
    #[error("没有可用的策略")]
    NoStrategies,

    /// 股票池为空
    #[error("股票列表为空")]
    EmptyUniverse,

    /// 推送错误
    #[error("推送失败: {0}")]
    Notify(String),

    /// 输入输出错误
    #[error("IO错误: {0}")]
    Io(#[from] io::Error),

    /// 序列化/反序列化错误
    #[error("序列化错误: {0}")]
    Serialization(String),

    /// Polars数据处理错误
    #[error("Polars错误: {0}")]
    Polars(#[from] PolarsError),

    // Rayon 并行处理错误
    #[error("Rayon 错误: {0}")]
    Rayon(#[from] ThreadPoolBuildError),

    /// 数据库错误
    #[error("数据库错误: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("配置文件解析错误: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("日期解析错误: {0}")]
    ParseDate(#[from] chrono::ParseError),

    #[error("通用错误: {0}")]
    Anyhow(#[from] anyhow::Error),

    #[error("未知错误: {0}")]
    Unknown(String),
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        ScanError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(err: reqwest::Error) -> Self {
        ScanError::Notify(err.to_string())
    }
}

impl From<String> for ScanError {
    fn from(err: String) -> Self {
        ScanError::Unknown(err)
    }
}

// 实现 PyO3 错误转换
#[cfg(feature = "python")]
impl From<ScanError> for pyo3::PyErr {
    fn from(err: ScanError) -> pyo3::PyErr {
        match err {
            ScanError::Validation(msg) | ScanError::Config(msg) => {
                pyo3::exceptions::PyValueError::new_err(msg)
            }
            _ => pyo3::exceptions::PyRuntimeError::new_err(err.to_string()),
        }
    }
}

// 扩展 Result 类型
pub type ScanResult<T> = Result<T, ScanError>;

/// 按变体构造错误，例如 `scan_err!(Validation, "缺少列 {}", name)`
#[macro_export]
macro_rules! scan_err {
    ($kind:ident, $($arg:tt)*) => {
        $crate::errors::ScanError::$kind(format!($($arg)*))
    };
}

/// 为错误添加上下文
pub trait ErrorContext<T, E> {
    fn context(self, context: &str) -> ScanResult<T>;
}

impl<T, E> ErrorContext<T, E> for Result<T, E>
where
    E: Into<ScanError>,
{
    fn context(self, context: &str) -> ScanResult<T> {
        self.map_err(|e| {
            let base_err: ScanError = e.into();
            match base_err {
                ScanError::Validation(msg) => ScanError::Validation(format!("{}: {}", context, msg)),
                ScanError::DataProcessing(msg) => {
                    ScanError::DataProcessing(format!("{}: {}", context, msg))
                }
                ScanError::Config(msg) => ScanError::Config(format!("{}: {}", context, msg)),
                ScanError::Notify(msg) => ScanError::Notify(format!("{}: {}", context, msg)),
                ScanError::Io(e) => {
                    ScanError::Io(io::Error::new(e.kind(), format!("{}: {}", context, e)))
                }
                ScanError::Serialization(msg) => {
                    ScanError::Serialization(format!("{}: {}", context, msg))
                }
                ScanError::Anyhow(e) => anyhow!("{}: {}", context, e).into(),
                ScanError::Unknown(msg) => ScanError::Unknown(format!("{}: {}", context, msg)),
                other @ (ScanError::NoStrategies | ScanError::EmptyUniverse) => other,
                other => ScanError::DataProcessing(format!("{}: {}", context, other)),
            }
        })
    }
}
