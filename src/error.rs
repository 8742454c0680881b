use crate::types::{GenerationKind, ProviderId};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevMasterError {
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML 解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON 解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP 请求错误: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("ZIP 写入错误: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("请求参数无效: {0}")]
    ValidationError(String),

    #[error("提供商不支持: {0}")]
    UnsupportedProvider(String),

    #[error("未配置 API 密钥: {0}")]
    MissingApiKey(ProviderId),

    #[error("没有可用于 {0} 的 API 密钥")]
    MissingKeys(GenerationKind),

    #[error("上游 API 错误: {status} - {message}")]
    UpstreamError { status: u16, message: String },

    #[error("响应格式错误: {0}")]
    MalformedResponse(String),

    #[error("所有提供商均失败 ({kind}): {summary}", summary = summarize(.failures))]
    Exhausted {
        kind: GenerationKind,
        failures: Vec<ProviderFailure>,
    },

    #[error("内部错误: {0}")]
    InternalError(String),
}

impl DevMasterError {
    pub fn config(msg: impl Into<String>) -> Self {
        DevMasterError::ConfigError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        DevMasterError::InternalError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        DevMasterError::ValidationError(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        DevMasterError::MalformedResponse(msg.into())
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        DevMasterError::UpstreamError {
            status,
            message: message.into(),
        }
    }
}

/// 单个提供商的一次失败尝试
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderFailure {
    pub provider: ProviderId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub detail: String,
}

impl ProviderFailure {
    pub fn new(provider: ProviderId, status: Option<u16>, detail: impl Into<String>) -> Self {
        Self {
            provider,
            status,
            detail: detail.into(),
        }
    }

    /// 将适配器内部错误折叠为失败记录
    pub fn from_error(provider: ProviderId, err: DevMasterError) -> Self {
        let status = match &err {
            DevMasterError::UpstreamError { status, .. } => Some(*status),
            DevMasterError::HttpError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        };
        Self::new(provider, status, err.to_string())
    }
}

fn summarize(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "未尝试任何提供商".to_string();
    }
    failures
        .iter()
        .map(|f| match f.status {
            Some(status) => format!("{} ({})", f.provider, status),
            None => f.provider.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
