pub mod deepai;
pub mod dispatch;
pub mod gemini;
pub mod huggingface;
pub mod openai;
pub mod prompt;
pub mod translate;

use crate::config::Config;
use crate::error::{DevMasterError, ProviderFailure};
use crate::types::{GenerationKind, GenerationOutput, GenerationRequest, ProviderId};
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::sync::Arc;
use std::time::Duration;

/// 提供商适配器：把通用请求转换为某个提供商的 HTTP 调用并归一化结果。
///
/// 每次 `attempt` 最多发出一次网络请求，不做内部重试；
/// 缺少密钥时直接返回失败而不发请求。
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    /// 是否配置了 API 密钥
    fn is_configured(&self) -> bool;

    fn supports(&self, kind: GenerationKind) -> bool;

    async fn attempt(
        &self,
        req: &GenerationRequest,
    ) -> std::result::Result<GenerationOutput, ProviderFailure>;
}

/// 按配置构建全部适配器
pub fn build_adapters(config: &Config) -> Vec<Arc<dyn ProviderAdapter>> {
    vec![
        Arc::new(openai::OpenAiAdapter::new(config.openai.clone())),
        Arc::new(gemini::GeminiAdapter::new(config.gemini.clone())),
        Arc::new(huggingface::HuggingFaceAdapter::new(config.huggingface.clone())),
        Arc::new(deepai::DeepAiAdapter::new(config.deepai.clone())),
    ]
}

/// 获取全局 HTTP 客户端（连接池复用）
pub(crate) fn http_client() -> &'static Client {
    use once_cell::sync::Lazy;
    static CLIENT: Lazy<Client> = Lazy::new(|| {
        Client::builder()
            .timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap()
    });
    &CLIENT
}

/// 非 2xx 响应转为上游错误
pub(crate) async fn ensure_success(response: Response, provider: ProviderId) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    // 限制错误响应体大小
    let error_body = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(4096)
        .collect::<String>();
    Err(DevMasterError::upstream(
        status.as_u16(),
        format!("{} API 错误: {}", provider, error_body),
    ))
}

pub(crate) fn require_key(provider: ProviderId, key: Option<&str>) -> Result<&str> {
    key.ok_or(DevMasterError::MissingApiKey(provider))
}
