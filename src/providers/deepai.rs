use crate::config::ProviderSettings;
use crate::error::{DevMasterError, ProviderFailure};
use crate::providers::{ensure_success, http_client, require_key, ProviderAdapter};
use crate::types::{
    GenerationKind, GenerationOutput, GenerationPayload, GenerationRequest, ImageItem,
    ImageOutput, ProviderId,
};
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://api.deepai.org";

#[derive(Debug, Deserialize)]
struct Text2ImgResponse {
    output_url: Option<String>,
}

/// DeepAI 适配器，仅支持 text2img，不在 auto 链中
#[derive(Debug, Clone)]
pub struct DeepAiAdapter {
    settings: ProviderSettings,
}

impl DeepAiAdapter {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationOutput> {
        let api_key = require_key(ProviderId::DeepAi, self.settings.key())?;

        let GenerationPayload::Image(params) = &req.payload else {
            return Err(DevMasterError::UnsupportedProvider(format!(
                "deepai 不支持 {}",
                req.kind()
            )));
        };

        let url = format!("{}/api/text2img", self.settings.base_or(DEFAULT_API_BASE));
        debug!("请求 DeepAI text2img");

        let response = http_client()
            .post(&url)
            .header("api-key", api_key)
            .form(&[("text", params.prompt.as_str())])
            .send()
            .await?;
        let response = ensure_success(response, ProviderId::DeepAi).await?;

        let parsed: Text2ImgResponse = response.json().await?;
        let images = parsed.output_url.map(ImageItem::url).into_iter().collect();

        let output = GenerationOutput::Image(ImageOutput { images });
        output.check()?;
        Ok(output)
    }
}

#[async_trait]
impl ProviderAdapter for DeepAiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::DeepAi
    }

    fn is_configured(&self) -> bool {
        self.settings.key().is_some()
    }

    fn supports(&self, kind: GenerationKind) -> bool {
        kind == GenerationKind::Image
    }

    async fn attempt(
        &self,
        req: &GenerationRequest,
    ) -> std::result::Result<GenerationOutput, ProviderFailure> {
        self.generate(req)
            .await
            .map_err(|e| ProviderFailure::from_error(self.id(), e))
    }
}
