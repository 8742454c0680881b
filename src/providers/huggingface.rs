use crate::config::ProviderSettings;
use crate::error::{DevMasterError, ProviderFailure};
use crate::providers::{ensure_success, http_client, prompt, require_key, ProviderAdapter};
use crate::types::{
    GenerationKind, GenerationOutput, GenerationPayload, GenerationRequest, ImageItem,
    ImageOutput, ImageParams, ProviderId,
};
use crate::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub(crate) const DEFAULT_API_BASE: &str = "https://api-inference.huggingface.co";
pub const DEFAULT_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.2";
pub const DEFAULT_IMAGE_MODEL: &str = "stabilityai/stable-diffusion-xl-base-1.0";

#[derive(Debug, Serialize)]
struct TextGenerationRequest<'a> {
    inputs: &'a str,
    parameters: TextGenerationParameters,
}

#[derive(Debug, Serialize)]
struct TextGenerationParameters {
    max_new_tokens: u32,
    temperature: f32,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: String,
}

// Inference API 对同一任务有时返回数组，有时返回单个对象
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextGenerationResponse {
    List(Vec<GeneratedText>),
    Single(GeneratedText),
}

impl TextGenerationResponse {
    fn into_text(self) -> Option<String> {
        match self {
            TextGenerationResponse::List(list) => list.into_iter().next().map(|g| g.generated_text),
            TextGenerationResponse::Single(single) => Some(single.generated_text),
        }
    }
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    inputs: &'a str,
}

/// Hugging Face Inference API 适配器
#[derive(Debug, Clone)]
pub struct HuggingFaceAdapter {
    settings: ProviderSettings,
}

impl HuggingFaceAdapter {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }

    fn model_url(&self, model: &str) -> String {
        format!("{}/models/{}", self.settings.base_or(DEFAULT_API_BASE), model)
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationOutput> {
        let api_key = require_key(ProviderId::HuggingFace, self.settings.key())?;

        match &req.payload {
            GenerationPayload::Image(params) => self.generate_image(api_key, params).await,
            _ => {
                let inputs = prompt::flatten(&prompt::conversation(req));
                let body = TextGenerationRequest {
                    inputs: &inputs,
                    parameters: TextGenerationParameters {
                        max_new_tokens: 1024,
                        temperature: 0.7,
                        return_full_text: false,
                    },
                };
                let model = self.settings.model_or(DEFAULT_MODEL);
                debug!(model, "请求 Hugging Face 文本生成");

                let response = http_client()
                    .post(self.model_url(model))
                    .bearer_auth(api_key)
                    .json(&body)
                    .send()
                    .await?;
                let response = ensure_success(response, ProviderId::HuggingFace).await?;

                let parsed: TextGenerationResponse = response.json().await?;
                let text = parsed
                    .into_text()
                    .ok_or_else(|| DevMasterError::malformed("Hugging Face 响应中没有 generated_text"))?;

                GenerationOutput::parse_text(req.kind(), &text)
            }
        }
    }

    /// 图片模型直接返回图片字节
    async fn generate_image(&self, api_key: &str, params: &ImageParams) -> Result<GenerationOutput> {
        let model = self.settings.image_model_or(DEFAULT_IMAGE_MODEL);
        debug!(model, "请求 Hugging Face 图片生成");

        let response = http_client()
            .post(self.model_url(model))
            .bearer_auth(api_key)
            .json(&ImageRequest {
                inputs: &params.prompt,
            })
            .send()
            .await?;
        let response = ensure_success(response, ProviderId::HuggingFace).await?;

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        if !mime.starts_with("image/") {
            return Err(DevMasterError::malformed(format!(
                "Hugging Face 返回了非图片内容: {}",
                mime
            )));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(DevMasterError::malformed("Hugging Face 返回了空图片"));
        }
        let output = GenerationOutput::Image(ImageOutput {
            images: vec![ImageItem::base64(STANDARD.encode(&bytes), mime)],
        });
        output.check()?;
        Ok(output)
    }
}

#[async_trait]
impl ProviderAdapter for HuggingFaceAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::HuggingFace
    }

    fn is_configured(&self) -> bool {
        self.settings.key().is_some()
    }

    fn supports(&self, _kind: GenerationKind) -> bool {
        true
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
