use crate::config::ProviderSettings;
use crate::error::{DevMasterError, ProviderFailure};
use crate::providers::{ensure_success, http_client, prompt, require_key, ProviderAdapter};
use crate::types::{
    ChatMessage, GenerationKind, GenerationOutput, GenerationPayload, GenerationRequest,
    ImageItem, ImageOutput, ImageParams, ProviderId,
};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.0-flash-preview-image-generation";

/// Gemini API 请求格式
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, PartialEq)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, PartialEq)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<&'static str>>,
}

/// Gemini API 响应格式
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidatePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

/// 转换对话为 Gemini contents：system 合并到第一条 user，assistant 映射为 model
fn convert_messages(messages: &[ChatMessage]) -> Vec<GeminiContent> {
    let mut contents: Vec<GeminiContent> = Vec::new();
    let mut system_content: Option<String> = None;

    for msg in messages {
        if msg.role == "system" {
            system_content = Some(match system_content.take() {
                Some(existing) => format!("{}\n\n{}", existing, msg.content),
                None => msg.content.clone(),
            });
            continue;
        }

        let role = if msg.role == "assistant" { "model" } else { "user" };
        let mut text = msg.content.clone();

        if role == "user" && contents.is_empty() {
            if let Some(system) = system_content.take() {
                text = format!("{}\n\n{}", system, text);
            }
        }

        contents.push(GeminiContent {
            role: role.to_string(),
            parts: vec![GeminiPart { text }],
        });
    }

    // 只有 system 消息时作为 user 发送
    if let Some(system) = system_content {
        contents.push(GeminiContent {
            role: "user".to_string(),
            parts: vec![GeminiPart { text: system }],
        });
    }

    contents
}

/// Gemini 适配器：generateContent（文本与图片模型）
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    settings: ProviderSettings,
}

impl GeminiAdapter {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationOutput> {
        let api_key = require_key(ProviderId::Gemini, self.settings.key())?;

        match &req.payload {
            GenerationPayload::Image(params) => self.generate_image(api_key, params).await,
            _ => {
                let config = (req.kind() != GenerationKind::Chat).then(|| GenerationConfig {
                    response_mime_type: Some("application/json"),
                    response_modalities: None,
                });
                let body = GeminiRequest {
                    contents: convert_messages(&prompt::conversation(req)),
                    generation_config: config,
                };
                let model = self.settings.model_or(DEFAULT_MODEL);
                let resp = self.generate_content(api_key, model, &body).await?;

                // candidates[0].content.parts[*].text
                let text = resp
                    .candidates
                    .into_iter()
                    .next()
                    .and_then(|c| c.content)
                    .map(|content| {
                        content
                            .parts
                            .into_iter()
                            .filter_map(|part| part.text)
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .ok_or_else(|| DevMasterError::malformed("Gemini 响应中没有 candidates"))?;

                GenerationOutput::parse_text(req.kind(), &text)
            }
        }
    }

    async fn generate_image(&self, api_key: &str, params: &ImageParams) -> Result<GenerationOutput> {
        let body = GeminiRequest {
            contents: convert_messages(&[ChatMessage::user(params.prompt.clone())]),
            generation_config: Some(GenerationConfig {
                response_mime_type: None,
                response_modalities: Some(vec!["TEXT", "IMAGE"]),
            }),
        };
        let model = self.settings.image_model_or(DEFAULT_IMAGE_MODEL);
        let resp = self.generate_content(api_key, model, &body).await?;

        let images = resp
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|content| content.parts)
            .filter_map(|part| part.inline_data)
            .map(|inline| ImageItem::base64(inline.data, inline.mime_type))
            .collect();

        let output = GenerationOutput::Image(ImageOutput { images });
        output.check()?;
        Ok(output)
    }

    async fn generate_content(
        &self,
        api_key: &str,
        model: &str,
        body: &GeminiRequest,
    ) -> Result<GeminiResponse> {
        // 通过 HTTP 头传递 API 密钥，不放在 URL 中
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_or(DEFAULT_API_BASE),
            model
        );
        debug!(model, "请求 Gemini generateContent");

        let response = http_client()
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await?;
        let response = ensure_success(response, ProviderId::Gemini).await?;

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
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
