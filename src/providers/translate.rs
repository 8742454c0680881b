use crate::config::ProviderSettings;
use crate::error::DevMasterError;
use crate::providers::huggingface::DEFAULT_API_BASE;
use crate::providers::{ensure_success, http_client, require_key};
use crate::types::{GenerationOutput, ProviderId};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// 翻译适配器
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct TranslationRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslationItem {
    translation_text: String,
}

/// 基于 Hugging Face 翻译模型（默认 Helsinki-NLP/opus-mt-en-{target}）
#[derive(Debug, Clone)]
pub struct HuggingFaceTranslator {
    settings: ProviderSettings,
}

impl HuggingFaceTranslator {
    /// 仅在配置了 Hugging Face 密钥时可用
    pub fn from_settings(settings: &ProviderSettings) -> Option<Self> {
        settings.key()?;
        Some(Self {
            settings: settings.clone(),
        })
    }

    fn model_for(&self, target: &str) -> String {
        match self.settings.translate_model.as_deref().filter(|m| !m.trim().is_empty()) {
            Some(model) => model.to_string(),
            None => format!("Helsinki-NLP/opus-mt-en-{}", target.trim().to_ascii_lowercase()),
        }
    }
}

#[async_trait]
impl Translator for HuggingFaceTranslator {
    async fn translate(&self, text: &str, target: &str) -> Result<String> {
        let api_key = require_key(ProviderId::HuggingFace, self.settings.key())?;
        let model = self.model_for(target);
        let url = format!("{}/models/{}", self.settings.base_or(DEFAULT_API_BASE), model);

        let response = http_client()
            .post(&url)
            .bearer_auth(api_key)
            .json(&TranslationRequest { inputs: text })
            .send()
            .await?;
        let response = ensure_success(response, ProviderId::HuggingFace).await?;

        let items: Vec<TranslationItem> = response.json().await?;
        items
            .into_iter()
            .next()
            .map(|item| item.translation_text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| DevMasterError::malformed("翻译响应为空"))
    }
}

/// 逐字段翻译结果；单个字段失败时保留原文
pub async fn translate_output(
    translator: &dyn Translator,
    output: &mut GenerationOutput,
    target: &str,
) -> usize {
    let mut translated = 0;
    for field in output.text_fields_mut() {
        if field.trim().is_empty() {
            continue;
        }
        let result = translator.translate(field.as_str(), target).await;
        match result {
            Ok(text) => {
                *field = text;
                translated += 1;
            }
            Err(e) => warn!(target_lang = target, error = %e, "翻译失败，保留原文"),
        }
    }
    debug!(translated, target_lang = target, "翻译完成");
    translated
}
