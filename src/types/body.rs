//! HTTP 请求体。缺失的必填字段反序列化为空字符串，交给
//! [`GenerationRequest::validate`] 统一报错。

use crate::types::{
    ChatMessage, ChatParams, CourseParams, ExerciseParams, GenerationPayload, GenerationRequest,
    GlossaryParams, ImageParams, ProviderPreference, QuizParams, DEFAULT_COURSE_STEPS,
    DEFAULT_QUIZ_COUNT,
};
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// `translate` 字段：布尔开关或目标语言代码
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TranslateOption {
    Flag(bool),
    Target(String),
}

impl TranslateOption {
    pub fn resolve(&self, default_target: &str) -> Option<String> {
        match self {
            TranslateOption::Flag(true) => Some(default_target.to_string()),
            TranslateOption::Flag(false) => None,
            TranslateOption::Target(target) => Some(target.clone()),
        }
    }
}

/// 可转换为 [`GenerationRequest`] 的请求体
pub trait RequestBody: DeserializeOwned {
    fn into_request(self, default_target: &str) -> Result<GenerationRequest>;
}

fn finish(
    payload: GenerationPayload,
    provider: Option<String>,
    translate: Option<TranslateOption>,
    default_target: &str,
) -> Result<GenerationRequest> {
    let preference = ProviderPreference::parse(provider.as_deref())?;
    let mut request = GenerationRequest::new(payload).with_preference(preference);
    request.translate = translate.and_then(|t| t.resolve(default_target));
    Ok(request)
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuizBody {
    #[serde(default)]
    pub language: String,
    pub framework: Option<String>,
    pub topic: Option<String>,
    pub level: Option<u8>,
    pub count: Option<usize>,
    pub provider: Option<String>,
    pub translate: Option<TranslateOption>,
}

impl RequestBody for QuizBody {
    fn into_request(self, default_target: &str) -> Result<GenerationRequest> {
        let payload = GenerationPayload::Quiz(QuizParams {
            language: self.language,
            framework: self.framework,
            topic: self.topic,
            level: self.level,
            count: self.count.unwrap_or(DEFAULT_QUIZ_COUNT),
        });
        finish(payload, self.provider, self.translate, default_target)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageBody {
    #[serde(default)]
    pub prompt: String,
    pub size: Option<String>,
    pub provider: Option<String>,
}

impl RequestBody for ImageBody {
    fn into_request(self, default_target: &str) -> Result<GenerationRequest> {
        let payload = GenerationPayload::Image(ImageParams {
            prompt: self.prompt,
            size: self.size,
        });
        finish(payload, self.provider, None, default_target)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExerciseBody {
    #[serde(default)]
    pub language: String,
    pub framework: Option<String>,
    pub topic: Option<String>,
    pub level: Option<u8>,
    pub provider: Option<String>,
    pub translate: Option<TranslateOption>,
}

impl RequestBody for ExerciseBody {
    fn into_request(self, default_target: &str) -> Result<GenerationRequest> {
        let payload = GenerationPayload::Exercise(ExerciseParams {
            language: self.language,
            framework: self.framework,
            topic: self.topic,
            level: self.level,
        });
        finish(payload, self.provider, self.translate, default_target)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourseBody {
    #[serde(default)]
    pub language: String,
    pub topic: Option<String>,
    pub level: Option<u8>,
    pub steps: Option<usize>,
    pub provider: Option<String>,
    pub translate: Option<TranslateOption>,
}

impl RequestBody for CourseBody {
    fn into_request(self, default_target: &str) -> Result<GenerationRequest> {
        let payload = GenerationPayload::Course(CourseParams {
            language: self.language,
            topic: self.topic,
            level: self.level,
            steps: self.steps.unwrap_or(DEFAULT_COURSE_STEPS),
        });
        finish(payload, self.provider, self.translate, default_target)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlossaryBody {
    #[serde(default)]
    pub term: String,
    pub language: Option<String>,
    pub provider: Option<String>,
    pub translate: Option<TranslateOption>,
}

impl RequestBody for GlossaryBody {
    fn into_request(self, default_target: &str) -> Result<GenerationRequest> {
        let payload = GenerationPayload::Glossary(GlossaryParams {
            term: self.term,
            language: self.language,
        });
        finish(payload, self.provider, self.translate, default_target)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// 单条消息的简写形式
    pub message: Option<String>,
    pub persona: Option<String>,
    pub provider: Option<String>,
    pub translate: Option<TranslateOption>,
}

impl RequestBody for ChatBody {
    fn into_request(self, default_target: &str) -> Result<GenerationRequest> {
        let mut messages = self.messages;
        if let Some(message) = self.message {
            messages.push(ChatMessage::user(message));
        }
        let payload = GenerationPayload::Chat(ChatParams {
            messages,
            persona: self.persona,
        });
        finish(payload, self.provider, self.translate, default_target)
    }
}

/// 文档导出请求
#[derive(Debug, Clone, Deserialize)]
pub struct ExportBody {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}
