pub mod body;
pub mod output;

pub use output::{
    extract_json, ChatOutput, Course, CourseOutput, CourseStep, ExerciseItem, ExerciseOutput,
    GenerationOutput, GlossaryItem, GlossaryOutput, ImageItem, ImageOutput, QuizOutput,
    QuizQuestion,
};

use crate::error::DevMasterError;
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 第三方 AI 提供商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAi,
    Gemini,
    HuggingFace,
    DeepAi,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::OpenAi,
        ProviderId::Gemini,
        ProviderId::HuggingFace,
        ProviderId::DeepAi,
    ];

    /// auto 模式下的固定优先级
    pub const AUTO_ORDER: [ProviderId; 3] =
        [ProviderId::OpenAi, ProviderId::Gemini, ProviderId::HuggingFace];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Gemini => "gemini",
            ProviderId::HuggingFace => "huggingface",
            ProviderId::DeepAi => "deepai",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = DevMasterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderId::OpenAi),
            "gemini" => Ok(ProviderId::Gemini),
            "huggingface" | "hf" => Ok(ProviderId::HuggingFace),
            "deepai" => Ok(ProviderId::DeepAi),
            _ => Err(DevMasterError::UnsupportedProvider(s.to_string())),
        }
    }
}

/// 调用方的提供商选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderPreference {
    #[default]
    Auto,
    Explicit(ProviderId),
}

impl ProviderPreference {
    /// 解析请求体中的 `provider` 字段
    pub fn parse(value: Option<&str>) -> Result<Self> {
        match value.map(str::trim) {
            None | Some("") => Ok(ProviderPreference::Auto),
            Some(v) if v.eq_ignore_ascii_case("auto") => Ok(ProviderPreference::Auto),
            Some(v) => v.parse().map(ProviderPreference::Explicit),
        }
    }
}

/// 生成任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    Quiz,
    Image,
    Exercise,
    Course,
    Glossary,
    Chat,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::Quiz => "quiz",
            GenerationKind::Image => "image",
            GenerationKind::Exercise => "exercise",
            GenerationKind::Course => "course",
            GenerationKind::Glossary => "glossary",
            GenerationKind::Chat => "chat",
        }
    }

    /// 提供商全部失败时返回给客户端的错误码
    pub fn failure_code(&self) -> &'static str {
        match self {
            GenerationKind::Quiz => "quiz_generation_failed",
            GenerationKind::Image => "image_generation_failed",
            GenerationKind::Exercise => "exercise_generation_failed",
            GenerationKind::Course => "course_generation_failed",
            GenerationKind::Glossary => "glossary_generation_failed",
            GenerationKind::Chat => "chat_failed",
        }
    }

    pub fn is_text(&self) -> bool {
        !matches!(self, GenerationKind::Image)
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 聊天消息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizParams {
    pub language: String,
    pub framework: Option<String>,
    pub topic: Option<String>,
    pub level: Option<u8>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageParams {
    pub prompt: String,
    pub size: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseParams {
    pub language: String,
    pub framework: Option<String>,
    pub topic: Option<String>,
    pub level: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CourseParams {
    pub language: String,
    pub topic: Option<String>,
    pub level: Option<u8>,
    pub steps: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlossaryParams {
    pub term: String,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatParams {
    pub messages: Vec<ChatMessage>,
    pub persona: Option<String>,
}

/// 按任务类型区分的请求内容
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationPayload {
    Quiz(QuizParams),
    Image(ImageParams),
    Exercise(ExerciseParams),
    Course(CourseParams),
    Glossary(GlossaryParams),
    Chat(ChatParams),
}

impl GenerationPayload {
    pub fn kind(&self) -> GenerationKind {
        match self {
            GenerationPayload::Quiz(_) => GenerationKind::Quiz,
            GenerationPayload::Image(_) => GenerationKind::Image,
            GenerationPayload::Exercise(_) => GenerationKind::Exercise,
            GenerationPayload::Course(_) => GenerationKind::Course,
            GenerationPayload::Glossary(_) => GenerationKind::Glossary,
            GenerationPayload::Chat(_) => GenerationKind::Chat,
        }
    }
}

pub const DEFAULT_QUIZ_COUNT: usize = 5;
pub const MAX_QUIZ_COUNT: usize = 20;
pub const DEFAULT_COURSE_STEPS: usize = 5;
pub const MAX_COURSE_STEPS: usize = 12;

static IMAGE_SIZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2,4}x\d{2,4}$").unwrap());

/// 一次生成请求，处理完即丢弃
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub payload: GenerationPayload,
    pub preference: ProviderPreference,
    /// 目标语言代码；None 表示不翻译
    pub translate: Option<String>,
}

impl GenerationRequest {
    pub fn new(payload: GenerationPayload) -> Self {
        Self {
            payload,
            preference: ProviderPreference::Auto,
            translate: None,
        }
    }

    pub fn with_preference(mut self, preference: ProviderPreference) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_translation(mut self, target: impl Into<String>) -> Self {
        self.translate = Some(target.into());
        self
    }

    pub fn kind(&self) -> GenerationKind {
        self.payload.kind()
    }

    /// 校验必填字段，失败时不会联系任何提供商
    pub fn validate(&self) -> Result<()> {
        match &self.payload {
            GenerationPayload::Quiz(p) => {
                require("language", &p.language)?;
                check_level(p.level)?;
                check_range("count", p.count, MAX_QUIZ_COUNT)?;
            }
            GenerationPayload::Image(p) => {
                require("prompt", &p.prompt)?;
                if let Some(size) = &p.size {
                    if !IMAGE_SIZE.is_match(size) {
                        return Err(DevMasterError::validation(format!(
                            "size 格式应为 WIDTHxHEIGHT，当前值: {}",
                            size
                        )));
                    }
                }
            }
            GenerationPayload::Exercise(p) => {
                require("language", &p.language)?;
                check_level(p.level)?;
            }
            GenerationPayload::Course(p) => {
                require("language", &p.language)?;
                check_level(p.level)?;
                check_range("steps", p.steps, MAX_COURSE_STEPS)?;
            }
            GenerationPayload::Glossary(p) => {
                require("term", &p.term)?;
            }
            GenerationPayload::Chat(p) => {
                let last = p
                    .messages
                    .last()
                    .ok_or_else(|| DevMasterError::validation("messages 不能为空"))?;
                require("messages[-1].content", &last.content)?;
            }
        }

        if let Some(target) = &self.translate {
            require("translate", target)?;
        }

        Ok(())
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DevMasterError::validation(format!("{} 不能为空", field)));
    }
    Ok(())
}

fn check_level(level: Option<u8>) -> Result<()> {
    match level {
        Some(l) if !(1..=5).contains(&l) => Err(DevMasterError::validation(format!(
            "level 必须在 1 到 5 之间，当前值: {}",
            l
        ))),
        _ => Ok(()),
    }
}

fn check_range(field: &str, value: usize, max: usize) -> Result<()> {
    if !(1..=max).contains(&value) {
        return Err(DevMasterError::validation(format!(
            "{} 必须在 1 到 {} 之间，当前值: {}",
            field, max, value
        )));
    }
    Ok(())
}
