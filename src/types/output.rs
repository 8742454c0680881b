use crate::error::DevMasterError;
use crate::types::GenerationKind;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub q: String,
    pub options: Vec<String>,
    #[serde(rename = "answerIndex")]
    pub answer_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizOutput {
    pub questions: Vec<QuizQuestion>,
}

/// 图片结果：远程 URL 或 base64 数据
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

impl ImageItem {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn base64(data: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            url: None,
            b64: Some(data.into()),
            mime: Some(mime.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageOutput {
    pub images: Vec<ImageItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseItem {
    pub title: String,
    pub prompt: String,
    #[serde(default)]
    pub starter_code: String,
    #[serde(default)]
    pub solution_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseOutput {
    pub exercise: ExerciseItem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseStep {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub title: String,
    pub steps: Vec<CourseStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseOutput {
    pub course: Course,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryItem {
    pub key: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryOutput {
    pub item: GlossaryItem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOutput {
    pub reply: String,
}

/// 归一化后的生成结果，序列化时不带类型标签
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GenerationOutput {
    Quiz(QuizOutput),
    Image(ImageOutput),
    Exercise(ExerciseOutput),
    Course(CourseOutput),
    Glossary(GlossaryOutput),
    Chat(ChatOutput),
}

// 提供商有时返回包装后的对象，有时直接返回内部对象
#[derive(Deserialize)]
#[serde(untagged)]
enum Wrapped<W, T> {
    Wrapped(W),
    Bare(T),
}

impl GenerationOutput {
    pub fn kind(&self) -> GenerationKind {
        match self {
            GenerationOutput::Quiz(_) => GenerationKind::Quiz,
            GenerationOutput::Image(_) => GenerationKind::Image,
            GenerationOutput::Exercise(_) => GenerationKind::Exercise,
            GenerationOutput::Course(_) => GenerationKind::Course,
            GenerationOutput::Glossary(_) => GenerationKind::Glossary,
            GenerationOutput::Chat(_) => GenerationKind::Chat,
        }
    }

    /// 将提供商返回的文本解析为指定类型的结果
    pub fn parse_text(kind: GenerationKind, text: &str) -> Result<Self> {
        let output = match kind {
            GenerationKind::Chat => GenerationOutput::Chat(ChatOutput {
                reply: text.trim().to_string(),
            }),
            GenerationKind::Image => {
                return Err(DevMasterError::malformed("图片结果不能从文本解析"));
            }
            GenerationKind::Quiz => {
                let questions = match parse_json::<Wrapped<QuizOutput, Vec<QuizQuestion>>>(text)? {
                    Wrapped::Wrapped(out) => out.questions,
                    Wrapped::Bare(questions) => questions,
                };
                GenerationOutput::Quiz(QuizOutput { questions })
            }
            GenerationKind::Exercise => {
                let exercise = match parse_json::<Wrapped<ExerciseOutput, ExerciseItem>>(text)? {
                    Wrapped::Wrapped(out) => out.exercise,
                    Wrapped::Bare(item) => item,
                };
                GenerationOutput::Exercise(ExerciseOutput { exercise })
            }
            GenerationKind::Course => {
                let course = match parse_json::<Wrapped<CourseOutput, Course>>(text)? {
                    Wrapped::Wrapped(out) => out.course,
                    Wrapped::Bare(course) => course,
                };
                GenerationOutput::Course(CourseOutput { course })
            }
            GenerationKind::Glossary => {
                let item = match parse_json::<Wrapped<GlossaryOutput, GlossaryItem>>(text)? {
                    Wrapped::Wrapped(out) => out.item,
                    Wrapped::Bare(item) => item,
                };
                GenerationOutput::Glossary(GlossaryOutput { item })
            }
        };

        output.check()?;
        Ok(output)
    }

    /// 空结果视为失败，以便继续尝试下一个提供商
    pub fn check(&self) -> Result<()> {
        match self {
            GenerationOutput::Quiz(out) => {
                if out.questions.is_empty() {
                    return Err(DevMasterError::malformed("questions 为空"));
                }
                for (i, question) in out.questions.iter().enumerate() {
                    if question.q.trim().is_empty() {
                        return Err(DevMasterError::malformed(format!("第 {} 题缺少题干", i)));
                    }
                    if question.options.len() < 2 {
                        return Err(DevMasterError::malformed(format!(
                            "第 {} 题选项少于 2 个",
                            i
                        )));
                    }
                    if question.answer_index >= question.options.len() {
                        return Err(DevMasterError::malformed(format!(
                            "第 {} 题 answerIndex 越界: {}",
                            i, question.answer_index
                        )));
                    }
                }
            }
            GenerationOutput::Image(out) => {
                if out.images.is_empty() {
                    return Err(DevMasterError::malformed("images 为空"));
                }
                if out.images.iter().any(|img| is_blank(&img.url) && is_blank(&img.b64)) {
                    return Err(DevMasterError::malformed("图片缺少 url 和 b64"));
                }
            }
            GenerationOutput::Exercise(out) => {
                if out.exercise.title.trim().is_empty() || out.exercise.prompt.trim().is_empty() {
                    return Err(DevMasterError::malformed("exercise 缺少 title 或 prompt"));
                }
            }
            GenerationOutput::Course(out) => {
                if out.course.title.trim().is_empty() {
                    return Err(DevMasterError::malformed("course 缺少 title"));
                }
                if out.course.steps.is_empty() {
                    return Err(DevMasterError::malformed("course.steps 为空"));
                }
                for (i, step) in out.course.steps.iter().enumerate() {
                    if step.title.trim().is_empty() || step.content.trim().is_empty() {
                        return Err(DevMasterError::malformed(format!(
                            "第 {} 步缺少 title 或 content",
                            i
                        )));
                    }
                }
            }
            GenerationOutput::Glossary(out) => {
                let item = &out.item;
                if [&item.key, &item.title, &item.description]
                    .iter()
                    .any(|field| field.trim().is_empty())
                {
                    return Err(DevMasterError::malformed(
                        "glossary 缺少 key、title 或 description",
                    ));
                }
            }
            GenerationOutput::Chat(out) => {
                if out.reply.trim().is_empty() {
                    return Err(DevMasterError::malformed("reply 为空"));
                }
            }
        }
        Ok(())
    }

    /// 面向用户的文本字段（不含代码和图片数据）
    pub fn text_fields_mut(&mut self) -> Vec<&mut String> {
        let mut fields = Vec::new();
        match self {
            GenerationOutput::Quiz(out) => {
                for question in &mut out.questions {
                    fields.push(&mut question.q);
                    fields.extend(question.options.iter_mut());
                    if let Some(explain) = question.explain.as_mut() {
                        fields.push(explain);
                    }
                }
            }
            GenerationOutput::Image(_) => {}
            GenerationOutput::Exercise(out) => {
                fields.push(&mut out.exercise.title);
                fields.push(&mut out.exercise.prompt);
            }
            GenerationOutput::Course(out) => {
                fields.push(&mut out.course.title);
                for step in &mut out.course.steps {
                    fields.push(&mut step.title);
                    fields.push(&mut step.content);
                }
            }
            GenerationOutput::Glossary(out) => {
                fields.push(&mut out.item.title);
                fields.push(&mut out.item.description);
            }
            GenerationOutput::Chat(out) => fields.push(&mut out.reply),
        }
        fields
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// 依次尝试各候选片段，返回第一个能解析的结果
fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let mut last_error = None;
    for candidate in json_candidates(text) {
        match serde_json::from_str(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e),
        }
    }

    match last_error {
        Some(e) => Err(e.into()),
        None => Err(DevMasterError::malformed("响应中没有 JSON 内容")),
    }
}

/// 从模型输出中截取 JSON（去掉 markdown 代码块和前后说明文字）
pub fn extract_json(text: &str) -> Option<&str> {
    json_candidates(text).into_iter().next()
}

/// `{...}` 与 `[...]` 两种候选片段，按起始位置排序
fn json_candidates(text: &str) -> Vec<&str> {
    let mut body = text.trim();

    if let Some(start) = body.find("```") {
        let after = &body[start + 3..];
        let after = after
            .strip_prefix("json")
            .or_else(|| after.strip_prefix("JSON"))
            .unwrap_or(after);
        let end = after.find("```").unwrap_or(after.len());
        body = after[..end].trim();
    }

    let mut candidates: Vec<(usize, &str)> = [('{', '}'), ('[', ']')]
        .into_iter()
        .filter_map(|(open, close)| {
            let start = body.find(open)?;
            let end = body.rfind(close)?;
            (end > start).then(|| (start, &body[start..=end]))
        })
        .collect();
    candidates.sort_by_key(|(start, _)| *start);
    candidates.into_iter().map(|(_, candidate)| candidate).collect()
}
