//! 各任务类型的提示词。结构化任务要求模型只输出固定形状的 JSON，
//! 这样所有提供商的结果都能用同一个解析器归一化。

use crate::types::{
    ChatMessage, ChatParams, CourseParams, ExerciseParams, GenerationPayload, GenerationRequest,
    GlossaryParams, QuizParams,
};

const TUTOR_PERSONA: &str = "You are DevMaster, a patient programming tutor. \
Explain concepts clearly, prefer short code examples, and ask a follow-up question when the learner seems stuck.";

const JSON_ONLY: &str =
    "Respond with a single JSON object and nothing else. Do not wrap it in markdown.";

/// 构建发送给文本模型的对话
pub fn conversation(req: &GenerationRequest) -> Vec<ChatMessage> {
    match &req.payload {
        GenerationPayload::Chat(params) => chat_conversation(params),
        GenerationPayload::Quiz(params) => structured(quiz_prompt(params)),
        GenerationPayload::Exercise(params) => structured(exercise_prompt(params)),
        GenerationPayload::Course(params) => structured(course_prompt(params)),
        GenerationPayload::Glossary(params) => structured(glossary_prompt(params)),
        GenerationPayload::Image(params) => vec![ChatMessage::user(params.prompt.clone())],
    }
}

/// 把对话压平为单个提示词（用于只接受纯文本输入的模型）
pub fn flatten(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for msg in messages {
        let speaker = match msg.role.as_str() {
            "system" => "System",
            "assistant" => "Assistant",
            _ => "User",
        };
        prompt.push_str(speaker);
        prompt.push_str(": ");
        prompt.push_str(&msg.content);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Assistant:");
    prompt
}

fn structured(user: String) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!("{} {}", TUTOR_PERSONA, JSON_ONLY)),
        ChatMessage::user(user),
    ]
}

fn chat_conversation(params: &ChatParams) -> Vec<ChatMessage> {
    let persona = params
        .persona
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(TUTOR_PERSONA);

    let mut messages = Vec::with_capacity(params.messages.len() + 1);
    messages.push(ChatMessage::system(persona));
    messages.extend(params.messages.iter().cloned());
    messages
}

fn subject(language: &str, framework: Option<&str>, topic: Option<&str>) -> String {
    let mut subject = language.trim().to_string();
    if let Some(framework) = framework.filter(|f| !f.trim().is_empty()) {
        subject.push_str(&format!(" ({})", framework.trim()));
    }
    if let Some(topic) = topic.filter(|t| !t.trim().is_empty()) {
        subject.push_str(&format!(", focusing on {}", topic.trim()));
    }
    subject
}

fn level_text(level: Option<u8>) -> String {
    match level {
        Some(level) => format!("difficulty level {} of 5", level),
        None => "beginner-friendly difficulty".to_string(),
    }
}

fn quiz_prompt(p: &QuizParams) -> String {
    format!(
        "Write {count} multiple-choice questions about {subject} at {level}. \
Each question needs at least three options and exactly one correct answer. \
Use this shape: {{\"questions\":[{{\"q\":\"question text\",\"options\":[\"option\"],\"answerIndex\":0,\"explain\":\"why the answer is correct\"}}]}}",
        count = p.count,
        subject = subject(&p.language, p.framework.as_deref(), p.topic.as_deref()),
        level = level_text(p.level),
    )
}

fn exercise_prompt(p: &ExerciseParams) -> String {
    format!(
        "Design one coding exercise about {subject} at {level}. \
Use this shape: {{\"exercise\":{{\"title\":\"short title\",\"prompt\":\"task description\",\"starterCode\":\"code the learner starts from\",\"solutionCode\":\"reference solution\"}}}}",
        subject = subject(&p.language, p.framework.as_deref(), p.topic.as_deref()),
        level = level_text(p.level),
    )
}

fn course_prompt(p: &CourseParams) -> String {
    format!(
        "Outline a mini course of {steps} steps about {subject} at {level}. \
Use this shape: {{\"course\":{{\"title\":\"course title\",\"steps\":[{{\"title\":\"step title\",\"content\":\"explanation\",\"code\":\"optional example\"}}]}}}}",
        steps = p.steps,
        subject = subject(&p.language, None, p.topic.as_deref()),
        level = level_text(p.level),
    )
}

fn glossary_prompt(p: &GlossaryParams) -> String {
    let context = match p.language.as_deref().filter(|l| !l.trim().is_empty()) {
        Some(language) => format!(" in the context of {}", language.trim()),
        None => String::new(),
    };
    format!(
        "Write a glossary entry for the programming term \"{term}\"{context}. \
Use a lowercase, hyphenated key. \
Use this shape: {{\"item\":{{\"key\":\"term-key\",\"title\":\"Term\",\"description\":\"plain explanation\",\"code\":\"short example\"}}}}",
        term = p.term.trim(),
        context = context,
    )
}
