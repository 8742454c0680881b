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

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
const DEFAULT_IMAGE_SIZE: &str = "1024x1024";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    b64_json: Option<String>,
}

/// OpenAI 适配器：chat/completions 与 images/generations
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    settings: ProviderSettings,
}

impl OpenAiAdapter {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationOutput> {
        let api_key = require_key(ProviderId::OpenAi, self.settings.key())?;

        match &req.payload {
            GenerationPayload::Image(params) => self.generate_image(api_key, params).await,
            _ => {
                let text = self.complete(api_key, req).await?;
                GenerationOutput::parse_text(req.kind(), &text)
            }
        }
    }

    /// 调用 chat/completions，返回 choices[0].message.content
    async fn complete(&self, api_key: &str, req: &GenerationRequest) -> Result<String> {
        let messages = prompt::conversation(req);
        let body = CompletionRequest {
            model: self.settings.model_or(DEFAULT_MODEL),
            messages: &messages,
            temperature: 0.7,
            response_format: (req.kind() != GenerationKind::Chat).then_some(ResponseFormat {
                format: "json_object",
            }),
        };

        let url = format!("{}/chat/completions", self.settings.base_or(DEFAULT_API_BASE));
        debug!(model = body.model, "请求 OpenAI chat/completions");

        let response = http_client()
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response, ProviderId::OpenAi).await?;

        let completion: CompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| DevMasterError::malformed("OpenAI 响应中没有 choices[0].message.content"))
    }

    async fn generate_image(&self, api_key: &str, params: &ImageParams) -> Result<GenerationOutput> {
        let body = ImageRequest {
            model: self.settings.image_model_or(DEFAULT_IMAGE_MODEL),
            prompt: &params.prompt,
            n: 1,
            size: params.size.as_deref().unwrap_or(DEFAULT_IMAGE_SIZE),
        };

        let url = format!("{}/images/generations", self.settings.base_or(DEFAULT_API_BASE));
        debug!(model = body.model, "请求 OpenAI images/generations");

        let response = http_client()
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response, ProviderId::OpenAi).await?;

        let parsed: ImageResponse = response.json().await?;
        let images = parsed
            .data
            .into_iter()
            .filter_map(|item| match (item.b64_json, item.url) {
                (Some(b64), _) => Some(ImageItem::base64(b64, "image/png")),
                (None, Some(url)) => Some(ImageItem::url(url)),
                (None, None) => None,
            })
            .collect();

        let output = GenerationOutput::Image(ImageOutput { images });
        output.check()?;
        Ok(output)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatParams, QuizParams};
    use mockito::{Matcher, Server, ServerGuard};

    async fn setup_mock_server() -> ServerGuard {
        Server::new_async().await
    }

    fn create_test_adapter(api_base: &str) -> OpenAiAdapter {
        OpenAiAdapter::new(ProviderSettings {
            api_key: Some("sk-test-key".to_string()),
            api_base: api_base.to_string(),
            ..ProviderSettings::default()
        })
    }

    fn quiz_request() -> GenerationRequest {
        GenerationRequest::new(GenerationPayload::Quiz(QuizParams {
            language: "JavaScript".to_string(),
            framework: None,
            topic: Some("loops".to_string()),
            level: Some(2),
            count: 1,
        }))
    }

    fn completion_body(content: &str) -> String {
        serde_json::json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_quiz_success() {
        let mut server = setup_mock_server().await;
        let quiz = r#"{"questions":[{"q":"What does a for-loop do?","options":["Repeats code","Declares a variable","Imports a module"],"answerIndex":0}]}"#;

        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test-key")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": DEFAULT_MODEL,
                "response_format": {"type": "json_object"}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body(quiz))
            .create_async()
            .await;

        let adapter = create_test_adapter(&server.url());
        let output = adapter.attempt(&quiz_request()).await.unwrap();
        assert_eq!(serde_json::to_string(&output).unwrap(), quiz);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_chat_has_no_json_mode() {
        let mut server = setup_mock_server().await;

        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "Hi"}
                ]
            })))
            .with_status(200)
            .with_body(completion_body("Hello!"))
            .create_async()
            .await;

        let adapter = create_test_adapter(&server.url());
        let req = GenerationRequest::new(GenerationPayload::Chat(ChatParams {
            messages: vec![ChatMessage::user("Hi")],
            persona: Some("Be brief.".to_string()),
        }));
        let output = adapter.attempt(&req).await.unwrap();
        assert_eq!(serde_json::to_value(&output).unwrap()["reply"], "Hello!");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_becomes_failure() {
        let mut server = setup_mock_server().await;

        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body(r#"{"error": {"message": "Rate limit"}}"#)
            .create_async()
            .await;

        let adapter = create_test_adapter(&server.url());
        let failure = adapter.attempt(&quiz_request()).await.unwrap_err();
        assert_eq!(failure.provider, ProviderId::OpenAi);
        assert_eq!(failure.status, Some(429));
        assert!(failure.detail.contains("Rate limit"));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unparseable_content_is_failure() {
        let mut server = setup_mock_server().await;

        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion_body("I cannot help with that."))
            .create_async()
            .await;

        let adapter = create_test_adapter(&server.url());
        let failure = adapter.attempt(&quiz_request()).await.unwrap_err();
        assert_eq!(failure.status, None);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_image_generation() {
        let mut server = setup_mock_server().await;

        let mock = server
            .mock("POST", "/images/generations")
            .match_body(Matcher::Json(serde_json::json!({
                "model": DEFAULT_IMAGE_MODEL,
                "prompt": "a red cube",
                "n": 1,
                "size": "512x512"
            })))
            .with_status(200)
            .with_body(r#"{"created": 1, "data": [{"url": "https://img.example/cube.png"}]}"#)
            .create_async()
            .await;

        let adapter = create_test_adapter(&server.url());
        let req = GenerationRequest::new(GenerationPayload::Image(ImageParams {
            prompt: "a red cube".to_string(),
            size: Some("512x512".to_string()),
        }));
        let output = adapter.attempt(&req).await.unwrap();
        assert_eq!(
            output,
            GenerationOutput::Image(ImageOutput {
                images: vec![ImageItem::url("https://img.example/cube.png")]
            })
        );

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_request() {
        let mut server = setup_mock_server().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let adapter = OpenAiAdapter::new(ProviderSettings {
            api_base: server.url(),
            ..ProviderSettings::default()
        });
        assert!(!adapter.is_configured());

        let failure = adapter.attempt(&quiz_request()).await.unwrap_err();
        assert!(failure.detail.contains("openai"));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_blank_image_url_is_failure() {
        let mut server = setup_mock_server().await;

        let mock = server
            .mock("POST", "/images/generations")
            .with_status(200)
            .with_body(r#"{"created": 1, "data": [{"url": ""}]}"#)
            .create_async()
            .await;

        let adapter = create_test_adapter(&server.url());
        let req = GenerationRequest::new(GenerationPayload::Image(ImageParams {
            prompt: "a red cube".to_string(),
            size: None,
        }));
        let failure = adapter.attempt(&req).await.unwrap_err();
        assert_eq!(failure.provider, ProviderId::OpenAi);

        mock.assert_async().await;
    }
}
