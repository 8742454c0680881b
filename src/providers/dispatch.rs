use crate::config::Config;
use crate::error::{DevMasterError, ProviderFailure};
use crate::metrics;
use crate::providers::translate::{translate_output, HuggingFaceTranslator, Translator};
use crate::providers::{build_adapters, ProviderAdapter};
use crate::types::{GenerationOutput, GenerationRequest, ProviderId, ProviderPreference};
use crate::Result;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 单个请求在回退链中的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Pending,
    Trying(ProviderId),
    Succeeded(ProviderId),
    Exhausted,
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainState::Pending => f.write_str("pending"),
            ChainState::Trying(id) => write!(f, "trying({})", id),
            ChainState::Succeeded(id) => write!(f, "succeeded({})", id),
            ChainState::Exhausted => f.write_str("exhausted"),
        }
    }
}

/// 成功结果及之前失败的尝试
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub output: GenerationOutput,
    pub provider: ProviderId,
    pub failures: Vec<ProviderFailure>,
}

/// 提供商回退调度器。
///
/// 指定提供商时只尝试该提供商，失败即终止；auto 模式按
/// openai → gemini → huggingface 的固定顺序依次尝试，第一个成功的结果直接返回。
/// 调度器本身不保存任何跨请求状态。
#[derive(Clone)]
pub struct Dispatcher {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    translator: Option<Arc<dyn Translator>>,
}

impl Dispatcher {
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        Self {
            adapters,
            translator: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let dispatcher = Self::new(build_adapters(config));
        match HuggingFaceTranslator::from_settings(&config.huggingface) {
            Some(translator) => dispatcher.with_translator(Arc::new(translator)),
            None => dispatcher,
        }
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn adapters(&self) -> &[Arc<dyn ProviderAdapter>] {
        &self.adapters
    }

    pub fn adapter(&self, id: ProviderId) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapters.iter().find(|a| a.id() == id)
    }

    pub fn can_translate(&self) -> bool {
        self.translator.is_some()
    }

    /// 计算本次请求的尝试顺序
    pub fn plan(&self, req: &GenerationRequest) -> Result<Vec<Arc<dyn ProviderAdapter>>> {
        let kind = req.kind();

        match req.preference {
            ProviderPreference::Explicit(id) => {
                let adapter = self
                    .adapter(id)
                    .ok_or_else(|| DevMasterError::UnsupportedProvider(id.to_string()))?;
                if !adapter.supports(kind) {
                    return Err(DevMasterError::validation(format!(
                        "{} 不支持 {} 生成",
                        id, kind
                    )));
                }
                Ok(vec![Arc::clone(adapter)])
            }
            ProviderPreference::Auto => {
                let plan: Vec<_> = ProviderId::AUTO_ORDER
                    .into_iter()
                    .filter_map(|id| self.adapter(id))
                    .filter(|adapter| adapter.supports(kind))
                    .cloned()
                    .collect();

                if !plan.iter().any(|adapter| adapter.is_configured()) {
                    return Err(DevMasterError::MissingKeys(kind));
                }
                Ok(plan)
            }
        }
    }

    /// 执行一次生成请求
    pub async fn dispatch(&self, req: &GenerationRequest) -> Result<DispatchOutcome> {
        req.validate()?;
        let plan = self.plan(req)?;
        let kind = req.kind();
        let metrics = metrics::global_metrics();

        let mut state = ChainState::Pending;
        let mut failures = Vec::new();
        debug!(%kind, %state, providers = plan.len(), "开始调度");

        for adapter in plan {
            let id = adapter.id();

            // auto 模式下跳过未配置密钥的提供商，不发请求
            if req.preference == ProviderPreference::Auto && !adapter.is_configured() {
                debug!(provider = %id, "跳过未配置密钥的提供商");
                failures.push(ProviderFailure::new(id, None, "api key not configured"));
                continue;
            }

            state = ChainState::Trying(id);
            debug!(%kind, %state, "尝试提供商");
            metrics.record_attempt();

            let failure = match adapter.attempt(req).await {
                Ok(output) if output.kind() == kind => {
                    state = ChainState::Succeeded(id);
                    info!(%kind, %state, fallbacks = failures.len(), "生成成功");
                    let output = self.post_process(req, output).await;
                    return Ok(DispatchOutcome {
                        output,
                        provider: id,
                        failures,
                    });
                }
                Ok(output) => ProviderFailure::new(
                    id,
                    None,
                    format!("返回了 {} 结果，期望 {}", output.kind(), kind),
                ),
                Err(failure) => failure,
            };

            metrics.record_provider_failure();
            warn!(
                provider = %id,
                status = ?failure.status,
                detail = %failure.detail,
                "提供商失败"
            );
            failures.push(failure);
        }

        state = ChainState::Exhausted;
        warn!(%kind, %state, tried = failures.len(), "所有提供商均失败");
        Err(DevMasterError::Exhausted { kind, failures })
    }

    /// 尽力翻译；翻译失败不影响结果
    async fn post_process(
        &self,
        req: &GenerationRequest,
        mut output: GenerationOutput,
    ) -> GenerationOutput {
        match (&req.translate, &self.translator) {
            (Some(target), Some(translator)) => {
                translate_output(translator.as_ref(), &mut output, target).await;
            }
            (Some(target), None) => {
                debug!(target_lang = %target, "未配置翻译，返回原文");
            }
            _ => {}
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ChatOutput, GenerationKind, GenerationPayload, ImageParams, QuizOutput, QuizParams,
        QuizQuestion,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type CallLog = Arc<Mutex<Vec<ProviderId>>>;

    struct MockAdapter {
        id: ProviderId,
        configured: bool,
        result: std::result::Result<GenerationOutput, u16>,
        calls: AtomicUsize,
        log: CallLog,
    }

    impl MockAdapter {
        fn ok(id: ProviderId, output: GenerationOutput, log: &CallLog) -> Arc<Self> {
            Arc::new(Self {
                id,
                configured: true,
                result: Ok(output),
                calls: AtomicUsize::new(0),
                log: Arc::clone(log),
            })
        }

        fn failing(id: ProviderId, status: u16, log: &CallLog) -> Arc<Self> {
            Arc::new(Self {
                id,
                configured: true,
                result: Err(status),
                calls: AtomicUsize::new(0),
                log: Arc::clone(log),
            })
        }

        fn unconfigured(id: ProviderId, log: &CallLog) -> Arc<Self> {
            Arc::new(Self {
                id,
                configured: false,
                result: Err(401),
                calls: AtomicUsize::new(0),
                log: Arc::clone(log),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderAdapter for MockAdapter {
        fn id(&self) -> ProviderId {
            self.id
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        fn supports(&self, kind: GenerationKind) -> bool {
            self.id != ProviderId::DeepAi || kind == GenerationKind::Image
        }

        async fn attempt(
            &self,
            _req: &GenerationRequest,
        ) -> std::result::Result<GenerationOutput, ProviderFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push(self.id);
            self.result
                .clone()
                .map_err(|status| ProviderFailure::new(self.id, Some(status), "mock failure"))
        }
    }

    struct FailingTranslator;

    #[async_trait]
    impl Translator for FailingTranslator {
        async fn translate(&self, _text: &str, _target: &str) -> Result<String> {
            Err(DevMasterError::upstream(503, "translation unavailable"))
        }
    }

    struct UppercaseTranslator;

    #[async_trait]
    impl Translator for UppercaseTranslator {
        async fn translate(&self, text: &str, _target: &str) -> Result<String> {
            Ok(text.to_uppercase())
        }
    }

    fn quiz_output(label: &str) -> GenerationOutput {
        GenerationOutput::Quiz(QuizOutput {
            questions: vec![QuizQuestion {
                q: format!("question from {}", label),
                options: vec!["yes".to_string(), "no".to_string()],
                answer_index: 0,
                explain: None,
            }],
        })
    }

    fn quiz_request(language: &str) -> GenerationRequest {
        GenerationRequest::new(GenerationPayload::Quiz(QuizParams {
            language: language.to_string(),
            framework: None,
            topic: Some("loops".to_string()),
            level: Some(2),
            count: 3,
        }))
    }

    fn as_dyn(adapters: &[&Arc<MockAdapter>]) -> Vec<Arc<dyn ProviderAdapter>> {
        adapters
            .iter()
            .map(|a| Arc::clone(*a) as Arc<dyn ProviderAdapter>)
            .collect()
    }

    #[tokio::test]
    async fn test_auto_falls_back_in_fixed_order() {
        let log = CallLog::default();
        let openai = MockAdapter::failing(ProviderId::OpenAi, 500, &log);
        let gemini = MockAdapter::ok(ProviderId::Gemini, quiz_output("gemini"), &log);
        let hf = MockAdapter::ok(ProviderId::HuggingFace, quiz_output("hf"), &log);
        // 注册顺序与优先级无关
        let dispatcher = Dispatcher::new(as_dyn(&[&hf, &gemini, &openai]));

        let outcome = dispatcher.dispatch(&quiz_request("Rust")).await.unwrap();
        assert_eq!(outcome.provider, ProviderId::Gemini);
        assert_eq!(outcome.output, quiz_output("gemini"));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].provider, ProviderId::OpenAi);
        assert_eq!(*log.lock().unwrap(), vec![ProviderId::OpenAi, ProviderId::Gemini]);
        assert_eq!(hf.calls(), 0);
    }

    #[tokio::test]
    async fn test_explicit_failure_is_terminal() {
        let log = CallLog::default();
        let openai = MockAdapter::ok(ProviderId::OpenAi, quiz_output("openai"), &log);
        let gemini = MockAdapter::failing(ProviderId::Gemini, 429, &log);
        let hf = MockAdapter::ok(ProviderId::HuggingFace, quiz_output("hf"), &log);
        let dispatcher = Dispatcher::new(as_dyn(&[&openai, &gemini, &hf]));

        let req = quiz_request("Rust")
            .with_preference(ProviderPreference::Explicit(ProviderId::Gemini));
        let err = dispatcher.dispatch(&req).await.unwrap_err();

        match err {
            DevMasterError::Exhausted { kind, failures } => {
                assert_eq!(kind, GenerationKind::Quiz);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].provider, ProviderId::Gemini);
                assert_eq!(failures[0].status, Some(429));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(openai.calls(), 0);
        assert_eq!(gemini.calls(), 1);
        assert_eq!(hf.calls(), 0);
    }

    #[tokio::test]
    async fn test_explicit_unconfigured_provider_is_attempted_alone() {
        let log = CallLog::default();
        let openai = MockAdapter::unconfigured(ProviderId::OpenAi, &log);
        let gemini = MockAdapter::ok(ProviderId::Gemini, quiz_output("gemini"), &log);
        let dispatcher = Dispatcher::new(as_dyn(&[&openai, &gemini]));

        let req = quiz_request("Rust")
            .with_preference(ProviderPreference::Explicit(ProviderId::OpenAi));
        let err = dispatcher.dispatch(&req).await.unwrap_err();

        assert!(matches!(err, DevMasterError::Exhausted { .. }));
        assert_eq!(gemini.calls(), 0);
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_call() {
        let log = CallLog::default();
        let openai = MockAdapter::ok(ProviderId::OpenAi, quiz_output("openai"), &log);
        let gemini = MockAdapter::ok(ProviderId::Gemini, quiz_output("gemini"), &log);
        let hf = MockAdapter::ok(ProviderId::HuggingFace, quiz_output("hf"), &log);
        let dispatcher = Dispatcher::new(as_dyn(&[&openai, &gemini, &hf]));

        let err = dispatcher.dispatch(&quiz_request("")).await.unwrap_err();
        assert!(matches!(err, DevMasterError::ValidationError(_)));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_keys_in_auto_mode() {
        let log = CallLog::default();
        let openai = MockAdapter::unconfigured(ProviderId::OpenAi, &log);
        let gemini = MockAdapter::unconfigured(ProviderId::Gemini, &log);
        let hf = MockAdapter::unconfigured(ProviderId::HuggingFace, &log);
        let dispatcher = Dispatcher::new(as_dyn(&[&openai, &gemini, &hf]));

        let err = dispatcher.dispatch(&quiz_request("Rust")).await.unwrap_err();
        assert!(matches!(err, DevMasterError::MissingKeys(GenerationKind::Quiz)));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auto_skips_unconfigured_without_calling() {
        let log = CallLog::default();
        let openai = MockAdapter::unconfigured(ProviderId::OpenAi, &log);
        let gemini = MockAdapter::ok(ProviderId::Gemini, quiz_output("gemini"), &log);
        let dispatcher = Dispatcher::new(as_dyn(&[&openai, &gemini]));

        let outcome = dispatcher.dispatch(&quiz_request("Rust")).await.unwrap();
        assert_eq!(outcome.provider, ProviderId::Gemini);
        assert_eq!(openai.calls(), 0);
        assert_eq!(outcome.failures[0].detail, "api key not configured");
    }

    #[tokio::test]
    async fn test_exhausted_reports_every_provider_in_order() {
        let log = CallLog::default();
        let openai = MockAdapter::failing(ProviderId::OpenAi, 500, &log);
        let gemini = MockAdapter::failing(ProviderId::Gemini, 503, &log);
        let hf = MockAdapter::failing(ProviderId::HuggingFace, 502, &log);
        let dispatcher = Dispatcher::new(as_dyn(&[&openai, &gemini, &hf]));

        let err = dispatcher.dispatch(&quiz_request("Rust")).await.unwrap_err();
        match err {
            DevMasterError::Exhausted { failures, .. } => {
                let tried: Vec<_> = failures.iter().map(|f| (f.provider, f.status)).collect();
                assert_eq!(
                    tried,
                    vec![
                        (ProviderId::OpenAi, Some(500)),
                        (ProviderId::Gemini, Some(503)),
                        (ProviderId::HuggingFace, Some(502)),
                    ]
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // 每个提供商只尝试一次，不重试
        assert_eq!(openai.calls(), 1);
        assert_eq!(gemini.calls(), 1);
        assert_eq!(hf.calls(), 1);
    }

    #[tokio::test]
    async fn test_mismatched_output_kind_falls_through() {
        let log = CallLog::default();
        let openai = MockAdapter::ok(
            ProviderId::OpenAi,
            GenerationOutput::Chat(ChatOutput {
                reply: "not a quiz".to_string(),
            }),
            &log,
        );
        let gemini = MockAdapter::ok(ProviderId::Gemini, quiz_output("gemini"), &log);
        let dispatcher = Dispatcher::new(as_dyn(&[&openai, &gemini]));

        let outcome = dispatcher.dispatch(&quiz_request("Rust")).await.unwrap();
        assert_eq!(outcome.provider, ProviderId::Gemini);
    }

    #[tokio::test]
    async fn test_same_request_twice_is_idempotent() {
        let log = CallLog::default();
        let openai = MockAdapter::failing(ProviderId::OpenAi, 500, &log);
        let gemini = MockAdapter::ok(ProviderId::Gemini, quiz_output("gemini"), &log);
        let dispatcher = Dispatcher::new(as_dyn(&[&openai, &gemini]));
        let req = quiz_request("Rust");

        let first = dispatcher.dispatch(&req).await.unwrap();
        let second = dispatcher.dispatch(&req).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(openai.calls(), 2);
    }

    #[tokio::test]
    async fn test_failing_translation_keeps_original() {
        let log = CallLog::default();
        let openai = MockAdapter::ok(ProviderId::OpenAi, quiz_output("openai"), &log);
        let dispatcher =
            Dispatcher::new(as_dyn(&[&openai])).with_translator(Arc::new(FailingTranslator));

        let req = quiz_request("Rust").with_translation("es");
        let outcome = dispatcher.dispatch(&req).await.unwrap();
        assert_eq!(outcome.output, quiz_output("openai"));
    }

    #[tokio::test]
    async fn test_translation_applied_to_text_fields() {
        let log = CallLog::default();
        let openai = MockAdapter::ok(ProviderId::OpenAi, quiz_output("openai"), &log);
        let dispatcher =
            Dispatcher::new(as_dyn(&[&openai])).with_translator(Arc::new(UppercaseTranslator));

        let req = quiz_request("Rust").with_translation("es");
        let outcome = dispatcher.dispatch(&req).await.unwrap();
        match outcome.output {
            GenerationOutput::Quiz(out) => {
                assert_eq!(out.questions[0].q, "QUESTION FROM OPENAI");
                assert_eq!(out.questions[0].options, vec!["YES", "NO"]);
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[test]
    fn test_plan_excludes_deepai_from_auto() {
        let log = CallLog::default();
        let openai = MockAdapter::ok(ProviderId::OpenAi, quiz_output("openai"), &log);
        let deepai = MockAdapter::ok(ProviderId::DeepAi, quiz_output("deepai"), &log);
        let dispatcher = Dispatcher::new(as_dyn(&[&deepai, &openai]));

        let req = GenerationRequest::new(GenerationPayload::Image(ImageParams {
            prompt: "a red cube".to_string(),
            size: None,
        }));
        let plan: Vec<_> = dispatcher.plan(&req).unwrap().iter().map(|a| a.id()).collect();
        assert_eq!(plan, vec![ProviderId::OpenAi]);

        let req = req.with_preference(ProviderPreference::Explicit(ProviderId::DeepAi));
        let plan: Vec<_> = dispatcher.plan(&req).unwrap().iter().map(|a| a.id()).collect();
        assert_eq!(plan, vec![ProviderId::DeepAi]);
    }

    #[test]
    fn test_plan_rejects_unsupported_explicit_kind() {
        let log = CallLog::default();
        let deepai = MockAdapter::ok(ProviderId::DeepAi, quiz_output("deepai"), &log);
        let dispatcher = Dispatcher::new(as_dyn(&[&deepai]));

        let req = quiz_request("Rust")
            .with_preference(ProviderPreference::Explicit(ProviderId::DeepAi));
        assert!(matches!(
            dispatcher.plan(&req),
            Err(DevMasterError::ValidationError(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = Config::default();
        let dispatcher = Dispatcher::from_config(&config);
        assert_eq!(dispatcher.adapters().len(), 4);
        assert!(!dispatcher.can_translate());

        let mut config = Config::default();
        config.huggingface.api_key = Some("hf_test".to_string());
        assert!(Dispatcher::from_config(&config).can_translate());
    }
}
