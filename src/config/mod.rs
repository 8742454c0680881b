use crate::error::DevMasterError;
use crate::types::ProviderId;
use crate::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 进程级配置，启动时读取一次后只读共享
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub openai: ProviderSettings,
    #[serde(default)]
    pub gemini: ProviderSettings,
    #[serde(default)]
    pub huggingface: ProviderSettings,
    #[serde(default)]
    pub deepai: ProviderSettings,
    /// `translate: true` 时使用的目标语言
    #[serde(default = "default_translate_target")]
    pub translate_target: String,
}

/// 单个提供商的密钥、地址与模型覆盖
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_base: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub image_model: Option<String>,
    #[serde(default)]
    pub translate_model: Option<String>,
}

fn default_translate_target() -> String {
    "es".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai: ProviderSettings::default(),
            gemini: ProviderSettings::default(),
            huggingface: ProviderSettings::default(),
            deepai: ProviderSettings::default(),
            translate_target: default_translate_target(),
        }
    }
}

impl ProviderSettings {
    pub fn with_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// 非空的 API 密钥
    pub fn key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    pub fn base_or<'a>(&'a self, default: &'a str) -> &'a str {
        let base = if self.api_base.is_empty() {
            default
        } else {
            &self.api_base
        };
        base.trim_end_matches('/')
    }

    pub fn model_or<'a>(&'a self, default: &'a str) -> &'a str {
        non_empty(&self.model).unwrap_or(default)
    }

    pub fn image_model_or<'a>(&'a self, default: &'a str) -> &'a str {
        non_empty(&self.image_model).unwrap_or(default)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// 从进程环境变量读取配置
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 用任意查找函数读取配置，空字符串视为未设置
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            openai: ProviderSettings {
                api_key: get("OPENAI_API_KEY"),
                model: get("OPENAI_MODEL"),
                image_model: get("OPENAI_IMAGE_MODEL"),
                ..ProviderSettings::default()
            },
            gemini: ProviderSettings {
                api_key: get("GEMINI_API_KEY"),
                model: get("GEMINI_MODEL"),
                image_model: get("GEMINI_IMAGE_MODEL"),
                ..ProviderSettings::default()
            },
            huggingface: ProviderSettings {
                api_key: get("HUGGINGFACE_API_KEY"),
                model: get("HUGGINGFACE_MODEL"),
                image_model: get("HUGGINGFACE_IMAGE_MODEL"),
                translate_model: get("HUGGINGFACE_TRANSLATE_MODEL"),
                ..ProviderSettings::default()
            },
            deepai: ProviderSettings {
                api_key: get("DEEPAI_API_KEY"),
                ..ProviderSettings::default()
            },
            translate_target: get("DEVMASTER_TRANSLATE_TARGET")
                .unwrap_or_else(default_translate_target),
        }
    }

    /// 从 YAML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let content = Self::replace_env_vars(&content)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// 替换配置中的环境变量 ${VAR}
    fn replace_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name).map_err(|_| {
                DevMasterError::config(format!("环境变量未找到: {}", var_name))
            })?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.translate_target.trim().is_empty() {
            return Err(DevMasterError::config("translate_target 不能为空"));
        }

        for id in ProviderId::ALL {
            let base = &self.settings(id).api_base;
            if !base.is_empty() && !base.starts_with("http://") && !base.starts_with("https://") {
                return Err(DevMasterError::config(format!(
                    "{} 的 api_base 必须以 http:// 或 https:// 开头: {}",
                    id, base
                )));
            }
        }

        Ok(())
    }

    pub fn settings(&self, id: ProviderId) -> &ProviderSettings {
        match id {
            ProviderId::OpenAi => &self.openai,
            ProviderId::Gemini => &self.gemini,
            ProviderId::HuggingFace => &self.huggingface,
            ProviderId::DeepAi => &self.deepai,
        }
    }

    /// 已配置密钥的提供商
    pub fn configured_providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|id| self.settings(*id).key().is_some())
            .collect()
    }
}
