//! Static model catalogue, one list per provider kind.
//!
//! Lists are known ahead of time so callers can present choices before any
//! credentials exist.

use super::ProviderKind;
use serde::{Deserialize, Serialize};

/// Model information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub display_name: String,
    pub provider: ProviderKind,
    /// Context window advertised by the provider
    pub max_tokens: u32,
    pub description: Option<String>,
    pub is_free: bool,
}

fn model(name: &str, display_name: &str, provider: ProviderKind, max_tokens: u32, is_free: bool) -> ModelInfo {
    ModelInfo {
        name: name.to_string(),
        display_name: display_name.to_string(),
        provider,
        max_tokens,
        description: None,
        is_free,
    }
}

fn described(mut info: ModelInfo, description: &str) -> ModelInfo {
    info.description = Some(description.to_string());
    info
}

/// Models offered by one provider kind
pub fn models_for(kind: ProviderKind) -> Vec<ModelInfo> {
    use ProviderKind::*;

    match kind {
        DashScope => vec![
            described(model("qwen-plus", "Qwen Plus", kind, 8192, false), "Alibaba Cloud Qwen Plus"),
            described(model("qwen-max", "Qwen Max", kind, 8192, false), "Alibaba Cloud Qwen Max"),
            described(model("qwen-turbo", "Qwen Turbo", kind, 8192, false), "Alibaba Cloud Qwen Turbo"),
        ],
        OpenAI => vec![
            model("gpt-3.5-turbo", "GPT-3.5 Turbo", kind, 4096, false),
            model("gpt-4", "GPT-4", kind, 8192, false),
            model("gpt-4-turbo", "GPT-4 Turbo", kind, 128_000, false),
        ],
        Gemini => vec![
            model("gemini-2.5-flash", "Gemini 2.5 Flash", kind, 1_000_000, false),
            model("gemini-1.5-pro", "Gemini 1.5 Pro", kind, 2_000_000, false),
            model("gemini-1.5-flash", "Gemini 1.5 Flash", kind, 1_000_000, false),
        ],
        SiliconFlow => vec![
            model("Qwen/Qwen2.5-7B-Instruct", "Qwen2.5-7B", kind, 32_768, true),
            model("Qwen/Qwen2.5-14B-Instruct", "Qwen2.5-14B", kind, 32_768, true),
            model("Qwen/Qwen2.5-32B-Instruct", "Qwen2.5-32B", kind, 32_768, false),
            model("deepseek-ai/DeepSeek-V2.5", "DeepSeek-V2.5", kind, 65_536, true),
        ],
        Groq => vec![
            model("llama-3.1-8b-instant", "Llama 3.1 8B (Groq)", kind, 131_072, true),
            model("llama-3.3-70b-versatile", "Llama 3.3 70B (Groq)", kind, 131_072, false),
            model("openai/gpt-oss-120b", "GPT OSS 120B (Groq)", kind, 131_072, false),
            model("openai/gpt-oss-20b", "GPT OSS 20B (Groq)", kind, 131_072, false),
            model("mixtral-8x7b-32768", "Mixtral 8x7B (Groq)", kind, 32_768, true),
        ],
        Together => vec![
            model("meta-llama/Meta-Llama-3.1-70B-Instruct-Turbo", "Llama 3.1 70B (Together)", kind, 131_072, false),
            model("meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo", "Llama 3.1 8B (Together)", kind, 131_072, false),
        ],
        OpenRouter => vec![
            model("mistralai/devstral-2512:free", "Mistral Devstral 2 2512 (Free)", kind, 262_144, true),
            model("xiaomi/mimo-v2-flash:free", "Xiaomi MiMo-V2-Flash (Free)", kind, 262_144, true),
            model("z-ai/glm-4.5-air:free", "Z.AI GLM 4.5 Air (Free)", kind, 131_000, true),
            model("tngtech/deepseek-r1t2-chimera:free", "TNG DeepSeek R1T2 Chimera (Free)", kind, 164_000, true),
            model("google/gemini-flash-1.5", "Gemini Flash 1.5", kind, 1_000_000, false),
            model("anthropic/claude-3.5-sonnet", "Claude 3.5 Sonnet", kind, 200_000, false),
        ],
        Cerebras => vec![
            model("llama-3.3-70b", "Llama 3.3 70B (Cerebras)", kind, 65_536, false),
            model("llama3.1-8b", "Llama 3.1 8B (Cerebras)", kind, 8192, true),
            model("gpt-oss-120b", "GPT OSS 120B (Cerebras)", kind, 65_536, false),
            model("qwen-3-32b", "Qwen 3 32B (Cerebras)", kind, 65_536, false),
        ],
    }
}

/// Catalogue for every provider kind, in declaration order
pub fn all_models() -> Vec<(ProviderKind, Vec<ModelInfo>)> {
    ProviderKind::ALL
        .into_iter()
        .map(|kind| (kind, models_for(kind)))
        .collect()
}

/// Model used when the settings leave the model name empty
pub fn default_model(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::DashScope => "qwen-plus",
        ProviderKind::OpenAI => "gpt-3.5-turbo",
        ProviderKind::Gemini => "gemini-2.5-flash",
        ProviderKind::SiliconFlow => "Qwen/Qwen2.5-7B-Instruct",
        ProviderKind::Groq => "llama-3.3-70b-versatile",
        ProviderKind::Together => "meta-llama/Meta-Llama-3.1-70B-Instruct-Turbo",
        ProviderKind::OpenRouter => "mistralai/devstral-2512:free",
        ProviderKind::Cerebras => "llama-3.3-70b",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_models() {
        let catalogue = all_models();
        assert_eq!(catalogue.len(), ProviderKind::ALL.len());

        for (kind, models) in catalogue {
            assert!(!models.is_empty(), "{} has no models", kind);
            assert!(models.iter().all(|m| m.provider == kind));
        }
    }

    #[test]
    fn test_default_model_is_listed() {
        for kind in ProviderKind::ALL {
            let default = default_model(kind);
            assert!(
                models_for(kind).iter().any(|m| m.name == default),
                "default {} missing from {} catalogue",
                default,
                kind
            );
        }
    }
}
