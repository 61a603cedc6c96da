//! Family inference rules and the curated artifact catalog

use async_trait::async_trait;

use crate::provider::LlmError;

use super::types::ModelFamily;

/// Ordered family inference rules: the first case-insensitive substring
/// match wins. More specific lineages come before generic ones, so a
/// DeepSeek distill of a Qwen base resolves as DeepSeek.
pub const FAMILY_RULES: &[(&str, ModelFamily)] = &[
    ("deepseek", ModelFamily::DeepSeek),
    ("qwen", ModelFamily::Qwen),
    ("mistral", ModelFamily::Mistral),
    ("llama", ModelFamily::Llama),
    ("phi", ModelFamily::Phi),
    ("gemma", ModelFamily::Gemma),
];

/// Infer the model family from an artifact filename
pub fn infer_family(filename: &str) -> ModelFamily {
    let lower = filename.to_lowercase();
    for (pattern, family) in FAMILY_RULES {
        if lower.contains(pattern) {
            return *family;
        }
    }
    ModelFamily::Unknown
}

/// A downloadable artifact known to the built-in catalog
#[derive(Debug, Clone)]
pub struct CuratedModel {
    pub filename: &'static str,
    pub family: ModelFamily,
    pub url: &'static str,
}

/// Curated list of recommended GGUF artifacts
pub const CURATED_MODELS: &[CuratedModel] = &[
    CuratedModel {
        filename: "Llama-3.2-3B-Instruct-Q4_K_M.gguf",
        family: ModelFamily::Llama,
        url: "https://huggingface.co/bartowski/Llama-3.2-3B-Instruct-GGUF/resolve/main/Llama-3.2-3B-Instruct-Q4_K_M.gguf",
    },
    CuratedModel {
        filename: "Llama-3.2-1B-Instruct-Q4_K_M.gguf",
        family: ModelFamily::Llama,
        url: "https://huggingface.co/bartowski/Llama-3.2-1B-Instruct-GGUF/resolve/main/Llama-3.2-1B-Instruct-Q4_K_M.gguf",
    },
    CuratedModel {
        filename: "Mistral-7B-Instruct-v0.3-Q4_K_M.gguf",
        family: ModelFamily::Mistral,
        url: "https://huggingface.co/bartowski/Mistral-7B-Instruct-v0.3-GGUF/resolve/main/Mistral-7B-Instruct-v0.3-Q4_K_M.gguf",
    },
    CuratedModel {
        filename: "qwen2.5-7b-instruct-q4_k_m.gguf",
        family: ModelFamily::Qwen,
        url: "https://huggingface.co/Qwen/Qwen2.5-7B-Instruct-GGUF/resolve/main/qwen2.5-7b-instruct-q4_k_m.gguf",
    },
    CuratedModel {
        filename: "DeepSeek-R1-Distill-Qwen-7B-Q4_K_M.gguf",
        family: ModelFamily::DeepSeek,
        url: "https://huggingface.co/bartowski/DeepSeek-R1-Distill-Qwen-7B-GGUF/resolve/main/DeepSeek-R1-Distill-Qwen-7B-Q4_K_M.gguf",
    },
    CuratedModel {
        filename: "Phi-3.5-mini-instruct-Q4_K_M.gguf",
        family: ModelFamily::Phi,
        url: "https://huggingface.co/bartowski/Phi-3.5-mini-instruct-GGUF/resolve/main/Phi-3.5-mini-instruct-Q4_K_M.gguf",
    },
    CuratedModel {
        filename: "gemma-2-2b-it-Q4_K_M.gguf",
        family: ModelFamily::Gemma,
        url: "https://huggingface.co/bartowski/gemma-2-2b-it-GGUF/resolve/main/gemma-2-2b-it-Q4_K_M.gguf",
    },
];

/// Download URL for a curated artifact
pub fn curated_url(filename: &str) -> Option<&'static str> {
    CURATED_MODELS
        .iter()
        .find(|m| m.filename == filename)
        .map(|m| m.url)
}

/// Remote catalog lookup: candidate artifact filenames for a family.
///
/// Implementations may fail (network down, registry unreachable);
/// callers treat failure as "offline" and fall back to locally known
/// artifacts.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn candidates(&self, family: ModelFamily) -> Result<Vec<String>, LlmError>;
}

/// Catalog backed by the built-in curated table. Never fails.
pub struct CuratedCatalog;

#[async_trait]
impl ModelCatalog for CuratedCatalog {
    async fn candidates(&self, family: ModelFamily) -> Result<Vec<String>, LlmError> {
        Ok(CURATED_MODELS
            .iter()
            .filter(|m| m.family == family)
            .map(|m| m.filename.to_string())
            .collect())
    }
}
