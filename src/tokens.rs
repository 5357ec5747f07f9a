//! Token encodings for budget accounting.
//!
//! Resolution for `context.model`, first match wins:
//!
//! 1. a `tokenizer.json` mapped to the model under `[context.tokenizers]`,
//!    loaded with `tokenizers`;
//! 2. the tiktoken BPE for the model id (`gpt-4`, `gpt-3.5-turbo`, ...);
//! 3. `cl100k_base` for ids tiktoken does not know.
//!
//! [`ApproxEncoding`] is used only if none of these can be built.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tiktoken_rs::CoreBPE;
use tokenizers::Tokenizer;

use code_context_core::encoding::{ApproxEncoding, TokenEncoding};

use crate::config::ContextConfig;

/// Encoding used when the model id is unknown to tiktoken.
const FALLBACK_BPE: &str = "cl100k_base";

pub struct HfEncoding {
    name: String,
    tokenizer: Tokenizer,
}

impl HfEncoding {
    pub fn from_file(name: &str, path: &Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow!("failed to load tokenizer {}: {e}", path.display()))?;
        Ok(Self {
            name: name.to_string(),
            tokenizer,
        })
    }
}

impl TokenEncoding for HfEncoding {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| anyhow!("tokenizer encode failed: {e}"))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| anyhow!("tokenizer decode failed: {e}"))
    }
}

/// OpenAI BPE from `tiktoken-rs`. The vocabularies ship inside the crate,
/// so no download happens at runtime.
pub struct TiktokenEncoding {
    name: String,
    bpe: CoreBPE,
}

impl TiktokenEncoding {
    /// The BPE tiktoken assigns to `model`.
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = tiktoken_rs::get_bpe_from_model(model)
            .map_err(|e| anyhow!("no tiktoken encoding for {model}: {e}"))?;
        Ok(Self {
            name: format!("tiktoken:{model}"),
            bpe,
        })
    }

    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| anyhow!("cl100k_base unavailable: {e}"))?;
        Ok(Self {
            name: FALLBACK_BPE.to_string(),
            bpe,
        })
    }
}

impl TokenEncoding for TiktokenEncoding {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(self
            .bpe
            .encode_ordinary(text)
            .into_iter()
            .map(|t| t as u32)
            .collect())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.bpe
            .decode(ids.iter().map(|&id| id as _).collect())
            .map_err(|e| anyhow!("tiktoken decode failed: {e}"))
    }
}

fn tiktoken_for(model: &str) -> Result<TiktokenEncoding> {
    match TiktokenEncoding::for_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(e) => {
            tracing::warn!(model = %model, error = %e, "unknown model, using cl100k_base");
            TiktokenEncoding::cl100k()
        }
    }
}

/// Resolve the encoding for `context.model`.
pub fn load_encoding(config: &ContextConfig) -> Arc<dyn TokenEncoding> {
    if let Some(path) = config.tokenizers.get(&config.model) {
        match HfEncoding::from_file(&config.model, path) {
            Ok(encoding) => {
                tracing::info!(model = %config.model, path = %path.display(), "loaded tokenizer");
                return Arc::new(encoding);
            }
            Err(e) => {
                tracing::warn!(model = %config.model, error = %e, "tokenizer file unusable, trying tiktoken");
            }
        }
    }

    match tiktoken_for(&config.model) {
        Ok(encoding) => {
            tracing::info!(model = %config.model, encoding = encoding.name(), "token encoding ready");
            Arc::new(encoding)
        }
        Err(e) => {
            tracing::error!(error = %e, "no BPE available, falling back to approximate encoding");
            Arc::new(ApproxEncoding)
        }
    }
}
