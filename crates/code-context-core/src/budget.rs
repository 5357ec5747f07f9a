//! Token budgeting and context assembly.
//!
//! [`TokenBudgeter`] counts and truncates text with a [`TokenEncoding`]
//! and assembles ranked [`SearchHit`]s into a single prompt-ready context
//! block that stays inside a token budget.
//!
//! # Output format
//!
//! ````text
//! # Relevant Code Context
//! Query: <query>
//!
//!
//! ## File: src/app.py
//! Function: handler
//! Lines: 10-24
//! ```python
//! ...
//! ```
//!
//! ---
//! Included 1 files with 1 code chunks.
//! Total tokens: ~57
//! ````
//!
//! Hits are taken greedily in the order given. The first hit that does not
//! fit ends assembly; later, smaller hits are not considered. The budget
//! check also covers the trailing summary so the rendered output stays
//! within the reservation.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::encoding::TokenEncoding;
use crate::models::SearchHit;

/// Tokens held back for prompt structure around the assembled context.
pub const FORMATTING_OVERHEAD: usize = 200;

/// Default budget for an assembled context.
pub const DEFAULT_MAX_TOKENS: usize = 4000;

/// Fallback ratio used when the encoding fails.
const CHARS_PER_TOKEN: usize = 4;

/// Fenced-code language tag for a file extension (case-insensitive).
/// Unknown extensions map to an empty tag.
pub fn language_tag(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        ".py" => "python",
        ".js" => "javascript",
        ".ts" => "typescript",
        ".jsx" => "jsx",
        ".tsx" => "tsx",
        ".java" => "java",
        ".cs" => "csharp",
        ".cpp" => "cpp",
        ".c" => "c",
        ".h" => "cpp",
        ".go" => "go",
        ".rs" => "rust",
        ".rb" => "ruby",
        ".php" => "php",
        ".swift" => "swift",
        ".kt" => "kotlin",
        ".vue" => "vue",
        ".html" => "html",
        ".css" => "css",
        ".scss" => "scss",
        ".json" => "json",
        ".yaml" | ".yml" => "yaml",
        ".md" => "markdown",
        _ => "",
    }
}

/// Counts, truncates, and assembles text against a token budget.
#[derive(Clone)]
pub struct TokenBudgeter {
    encoding: Arc<dyn TokenEncoding>,
    max_tokens: usize,
}

impl std::fmt::Debug for TokenBudgeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBudgeter")
            .field("encoding", &self.encoding.name())
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl TokenBudgeter {
    pub fn new(encoding: Arc<dyn TokenEncoding>, max_tokens: usize) -> Self {
        Self {
            encoding,
            max_tokens,
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Token count of `text`. Falls back to `chars / 4` if encoding fails.
    pub fn count(&self, text: &str) -> usize {
        match self.encoding.encode(text) {
            Ok(ids) => ids.len(),
            Err(e) => {
                tracing::warn!(encoding = self.encoding.name(), error = %e, "token count fell back to estimate");
                text.chars().count() / CHARS_PER_TOKEN
            }
        }
    }

    /// Cut `text` to at most `max_tokens` tokens.
    pub fn truncate(&self, text: &str, max_tokens: usize) -> String {
        let attempt = self.encoding.encode(text).and_then(|ids| {
            if ids.len() <= max_tokens {
                Ok(text.to_string())
            } else {
                self.encoding.decode(&ids[..max_tokens])
            }
        });
        match attempt {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(encoding = self.encoding.name(), error = %e, "truncation fell back to characters");
                text.chars().take(max_tokens * CHARS_PER_TOKEN).collect()
            }
        }
    }

    /// Assemble hits into a context block within the configured budget.
    pub fn assemble(&self, query: &str, hits: &[SearchHit]) -> String {
        self.assemble_with_budget(query, hits, self.max_tokens)
    }

    /// Assemble hits into a context block within `budget` tokens, of which
    /// `count(query) + FORMATTING_OVERHEAD` is reserved.
    pub fn assemble_with_budget(&self, query: &str, hits: &[SearchHit], budget: usize) -> String {
        let available = budget.saturating_sub(self.count(query) + FORMATTING_OVERHEAD);

        let mut out = String::from("# Relevant Code Context\n");
        out.push_str(&format!("Query: {query}\n\n"));
        let mut used = self.count(&out);

        let mut files: BTreeSet<&str> = BTreeSet::new();
        let mut included = 0usize;

        for hit in hits {
            let block = render_hit(hit);
            let cost = self.count(&block);

            let file_count = files.len() + usize::from(!files.contains(hit.metadata.file_path.as_str()));
            let trailer = self.count(&summary(file_count, included + 1, used + cost));
            if used + cost + trailer > available {
                break;
            }

            out.push_str(&block);
            used += cost;
            included += 1;
            files.insert(hit.metadata.file_path.as_str());
        }

        out.push_str(&summary(files.len(), included, used));
        out
    }
}

fn render_hit(hit: &SearchHit) -> String {
    let meta = &hit.metadata;
    let mut block = format!("\n## File: {}\n", meta.file_path);
    if let Some(name) = &meta.function_name {
        block.push_str(&format!("Function: {name}\n"));
    }
    if let Some(name) = &meta.class_name {
        block.push_str(&format!("Class: {name}\n"));
    }
    if meta.start_line > 0 && meta.end_line > 0 {
        block.push_str(&format!("Lines: {}-{}\n", meta.start_line, meta.end_line));
    }
    block.push_str(&format!(
        "```{}\n{}\n```\n",
        language_tag(&meta.file_extension),
        hit.text
    ));
    block
}

fn summary(files: usize, chunks: usize, tokens: usize) -> String {
    format!("\n---\nIncluded {files} files with {chunks} code chunks.\nTotal tokens: ~{tokens}\n")
}
