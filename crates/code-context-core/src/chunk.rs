//! Structure-aware source chunker.
//!
//! Splits file content into [`Chunk`]s of roughly `chunk_size` bytes with
//! `chunk_overlap` bytes of line overlap between consecutive chunks. Where
//! the language is recognised, chunk boundaries follow scope headers
//! (classes, functions, function-valued bindings) so a chunk tends to hold
//! one named unit of code.
//!
//! # Strategies
//!
//! | Extensions | Strategy |
//! |------------|----------|
//! | `.py` | indentation-scoped |
//! | `.js .ts .jsx .tsx` | declaration-scoped, JavaScript family |
//! | `.java .cs .cpp .c .h` | declaration-scoped, C family |
//! | anything else | generic line accumulation |
//!
//! # Algorithm
//!
//! 1. Split content into lines on `\n`. A single trailing newline does not
//!    produce an extra empty line.
//! 2. Accumulate lines. When the joined length exceeds `chunk_size`, emit a
//!    chunk and seed the next one with the shortest suffix of its lines
//!    whose summed length reaches `chunk_overlap`. The suffix never covers
//!    the whole emitted chunk, so every split makes progress.
//! 3. For structured languages, a scope header closes the running chunk
//!    and opens a new one carrying the scope's name. A later significant
//!    line at or below the header's indentation closes the scope; in brace
//!    languages a closing `}` at that level stays with the scope it ends.
//! 4. Decorator and annotation lines (`@...`) directly above a header
//!    travel with the header.
//! 5. A force split inside a scope clears the name on the continuation
//!    chunk.
//!
//! Lengths are measured in UTF-8 bytes. Output is a pure function of the
//! input, so re-chunking unchanged content reproduces identical chunks.
//!
//! # Example
//!
//! ```rust
//! use code_context_core::chunk::Chunker;
//!
//! let chunks = Chunker::default().parse("def add(a, b):\n    return a + b\n", ".py");
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].function_name.as_deref(), Some("add"));
//! ```

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Chunk, ChunkKind};

/// Default chunk size target in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive chunks in bytes.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Name attached when a header is recognised but its identifier is not.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Chunking strategy selected from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Python,
    JavaScript,
    CFamily,
    Generic,
}

impl Strategy {
    /// Pick the strategy for an extension such as `.py` or `py`.
    /// Matching is case-insensitive.
    pub fn for_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "py" => Strategy::Python,
            "js" | "ts" | "jsx" | "tsx" => Strategy::JavaScript,
            "java" | "cs" | "cpp" | "c" | "h" => Strategy::CFamily,
            _ => Strategy::Generic,
        }
    }

    fn comment_prefixes(self) -> &'static [&'static str] {
        match self {
            Strategy::Python => &["#"],
            Strategy::JavaScript | Strategy::CFamily => &["//", "/*", "*"],
            Strategy::Generic => &[],
        }
    }

    fn uses_braces(self) -> bool {
        matches!(self, Strategy::JavaScript | Strategy::CFamily)
    }

    /// Python keeps methods inside their class chunk.
    fn nests_methods(self) -> bool {
        matches!(self, Strategy::Python)
    }

    fn header(self, stripped: &str) -> Option<Header> {
        match self {
            Strategy::Python => python_header(stripped),
            Strategy::JavaScript => javascript_header(stripped),
            Strategy::CFamily => c_family_header(stripped),
            Strategy::Generic => None,
        }
    }
}

/// Splits source text into position-annotated chunks.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Chunk `content` using the strategy for `file_extension`.
    ///
    /// Empty content yields no chunks.
    pub fn parse(&self, content: &str, file_extension: &str) -> Vec<Chunk> {
        if content.is_empty() {
            return Vec::new();
        }

        let mut lines: Vec<&str> = content.split('\n').collect();
        if lines.len() > 1 && lines.last() == Some(&"") {
            lines.pop();
        }

        let strategy = Strategy::for_extension(file_extension);
        if strategy == Strategy::Generic {
            return self.parse_generic(&lines);
        }

        let chunks = self.parse_structured(&lines, strategy);
        if chunks.is_empty() {
            return self.parse_generic(&lines);
        }
        chunks
    }

    fn parse_generic(&self, lines: &[&str]) -> Vec<Chunk> {
        let mut out = Vec::new();
        let mut acc = Accumulator::default();
        for (idx, line) in lines.iter().enumerate() {
            acc.push(idx + 1, line);
            if acc.len > self.chunk_size {
                acc.split(&mut out, self.chunk_overlap);
            }
        }
        acc.finish(&mut out);
        out
    }

    fn parse_structured(&self, lines: &[&str], strategy: Strategy) -> Vec<Chunk> {
        let mut out = Vec::new();
        let mut acc = Accumulator::default();
        let mut scope: Option<Scope> = None;

        for (idx, line) in lines.iter().enumerate() {
            let line_num = idx + 1;
            let stripped = line.trim_start();
            let indent = line.len() - stripped.len();

            if let Some(header) = strategy.header(stripped) {
                let inside = scope.is_some_and(|s| indent > s.indent);
                let is_method = strategy.nests_methods()
                    && header.kind == ScopeKind::Function
                    && inside
                    && scope.is_some_and(|s| s.kind == ScopeKind::Class);

                if header.binding && inside {
                    acc.push(line_num, line);
                } else if is_method {
                    acc.function_name = Some(header.name);
                    acc.push(line_num, line);
                } else {
                    acc.flush_before_header(&mut out);
                    match header.kind {
                        ScopeKind::Class => acc.class_name = Some(header.name),
                        ScopeKind::Function => acc.function_name = Some(header.name),
                    }
                    acc.push(line_num, line);
                    scope = Some(Scope {
                        kind: header.kind,
                        indent,
                    });
                }
            } else {
                let significant = !stripped.is_empty()
                    && !strategy
                        .comment_prefixes()
                        .iter()
                        .any(|p| stripped.starts_with(p));
                let closes = scope.is_some_and(|s| {
                    significant && indent <= s.indent && line_num > acc.start_line + 1
                });

                if closes {
                    scope = None;
                    if strategy.uses_braces() && stripped.starts_with('}') {
                        acc.push(line_num, line);
                        acc.flush(&mut out);
                    } else {
                        acc.flush(&mut out);
                        acc.push(line_num, line);
                    }
                } else {
                    acc.push(line_num, line);
                }
            }

            if acc.len > self.chunk_size {
                acc.split(&mut out, self.chunk_overlap);
            }
        }

        acc.finish(&mut out);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Class,
    Function,
}

#[derive(Debug, Clone, Copy)]
struct Scope {
    kind: ScopeKind,
    indent: usize,
}

#[derive(Debug)]
struct Header {
    kind: ScopeKind,
    name: String,
    /// `const`/`let`/`var` declaration rather than a keyword scope.
    binding: bool,
}

impl Header {
    fn class(name: String) -> Self {
        Self {
            kind: ScopeKind::Class,
            name,
            binding: false,
        }
    }

    fn function(name: String) -> Self {
        Self {
            kind: ScopeKind::Function,
            name,
            binding: false,
        }
    }
}

/// Running set of lines for the chunk under construction.
///
/// The first `emitted` lines are overlap carried over from the previous
/// chunk and have already been emitted once.
#[derive(Debug, Default)]
struct Accumulator<'a> {
    lines: Vec<&'a str>,
    start_line: usize,
    len: usize,
    emitted: usize,
    function_name: Option<String>,
    class_name: Option<String>,
}

impl<'a> Accumulator<'a> {
    fn push(&mut self, line_num: usize, line: &'a str) {
        if self.lines.is_empty() {
            self.start_line = line_num;
            self.len = line.len();
        } else {
            self.len += 1 + line.len();
        }
        self.lines.push(line);
    }

    fn has_fresh_lines(&self) -> bool {
        self.lines.len() > self.emitted
    }

    fn emit(&self, out: &mut Vec<Chunk>, upto: usize) {
        out.push(Chunk {
            content: self.lines[..upto].join("\n"),
            kind: ChunkKind::Code,
            start_line: self.start_line,
            end_line: self.start_line + upto - 1,
            function_name: self.function_name.clone(),
            class_name: self.class_name.clone(),
        });
    }

    /// Drop the first `n` lines and reset per-chunk state.
    fn advance(&mut self, n: usize) {
        self.lines.drain(..n);
        self.start_line += n;
        self.len = joined_len(&self.lines);
        self.emitted = 0;
        self.function_name = None;
        self.class_name = None;
    }

    fn flush(&mut self, out: &mut Vec<Chunk>) {
        if self.has_fresh_lines() {
            self.emit(out, self.lines.len());
        }
        self.advance(self.lines.len());
    }

    /// Close the running chunk ahead of a new header, keeping any
    /// decorator lines that belong to the header.
    fn flush_before_header(&mut self, out: &mut Vec<Chunk>) {
        let tail = prelude_len(&self.lines[self.emitted..]);
        let head_end = self.lines.len() - tail;
        let fresh_start = self.emitted.min(head_end);
        let fresh_head = &self.lines[fresh_start..head_end];

        if fresh_head.iter().any(|l| !l.trim().is_empty()) {
            self.emit(out, head_end);
            self.advance(head_end);
        } else {
            self.advance(fresh_start);
        }
    }

    /// Emit the running chunk and keep an overlap tail.
    fn split(&mut self, out: &mut Vec<Chunk>, overlap: usize) {
        self.emit(out, self.lines.len());
        let keep = overlap_tail(&self.lines, overlap);
        self.advance(self.lines.len() - keep);
        self.emitted = keep;
    }

    /// End of input. Trailing blank lines join the previous chunk when
    /// they directly follow it.
    fn finish(&mut self, out: &mut Vec<Chunk>) {
        if !self.has_fresh_lines() {
            return;
        }
        let fresh = &self.lines[self.emitted..];
        let fresh_start = self.start_line + self.emitted;
        if fresh.iter().all(|l| l.trim().is_empty()) {
            if let Some(last) = out.last_mut() {
                if last.end_line + 1 == fresh_start {
                    for line in fresh {
                        last.content.push('\n');
                        last.content.push_str(line);
                    }
                    last.end_line += fresh.len();
                    return;
                }
            }
        }
        self.flush(out);
    }
}

fn joined_len(lines: &[&str]) -> usize {
    if lines.is_empty() {
        return 0;
    }
    lines.iter().map(|l| l.len()).sum::<usize>() + lines.len() - 1
}

/// Number of trailing lines to carry into the next chunk.
fn overlap_tail(lines: &[&str], overlap: usize) -> usize {
    if overlap == 0 {
        return 0;
    }
    let mut total = 0;
    let mut keep = 0;
    for line in lines.iter().skip(1).rev() {
        keep += 1;
        total += line.len();
        if total >= overlap {
            break;
        }
    }
    keep
}

/// Trailing decorator block: from the first `@` line of the trailing run
/// of blank or `@` lines to the end.
fn prelude_len(lines: &[&str]) -> usize {
    let run = lines
        .iter()
        .rev()
        .take_while(|l| {
            let t = l.trim();
            t.is_empty() || t.starts_with('@')
        })
        .count();
    let run_start = lines.len() - run;
    lines[run_start..]
        .iter()
        .position(|l| l.trim_start().starts_with('@'))
        .map_or(0, |first| run - first)
}

fn capture_name(re: &Regex, line: &str) -> String {
    re.captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_NAME.to_string())
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static chunker pattern"))
}

fn python_header(stripped: &str) -> Option<Header> {
    static CLASS: OnceLock<Regex> = OnceLock::new();
    static DEF: OnceLock<Regex> = OnceLock::new();

    if stripped.starts_with("class ") {
        let re = regex(&CLASS, r"^class\s+([A-Za-z_]\w*)");
        return Some(Header::class(capture_name(re, stripped)));
    }
    if stripped.starts_with("def ") || stripped.starts_with("async def ") {
        let re = regex(&DEF, r"^(?:async\s+)?def\s+([A-Za-z_]\w*)");
        return Some(Header::function(capture_name(re, stripped)));
    }
    None
}

fn javascript_header(stripped: &str) -> Option<Header> {
    static FUNCTION: OnceLock<Regex> = OnceLock::new();
    static CLASS: OnceLock<Regex> = OnceLock::new();
    static BINDING: OnceLock<Regex> = OnceLock::new();

    let function = regex(
        &FUNCTION,
        r"^(?:export\s+)?(?:default\s+)?(?:async\s+)?function\b\*?\s*([A-Za-z_$][\w$]*)?",
    );
    if function.is_match(stripped) {
        return Some(Header::function(capture_name(function, stripped)));
    }

    let class = regex(
        &CLASS,
        r"^(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\b\s*([A-Za-z_$][\w$]*)?",
    );
    if class.is_match(stripped) {
        return Some(Header::class(capture_name(class, stripped)));
    }

    let binding = regex(
        &BINDING,
        r"^(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)[^=]*=(.*)$",
    );
    let caps = binding.captures(stripped)?;
    let value = caps.get(2).map_or("", |m| m.as_str()).trim();
    if opens_scope(value) {
        let mut header = Header::function(capture_name(binding, stripped));
        header.binding = true;
        return Some(header);
    }
    None
}

/// A binding's value introduces a scope when it is a function, arrow,
/// or class expression, or a literal that continues on the next line.
fn opens_scope(value: &str) -> bool {
    value.starts_with("function")
        || value.starts_with("async")
        || value.starts_with("class")
        || value.contains("=>")
        || value.ends_with('{')
        || value.ends_with('[')
        || value.ends_with('(')
}

const C_NON_DECLARATIONS: &[&str] = &[
    "return", "new", "else", "if", "while", "for", "foreach", "switch", "catch", "throw", "case",
    "do", "using", "typedef", "delete", "goto", "sizeof", "await", "yield", "lock",
];

fn c_family_header(stripped: &str) -> Option<Header> {
    static TYPE: OnceLock<Regex> = OnceLock::new();
    static FUNCTION: OnceLock<Regex> = OnceLock::new();

    let type_decl = regex(
        &TYPE,
        r"^(?:(?:public|private|protected|internal|static|abstract|final|sealed|partial|export|readonly)\s+)*(?:class|interface|struct|enum|record|namespace)\s+([A-Za-z_]\w*)",
    );
    if type_decl.is_match(stripped) {
        return Some(Header::class(capture_name(type_decl, stripped)));
    }

    if stripped.trim_end().ends_with(';') {
        return None;
    }
    let first_word = stripped
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .unwrap_or("");
    if C_NON_DECLARATIONS.contains(&first_word) {
        return None;
    }

    let function = regex(
        &FUNCTION,
        r"^(?:[A-Za-z_][\w:<>,\[\]*&]*\s+)+[*&]*([A-Za-z_~][\w:~]*)\s*\(",
    );
    let name = function.captures(stripped)?.get(1)?.as_str();
    if C_NON_DECLARATIONS.contains(&name) {
        return None;
    }
    Some(Header::function(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rebuild the source from chunks, dropping overlapped lines.
    fn reconstruct(chunks: &[Chunk]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for c in chunks {
            assert!(c.start_line >= 1 && c.start_line <= c.end_line);
            assert!(c.start_line <= out.len() + 1, "gap before line {}", c.start_line);
            let skip = (out.len() + 1) - c.start_line;
            let lines: Vec<&str> = c.content.split('\n').collect();
            assert_eq!(lines.len(), c.end_line - c.start_line + 1);
            out.extend(lines.into_iter().skip(skip).map(String::from));
        }
        out
    }

    fn source_lines(src: &str) -> Vec<String> {
        src.lines().map(String::from).collect()
    }

    fn numbered_lines(n: usize) -> String {
        (1..=n)
            .map(|i| format!("line-{i:05}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    const PYTHON_SRC: &str = "import os

class Greeter:
    def __init__(self, name):
        self.name = name

    def greet(self):
        return \"hi \" + self.name

def helper(x):
    return x * 2

print(helper(3))
";

    #[test]
    fn test_empty_content_no_chunks() {
        assert!(Chunker::default().parse("", ".py").is_empty());
        assert!(Chunker::default().parse("", ".txt").is_empty());
    }

    #[test]
    fn test_strategy_table() {
        assert_eq!(Strategy::for_extension(".py"), Strategy::Python);
        assert_eq!(Strategy::for_extension(".TSX"), Strategy::JavaScript);
        assert_eq!(Strategy::for_extension("java"), Strategy::CFamily);
        assert_eq!(Strategy::for_extension(".h"), Strategy::CFamily);
        assert_eq!(Strategy::for_extension(".go"), Strategy::Generic);
        assert_eq!(Strategy::for_extension(""), Strategy::Generic);
    }

    #[test]
    fn test_generic_small_single_chunk() {
        let chunks = Chunker::default().parse("a\nb\nc\n", ".md");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "a\nb\nc");
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 3));
        assert_eq!(chunks[0].kind, ChunkKind::Code);
        assert!(chunks[0].function_name.is_none());
    }

    #[test]
    fn test_generic_split_with_overlap() {
        let src = numbered_lines(30);
        let chunks = Chunker::new(50, 20).parse(&src, ".txt");
        assert!(chunks.len() > 1);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 5));
        // Two 10-byte lines reach the 20-byte overlap target.
        assert_eq!(chunks[1].start_line, 4);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_line <= pair[0].end_line);
            assert!(pair[1].start_line > pair[0].start_line);
        }
        assert_eq!(reconstruct(&chunks), source_lines(&src));
    }

    #[test]
    fn test_generic_no_overlap() {
        let src = numbered_lines(12);
        let chunks = Chunker::new(30, 0).parse(&src, ".txt");
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].start_line, pair[0].end_line + 1);
        }
        assert_eq!(reconstruct(&chunks), source_lines(&src));
    }

    #[test]
    fn test_single_huge_line_terminates() {
        let src = format!("{}\n{}\nshort", "x".repeat(5000), "y".repeat(5000));
        let chunks = Chunker::new(100, 50).parse(&src, ".txt");
        assert_eq!(reconstruct(&chunks), source_lines(&src));
        assert!(chunks.len() <= 3);
    }

    #[test]
    fn test_python_scopes_and_names() {
        let chunks = Chunker::default().parse(PYTHON_SRC, ".py");
        let spans: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start_line, c.end_line)).collect();
        assert_eq!(spans, vec![(1, 2), (3, 9), (10, 12), (13, 13)]);

        assert_eq!(chunks[1].class_name.as_deref(), Some("Greeter"));
        assert_eq!(chunks[1].function_name.as_deref(), Some("greet"));
        assert!(chunks[1].content.contains("def __init__"));

        assert_eq!(chunks[2].function_name.as_deref(), Some("helper"));
        assert!(chunks[2].class_name.is_none());

        assert!(chunks[3].function_name.is_none());
        assert_eq!(chunks[3].content, "print(helper(3))");
        assert_eq!(reconstruct(&chunks), source_lines(PYTHON_SRC));
    }

    #[test]
    fn test_python_decorator_stays_with_header() {
        let src = "x = 1\n\n@cached\ndef load():\n    return x\n";
        let chunks = Chunker::default().parse(src, ".py");
        let last = chunks.last().unwrap();
        assert_eq!(last.function_name.as_deref(), Some("load"));
        assert!(last.content.starts_with("@cached"));
        assert_eq!(reconstruct(&chunks), source_lines(src));
    }

    #[test]
    fn test_python_async_def() {
        let chunks = Chunker::default().parse("async def fetch(url):\n    pass\n", ".py");
        assert_eq!(chunks[0].function_name.as_deref(), Some("fetch"));
    }

    #[test]
    fn test_force_split_clears_names() {
        let mut src = String::from("def big():\n");
        for i in 0..80 {
            src.push_str(&format!("    value_{i} = compute({i})\n"));
        }
        let chunks = Chunker::new(300, 60).parse(&src, ".py");
        assert!(chunks.len() > 2);
        assert_eq!(chunks[0].function_name.as_deref(), Some("big"));
        for c in &chunks[1..] {
            assert!(c.function_name.is_none());
            assert!(c.class_name.is_none());
        }
        assert_eq!(reconstruct(&chunks), source_lines(&src));
    }

    #[test]
    fn test_javascript_declarations() {
        let src = r#"import x from "y";

export function add(a, b) {
  return a + b;
}

const mul = (a, b) => {
  return a * b;
};

class Box {
  constructor() {
    this.v = 1;
  }
}
"#;
        let chunks = Chunker::default().parse(src, ".js");
        let spans: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start_line, c.end_line)).collect();
        assert_eq!(spans, vec![(1, 2), (3, 5), (6, 9), (10, 15)]);
        assert_eq!(chunks[1].function_name.as_deref(), Some("add"));
        assert_eq!(chunks[2].function_name.as_deref(), Some("mul"));
        assert_eq!(chunks[3].class_name.as_deref(), Some("Box"));
        assert_eq!(reconstruct(&chunks), source_lines(src));
    }

    #[test]
    fn test_javascript_plain_binding_is_not_a_scope() {
        let src = "const a = require('a');\nconst b = require('b');\n";
        let chunks = Chunker::default().parse(src, ".ts");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].function_name.is_none());
    }

    #[test]
    fn test_nested_binding_does_not_split() {
        let src = "function outer() {\n  const inner = () => {\n    return 1;\n  };\n  return inner();\n}\n";
        let chunks = Chunker::default().parse(src, ".js");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].function_name.as_deref(), Some("outer"));
    }

    #[test]
    fn test_anonymous_header_is_unknown() {
        let chunks = Chunker::default().parse("export default function () {\n  return 1;\n}\n", ".js");
        assert_eq!(chunks[0].function_name.as_deref(), Some(UNKNOWN_NAME));
    }

    #[test]
    fn test_java_methods_and_annotations() {
        let src = r#"public class Calc {
    private int total;

    @Override
    public String toString() {
        return "calc";
    }

    public int add(int a, int b) {
        return a + b;
    }
}
"#;
        let chunks = Chunker::default().parse(src, ".java");
        let spans: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start_line, c.end_line)).collect();
        assert_eq!(spans, vec![(1, 3), (4, 7), (8, 11), (12, 12)]);
        assert_eq!(chunks[0].class_name.as_deref(), Some("Calc"));
        assert_eq!(chunks[1].function_name.as_deref(), Some("toString"));
        assert!(chunks[1].content.starts_with("    @Override"));
        assert_eq!(chunks[2].function_name.as_deref(), Some("add"));
        assert_eq!(reconstruct(&chunks), source_lines(src));
    }

    #[test]
    fn test_c_family_ignores_calls_and_control_flow() {
        assert!(c_family_header("return compute(x);").is_none());
        assert!(c_family_header("if (x) {").is_none());
        assert!(c_family_header("else if (y) {").is_none());
        assert!(c_family_header("printf(\"hi\");").is_none());
        let h = c_family_header("static int* make_buffer(size_t n) {").unwrap();
        assert_eq!(h.name, "make_buffer");
        let h = c_family_header("public sealed partial class Widget : Base").unwrap();
        assert_eq!(h.kind, ScopeKind::Class);
        assert_eq!(h.name, "Widget");
    }

    #[test]
    fn test_trailing_blank_lines_join_previous_chunk() {
        let src = "function a() {\n  return 1;\n}\n\n\n";
        let chunks = Chunker::default().parse(src, ".js");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].end_line, 5);
    }

    #[test]
    fn test_deterministic() {
        let chunker = Chunker::new(120, 30);
        let a = chunker.parse(PYTHON_SRC, ".py");
        let b = chunker.parse(PYTHON_SRC, ".py");
        assert_eq!(a, b);
    }

    #[test]
    fn test_structured_respects_size_bound() {
        let src = PYTHON_SRC.repeat(20);
        let chunks = Chunker::new(200, 40).parse(&src, ".py");
        for c in &chunks {
            let longest_line = c.content.split('\n').map(str::len).max().unwrap_or(0);
            assert!(c.content.len() <= 200 + longest_line + 1);
        }
        assert_eq!(reconstruct(&chunks), source_lines(&src));
    }
}
