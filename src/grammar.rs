//! Lexical grammar of Fire Script.
//!
//! A flat table of token categories and the patterns that produce them. The
//! scanner follows the usual highlighter rules: the earliest match in the
//! input wins, and when two rules match at the same offset the one listed
//! first wins. Text between matches is split into words and looked up in the
//! keyword tables.

use std::fmt;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

pub type Span = Range<usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Keyword,
    Literal,
    Type,
    BuiltIn,
    /// Name being defined, `f` in `f = fun …`.
    Function,
    String,
    Number,
    Comment,
    Meta,
    Prompt,
    Variable,
    Command,
}

impl Category {
    /// Scope name as understood by highlight.js themes.
    pub fn scope(self) -> &'static str {
        match self {
            Category::Keyword => "keyword",
            Category::Literal => "literal",
            Category::Type => "type",
            Category::BuiltIn => "built_in",
            Category::Function => "title.function",
            Category::String => "string",
            Category::Number => "number",
            Category::Comment => "comment",
            Category::Meta => "meta",
            Category::Prompt => "meta.prompt",
            Category::Variable => "variable",
            Category::Command => "meta.command",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.scope())
    }
}

/// Which kind of text is being highlighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Plain `.fire` source.
    Source,
    /// REPL session: source plus `_N ?` prompts and `.command` lines.
    Transcript,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub category: Category,
    pub span: Span,
}

pub const KEYWORDS: &[&str] = &[
    "catch", "class", "else", "fun", "if", "import", "instance", "in", "match", "module", "then",
    "try", "type", "with",
];
pub const LITERALS: &[&str] = &["void", "false", "true"];
pub const TYPES: &[&str] = &[
    "Void", "Bool", "Byte", "Char", "Int", "Int32", "Int64", "Float", "Float32", "Float64",
    "String",
];
pub const BUILT_INS: &[&str] = &["stdin", "stdout", "stderr", "null"];

const INT_SUFFIX: &str = "(?:[lL][uU]?|[uU][lL]?|[bB])?";

fn number_pattern() -> String {
    [
        r"-?\b\d+(?:[eE][-+]?\d+)?[fF]".to_string(),
        r"-?\b\d+\.\d*(?:[eE][-+]?\d+)?[fF]?".to_string(),
        format!(r"\b0b[01]+{}", INT_SUFFIX),
        format!(r"-?\b(?:0o[0-7]+|0x[a-fA-F0-9]+){}", INT_SUFFIX),
        format!(r"-?\b\d+{}", INT_SUFFIX),
    ]
    .join("|")
}

const STRING_PATTERN: &str = concat!(
    r#"(?s:"""(?:\\.|[^\\])*?(?:"""|\z))"#,
    r#"|(?:\bb)?"(?:\\.|[^"\\\n])*"?"#,
    r#"|(?:\bb)?'(?:\\x[a-fA-F0-9]{1,2}|\\[0-7]{1,3}|\\.|[^\\'\n])'"#,
    r"|(?s:\$\$.*?\$\$)",
);

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").expect("word pattern"));

struct Rule {
    category: Category,
    pattern: Regex,
    /// Capture group that becomes the token, 0 for the whole match.
    group: usize,
}

#[derive(Debug, Clone)]
struct Found {
    start: usize,
    token: Span,
}

impl Rule {
    fn new(category: Category, pattern: &str) -> Result<Self, regex::Error> {
        Self::with_group(category, pattern, 0)
    }

    fn with_group(category: Category, pattern: &str, group: usize) -> Result<Self, regex::Error> {
        Ok(Rule {
            category,
            pattern: Regex::new(pattern)?,
            group,
        })
    }

    fn find_at(&self, src: &str, pos: usize) -> Option<Found> {
        if self.group == 0 {
            let m = self.pattern.find_at(src, pos)?;
            return Some(Found {
                start: m.start(),
                token: m.range(),
            });
        }

        let caps = self.pattern.captures_at(src, pos)?;
        let whole = caps.get(0)?;
        let token = caps.get(self.group).map_or(whole.range(), |m| m.range());
        Some(Found {
            start: whole.start(),
            token,
        })
    }
}

/// Ordered rule table for one [`Flavor`].
pub struct Grammar {
    rules: Vec<Rule>,
}

static SOURCE: Lazy<Grammar> =
    Lazy::new(|| Grammar::new(Flavor::Source).expect("built-in grammar patterns are valid"));
static TRANSCRIPT: Lazy<Grammar> =
    Lazy::new(|| Grammar::new(Flavor::Transcript).expect("built-in grammar patterns are valid"));

impl Grammar {
    pub fn new(flavor: Flavor) -> Result<Self, regex::Error> {
        use Category::*;

        let mut rules = vec![
            Rule::new(Comment, r"//.*")?,
            Rule::new(Comment, r"(?s)/\*.*?(?:\*/|\z)")?,
            Rule::with_group(Function, r"\b([a-z][a-zA-Z_0-9]*)\s+[=:](?:[^=:]|\z)", 1)?,
            Rule::new(Type, r"\b[A-Z][A-Za-z_0-9]*\b")?,
            Rule::new(BuiltIn, r"\b__[A-Za-z_]+\b")?,
            Rule::new(Number, &number_pattern())?,
            Rule::new(String, STRING_PATTERN)?,
            Rule::new(Meta, r"#.*")?,
        ];
        if flavor == Flavor::Transcript {
            rules.push(Rule::new(Prompt, r"(?m)^_[0-9]+ \?")?);
        }
        rules.push(Rule::new(Variable, r"\b_[0-9]*\b")?);
        if flavor == Flavor::Transcript {
            rules.push(Rule::with_group(Command, r"(?m)^[ \t]*(\.[A-Za-z_]\w*)", 1)?);
        }

        Ok(Grammar { rules })
    }

    /// Shared grammar for plain source files.
    pub fn source() -> &'static Grammar {
        &SOURCE
    }

    /// Shared grammar for REPL input and session transcripts.
    pub fn transcript() -> &'static Grammar {
        &TRANSCRIPT
    }

    pub fn tokenize(&self, src: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        // Next match of every rule at or after `pos`; `None` once a rule is exhausted.
        let mut next: Vec<Option<Option<Found>>> = vec![None; self.rules.len()];
        let mut pos = 0;

        while pos < src.len() {
            let mut best: Option<(usize, Found)> = None;
            for (i, rule) in self.rules.iter().enumerate() {
                let found = match &next[i] {
                    Some(Some(f)) if f.start >= pos => Some(f.clone()),
                    Some(None) => None,
                    _ => {
                        let f = rule.find_at(src, pos);
                        next[i] = Some(f.clone());
                        f
                    }
                };
                if let Some(f) = found {
                    if best.as_ref().map_or(true, |(_, b)| f.start < b.start) {
                        best = Some((i, f));
                    }
                }
            }

            let Some((i, found)) = best else {
                break;
            };
            self.keywords(src, pos..found.token.start, &mut tokens);

            let text = &src[found.token.clone()];
            let category = match self.rules[i].category {
                Category::Function => keyword_category(text).unwrap_or(Category::Function),
                c => c,
            };
            pos = found.token.end;
            tokens.push(Token {
                category,
                span: found.token,
            });
        }

        if pos < src.len() {
            self.keywords(src, pos..src.len(), &mut tokens);
        }
        tokens
    }

    /// Category of `sample` when a single token covers all of it.
    pub fn classify(&self, sample: &str) -> Option<Category> {
        match self.tokenize(sample).as_slice() {
            [token] if token.span == (0..sample.len()) => Some(token.category),
            _ => None,
        }
    }

    fn keywords(&self, src: &str, gap: Span, tokens: &mut Vec<Token>) {
        if gap.is_empty() {
            return;
        }
        let offset = gap.start;
        for m in WORD.find_iter(&src[gap]) {
            if let Some(category) = keyword_category(m.as_str()) {
                tokens.push(Token {
                    category,
                    span: offset + m.start()..offset + m.end(),
                });
            }
        }
    }
}

fn keyword_category(word: &str) -> Option<Category> {
    if KEYWORDS.contains(&word) {
        Some(Category::Keyword)
    } else if LITERALS.contains(&word) {
        Some(Category::Literal)
    } else if TYPES.contains(&word) {
        Some(Category::Type)
    } else if BUILT_INS.contains(&word) {
        Some(Category::BuiltIn)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories(grammar: &Grammar, src: &str) -> Vec<(Category, String)> {
        grammar
            .tokenize(src)
            .into_iter()
            .map(|t| (t.category, src[t.span].to_string()))
            .collect()
    }

    #[test]
    fn classifies_samples() {
        let g = Grammar::transcript();
        assert_eq!(g.classify("\"hello\""), Some(Category::String));
        assert_eq!(g.classify("42"), Some(Category::Number));
        assert_eq!(g.classify("# comment"), Some(Category::Meta));
        assert_eq!(g.classify("_1 ?"), Some(Category::Prompt));
        assert_eq!(g.classify("fun"), Some(Category::Keyword));
        assert_eq!(g.classify("true"), Some(Category::Literal));
        assert_eq!(g.classify("Int32"), Some(Category::Type));
        assert_eq!(g.classify("__add"), Some(Category::BuiltIn));
        assert_eq!(g.classify("stdout"), Some(Category::BuiltIn));
        assert_eq!(g.classify("// note"), Some(Category::Comment));
        assert_eq!(g.classify("/* a\nb */"), Some(Category::Comment));
        assert_eq!(g.classify("_3"), Some(Category::Variable));
        assert_eq!(g.classify("_"), Some(Category::Variable));
        assert_eq!(g.classify(".quit"), Some(Category::Command));
        assert_eq!(g.classify("plain"), None);
    }

    #[test]
    fn prompt_only_in_transcripts() {
        assert_eq!(Grammar::source().classify("_1 ?"), None);
        assert_eq!(
            categories(Grammar::source(), "_1 ?"),
            vec![(Category::Variable, "_1".to_string())]
        );
        assert_eq!(Grammar::source().classify(".quit"), None);
    }

    #[test]
    fn number_variants() {
        let g = Grammar::source();
        for sample in ["1.5", "1.", "-2.5e-3", "3f", "1e3f", "0b101", "0o17", "0xff", "7ul", "255b", "-4"] {
            assert_eq!(g.classify(sample), Some(Category::Number), "{}", sample);
        }
    }

    #[test]
    fn string_variants() {
        let g = Grammar::source();
        for sample in [
            r#""a \"quoted\" word""#,
            r#"b"bytes""#,
            "'x'",
            r"'\n'",
            r"'\x41'",
            r"b'\101'",
            "\"\"\"multi\nline\"\"\"",
            "$$ raw \\ text $$",
        ] {
            assert_eq!(g.classify(sample), Some(Category::String), "{}", sample);
        }
    }

    #[test]
    fn unterminated_forms_extend_to_end() {
        let g = Grammar::source();
        assert_eq!(g.classify("/* open"), Some(Category::Comment));
        assert_eq!(
            categories(g, "\"open\nx"),
            vec![(Category::String, "\"open".to_string())]
        );
    }

    #[test]
    fn definitions_name_only() {
        let g = Grammar::source();
        assert_eq!(
            categories(g, "add = fun a b { a + b }"),
            vec![
                (Category::Function, "add".to_string()),
                (Category::Keyword, "fun".to_string()),
            ]
        );
        // parameter annotations are not definitions
        assert_eq!(
            categories(g, "add = fun a:Int b:Int { a + b }"),
            vec![
                (Category::Function, "add".to_string()),
                (Category::Keyword, "fun".to_string()),
                (Category::Type, "Int".to_string()),
                (Category::Type, "Int".to_string()),
            ]
        );
        assert_eq!(
            categories(g, "x : Int"),
            vec![
                (Category::Function, "x".to_string()),
                (Category::Type, "Int".to_string()),
            ]
        );
        assert_eq!(categories(g, "x=1"), vec![(Category::Number, "1".to_string())]);
        assert_eq!(categories(g, "a == b"), vec![]);
    }

    #[test]
    fn earliest_match_wins() {
        let g = Grammar::source();
        assert_eq!(
            categories(g, "\"# not meta\" # meta"),
            vec![
                (Category::String, "\"# not meta\"".to_string()),
                (Category::Meta, "# meta".to_string()),
            ]
        );
        assert_eq!(
            categories(g, "// \"not a string\""),
            vec![(Category::Comment, "// \"not a string\"".to_string())]
        );
    }

    #[test]
    fn transcript_line() {
        let g = Grammar::transcript();
        assert_eq!(
            categories(g, "_0 ? if true then 1 else 2\n_0 = 1"),
            vec![
                (Category::Prompt, "_0 ?".to_string()),
                (Category::Keyword, "if".to_string()),
                (Category::Literal, "true".to_string()),
                (Category::Keyword, "then".to_string()),
                (Category::Number, "1".to_string()),
                (Category::Keyword, "else".to_string()),
                (Category::Number, "2".to_string()),
                (Category::Variable, "_0".to_string()),
                (Category::Number, "1".to_string()),
            ]
        );
    }

    #[test]
    fn scopes() {
        assert_eq!(Category::Function.scope(), "title.function");
        assert_eq!(Category::BuiltIn.to_string(), "built_in");
    }
}
