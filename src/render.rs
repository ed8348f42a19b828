//! Turn grammar tokens into highlighted text.

use crate::grammar::{Category, Grammar};

pub const RESET: &str = "\x1B[0m";

/// SGR sequence per token category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    pub keyword: &'static str,
    pub literal: &'static str,
    pub type_name: &'static str,
    pub built_in: &'static str,
    pub function: &'static str,
    pub string: &'static str,
    pub number: &'static str,
    pub comment: &'static str,
    pub meta: &'static str,
    pub prompt: &'static str,
    pub variable: &'static str,
    pub command: &'static str,
}

impl Default for Palette {
    fn default() -> Self {
        Palette {
            keyword: "\x1B[35m",
            literal: "\x1B[94m",
            type_name: "\x1B[33m",
            built_in: "\x1B[93m",
            function: "\x1B[1m",
            string: "\x1B[92m",
            number: "\x1B[96m",
            comment: "\x1B[90m",
            meta: "\x1B[36m",
            prompt: "\x1B[32m",
            variable: "\x1B[1;35m",
            command: "\x1B[1;93m",
        }
    }
}

impl Palette {
    pub fn style(&self, category: Category) -> &'static str {
        match category {
            Category::Keyword => self.keyword,
            Category::Literal => self.literal,
            Category::Type => self.type_name,
            Category::BuiltIn => self.built_in,
            Category::Function => self.function,
            Category::String => self.string,
            Category::Number => self.number,
            Category::Comment => self.comment,
            Category::Meta => self.meta,
            Category::Prompt => self.prompt,
            Category::Variable => self.variable,
            Category::Command => self.command,
        }
    }
}

/// Colorize `src` for a terminal.
pub fn ansi(grammar: &Grammar, src: &str, palette: &Palette) -> String {
    let mut out = String::with_capacity(src.len() * 2);
    let mut last_end = 0;

    for token in grammar.tokenize(src) {
        out.push_str(&src[last_end..token.span.start]);
        out.push_str(palette.style(token.category));
        out.push_str(&src[token.span.clone()]);
        out.push_str(RESET);
        last_end = token.span.end;
    }
    out.push_str(&src[last_end..]);
    out
}

/// Markup with highlight.js class names, so existing hljs themes apply.
pub fn html(grammar: &Grammar, src: &str) -> String {
    let mut out = String::with_capacity(src.len() * 2);
    let mut last_end = 0;

    for token in grammar.tokenize(src) {
        escape_into(&mut out, &src[last_end..token.span.start]);
        out.push_str("<span class=\"");
        out.push_str(&class_name(token.category));
        out.push_str("\">");
        escape_into(&mut out, &src[token.span.clone()]);
        out.push_str("</span>");
        last_end = token.span.end;
    }
    escape_into(&mut out, &src[last_end..]);
    out
}

// "title.function" becomes "hljs-title function_"
fn class_name(category: Category) -> String {
    category
        .scope()
        .split('.')
        .enumerate()
        .map(|(i, part)| match i {
            0 => format!("hljs-{}", part),
            _ => format!("{}{}", part, "_".repeat(i)),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
}
