//! Highlighting of the REPL input line while it is being edited.
//!
//! The input is often incomplete or invalid (think of the cursor in the middle
//! of `1 + / 2`), so this works on grammar tokens and bracket pairs only and
//! never fails.

use crate::command;
use crate::grammar::{Category, Grammar, Span, Token};
use crate::render::{Palette, RESET};

const BRACKET: &str = "\x1B[97m";
const BRACKET_UNDER_CURSOR: &str = "\x1B[97;100m";
const INVALID_CLOSE_BRACKET: &str = "\x1B[91m";
const INVALID_CLOSE_BRACE: &str = "\x1B[1;91m";
const INVALID_COMMAND: &str = "\x1B[91m";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlResult {
    pub output: String,
    /// Some bracket is still open, the input should continue on another line.
    pub open_bracket: bool,
    /// Short note for the line below the input.
    pub hint: Option<String>,
}

pub struct Highlighter {
    grammar: &'static Grammar,
    palette: Palette,
}

impl Default for Highlighter {
    fn default() -> Self {
        Highlighter::new(Palette::default())
    }
}

#[derive(Debug, Default)]
struct Brackets {
    pairs: Vec<(usize, usize)>,
    invalid: Vec<usize>,
    open: Vec<(char, usize)>,
}

fn opening(close: char) -> char {
    match close {
        ')' => '(',
        ']' => '[',
        _ => '{',
    }
}

// Brackets inside strings and comments are covered by tokens and don't count.
fn match_brackets(input: &str, tokens: &[Token]) -> Brackets {
    let mut brackets = Brackets::default();
    let mut last = 0;
    let gaps = tokens
        .iter()
        .map(|t| t.span.clone())
        .chain(std::iter::once(input.len()..input.len()));

    for span in gaps {
        for (i, ch) in input[last..span.start].char_indices() {
            let pos = last + i;
            match ch {
                '(' | '[' | '{' => brackets.open.push((ch, pos)),
                ')' | ']' | '}' => match brackets.open.last() {
                    Some(&(c, start)) if c == opening(ch) => {
                        brackets.open.pop();
                        brackets.pairs.push((start, pos));
                    }
                    _ => brackets.invalid.push(pos),
                },
                _ => (),
            }
        }
        last = span.end;
    }

    brackets
}

fn line_at(input: &str, pos: usize) -> &str {
    let start = input[..pos].rfind('\n').map_or(0, |i| i + 1);
    let end = input[pos..].find('\n').map_or(input.len(), |i| pos + i);
    &input[start..end]
}

impl Highlighter {
    pub fn new(palette: Palette) -> Self {
        Highlighter {
            grammar: Grammar::transcript(),
            palette,
        }
    }

    /// `cursor` is a byte offset into `input`.
    pub fn highlight(&self, input: &str, cursor: usize) -> HlResult {
        let tokens = self.grammar.tokenize(input);
        let brackets = match_brackets(input, &tokens);
        let mut hint = None;
        let mut styled: Vec<(Span, &'static str)> = Vec::with_capacity(tokens.len());

        for token in &tokens {
            let style = match token.category {
                Category::Command => match command::parse(line_at(input, token.span.start)) {
                    Ok(cmd) => {
                        hint = Some(cmd.help_line().to_string());
                        self.palette.command
                    }
                    Err(e) => {
                        hint = Some(format!("{} (.h for help)", e));
                        INVALID_COMMAND
                    }
                },
                c => self.palette.style(c),
            };
            styled.push((token.span.clone(), style));
        }

        let under_cursor = brackets
            .pairs
            .iter()
            .find(|&&(open, close)| open == cursor || close == cursor)
            .copied();

        for &(open, close) in &brackets.pairs {
            let style = match under_cursor {
                Some(pair) if pair == (open, close) => BRACKET_UNDER_CURSOR,
                _ => BRACKET,
            };
            styled.push((open..open + 1, style));
            styled.push((close..close + 1, style));
        }
        for &pos in &brackets.invalid {
            let style = match &input[pos..pos + 1] {
                "}" => INVALID_CLOSE_BRACE,
                _ => INVALID_CLOSE_BRACKET,
            };
            styled.push((pos..pos + 1, style));
        }
        for &(_, pos) in &brackets.open {
            styled.push((pos..pos + 1, BRACKET));
        }
        styled.sort_by_key(|(span, _)| span.start);

        let mut output = String::with_capacity(input.len() * 2);
        let mut last_end = 0;
        for (span, style) in styled {
            output.push_str(&input[last_end..span.start]);
            output.push_str(style);
            output.push_str(&input[span.clone()]);
            output.push_str(RESET);
            last_end = span.end;
        }
        output.push_str(&input[last_end..]);

        if hint.is_none() {
            if let Some(&pos) = brackets.invalid.first() {
                hint = Some(format!("unmatched '{}'", &input[pos..pos + 1]));
            } else if let Some(&(ch, _)) = brackets.open.last() {
                hint = Some(format!("unclosed '{}'", ch));
            }
        }

        // whichever comes later wins: an unclosed opener or an invalid closer
        let last_open = brackets.open.last().map(|&(_, pos)| pos);
        let last_invalid = brackets.invalid.last().copied();

        HlResult {
            output,
            open_bracket: last_open > last_invalid,
            hint,
        }
    }
}
