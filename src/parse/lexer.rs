//! Tokenizer for the C-subset front end.

use crate::ast::NodeKind;
use crate::core::{Error, Result};

/// A raw token before it is pushed into the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawToken {
    pub text: String,
    pub kind: NodeKind,
    pub line: usize,
}

const KEYWORDS: &[&str] = &[
    "if", "else", "while", "for", "do", "switch", "case", "default", "break", "continue",
    "return", "goto", "try", "catch", "throw", "struct", "class", "union", "enum", "asm",
    "sizeof", "new", "delete", "static", "extern", "const", "volatile", "unsigned", "signed",
    "int", "char", "short", "long", "float", "double", "bool", "void", "auto",
];

/// Multi-character operators, longest first so maximal munch works.
const OPERATORS: &[&str] = &[
    "<<=", ">>=", "->", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "+=", "-=",
    "*=", "/=", "%=", "&=", "|=", "^=", "::",
];

pub fn is_keyword(text: &str) -> bool {
    KEYWORDS.contains(&text)
}

/// Tokenize `source` into raw tokens, skipping whitespace and comments.
pub fn tokenize(source: &str) -> Result<Vec<RawToken>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 1;

    while i < bytes.len() {
        let c = bytes[i] as char;

        if c == '\n' {
            line += 1;
            i += 1;
            continue;
        }
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        // Line comment
        if c == '/' && bytes.get(i + 1) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        // Block comment
        if c == '/' && bytes.get(i + 1) == Some(&b'*') {
            i += 2;
            loop {
                if i + 1 >= bytes.len() {
                    return Err(Error::parse(line, "unterminated block comment"));
                }
                if bytes[i] == b'\n' {
                    line += 1;
                }
                if bytes[i] == b'*' && bytes[i + 1] == b'/' {
                    i += 2;
                    break;
                }
                i += 1;
            }
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len()
                && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
            {
                i += 1;
            }
            let text = &source[start..i];
            let kind = if is_keyword(text) {
                NodeKind::Keyword
            } else {
                NodeKind::Name
            };
            tokens.push(RawToken {
                text: text.to_string(),
                kind,
                line,
            });
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            // Hex literal
            if c == '0' && matches!(bytes.get(i + 1), Some(b'x') | Some(b'X')) {
                i += 2;
                while i < bytes.len() && (bytes[i] as char).is_ascii_hexdigit() {
                    i += 1;
                }
            } else {
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                    i += 1;
                }
            }
            // Integer suffixes
            while i < bytes.len() && matches!(bytes[i], b'u' | b'U' | b'l' | b'L') {
                i += 1;
            }
            tokens.push(RawToken {
                text: source[start..i].to_string(),
                kind: NodeKind::Number,
                line,
            });
            continue;
        }

        // Multi-character operators, longest match first
        if let Some(op) = OPERATORS
            .iter()
            .find(|op| source[i..].starts_with(**op))
        {
            tokens.push(RawToken {
                text: (*op).to_string(),
                kind: NodeKind::Op,
                line,
            });
            i += op.len();
            continue;
        }

        let kind = match c {
            '(' | ')' | '{' | '}' | '[' | ']' | ';' | ',' => NodeKind::Punct,
            '+' | '-' | '*' | '/' | '%' | '=' | '<' | '>' | '!' | '~' | '&' | '|' | '^' | '?'
            | ':' | '.' => NodeKind::Op,
            _ => return Err(Error::parse(line, format!("unexpected character '{}'", c))),
        };
        tokens.push(RawToken {
            text: c.to_string(),
            kind,
            line,
        });
        i += 1;
    }

    Ok(tokens)
}

/// Parse the integer value of a literal token, if it fits in `i64`.
pub fn int_value(text: &str) -> Option<i64> {
    let trimmed = text.trim_end_matches(['u', 'U', 'l', 'L']);
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        trimmed.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_operators_with_maximal_munch() {
        let toks = tokenize("a<<=b->c++").unwrap();
        let texts: Vec<_> = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "<<=", "b", "->", "c", "++"]);
    }

    #[test]
    fn classifies_keywords_and_names() {
        let toks = tokenize("while (running) count = 0;").unwrap();
        assert_eq!(toks[0].kind, NodeKind::Keyword);
        assert_eq!(toks[2].kind, NodeKind::Name);
        assert_eq!(toks[6].kind, NodeKind::Number);
    }

    #[test]
    fn skips_comments_and_tracks_lines() {
        let toks = tokenize("x; // trailing\n/* block\nspan */ y;").unwrap();
        let texts: Vec<_> = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["x", ";", "y", ";"]);
        assert_eq!(toks[2].line, 3);
    }

    #[test]
    fn integer_values() {
        assert_eq!(int_value("42"), Some(42));
        assert_eq!(int_value("0x10"), Some(16));
        assert_eq!(int_value("7UL"), Some(7));
    }

    #[test]
    fn rejects_unknown_characters() {
        assert!(tokenize("x = $;").is_err());
    }
}
