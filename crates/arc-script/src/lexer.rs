//! Hand-written lexer. No significant whitespace — blocks are
//! brace-delimited and statements are newline- or semicolon-terminated,
//! so the parser never has to reconstruct indentation.

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,
    Let,
    Fn,
    Async,
    Await,
    If,
    Else,
    While,
    For,
    In,
    Return,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Assign,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    AndAnd,
    OrOr,
    Bang,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
}

#[derive(Debug, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct LexError {
    pub message: String,
    pub line: u32,
}

pub fn lex(src: &str) -> Result<Vec<Spanned>, LexError> {
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0usize;
    let mut line = 1u32;
    let mut out = Vec::new();

    macro_rules! push {
        ($tok:expr) => {
            out.push(Spanned { token: $tok, line })
        };
    }

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '(' => {
                push!(Token::LParen);
                i += 1;
            }
            ')' => {
                push!(Token::RParen);
                i += 1;
            }
            '{' => {
                push!(Token::LBrace);
                i += 1;
            }
            '}' => {
                push!(Token::RBrace);
                i += 1;
            }
            '[' => {
                push!(Token::LBracket);
                i += 1;
            }
            ']' => {
                push!(Token::RBracket);
                i += 1;
            }
            ',' => {
                push!(Token::Comma);
                i += 1;
            }
            '.' => {
                push!(Token::Dot);
                i += 1;
            }
            ':' => {
                push!(Token::Colon);
                i += 1;
            }
            ';' => {
                push!(Token::Semicolon);
                i += 1;
            }
            '+' => {
                push!(Token::Plus);
                i += 1;
            }
            '-' => {
                push!(Token::Minus);
                i += 1;
            }
            '*' => {
                push!(Token::Star);
                i += 1;
            }
            '/' => {
                push!(Token::Slash);
                i += 1;
            }
            '%' => {
                push!(Token::Percent);
                i += 1;
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    push!(Token::Eq);
                    i += 2;
                } else {
                    push!(Token::Assign);
                    i += 1;
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    push!(Token::NotEq);
                    i += 2;
                } else {
                    push!(Token::Bang);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    push!(Token::LtEq);
                    i += 2;
                } else {
                    push!(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    push!(Token::GtEq);
                    i += 2;
                } else {
                    push!(Token::Gt);
                    i += 1;
                }
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                push!(Token::AndAnd);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                push!(Token::OrOr);
                i += 2;
            }
            '"' => {
                i += 1;
                let mut s = String::new();
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(LexError {
                                message: "unterminated string literal".into(),
                                line,
                            })
                        }
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            i += 1;
                            match chars.get(i) {
                                Some('n') => s.push('\n'),
                                Some('t') => s.push('\t'),
                                Some('"') => s.push('"'),
                                Some('\\') => s.push('\\'),
                                Some(other) => s.push(*other),
                                None => {
                                    return Err(LexError {
                                        message: "unterminated escape sequence".into(),
                                        line,
                                    })
                                }
                            }
                            i += 1;
                        }
                        Some(ch) => {
                            if *ch == '\n' {
                                line += 1;
                            }
                            s.push(*ch);
                            i += 1;
                        }
                    }
                }
                push!(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let mut is_float = false;
                if chars.get(i) == Some(&'.') && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) {
                    is_float = true;
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                if is_float {
                    push!(Token::Float(text.parse().map_err(|_| LexError {
                        message: format!("invalid float literal '{text}'"),
                        line,
                    })?));
                } else {
                    push!(Token::Int(text.parse().map_err(|_| LexError {
                        message: format!("invalid int literal '{text}'"),
                        line,
                    })?));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                push!(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "let" => Token::Let,
                    "fn" => Token::Fn,
                    "async" => Token::Async,
                    "await" => Token::Await,
                    "if" => Token::If,
                    "else" => Token::Else,
                    "while" => Token::While,
                    "for" => Token::For,
                    "in" => Token::In,
                    "return" => Token::Return,
                    _ => Token::Ident(word),
                });
            }
            other => {
                return Err(LexError {
                    message: format!("unexpected character '{other}'"),
                    line,
                })
            }
        }
    }

    push!(Token::Eof);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_arithmetic_and_identifiers() {
        let tokens = lex("let x = 1 + 2 * foo;").unwrap();
        let kinds: Vec<Token> = tokens.into_iter().map(|s| s.token).collect();
        assert_eq!(
            kinds,
            vec![
                Token::Let,
                Token::Ident("x".into()),
                Token::Assign,
                Token::Int(1),
                Token::Plus,
                Token::Int(2),
                Token::Star,
                Token::Ident("foo".into()),
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn lexes_string_escapes() {
        let tokens = lex(r#""hi\nthere""#).unwrap();
        assert_eq!(tokens[0].token, Token::Str("hi\nthere".into()));
    }

    #[test]
    fn tracks_line_numbers_across_newlines() {
        let tokens = lex("let a = 1;\nlet b = 2;").unwrap();
        let let_b = tokens.iter().filter(|s| s.token == Token::Let).nth(1).unwrap();
        assert_eq!(let_b.line, 2);
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(lex("\"unterminated").is_err());
    }

    #[test]
    fn comments_are_skipped() {
        let tokens = lex("# a comment\nlet x = 1;").unwrap();
        assert_eq!(tokens[0].token, Token::Let);
    }
}
