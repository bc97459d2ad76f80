//! Tokenizer for QubecTalk source text (spec.md §4.A). Keyword matching is
//! case-insensitive; identifiers and string contents preserve source case.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    String(String),
    Identifier(String),
    Keyword(Keyword),

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,

    Plus,
    Minus,
    Star,
    Slash,
    Caret,

    EqEq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,

    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    // Structure
    About,
    Application,
    Default,
    Define,
    End,
    Policy,
    Simulations,
    Start,
    Substance,
    Uses,
    Variables,
    // Commands
    Across,
    As,
    By,
    Cap,
    Change,
    Charge,
    During,
    Floor,
    For,
    From,
    Get,
    In,
    Initial,
    Modify,
    Of,
    Recharge,
    Recover,
    Replace,
    Retire,
    Reuse,
    Set,
    Simulate,
    Then,
    To,
    Trials,
    Using,
    With,
    /// Not in spec.md §6's enumerated keyword list; added because the AST's
    /// `Emit` statement (spec.md §4.B) needs a surface keyword and none is
    /// given. See DESIGN.md.
    Emit,
    // Conditional/logic
    And,
    Else,
    Endif,
    If,
    Or,
    Xor,
    // Sampling
    Mean,
    Normally,
    Sample,
    Std,
    Uniformly,
    Limit,
    // Streams
    PriorEquipment,
    Equipment,
    Export,
    Import,
    Manufacture,
    Sales,
    Recycle,
    Consumption,
    RechargeEmissions,
    EolEmissions,
    NewEquipment,
    Energy,
    // Units
    Annually,
    Beginning,
    Day,
    Days,
    Each,
    Kg,
    Kwh,
    Month,
    Months,
    Mt,
    Onwards,
    Percent,
    TCo2e,
    Unit,
    Units,
    Year,
    Years,
    // Special
    Equals,
    Displacing,
}

impl Keyword {
    fn lookup(lower: &str) -> Option<Keyword> {
        use Keyword::*;
        Some(match lower {
            "about" => About,
            "application" => Application,
            "default" => Default,
            "define" => Define,
            "end" => End,
            "policy" => Policy,
            "simulations" => Simulations,
            "start" => Start,
            "substance" => Substance,
            "uses" => Uses,
            "variables" => Variables,
            "across" => Across,
            "as" => As,
            "by" => By,
            "cap" => Cap,
            "change" => Change,
            "charge" => Charge,
            "during" => During,
            "floor" => Floor,
            "for" => For,
            "from" => From,
            "get" => Get,
            "in" => In,
            "initial" => Initial,
            "modify" => Modify,
            "of" => Of,
            "recharge" => Recharge,
            "recover" => Recover,
            "replace" => Replace,
            "retire" => Retire,
            "reuse" => Reuse,
            "set" => Set,
            "simulate" => Simulate,
            "then" => Then,
            "to" => To,
            "trials" => Trials,
            "using" => Using,
            "with" => With,
            "emit" => Emit,
            "and" => And,
            "else" => Else,
            "endif" => Endif,
            "if" => If,
            "or" => Or,
            "xor" => Xor,
            "mean" => Mean,
            "normally" => Normally,
            "sample" => Sample,
            "std" => Std,
            "uniformly" => Uniformly,
            "limit" => Limit,
            "priorequipment" => PriorEquipment,
            "equipment" => Equipment,
            "export" => Export,
            "import" => Import,
            "manufacture" => Manufacture,
            "sales" => Sales,
            "recycle" => Recycle,
            "consumption" => Consumption,
            "rechargeemissions" => RechargeEmissions,
            "eolemissions" => EolEmissions,
            "newequipment" => NewEquipment,
            "energy" => Energy,
            "annually" => Annually,
            "beginning" => Beginning,
            "day" => Day,
            "days" => Days,
            "each" => Each,
            "kg" => Kg,
            "kwh" => Kwh,
            "month" => Month,
            "months" => Months,
            "mt" => Mt,
            "onwards" => Onwards,
            "percent" => Percent,
            "tco2e" => TCo2e,
            "unit" => Unit,
            "units" => Units,
            "year" => Year,
            "years" => Years,
            "equals" => Equals,
            "displacing" => Displacing,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.span.line, self.span.column, self.message)
    }
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    source: &'a str,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Lexer<'a> {
        Lexer {
            chars: source.char_indices().peekable(),
            source,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia();
        let span = Span {
            line: self.line,
            column: self.column,
        };
        let c = match self.peek_char() {
            None => {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    lexeme: String::new(),
                    span,
                })
            }
            Some(c) => c,
        };

        if c.is_ascii_digit() {
            return self.lex_number(span);
        }
        if c == '"' {
            return self.lex_string(span);
        }
        if c.is_alphabetic() {
            return self.lex_word(span);
        }

        self.bump();
        let (kind, lexeme) = match c {
            '(' => (TokenKind::LParen, "("),
            ')' => (TokenKind::RParen, ")"),
            '[' => (TokenKind::LBracket, "["),
            ']' => (TokenKind::RBracket, "]"),
            '{' => (TokenKind::LBrace, "{"),
            '}' => (TokenKind::RBrace, "}"),
            ',' => (TokenKind::Comma, ","),
            '+' => (TokenKind::Plus, "+"),
            '-' => (TokenKind::Minus, "-"),
            '*' => (TokenKind::Star, "*"),
            '/' => (TokenKind::Slash, "/"),
            '^' => (TokenKind::Caret, "^"),
            '%' => (TokenKind::Keyword(Keyword::Percent), "%"),
            '=' => {
                if self.peek_char() == Some('=') {
                    self.bump();
                    (TokenKind::EqEq, "==")
                } else {
                    return Err(LexError {
                        span,
                        message: "unexpected `=`, did you mean `==`?".to_string(),
                    });
                }
            }
            '!' => {
                if self.peek_char() == Some('=') {
                    self.bump();
                    (TokenKind::NotEq, "!=")
                } else {
                    return Err(LexError {
                        span,
                        message: "unexpected `!`, did you mean `!=`?".to_string(),
                    });
                }
            }
            '<' => {
                if self.peek_char() == Some('=') {
                    self.bump();
                    (TokenKind::Lte, "<=")
                } else {
                    (TokenKind::Lt, "<")
                }
            }
            '>' => {
                if self.peek_char() == Some('=') {
                    self.bump();
                    (TokenKind::Gte, ">=")
                } else {
                    (TokenKind::Gt, ">")
                }
            }
            other => {
                return Err(LexError {
                    span,
                    message: format!("unexpected character `{}`", other),
                })
            }
        };
        Ok(Token {
            kind,
            lexeme: lexeme.to_string(),
            span,
        })
    }

    fn lex_number(&mut self, span: Span) -> Result<Token, LexError> {
        let start = self.chars.peek().unwrap().0;
        while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek_char() == Some('.') {
            self.bump();
            while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        let end = self.chars.peek().map(|(i, _)| *i).unwrap_or(self.source.len());
        let lexeme = &self.source[start..end];
        let value: f64 = lexeme.parse().map_err(|_| LexError {
            span,
            message: format!("invalid number literal `{}`", lexeme),
        })?;
        Ok(Token {
            kind: TokenKind::Number(value),
            lexeme: lexeme.to_string(),
            span,
        })
    }

    fn lex_string(&mut self, span: Span) -> Result<Token, LexError> {
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(LexError {
                        span,
                        message: "unterminated string literal".to_string(),
                    })
                }
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some(other) => value.push(other),
                    None => {
                        return Err(LexError {
                            span,
                            message: "unterminated escape sequence".to_string(),
                        })
                    }
                },
                Some(c) => value.push(c),
            }
        }
        let lexeme = value.clone();
        Ok(Token {
            kind: TokenKind::String(value),
            lexeme,
            span,
        })
    }

    fn lex_word(&mut self, span: Span) -> Result<Token, LexError> {
        let start = self.chars.peek().unwrap().0;
        while matches!(self.peek_char(), Some(c) if c.is_alphanumeric()) {
            self.bump();
        }
        let end = self.chars.peek().map(|(i, _)| *i).unwrap_or(self.source.len());
        let lexeme = self.source[start..end].to_string();
        let lower = lexeme.to_ascii_lowercase();
        let kind = match Keyword::lookup(&lower) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Identifier(lexeme.clone()),
        };
        Ok(Token { kind, lexeme, span })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_a_set_statement() {
        let kinds = kinds("set manufacture to 10 kg");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword(Keyword::Set),
                TokenKind::Keyword(Keyword::Manufacture),
                TokenKind::Keyword(Keyword::To),
                TokenKind::Number(10.0),
                TokenKind::Keyword(Keyword::Kg),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let kinds = kinds("SET Manufacture TO 10 KG");
        assert_eq!(kinds[0], TokenKind::Keyword(Keyword::Set));
        assert_eq!(kinds[1], TokenKind::Keyword(Keyword::Manufacture));
    }

    #[test]
    fn strings_preserve_case_and_support_escapes() {
        let kinds = kinds(r#""Hello\n\"World\"""#);
        assert_eq!(kinds[0], TokenKind::String("Hello\n\"World\"".to_string()));
    }

    #[test]
    fn comments_are_skipped() {
        let kinds = kinds("set manufacture # trailing comment\nto 10 kg");
        assert_eq!(kinds[0], TokenKind::Keyword(Keyword::Set));
        assert_eq!(kinds[1], TokenKind::Keyword(Keyword::Manufacture));
        assert_eq!(kinds[2], TokenKind::Keyword(Keyword::To));
    }

    #[test]
    fn rejects_unknown_characters() {
        let err = Lexer::new("set manufacture to 10 kg ~").tokenize().unwrap_err();
        assert!(err.message.contains('~'));
    }
}
