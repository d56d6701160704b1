use std::fmt;
use std::str::SplitWhitespace;

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Word(String),
    Pipe,
    Redirect(RedirectOp),
    Background,
    EOF,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RedirectOp {
    Input,  // <
    Output, // >
    Append, // >>
}

impl RedirectOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedirectOp::Input => "<",
            RedirectOp::Output => ">",
            RedirectOp::Append => ">>",
        }
    }
}

impl fmt::Display for RedirectOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(word) => f.write_str(word),
            Token::Pipe => f.write_str("|"),
            Token::Redirect(op) => write!(f, "{}", op),
            Token::Background => f.write_str("&"),
            Token::EOF => Ok(()),
        }
    }
}

/// Whitespace tokenizer. Operators are only recognized as standalone
/// tokens: `a>b` is a single word, and quotes carry no meaning.
pub struct Lexer<'a> {
    input: SplitWhitespace<'a>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.split_whitespace(),
        }
    }

    pub fn next_token(&mut self) -> Token {
        match self.input.next() {
            None => Token::EOF,
            Some(word) => match word {
                "|" => Token::Pipe,
                "&" => Token::Background,
                "<" => Token::Redirect(RedirectOp::Input),
                ">" => Token::Redirect(RedirectOp::Output),
                ">>" => Token::Redirect(RedirectOp::Append),
                _ => Token::Word(word.to_string()),
            },
        }
    }
}
