use log::warn;

use super::ast::{Pipeline, PipelineStage, Redirection};
use super::lexer::{Lexer, RedirectOp, Token};

/// Parses one input line. Never fails: a blank line yields an empty pipeline.
pub fn parse(line: &str) -> Pipeline {
    Parser::new(line).parse_pipeline()
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token();
        Parser {
            lexer,
            current_token,
        }
    }

    fn next_token(&mut self) -> Token {
        std::mem::replace(&mut self.current_token, self.lexer.next_token())
    }

    pub fn parse_pipeline(&mut self) -> Pipeline {
        let mut stages = Vec::new();

        while self.current_token != Token::EOF {
            stages.push(self.parse_stage());
        }

        Pipeline { stages }
    }

    /// Consumes tokens up to and including the `&`/`|` closing the stage.
    fn parse_stage(&mut self) -> PipelineStage {
        let mut stage = PipelineStage::default();
        let mut pending: Option<RedirectOp> = None;

        // 阶段的第一个词总是命令名，即使它看起来像操作符
        stage.command = self.next_token().to_string();

        loop {
            match self.next_token() {
                Token::EOF => break,
                Token::Background => {
                    stage.background = true;
                    break;
                }
                Token::Pipe => {
                    // 管道前面的阶段从不被直接等待，只等待链尾
                    stage.pipes_with_next = true;
                    stage.background = true;
                    break;
                }
                Token::Redirect(op) => {
                    if let Some(dropped) = pending.replace(op) {
                        warn!("重定向 `{}` 缺少文件名，已忽略", dropped);
                    }
                }
                Token::Word(word) => match pending.take() {
                    Some(operator) => stage.redirections.push(Redirection {
                        operator,
                        filename: word,
                    }),
                    None => stage.arguments.push(word),
                },
            }
        }

        if let Some(dropped) = pending {
            warn!("重定向 `{}` 缺少文件名，已忽略", dropped);
        }
        stage
    }
}
