//! `arc-script`: the purpose-built scripting language the interactive
//! agent loop compiles and executes each turn against. No language
//! runtime to embed plays the role CPython's `ast.Interactive` +
//! `PyCF_ALLOW_TOP_LEVEL_AWAIT` would, so this crate is that runtime:
//! lexer → parser → auto-await rewrite → tree-walking interpreter.

pub mod ast;
pub mod capture;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod rewrite;
pub mod value;

pub use ast::Block;
pub use interp::Interp;
pub use rewrite::AutoAwaitConfig;
pub use value::{HandleObj, NativeFn, TaskState, ToolError, Value};

/// Compiles one interactive turn's source into an auto-await-rewritten
/// `Block`, ready to hand to `Interp::exec_block`.
pub fn compile(src: &str, auto_await: &AutoAwaitConfig) -> Result<Block, CompileError> {
    let tokens = lexer::lex(src).map_err(CompileError::Lex)?;
    let block = parser::parse(tokens).map_err(CompileError::Parse)?;
    Ok(rewrite::auto_await(block, auto_await))
}

#[derive(Debug)]
pub enum CompileError {
    Lex(lexer::LexError),
    Parse(parser::ParseError),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Lex(e) => write!(f, "lex error at line {}: {}", e.line, e.message),
            CompileError::Parse(e) => write!(f, "parse error at line {}: {}", e.line, e.message),
        }
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn compile_and_exec_round_trip() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let config = AutoAwaitConfig::default();
                let block = compile("let x = 1 + 2; x = x * 3;", &config).unwrap();
                let mut interp = Interp::new("agent-1");
                interp.exec_block(&block).await.unwrap();
                assert_eq!(interp.get_global("x"), Some(&Value::Int(9)));
            })
            .await;
    }

    #[test]
    fn compile_surfaces_lex_errors() {
        let config = AutoAwaitConfig::default();
        let err = compile("let x = \"unterminated;", &config).unwrap_err();
        assert!(matches!(err, CompileError::Lex(_)));
    }

    #[test]
    fn compile_surfaces_parse_errors() {
        let config = AutoAwaitConfig::default();
        let err = compile("let 1 = 2;", &config).unwrap_err();
        assert!(matches!(err, CompileError::Parse(_)));
    }
}
