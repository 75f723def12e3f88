//! Auto-await rewrite pass.
//!
//! Mirrors the shape of an AST `NodeTransformer`: walks a parsed block
//! and wraps bare calls to registered tool proxies — whether a free
//! function (`read_file(...)`) or a method (`shell.run(...)`) — in an
//! implicit `Await`, so script authors never have to write `await`
//! themselves for calls that always suspend. A call already inside an
//! explicit `await expr` is left alone; the direct argument expressions
//! of `gather`/`create_task`/`ensure_future`/`wait` calls are left
//! untouched entirely, since those combinators drive and await their
//! arguments themselves.

use std::collections::HashSet;

use crate::ast::{is_asyncio_call, Block, Expr, FnDef, LValue, Stmt, PASSTHROUGH_CALLS};

/// Names eligible for the auto-await rewrite.
#[derive(Debug, Clone, Default)]
pub struct AutoAwaitConfig {
    /// Bare function names, e.g. tool proxies bound at the top level.
    pub names: HashSet<String>,
    /// Method names reachable via attribute access, e.g. `shell.run`.
    pub attrs: HashSet<String>,
}

impl AutoAwaitConfig {
    pub fn new(names: impl IntoIterator<Item = String>, attrs: impl IntoIterator<Item = String>) -> Self {
        Self {
            names: names.into_iter().collect(),
            attrs: attrs.into_iter().collect(),
        }
    }
}

pub fn auto_await(block: Block, config: &AutoAwaitConfig) -> Block {
    block.into_iter().map(|stmt| rewrite_stmt(stmt, config)).collect()
}

fn rewrite_stmt(stmt: Stmt, config: &AutoAwaitConfig) -> Stmt {
    match stmt {
        Stmt::Let(name, expr) => Stmt::Let(name, rewrite_expr(expr, config, false)),
        Stmt::Assign(lvalue, expr) => Stmt::Assign(rewrite_lvalue(lvalue, config), rewrite_expr(expr, config, false)),
        Stmt::ExprStmt(expr) => Stmt::ExprStmt(rewrite_expr(expr, config, false)),
        Stmt::If(cond, then_block, else_block) => Stmt::If(
            rewrite_expr(cond, config, false),
            auto_await(then_block, config),
            else_block.map(|b| auto_await(b, config)),
        ),
        Stmt::While(cond, body) => Stmt::While(rewrite_expr(cond, config, false), auto_await(body, config)),
        Stmt::For(var, iter, body) => Stmt::For(var, rewrite_expr(iter, config, false), auto_await(body, config)),
        Stmt::Return(expr) => Stmt::Return(expr.map(|e| rewrite_expr(e, config, false))),
        Stmt::FnDef(def) => Stmt::FnDef(FnDef {
            body: auto_await(def.body, config),
            ..def
        }),
    }
}

fn rewrite_lvalue(lvalue: LValue, config: &AutoAwaitConfig) -> LValue {
    match lvalue {
        LValue::Ident(name) => LValue::Ident(name),
        LValue::Attr(base, name) => LValue::Attr(Box::new(rewrite_expr(*base, config, false)), name),
        LValue::Index(base, index) => LValue::Index(
            Box::new(rewrite_expr(*base, config, false)),
            Box::new(rewrite_expr(*index, config, false)),
        ),
    }
}

fn is_passthrough_call(callee: &Expr) -> bool {
    PASSTHROUGH_CALLS.iter().any(|name| is_asyncio_call(callee, name))
}

fn should_auto_await(callee: &Expr, config: &AutoAwaitConfig) -> bool {
    match callee {
        Expr::Ident(name) => config.names.contains(name),
        Expr::Attr(_, method) => config.attrs.contains(method),
        _ => false,
    }
}

/// `already_awaited` is true only for the direct child of an explicit
/// `Await` node — it suppresses re-wrapping that one call, not calls
/// nested deeper inside its arguments.
fn rewrite_expr(expr: Expr, config: &AutoAwaitConfig, already_awaited: bool) -> Expr {
    match expr {
        Expr::Await(inner) => Expr::Await(Box::new(rewrite_expr(*inner, config, true))),
        Expr::Call { callee, args, kwargs } => {
            let passthrough = is_passthrough_call(&callee);
            let new_callee = rewrite_expr(*callee, config, false);
            let (new_args, new_kwargs) = if passthrough {
                (args, kwargs)
            } else {
                (
                    args.into_iter().map(|a| rewrite_expr(a, config, false)).collect(),
                    kwargs
                        .into_iter()
                        .map(|(k, v)| (k, rewrite_expr(v, config, false)))
                        .collect(),
                )
            };
            let call = Expr::Call {
                callee: Box::new(new_callee),
                args: new_args,
                kwargs: new_kwargs,
            };
            if !already_awaited && should_auto_await(call_callee(&call), config) {
                Expr::Await(Box::new(call))
            } else {
                call
            }
        }
        Expr::Binary(l, op, r) => Expr::Binary(
            Box::new(rewrite_expr(*l, config, false)),
            op,
            Box::new(rewrite_expr(*r, config, false)),
        ),
        Expr::Unary(op, inner) => Expr::Unary(op, Box::new(rewrite_expr(*inner, config, false))),
        Expr::Attr(base, name) => Expr::Attr(Box::new(rewrite_expr(*base, config, false)), name),
        Expr::Index(base, index) => Expr::Index(
            Box::new(rewrite_expr(*base, config, false)),
            Box::new(rewrite_expr(*index, config, false)),
        ),
        Expr::List(items) => Expr::List(items.into_iter().map(|i| rewrite_expr(i, config, false)).collect()),
        Expr::Map(entries) => Expr::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k, rewrite_expr(v, config, false)))
                .collect(),
        ),
        literal => literal,
    }
}

fn call_callee(expr: &Expr) -> &Expr {
    match expr {
        Expr::Call { callee, .. } => callee,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn rewritten(src: &str, names: &[&str], attrs: &[&str]) -> Block {
        let block = parse(lex(src).unwrap()).unwrap();
        let config = AutoAwaitConfig::new(
            names.iter().map(|s| s.to_string()),
            attrs.iter().map(|s| s.to_string()),
        );
        auto_await(block, &config)
    }

    #[test]
    fn wraps_bare_call_to_registered_name() {
        let block = rewritten("let x = read_file(\"a.rs\");", &["read_file"], &[]);
        match &block[0] {
            Stmt::Let(_, Expr::Await(inner)) => {
                assert!(matches!(inner.as_ref(), Expr::Call { .. }));
            }
            other => panic!("expected wrapped call, got {other:?}"),
        }
    }

    #[test]
    fn wraps_bare_method_call_to_registered_attr() {
        let block = rewritten("let x = shell.run(\"ls\");", &[], &["run"]);
        match &block[0] {
            Stmt::Let(_, Expr::Await(_)) => {}
            other => panic!("expected wrapped call, got {other:?}"),
        }
    }

    #[test]
    fn does_not_double_wrap_explicit_await() {
        let block = rewritten("let x = await read_file(\"a.rs\");", &["read_file"], &[]);
        match &block[0] {
            Stmt::Let(_, Expr::Await(inner)) => {
                assert!(matches!(inner.as_ref(), Expr::Call { .. }), "inner should not be a nested Await");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn leaves_unregistered_calls_bare() {
        let block = rewritten("let x = len(items);", &["read_file"], &[]);
        assert_eq!(block[0], Stmt::Let("x".into(), {
            let call = parse(lex("len(items);").unwrap()).unwrap();
            match call.into_iter().next().unwrap() {
                Stmt::ExprStmt(e) => e,
                _ => unreachable!(),
            }
        }));
    }

    #[test]
    fn does_not_wrap_direct_gather_arguments() {
        let block = rewritten(
            "let x = asyncio.gather(read_file(\"a.rs\"), read_file(\"b.rs\"));",
            &["read_file"],
            &[],
        );
        match &block[0] {
            Stmt::Let(_, Expr::Call { args, .. }) => {
                for arg in args {
                    assert!(matches!(arg, Expr::Call { .. }), "gather args must stay bare, got {arg:?}");
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rewrites_inside_if_and_while_bodies() {
        let block = rewritten(
            "if true { let x = read_file(\"a\"); } while true { let y = read_file(\"b\"); }",
            &["read_file"],
            &[],
        );
        match &block[0] {
            Stmt::If(_, then_block, _) => {
                assert!(matches!(&then_block[0], Stmt::Let(_, Expr::Await(_))));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
