//! AST produced by the parser and consumed by both the auto-await
//! rewriter and the interpreter.

#[derive(Debug, Clone, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Await(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LValue {
    Ident(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnDef {
    pub name: String,
    pub params: Vec<String>,
    pub is_async: bool,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let(String, Expr),
    Assign(LValue, Expr),
    ExprStmt(Expr),
    If(Expr, Block, Option<Block>),
    While(Expr, Block),
    For(String, Expr, Block),
    Return(Option<Expr>),
    FnDef(FnDef),
}

pub type Block = Vec<Stmt>;

/// The namespace the concurrency combinators below live under —
/// `asyncio.gather(...)`, not a bare `gather(...)` — so that a tool
/// happening to be named `create_task` (the task-board tool that makes
/// a `Task`, unrelated to spawning a coroutine) never collides with the
/// language's own `create_task` combinator.
pub const ASYNCIO_NAMESPACE: &str = "asyncio";

/// Method names under `asyncio.` the auto-await rewriter (and the
/// interpreter's `gather`/`create_task` builtins) treat as
/// concurrency-combinator "passthrough" calls: their direct argument
/// expressions are not wrapped in an implicit `await` because the
/// combinator itself drives and awaits them.
pub const PASSTHROUGH_CALLS: &[&str] = &["gather", "create_task", "ensure_future", "wait"];

/// True if `callee` is syntactically `asyncio.<name>` for one of the
/// `PASSTHROUGH_CALLS` names.
pub fn is_asyncio_call(callee: &Expr, name: &str) -> bool {
    matches!(
        callee,
        Expr::Attr(base, method)
            if method == name && matches!(base.as_ref(), Expr::Ident(ns) if ns == ASYNCIO_NAMESPACE)
    )
}
