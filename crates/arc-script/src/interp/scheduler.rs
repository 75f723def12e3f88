//! Drives concurrent tool-call futures for `gather`/`create_task`.
//!
//! Ordinary evaluation awaits a native call the moment its `Call` node
//! is reached. `gather`'s whole point is to *not* do that: its direct
//! arguments are collected as inert `PendingCall`s first, then run
//! together on the current `LocalSet` via a `JoinSet`, so a batch of
//! independent tool round-trips overlaps instead of serializing.

use std::rc::Rc;

use tokio::task::JoinSet;

use crate::value::{NativeFn, ToolError, Value};

pub struct PendingCall {
    pub native: Rc<dyn NativeFn>,
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
}

/// Run `calls` concurrently, returning results in the same order as the
/// input (not completion order).
pub async fn run_concurrently(calls: Vec<PendingCall>) -> Vec<Result<Value, ToolError>> {
    let mut set = JoinSet::new();
    for (index, call) in calls.into_iter().enumerate() {
        set.spawn_local(async move {
            let result = call.native.call(call.args, call.kwargs).await;
            (index, result)
        });
    }

    let mut results: Vec<Option<Result<Value, ToolError>>> = Vec::new();
    while let Some(joined) = set.join_next().await {
        let (index, result) = joined.expect("gather task panicked");
        if results.len() <= index {
            results.resize_with(index + 1, || None);
        }
        results[index] = Some(result);
    }
    results
        .into_iter()
        .map(|slot| slot.expect("gather result missing for a spawned index"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Echo(Value);

    #[async_trait::async_trait(?Send)]
    impl NativeFn for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        async fn call(&self, _args: Vec<Value>, _kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Debug)]
    struct Failing;

    #[async_trait::async_trait(?Send)]
    impl NativeFn for Failing {
        fn name(&self) -> &str {
            "fail"
        }
        async fn call(&self, _args: Vec<Value>, _kwargs: Vec<(String, Value)>) -> Result<Value, ToolError> {
            Err(ToolError { message: "boom".into() })
        }
    }

    #[tokio::test]
    async fn preserves_input_order() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let calls = vec![
                    PendingCall {
                        native: Rc::new(Echo(Value::Int(1))),
                        args: vec![],
                        kwargs: vec![],
                    },
                    PendingCall {
                        native: Rc::new(Echo(Value::Int(2))),
                        args: vec![],
                        kwargs: vec![],
                    },
                ];
                let results = run_concurrently(calls).await;
                assert_eq!(results[0].as_ref().unwrap().repr(), "1");
                assert_eq!(results[1].as_ref().unwrap().repr(), "2");
            })
            .await;
    }

    #[tokio::test]
    async fn captures_individual_failures() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let calls = vec![
                    PendingCall {
                        native: Rc::new(Echo(Value::Int(1))),
                        args: vec![],
                        kwargs: vec![],
                    },
                    PendingCall {
                        native: Rc::new(Failing),
                        args: vec![],
                        kwargs: vec![],
                    },
                ];
                let results = run_concurrently(calls).await;
                assert!(results[0].is_ok());
                assert!(results[1].is_err());
            })
            .await;
    }
}
