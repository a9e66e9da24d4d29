//! Sandboxed script execution under a hard deadline

use super::sanitize::sanitize;
use crate::error::CipherError;
use crate::Result;
use deno_core::{FastString, JsRuntime, RuntimeOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Stack size for interpreter threads; large player scripts nest deeply
const SANDBOX_STACK_SIZE: usize = 8 * 1024 * 1024;

type Terminator = Box<dyn Fn() + Send + Sync>;

/// Lets the caller ask a running evaluation to stop.
///
/// Termination is best effort. The deadline is enforced by abandoning the
/// evaluation, not by waiting for it to stop.
#[derive(Default)]
pub struct ExecutionGuard {
    cancelled: AtomicBool,
    terminator: Mutex<Option<Terminator>>,
}

impl ExecutionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the engine's termination hook
    pub fn set_terminator<F>(&self, terminate: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.is_cancelled() {
            terminate();
            return;
        }
        *self
            .terminator
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(terminate));
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let terminator = self
            .terminator
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(terminate) = terminator.as_ref() {
            terminate();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// An embedded script interpreter.
///
/// Each call evaluates `program` in a fresh interpreter, calls `entry_point`
/// with `arg` and returns the string result. Implementations block.
pub trait ScriptEngine: Send + Sync + 'static {
    fn evaluate(
        &self,
        program: &str,
        entry_point: &str,
        arg: &str,
        guard: &ExecutionGuard,
    ) -> Result<String>;
}

/// V8 through `deno_core`
#[derive(Debug, Clone, Copy, Default)]
pub struct DenoEngine;

impl ScriptEngine for DenoEngine {
    fn evaluate(
        &self,
        program: &str,
        entry_point: &str,
        arg: &str,
        guard: &ExecutionGuard,
    ) -> Result<String> {
        let mut runtime = JsRuntime::new(RuntimeOptions::default());
        let isolate = runtime.v8_isolate().thread_safe_handle();
        guard.set_terminator(move || {
            isolate.terminate_execution();
        });

        runtime
            .execute_script("<program>", FastString::from(program.to_string()))
            .map_err(|e| {
                let message = e.to_string();
                if message.contains("SyntaxError") {
                    CipherError::ScriptSyntax(message)
                } else {
                    CipherError::Execution(message)
                }
            })?;

        let call = format!("{}({})", entry_point, serde_json::to_string(arg)?);
        let result = runtime
            .execute_script("<entry>", FastString::from(call))
            .map_err(|e| CipherError::Execution(e.to_string()))?;

        let scope = &mut runtime.handle_scope();
        let value = result.open(scope);
        if !value.is_string() {
            return Err(CipherError::Execution(format!(
                "{} returned a non-string value",
                entry_point
            )));
        }
        Ok(value.to_rust_string_lossy(scope))
    }
}

/// Runs a [`ScriptEngine`] on its own thread, raced against a timer
#[derive(Clone)]
pub struct Sandbox {
    engine: Arc<dyn ScriptEngine>,
    stack_size: usize,
}

impl Sandbox {
    pub fn new(engine: Arc<dyn ScriptEngine>) -> Self {
        Self {
            engine,
            stack_size: SANDBOX_STACK_SIZE,
        }
    }

    #[cfg(test)]
    fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Sandbox backed by [`DenoEngine`]
    pub fn deno() -> Self {
        Self::new(Arc::new(DenoEngine))
    }

    /// Evaluate `program` and call `entry_point(arg)` within `timeout`.
    ///
    /// On timeout the thread is abandoned and the engine asked to stop; the
    /// result is `Timeout` and the program should not be retried.
    pub async fn run(
        &self,
        program: &str,
        entry_point: &str,
        arg: &str,
        timeout: Duration,
    ) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        let guard = Arc::new(ExecutionGuard::new());

        let engine = Arc::clone(&self.engine);
        let thread_guard = Arc::clone(&guard);
        let program = program.to_string();
        let entry_point = entry_point.to_string();
        let arg = arg.to_string();

        std::thread::Builder::new()
            .name("cipher-sandbox".into())
            .stack_size(self.stack_size)
            .spawn(move || {
                let result = engine.evaluate(&program, &entry_point, &arg, &thread_guard);
                // The receiver is gone when the deadline already passed
                let _ = tx.send(result);
            })
            .map_err(|e| CipherError::Execution(format!("cannot start sandbox thread: {}", e)))?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CipherError::Execution(
                "sandbox thread exited without a result".into(),
            )),
            Err(_) => {
                guard.cancel();
                Err(CipherError::Timeout(timeout))
            }
        }
    }

    /// [`Sandbox::run`] on a full script, retrying once on sanitized text if
    /// the interpreter could not parse it
    pub async fn run_full(
        &self,
        program: &str,
        entry_point: &str,
        arg: &str,
        timeout: Duration,
    ) -> Result<String> {
        match self.run(program, entry_point, arg, timeout).await {
            Err(CipherError::ScriptSyntax(reason)) => {
                let sanitized = sanitize(program);
                if sanitized == program {
                    return Err(CipherError::ScriptSyntax(reason));
                }
                debug!(%reason, "retrying with sanitized script");
                self.run(&sanitized, entry_point, arg, timeout).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::platform::cipher::fixtures::THROTTLE_FIXTURE;
    use std::sync::atomic::AtomicUsize;

    /// Engine double with canned behavior per program
    pub(crate) struct ScriptedEngine {
        pub calls: AtomicUsize,
        pub behavior: Box<dyn Fn(&str, &str, &str) -> Result<String> + Send + Sync>,
    }

    impl ScriptedEngine {
        pub fn new<F>(behavior: F) -> Self
        where
            F: Fn(&str, &str, &str) -> Result<String> + Send + Sync + 'static,
        {
            Self {
                calls: AtomicUsize::new(0),
                behavior: Box::new(behavior),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ScriptEngine for ScriptedEngine {
        fn evaluate(
            &self,
            program: &str,
            entry_point: &str,
            arg: &str,
            _guard: &ExecutionGuard,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.behavior)(program, entry_point, arg)
        }
    }

    #[test]
    fn test_guard_runs_terminator_registered_after_cancel() {
        let guard = ExecutionGuard::new();
        guard.cancel();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        guard.set_terminator(move || flag.store(true, Ordering::SeqCst));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let engine = ScriptedEngine::new(|_, _, _| {
            std::thread::sleep(Duration::from_millis(500));
            Ok("late".into())
        });
        let sandbox = Sandbox::new(Arc::new(engine));
        let err = sandbox
            .run("loop()", "f", "x", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_thread_spawn_failure_is_execution_error() {
        let engine = Arc::new(ScriptedEngine::new(|_, _, _| Ok("never".into())));
        let sandbox = Sandbox::new(engine.clone()).with_stack_size(1 << 50);
        let err = sandbox
            .run("var a=1;", "f", "x", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, CipherError::Execution(_)));
        assert!(err.is_fallthrough());
        assert_eq!(engine.calls(), 0);
    }

    #[tokio::test]
    async fn test_run_full_retries_sanitized_on_syntax_error() {
        let engine = Arc::new(ScriptedEngine::new(|program, _, arg| {
            if program.contains("(?>") {
                Err(CipherError::ScriptSyntax("Invalid regular expression".into()))
            } else {
                Ok(arg.chars().rev().collect())
            }
        }));
        let sandbox = Sandbox::new(engine.clone());
        let out = sandbox
            .run_full("var r=/(?>abc)/;", "ncode", "abc", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out, "cba");
        assert_eq!(engine.calls(), 2);
    }

    #[tokio::test]
    async fn test_run_full_does_not_retry_execution_errors() {
        let engine = Arc::new(ScriptedEngine::new(|_, _, _| {
            Err(CipherError::Execution("ReferenceError".into()))
        }));
        let sandbox = Sandbox::new(engine.clone());
        let err = sandbox
            .run_full("var r=/(?=a)/;", "f", "x", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, CipherError::Execution(_)));
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn test_run_full_does_not_retry_timeouts() {
        let engine = Arc::new(ScriptedEngine::new(|_, _, _| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(String::new())
        }));
        let sandbox = Sandbox::new(engine.clone());
        let err = sandbox
            .run_full("var r=/(?=a)/;", "f", "x", Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn test_deno_engine_runs_entry_point() {
        let out = Sandbox::deno()
            .run(THROTTLE_FIXTURE, "ncode", "abcdef", Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(out, "fedcba");
    }

    #[tokio::test]
    async fn test_deno_engine_error_kinds() {
        let sandbox = Sandbox::deno();
        let timeout = Duration::from_secs(30);

        let missing = sandbox.run("var a=1;", "ncode", "x", timeout).await;
        assert!(matches!(missing, Err(CipherError::Execution(_))));

        let number = sandbox
            .run("function f(a){return 1}", "f", "x", timeout)
            .await;
        assert!(matches!(number, Err(CipherError::Execution(_))));

        let syntax = sandbox.run("function (", "f", "x", timeout).await;
        assert!(matches!(syntax, Err(CipherError::ScriptSyntax(_))));
    }

    #[tokio::test]
    async fn test_deno_engine_is_terminated_on_timeout() {
        let err = Sandbox::deno()
            .run(
                "function spin(a){for(;;){}}",
                "spin",
                "x",
                Duration::from_millis(200),
            )
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
