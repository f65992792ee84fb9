//! In-process evaluation backends for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use reprodag::errors::{PipelineError, Result};
use reprodag::exec::{
    Dispatcher, EvalFuture, EvalOutput, EvalRequest, Evaluator, RenderRequest, Renderer,
};

/// Custom response for one target.
pub type Behaviour = Arc<dyn Fn(&EvalRequest) -> Result<EvalOutput> + Send + Sync>;

/// A fake evaluator that:
/// - records which targets were evaluated, in order
/// - returns a value derived from the target name and its inputs unless a
///   canned value, failure or custom behaviour is registered
/// - can delay targets, and tracks how many evaluations overlapped
///
/// All setters take `&self` so a test can keep an `Arc` to the evaluator
/// it handed to the engine and change behaviour between runs.
#[derive(Default)]
pub struct FakeEvaluator {
    behaviours: Mutex<HashMap<String, Behaviour>>,
    delays: Mutex<HashMap<String, Duration>>,
    default_delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeEvaluator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Always return `value` for `name`.
    pub fn set_value(&self, name: &str, value: Value) {
        self.set_behaviour(name, move |_| Ok(EvalOutput::new(value.clone())));
    }

    /// Fail every evaluation of `name` with `message`.
    pub fn set_failure(&self, name: &str, message: &str) {
        let message = message.to_string();
        self.set_behaviour(name, move |req| {
            Err(PipelineError::Evaluator {
                target: req.name.clone(),
                message: message.clone(),
            })
        });
    }

    pub fn set_behaviour<F>(&self, name: &str, f: F)
    where
        F: Fn(&EvalRequest) -> Result<EvalOutput> + Send + Sync + 'static,
    {
        self.behaviours
            .lock()
            .unwrap()
            .insert(name.to_string(), Arc::new(f));
    }

    /// Go back to the derived default value for `name`.
    pub fn reset(&self, name: &str) {
        self.behaviours.lock().unwrap().remove(name);
    }

    pub fn set_delay(&self, name: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(name.to_string(), delay);
    }

    /// Delay applied to targets without their own.
    pub fn set_default_delay(&self, delay: Duration) {
        *self.default_delay.lock().unwrap() = Some(delay);
    }

    /// Targets evaluated so far, in the order they started.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == name).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Highest number of evaluations that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn delay_for(&self, name: &str) -> Option<Duration> {
        let own = self.delays.lock().unwrap().get(name).copied();
        own.or(*self.default_delay.lock().unwrap())
    }

    fn respond(&self, request: &EvalRequest) -> Result<EvalOutput> {
        let behaviour = self.behaviours.lock().unwrap().get(&request.name).cloned();
        match behaviour {
            Some(f) => f(request),
            None => Ok(EvalOutput::new(derived_value(request))),
        }
    }
}

/// `{"target": name, "inputs": {dep: arg, ..}}`: changes whenever any input
/// changes, so propagation is observable through values alone.
pub fn derived_value(request: &EvalRequest) -> Value {
    let inputs: serde_json::Map<String, Value> = request
        .inputs
        .iter()
        .map(|(dep, input)| (dep.clone(), Value::String(input.to_arg())))
        .collect();
    json!({ "target": request.name, "inputs": inputs })
}

/// Decrements the in-flight counter even when the evaluation future is
/// dropped by a timeout.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Evaluator for FakeEvaluator {
    fn evaluate(&self, request: EvalRequest) -> EvalFuture<'_> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(request.name.clone());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);

            if let Some(delay) = self.delay_for(&request.name) {
                tokio::time::sleep(delay).await;
            }

            self.respond(&request)
        })
    }
}

/// A fake renderer that writes the resolved inputs of a render target to
/// its output file (below `workdir`) and returns the output path.
#[derive(Debug)]
pub struct FakeRenderer {
    workdir: PathBuf,
    calls: Mutex<Vec<String>>,
}

impl FakeRenderer {
    pub fn new(workdir: impl AsRef<Path>) -> Arc<Self> {
        Arc::new(Self {
            workdir: workdir.as_ref().to_path_buf(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Renderer for FakeRenderer {
    fn render(&self, request: RenderRequest) -> EvalFuture<'_> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(request.name.clone());

            let body: Vec<String> = request
                .inputs
                .iter()
                .map(|(dep, input)| format!("{dep}={}", input.to_arg()))
                .collect();
            let out = self.workdir.join(&request.output);
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&out, body.join("\n"))?;

            Ok(EvalOutput::new(Value::String(
                request.output.to_string_lossy().into_owned(),
            )))
        })
    }
}

/// Dispatcher over a fake evaluator and a fake renderer rooted at `workdir`.
pub fn fake_dispatcher(evaluator: &Arc<FakeEvaluator>, workdir: impl AsRef<Path>) -> Dispatcher {
    Dispatcher::new(evaluator.clone(), FakeRenderer::new(workdir))
}
