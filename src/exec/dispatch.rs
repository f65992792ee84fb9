// src/exec/dispatch.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::Result;
use crate::exec::backend::{EvalOutput, EvalRequest, Evaluator, Input, RenderRequest, Renderer};
use crate::pipeline::{CommandKind, Target};
use crate::types::{StorageFormat, TargetName};

/// Routes a target to the evaluator or the renderer depending on its command.
#[derive(Clone)]
pub struct Dispatcher {
    evaluator: Arc<dyn Evaluator>,
    renderer: Arc<dyn Renderer>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(evaluator: Arc<dyn Evaluator>, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            evaluator,
            renderer,
        }
    }

    pub async fn dispatch(
        &self,
        target: &Target,
        format: StorageFormat,
        inputs: BTreeMap<TargetName, Input>,
    ) -> Result<EvalOutput> {
        match &target.command.kind {
            CommandKind::Evaluate => {
                let request = EvalRequest {
                    name: target.name.clone(),
                    source: target.command.source.clone(),
                    format,
                    seed: target.effective_seed(),
                    inputs,
                };
                self.evaluator.evaluate(request).await
            }
            CommandKind::Render(spec) => {
                let request = RenderRequest {
                    name: target.name.clone(),
                    document: spec.document.clone(),
                    output: spec.output.clone(),
                    inputs,
                };
                self.renderer.render(request).await
            }
        }
    }
}
