// tests/runtime_scheduling.rs

mod common;
use crate::common::builders::PipelineBuilder;
use crate::common::fake_evaluator::FakeEvaluator;
use crate::common::{TestResult, engine, init_tracing, memory_store, with_timeout};

use std::time::Duration;

use reprodag::engine::RunOptions;
use reprodag::report::TargetOutcome;

#[tokio::test]
async fn never_more_workers_than_the_concurrency_bound() -> TestResult {
    init_tracing();
    let store = memory_store();
    let eval = FakeEvaluator::new();
    eval.set_default_delay(Duration::from_millis(40));

    let mut builder = PipelineBuilder::new().concurrency(2);
    for i in 0..6 {
        builder = builder.target(&format!("leaf_{i}"), "measure()");
    }

    let report = with_timeout(engine(builder.build(), &store, &eval).run(&RunOptions::all())).await?;

    assert_eq!(report.count(TargetOutcome::Built), 6);
    assert_eq!(eval.max_in_flight(), 2);
    Ok(())
}

#[tokio::test]
async fn run_option_overrides_configured_concurrency() -> TestResult {
    init_tracing();
    let store = memory_store();
    let eval = FakeEvaluator::new();
    eval.set_default_delay(Duration::from_millis(40));

    let mut builder = PipelineBuilder::new().concurrency(1);
    for i in 0..4 {
        builder = builder.target(&format!("leaf_{i}"), "measure()");
    }

    let options = RunOptions::all().concurrency(4);
    with_timeout(engine(builder.build(), &store, &eval).run(&options)).await?;

    assert_eq!(eval.max_in_flight(), 4);
    Ok(())
}

#[tokio::test]
async fn targets_start_only_after_their_dependencies() -> TestResult {
    init_tracing();
    let store = memory_store();
    let eval = FakeEvaluator::new();
    eval.set_delay("left", Duration::from_millis(30));

    //   root
    //   /  \
    // left right
    //   \  /
    //   join
    let pipeline = PipelineBuilder::new()
        .concurrency(4)
        .target("join", "merge(left, right)")
        .target("left", "split_left(root)")
        .target("right", "split_right(root)")
        .target("root", "load()")
        .build();

    let report = with_timeout(engine(pipeline, &store, &eval).run(&RunOptions::all())).await?;
    assert_eq!(report.count(TargetOutcome::Built), 4);

    let calls = eval.calls();
    let pos = |name: &str| calls.iter().position(|c| c == name).unwrap();
    assert_eq!(pos("root"), 0);
    assert!(pos("left") > pos("root"));
    assert!(pos("right") > pos("root"));
    assert_eq!(pos("join"), 3);
    Ok(())
}

#[tokio::test]
async fn ready_targets_start_in_declaration_order() -> TestResult {
    init_tracing();
    let store = memory_store();
    let eval = FakeEvaluator::new();

    let pipeline = PipelineBuilder::new()
        .target("zeta", "z()")
        .target("alpha", "a()")
        .target("mid", "m()")
        .build();

    engine(pipeline, &store, &eval).run(&RunOptions::all()).await?;
    assert_eq!(eval.calls(), vec!["zeta", "alpha", "mid"]);
    Ok(())
}

#[tokio::test]
async fn report_lists_targets_in_declaration_order() -> TestResult {
    init_tracing();
    let store = memory_store();
    let eval = FakeEvaluator::new();

    let pipeline = PipelineBuilder::new()
        .target("plot", "draw(model)")
        .target("model", "fit()")
        .build();

    let report = engine(pipeline, &store, &eval).run(&RunOptions::all()).await?;
    let names: Vec<_> = report.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["plot", "model"]);
    assert!(report.entries.iter().all(|e| e.started_at.is_some()));
    Ok(())
}

#[tokio::test]
async fn cancelling_lets_running_targets_finish_and_starts_nothing_new() -> TestResult {
    init_tracing();
    let store = memory_store();
    let eval = FakeEvaluator::new();
    eval.set_delay("first", Duration::from_millis(200));

    let pipeline = PipelineBuilder::new()
        .target("first", "slow()")
        .target("second", "next(first)")
        .target("third", "last(second)")
        .build();
    let engine = engine(pipeline, &store, &eval);

    let (runtime, cancel) = engine.prepare(&RunOptions::all())?;
    let (report, ()) = with_timeout(async {
        tokio::join!(runtime.run(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(cancel.try_cancel());
        })
    })
    .await;
    let report = report?;

    assert!(report.cancelled);
    assert_eq!(report.outcome_of("first"), Some(TargetOutcome::Built));
    assert_eq!(report.outcome_of("second"), Some(TargetOutcome::Cancelled));
    assert_eq!(report.outcome_of("third"), Some(TargetOutcome::Cancelled));
    assert_eq!(eval.calls(), vec!["first"]);

    // The finished target was persisted; the rest run next time.
    eval.clear_calls();
    let resumed = engine.run(&RunOptions::all()).await?;
    assert_eq!(resumed.outcome_of("first"), Some(TargetOutcome::Current));
    assert_eq!(eval.calls(), vec!["second", "third"]);
    Ok(())
}

#[tokio::test]
async fn subset_runs_only_the_targets_and_their_ancestors() -> TestResult {
    init_tracing();
    let store = memory_store();
    let eval = FakeEvaluator::new();

    let pipeline = || {
        PipelineBuilder::new()
            .target("raw", "load()")
            .target("clean", "tidy(raw)")
            .target("model", "fit(clean)")
            .target("plot2", "draw(axes)")
            .build()
    };

    let report = engine(pipeline(), &store, &eval)
        .run(&RunOptions::all().target("clean"))
        .await?;

    assert_eq!(report.outcome_of("raw"), Some(TargetOutcome::Built));
    assert_eq!(report.outcome_of("clean"), Some(TargetOutcome::Built));
    assert_eq!(report.outcome_of("model"), Some(TargetOutcome::Skipped));
    assert_eq!(report.outcome_of("plot2"), Some(TargetOutcome::Skipped));
    assert_eq!(eval.calls(), vec!["raw", "clean"]);

    let rest = engine(pipeline(), &store, &eval).run(&RunOptions::all()).await?;
    assert_eq!(rest.outcome_of("raw"), Some(TargetOutcome::Current));
    assert_eq!(rest.outcome_of("model"), Some(TargetOutcome::Built));
    assert_eq!(rest.outcome_of("plot2"), Some(TargetOutcome::Built));
    Ok(())
}
