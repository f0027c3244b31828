use std::sync::Arc;

use spark_pipeline::{ErrorKind, Phase, Pipeline, PipelineError, ReceivePhases};
use tracing_test::traced_test;

use super::support::{Boom, Record, Trace};

const A: Phase = Phase::new("A");
const B: Phase = Phase::new("B");
const C: Phase = Phase::new("C");

fn abc() -> Pipeline<String, Trace> {
    Pipeline::new([A, B, C]).expect("构造管道失败")
}

/// 拦截器多次挂起也不会打乱顺序；并发执行互不干扰各自的游标。
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn order_is_stable_across_suspension() {
    let mut pipeline = abc();
    pipeline
        .intercept(&A, Record::yielding("a1", 3))
        .expect("注册失败");
    pipeline.intercept(&A, Record::new("a2")).expect("注册失败");
    pipeline
        .intercept(&B, Record::yielding("b1", 5))
        .expect("注册失败");
    let pipeline = Arc::new(pipeline);

    let runs: Vec<_> = (0..8)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                let trace = Arc::new(Trace::default());
                pipeline
                    .execute(Arc::clone(&trace), "x".to_owned())
                    .await
                    .expect("执行失败");
                trace.snapshot()
            })
        })
        .collect();

    for run in runs {
        assert_eq!(run.await.expect("任务失败"), ["a1", "a2", "b1"]);
    }
}

/// `finish` 之后剩余拦截器不再执行，返回 finish 时的主体。
#[tokio::test]
async fn finish_short_circuits_remaining_chain() {
    let mut pipeline = abc();
    pipeline
        .intercept_fn(&A, "a1", |ctx| {
            Box::pin(async move {
                ctx.context().push("a1");
                ctx.set_subject("from-a1".to_owned());
                ctx.finish();
                Ok(())
            })
        })
        .expect("注册失败");
    pipeline.intercept(&A, Record::new("a2")).expect("注册失败");
    pipeline.intercept(&B, Record::new("b1")).expect("注册失败");

    let trace = Arc::new(Trace::default());
    let subject = pipeline
        .execute(Arc::clone(&trace), "x".to_owned())
        .await
        .expect("执行失败");
    assert_eq!(subject, "from-a1");
    assert_eq!(trace.snapshot(), ["a1"]);
}

/// 每个阶段一个记录拦截器，主体保持不变。
#[tokio::test]
async fn receive_phases_run_in_declared_order() {
    let mut pipeline: Pipeline<String, Trace> =
        Pipeline::new(ReceivePhases::ALL).expect("构造管道失败");
    pipeline
        .intercept(&ReceivePhases::BEFORE, Record::new("Before"))
        .expect("注册失败");
    pipeline
        .intercept(&ReceivePhases::TRANSFORM, Record::new("Transform"))
        .expect("注册失败");
    pipeline
        .intercept(&ReceivePhases::AFTER, Record::new("After"))
        .expect("注册失败");

    let trace = Arc::new(Trace::default());
    let subject = pipeline
        .execute(Arc::clone(&trace), "x".to_owned())
        .await
        .expect("执行失败");
    assert_eq!(trace.snapshot(), ["Before", "Transform", "After"]);
    assert_eq!(subject, "x");
}

/// 拦截器内部调用 `proceed` 可以包裹后续链路，后续拦截器只运行一次。
#[tokio::test]
async fn nested_proceed_wraps_downstream() {
    let mut pipeline = abc();
    pipeline
        .intercept_fn(&A, "timer", |ctx| {
            Box::pin(async move {
                ctx.context().push("timer:start");
                ctx.proceed().await?;
                ctx.context().push("timer:end");
                Ok(())
            })
        })
        .expect("注册失败");
    pipeline.intercept(&B, Record::yielding("b1", 2)).expect("注册失败");
    pipeline.intercept(&C, Record::new("c1")).expect("注册失败");

    let trace = Arc::new(Trace::default());
    pipeline
        .execute(Arc::clone(&trace), String::new())
        .await
        .expect("执行失败");
    assert_eq!(
        trace.snapshot(),
        ["timer:start", "b1", "c1", "timer:end"]
    );
}

/// 未被捕获的错误立即终止执行，并原样返回给调用方。
#[tokio::test]
async fn uncaught_error_halts_execution() {
    let mut pipeline = abc();
    pipeline.intercept(&A, Record::new("a1")).expect("注册失败");
    pipeline
        .intercept_fn(&B, "fails", |_ctx| {
            Box::pin(async { Err::<(), _>(PipelineError::interceptor(Boom("b1"))) })
        })
        .expect("注册失败");
    pipeline.intercept(&C, Record::new("c1")).expect("注册失败");

    let trace = Arc::new(Trace::default());
    let err = pipeline
        .execute(Arc::clone(&trace), String::new())
        .await
        .expect_err("应返回拦截器错误");
    assert_eq!(err.kind(), ErrorKind::Interceptor);
    assert_eq!(trace.snapshot(), ["a1"], "出错之后的拦截器不应执行");
}

/// 靠前的拦截器可以捕获后续链路的错误并改写结果。
#[tokio::test]
async fn earlier_interceptor_can_catch_downstream_error() {
    let mut pipeline = abc();
    pipeline
        .intercept_fn(&A, "recover", |ctx| {
            Box::pin(async move {
                match ctx.proceed().await {
                    Err(PipelineError::Interceptor(source)) => {
                        ctx.context().push(format!("caught: {source}"));
                        ctx.set_subject("recovered".to_owned());
                        ctx.finish();
                        Ok(())
                    }
                    other => other,
                }
            })
        })
        .expect("注册失败");
    pipeline
        .intercept_fn(&B, "fails", |_ctx| {
            Box::pin(async { Err::<(), _>(PipelineError::interceptor(Boom("b1"))) })
        })
        .expect("注册失败");
    pipeline.intercept(&C, Record::new("c1")).expect("注册失败");

    let trace = Arc::new(Trace::default());
    let subject = pipeline
        .execute(Arc::clone(&trace), String::new())
        .await
        .expect("错误应被捕获");
    assert_eq!(subject, "recovered");
    assert_eq!(trace.snapshot(), ["caught: interceptor `b1` failed"]);
}

/// 首次执行后配置变更一律失败。
#[tokio::test]
#[traced_test]
async fn configuration_is_sealed_after_first_execute() {
    let mut pipeline = abc();
    pipeline.intercept(&A, Record::new("a1")).expect("注册失败");
    assert!(!pipeline.is_sealed());

    pipeline
        .execute(Trace::default(), String::new())
        .await
        .expect("执行失败");
    assert!(pipeline.is_sealed());
    assert!(logs_contain("pipeline sealed"));

    assert!(matches!(
        pipeline.intercept(&B, Record::new("late")),
        Err(PipelineError::Sealed { operation: "intercept" })
    ));
    assert!(matches!(
        pipeline.add_phase(Phase::new("D")),
        Err(PipelineError::Sealed { .. })
    ));
    assert_eq!(pipeline.interceptor_count(), 1);
}

/// 空管道直接返回初始主体。
#[tokio::test]
async fn empty_pipeline_returns_initial_subject() {
    let pipeline = abc();
    assert!(pipeline.is_empty());
    let subject = pipeline
        .execute(Trace::default(), "untouched".to_owned())
        .await
        .expect("执行失败");
    assert_eq!(subject, "untouched");
}
