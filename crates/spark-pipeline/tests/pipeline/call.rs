use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use spark_io::{CancellationError, TimeoutError};
use spark_pipeline::{
    AttributeKey, ByteChannel, Call, CallPhases, CallPipelines, Content, ErrorKind, Pipeline,
    PipelineError, ResponseFailed, SendPhases, TransformTable,
    phases::{call_pipeline, receive_pipeline, send_pipeline},
};
use tracing_test::traced_test;

use super::support::Boom;

const USER: AttributeKey<String> = AttributeKey::new("user");

/// 同一调用第二次接收请求体失败。
#[tokio::test]
async fn second_receive_is_rejected() {
    let receive = receive_pipeline().expect("构造接收管道失败");
    let call = Call::builder()
        .method("POST")
        .uri("/echo")
        .body(ByteChannel::from_bytes("hello"))
        .build();

    let body: String = call.receive(&receive).await.expect("首次接收失败");
    assert_eq!(body, "hello");
    assert!(call.is_received());

    let err = call
        .receive::<String>(&receive)
        .await
        .expect_err("第二次接收应失败");
    assert!(matches!(err, PipelineError::DoubleReceive));
    assert_eq!(err.kind(), ErrorKind::Transformation);
}

/// 接收管道无法产出目标类型时返回转换错误。
#[tokio::test]
async fn receive_without_transformation_fails() {
    let receive = receive_pipeline().expect("构造接收管道失败");
    let call = Call::builder().body(ByteChannel::from_bytes("42")).build();

    let err = call
        .receive::<u32>(&receive)
        .await
        .expect_err("没有 u32 转换时应失败");
    assert!(matches!(
        err,
        PipelineError::NoTransformation { ref to, .. } if to == "u32"
    ));
}

/// 请求体不是合法 UTF-8 时按转换失败报告，而不是 I/O 失败。
#[tokio::test]
async fn non_utf8_body_is_a_transformation_failure() {
    let receive = receive_pipeline().expect("构造接收管道失败");
    let call = Call::builder()
        .body(ByteChannel::from_bytes(Bytes::from_static(&[0xff, 0xfe, 0x41])))
        .build();

    let err = call
        .receive::<String>(&receive)
        .await
        .expect_err("非法 UTF-8 不应读成 String");
    assert!(matches!(err, PipelineError::InvalidContent { ref to, .. } if to.contains("String")));
    assert_eq!(err.kind(), ErrorKind::Transformation);
    assert_eq!(err.code(), "pipeline.invalid_content");
}

struct Greeting(&'static str);

/// 业务值经转换表渲染成字节写入响应体；重复响应被拒绝。
#[tokio::test]
async fn respond_renders_through_transform_table() {
    let mut table = TransformTable::with_defaults();
    table.register_typed(|greeting: Greeting| Ok(format!("hello, {}", greeting.0)));
    let mut send = send_pipeline(Arc::new(table)).expect("构造发送管道失败");
    send.intercept_fn(&SendPhases::AFTER, "content-length", |ctx| {
        Box::pin(async move {
            if let Some(bytes) = ctx.subject().downcast_ref::<Bytes>() {
                let length = bytes.len().to_string();
                ctx.context()
                    .update_response(|head| head.headers.set("Content-Length", length));
            }
            Ok(())
        })
    })
    .expect("注册失败");

    let call = Call::builder().build();
    call.respond(&send, Content::new(Greeting("spark")))
        .await
        .expect("响应失败");

    let body = call
        .response_body()
        .read_remaining(1024)
        .await
        .expect("读取响应体失败");
    assert_eq!(&body[..], b"hello, spark");
    assert_eq!(call.response_head().headers.get("content-length"), Some("12"));
    assert!(call.response_body().is_closed_for_read());

    assert!(matches!(
        call.respond(&send, Content::unit()).await,
        Err(PipelineError::ResponseAlreadySent)
    ));
}

/// 以通道作为响应值时完整复制到响应体。
#[tokio::test]
async fn respond_with_channel_copies_body() {
    let send: Pipeline<Content, Call> = Pipeline::empty();
    let call = Call::builder().build();
    call.respond(&send, Content::new(ByteChannel::from_bytes("streamed")))
        .await
        .expect("响应失败");
    let body = call
        .response_body()
        .read_remaining(64)
        .await
        .expect("读取响应体失败");
    assert_eq!(&body[..], b"streamed");
}

/// 渲染失败时响应体以失败关闭，读取响应体的一方立即得到错误。
#[tokio::test]
async fn failed_render_closes_response_body() {
    let mut send = send_pipeline(Arc::new(TransformTable::with_defaults())).expect("构造发送管道失败");
    send.intercept_fn(&SendPhases::BEFORE, "reject", |_ctx| {
        Box::pin(async { Err(PipelineError::interceptor(Boom("reject"))) })
    })
    .expect("注册失败");

    let call = Call::builder().build();
    let err = call
        .respond(&send, Content::new(String::from("never sent")))
        .await
        .expect_err("拦截器失败时响应应失败");
    assert_eq!(err.kind(), ErrorKind::Interceptor);

    let read = tokio::time::timeout(Duration::from_secs(1), call.response_body().await_content())
        .await
        .expect("响应体不应一直挂起");
    let failure = read.expect_err("响应体应以失败结束");
    let cause = failure.cause().expect("失败应携带原因");
    let wrapped = cause
        .downcast_ref::<ResponseFailed>()
        .expect("原因应为 ResponseFailed");
    assert_eq!(wrapped.code(), "pipeline.interceptor");
}

/// 属性在同一调用的不同阶段之间共享。
#[tokio::test]
async fn attributes_flow_between_phases() {
    let mut pipeline = call_pipeline().expect("构造调用管道失败");
    pipeline
        .intercept_fn(&CallPhases::SETUP, "auth", |ctx| {
            Box::pin(async move {
                ctx.context().attributes().put(USER, "alice".to_owned());
                Ok(())
            })
        })
        .expect("注册失败");
    pipeline
        .intercept_fn(&CallPhases::CALL, "handler", |ctx| {
            Box::pin(async move {
                let user = ctx.context().attributes().get(USER);
                ctx.context()
                    .set_status(if user.is_some() { 200 } else { 401 });
                Ok(())
            })
        })
        .expect("注册失败");

    let call = Call::builder().build();
    pipeline
        .execute(Arc::clone(&call), ())
        .await
        .expect("执行失败");
    assert_eq!(call.status(), 200);
}

/// 取消调用时，挂起在请求体上的拦截器立即以取消错误返回。
#[tokio::test]
#[traced_test]
async fn cancel_unblocks_suspended_interceptor() {
    let mut pipeline = call_pipeline().expect("构造调用管道失败");
    pipeline
        .intercept_fn(&CallPhases::CALL, "read-body", |ctx| {
            Box::pin(async move {
                ctx.context().request_body().await_content().await?;
                Ok(())
            })
        })
        .expect("注册失败");
    let pipeline = Arc::new(pipeline);

    let call = Call::builder().body(ByteChannel::new()).build();
    let running = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        let call = Arc::clone(&call);
        async move { pipeline.execute(call, ()).await }
    });
    tokio::task::yield_now().await;

    assert!(call.cancel("client went away"));
    let err = running
        .await
        .expect("任务失败")
        .expect_err("应以取消结束");
    assert_eq!(err.kind(), ErrorKind::Cancellation);
    assert!(matches!(
        &err,
        PipelineError::Cancelled(cause)
            if cause.downcast_ref::<CancellationError>().map(CancellationError::reason)
                == Some("client went away")
    ));
    assert!(logs_contain("call cancelled"));
}

/// 截止时间到期：返回超时错误，并与手动取消一样取消调用的通道。
#[tokio::test]
async fn deadline_cancels_call_with_timeout_cause() {
    let pipelines = CallPipelines::with_defaults().expect("构造标准管道失败");
    let call = Call::builder().body(ByteChannel::new()).build();
    let limit = Duration::from_millis(20);

    let err = call
        .run_with_deadline(limit, call.receive::<Bytes>(&pipelines.receive))
        .await
        .expect_err("应超时");
    assert!(matches!(err, PipelineError::Timeout(l) if l == limit));
    assert!(call.is_cancelled());

    let closed = call
        .request_body()
        .closed_cause()
        .expect("请求体应已终止");
    assert!(closed.is_timeout());
    assert!(
        closed
            .cause()
            .and_then(|cause| cause.downcast_ref::<TimeoutError>())
            .is_some()
    );
}
