use std::sync::Arc;

use spark_pipeline::{
    ByteChannel, CallPhases, CallPipelines, Content, EngineCatalog, EngineConfig, ErrorKind,
    PipelineEngineFactory, PipelineError, TransformTable,
    phases::{call_pipeline, receive_pipeline, send_pipeline},
};

/// 调用管道在 `Call` 阶段读取请求体并原样回显。
fn echo_pipelines() -> Arc<CallPipelines> {
    let mut call = call_pipeline().expect("构造调用管道失败");
    call.intercept_fn(&CallPhases::CALL, "echo", |ctx| {
        Box::pin(async move {
            let call = ctx.context_handle();
            let pipelines = call
                .pipelines()
                .cloned()
                .ok_or_else(|| PipelineError::Configuration("call has no pipelines".to_owned()))?;
            let body: String = call.receive(&pipelines.receive).await?;
            call.respond(&pipelines.send, Content::new(format!("echo: {body}")))
                .await
        })
    })
    .expect("注册失败");

    Arc::new(CallPipelines {
        call,
        receive: receive_pipeline().expect("构造接收管道失败"),
        send: send_pipeline(Arc::new(TransformTable::with_defaults()))
            .expect("构造发送管道失败"),
    })
}

fn catalog() -> EngineCatalog {
    EngineCatalog::default().with_factory(PipelineEngineFactory::new(echo_pipelines()))
}

/// 按配置选中引擎并完整执行一次调用。
#[tokio::test]
async fn configured_engine_dispatches_call() {
    let config = EngineConfig::from_toml_str(
        r#"
        engine = "pipeline"

        [pool]
        capacity = 8
        "#,
    )
    .expect("解析配置失败");
    let catalog = catalog();
    assert_eq!(catalog.names(), ["pipeline"]);

    let engine = catalog.create(&config).expect("创建引擎失败");
    assert_eq!(engine.name(), "pipeline");

    let call = engine
        .call_builder()
        .expect("构造调用失败")
        .method("POST")
        .body(ByteChannel::from_bytes("ping"))
        .build();
    engine.dispatch(Arc::clone(&call)).await.expect("调用失败");

    assert!(call.is_responded());
    let body = call
        .response_body()
        .read_remaining(64)
        .await
        .expect("读取响应体失败");
    assert_eq!(&body[..], b"echo: ping");
}

/// 目录中没有同名引擎时在启动期失败。
#[test]
fn unknown_engine_is_a_configuration_error() {
    let config = EngineConfig {
        engine: Some("quic".to_owned()),
        ..EngineConfig::default()
    };
    let err = catalog().create(&config).err().expect("未知引擎应失败");
    assert!(matches!(&err, PipelineError::EngineNotFound { name } if name == "quic"));
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let empty = EngineCatalog::default();
    assert!(empty.create(&EngineConfig::default()).is_err());
}

/// 请求超时配置作用于整个调用。
#[tokio::test]
async fn request_timeout_bounds_dispatch() {
    let config =
        EngineConfig::from_toml_str("[call]\nrequest_timeout_ms = 20").expect("解析配置失败");
    let engine = catalog().create(&config).expect("创建引擎失败");

    // 请求体永不结束，回显拦截器一直挂起在读取上。
    let call = engine
        .call_builder()
        .expect("构造调用失败")
        .body(ByteChannel::new())
        .build();
    let err = engine
        .dispatch(Arc::clone(&call))
        .await
        .expect_err("应超时");
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(call.is_cancelled());
}
