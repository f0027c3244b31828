//! 全局 Subscriber 安装：独立测试二进制，避免与 `tracing-test` 的全局安装冲突。

use spark_pipeline::{ErrorKind, logging::install_fmt_subscriber};

#[test]
fn second_install_reports_configuration_error() {
    install_fmt_subscriber("spark_pipeline=debug").expect("首次安装应成功");
    let err = install_fmt_subscriber("info").expect_err("重复安装应失败");
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
