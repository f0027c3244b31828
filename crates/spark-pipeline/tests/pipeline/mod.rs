//! `pipeline` 集成测试：阶段顺序、短路、合并、调用上下文、内容转换与引擎目录。

mod call;
mod engine;
mod merge;
mod ordering;
mod support;
mod transform;
