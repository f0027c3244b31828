//! 按类型层级分派的内容转换表。
//!
//! # 教案式说明
//! - **意图（Why）**：发送管道需要把任意业务值渲染成可写出的字节，接收管道需要把字节还原成目标类型；
//!   插件只需针对某个类型（或它的父类型/接口）注册处理器，而不必关心具体值从哪里来；
//! - **逻辑（How）**：
//!   - 处理器按“声明类型 + 可选谓词”登记；
//!   - `transform` 取当前值的类型线性化序列（见 [`TypeHierarchy::linearize`]），按序列顺序、
//!     同类型内按登记顺序挑出第一个尚未运行且谓词接受的处理器，执行后以输出作为新的当前值，
//!     再以新值的类型重新计算候选序列；
//! - **契约（What）**：
//!   - 同一次 `transform` 中每个处理器至多运行一次，因此转换必然终止；
//!   - 没有可用处理器时原值返回，是否满足调用方期望由调用方判断；
//!   - 处理器错误立即终止转换并原样返回。

use std::{collections::HashSet, fmt, mem, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use crate::{Content, Interceptor, PipelineContext, Result, TypeHierarchy, TypeKey};

type Predicate = Box<dyn Fn(&Content) -> bool + Send + Sync>;
type Handler = Box<dyn Fn(Content) -> Result<Content> + Send + Sync>;

struct Registration {
    declared: TypeKey,
    predicate: Option<Predicate>,
    handler: Handler,
}

/// 内容转换表。
#[derive(Default)]
pub struct TransformTable {
    hierarchy: TypeHierarchy,
    registrations: Vec<Registration>,
}

impl TransformTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置 `String`、`Vec<u8>`、`&'static str` 到 [`Bytes`] 的转换。
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.register_typed(|text: String| Ok(Bytes::from(text)));
        table.register_typed(|raw: Vec<u8>| Ok(Bytes::from(raw)));
        table.register_typed(|text: &'static str| Ok(Bytes::from_static(text.as_bytes())));
        table
    }

    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    /// 声明类型层级，见 [`TypeHierarchy::declare`]。
    pub fn declare(&mut self, sub: TypeKey, supers: impl IntoIterator<Item = TypeKey>) {
        self.hierarchy.declare(sub, supers);
    }

    /// 为声明类型登记处理器，可附带谓词。
    pub fn register<F>(
        &mut self,
        declared: TypeKey,
        predicate: Option<Box<dyn Fn(&Content) -> bool + Send + Sync>>,
        handler: F,
    ) where
        F: Fn(Content) -> Result<Content> + Send + Sync + 'static,
    {
        self.registrations.push(Registration {
            declared,
            predicate,
            handler: Box::new(handler),
        });
    }

    /// 为具体类型 `T` 登记强类型处理器。
    pub fn register_typed<T, R, F>(&mut self, handler: F)
    where
        T: Send + Sync + 'static,
        R: Send + Sync + 'static,
        F: Fn(T) -> Result<R> + Send + Sync + 'static,
    {
        self.register(TypeKey::of::<T>(), None, move |content| {
            match content.downcast::<T>() {
                Ok(value) => handler(value).map(Content::new),
                Err(content) => Ok(content),
            }
        });
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// 对值依次应用适用的处理器。
    pub fn transform(&self, mut content: Content) -> Result<Content> {
        let mut applied = HashSet::new();
        while let Some(index) = self.next_handler(&content, &applied) {
            applied.insert(index);
            let registration = &self.registrations[index];
            trace!(
                transform.declared = registration.declared.name(),
                transform.input = content.type_name(),
                "transform handler applied"
            );
            content = (registration.handler)(content)?;
        }
        Ok(content)
    }

    fn next_handler(&self, content: &Content, applied: &HashSet<usize>) -> Option<usize> {
        self.hierarchy
            .linearize(content.type_key())
            .into_iter()
            .flat_map(|key| {
                self.registrations
                    .iter()
                    .enumerate()
                    .filter(move |(_, registration)| registration.declared == key)
            })
            .find(|(index, registration)| {
                !applied.contains(index)
                    && registration
                        .predicate
                        .as_ref()
                        .is_none_or(|accepts| accepts(content))
            })
            .map(|(index, _)| index)
    }
}

impl fmt::Debug for TransformTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformTable")
            .field(
                "declared",
                &self
                    .registrations
                    .iter()
                    .map(|registration| registration.declared)
                    .collect::<Vec<_>>(),
            )
            .field("hierarchy", &self.hierarchy)
            .finish()
    }
}

/// 把转换表挂到以 [`Content`] 为主体的管道上。
#[derive(Clone, Debug)]
pub struct TransformInterceptor {
    table: Arc<TransformTable>,
}

impl TransformInterceptor {
    pub fn new(table: Arc<TransformTable>) -> Self {
        Self { table }
    }
}

#[async_trait]
impl<C> Interceptor<Content, C> for TransformInterceptor
where
    C: Send + Sync + 'static,
{
    fn label(&self) -> &str {
        "transform-table"
    }

    async fn intercept(&self, ctx: &mut PipelineContext<Content, C>) -> Result<()> {
        let content = mem::replace(ctx.subject_mut(), Content::unit());
        let transformed = self.table.transform(content)?;
        ctx.set_subject(transformed);
        Ok(())
    }
}
