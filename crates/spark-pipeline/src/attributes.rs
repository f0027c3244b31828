use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    marker::PhantomData,
    sync::Arc,
};

use parking_lot::Mutex;

/// 类型化属性键。
///
/// 键由名称与值类型共同确定：同名但类型不同的两个键互不冲突。
pub struct AttributeKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AttributeKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for AttributeKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AttributeKey<T> {}

impl<T> fmt::Debug for AttributeKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttributeKey").field(&self.name).finish()
    }
}

type Slot = (&'static str, TypeId);

/// 调用与管道共享的属性袋。
///
/// # 教案式说明
/// - **意图（Why）**：插件之间需要跨阶段传递数据（认证主体、计时起点、重试次数），
///   又不希望为每种数据扩展 `Call` 的字段；
/// - **逻辑（How）**：以 `(键名, 值类型)` 为槽位存放 `Arc<dyn Any>`，读取时向下转型；
///   内部使用 `parking_lot::Mutex`，临界区只做哈希表操作，不跨越 `.await`；
/// - **契约（What）**：
///   - 方法均接收 `&self`，可被多个拦截器通过共享引用写入；
///   - `get` 返回 `Arc<T>`，调用方持有期间与后续写入互不影响。
#[derive(Default)]
pub struct Attributes {
    entries: Mutex<HashMap<Slot, Arc<dyn Any + Send + Sync>>>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入属性，返回被替换的旧值。
    pub fn put<T>(&self, key: AttributeKey<T>, value: T) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let previous = self.entries.lock().insert(slot(&key), Arc::new(value));
        previous.and_then(downcast)
    }

    pub fn get<T>(&self, key: AttributeKey<T>) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.entries.lock().get(&slot(&key)).cloned().and_then(downcast)
    }

    pub fn contains<T: 'static>(&self, key: AttributeKey<T>) -> bool {
        self.entries.lock().contains_key(&slot(&key))
    }

    pub fn remove<T>(&self, key: AttributeKey<T>) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.entries.lock().remove(&slot(&key)).and_then(downcast)
    }

    /// 属性缺失时以 `init` 初始化；并发调用时只有一个 `init` 的结果被保留。
    pub fn compute_if_absent<T>(&self, key: AttributeKey<T>, init: impl FnOnce() -> T) -> Arc<T>
    where
        T: Send + Sync + 'static,
    {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&slot(&key)).cloned().and_then(downcast) {
            return existing;
        }
        let value = Arc::new(init());
        entries.insert(slot(&key), value.clone());
        value
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        let mut names: Vec<_> = entries.keys().map(|(name, _)| *name).collect();
        names.sort_unstable();
        f.debug_struct("Attributes").field("keys", &names).finish()
    }
}

fn slot<T: 'static>(key: &AttributeKey<T>) -> Slot {
    (key.name, TypeId::of::<T>())
}

fn downcast<T: Send + Sync + 'static>(value: Arc<dyn Any + Send + Sync>) -> Option<Arc<T>> {
    value.downcast::<T>().ok()
}
