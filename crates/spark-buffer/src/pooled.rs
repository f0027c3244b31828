use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::Arc,
};

use crate::pool::PoolCore;

/// 池化实例的租约。
///
/// # 教案式说明
/// - **意图（Why）**：调用方只需持有租约即可使用实例；忘记归还时由 `Drop` 兜底送回来源池，
///   保证异常路径与取消路径不会泄漏池容量。
/// - **契约（What）**：
///   - 通过 `Deref/DerefMut` 访问实例；
///   - `Drop` 时实例回到来源池，策略校验失败则静默销毁；
///   - [`Pooled::detach`] 取出实例并结束租约，实例此后与池再无关系。
pub struct Pooled<T: Send + 'static> {
    value: Option<T>,
    origin: Arc<PoolCore<T>>,
}

impl<T: Send + 'static> Pooled<T> {
    pub(crate) fn new(value: T, origin: Arc<PoolCore<T>>) -> Self {
        Self {
            value: Some(value),
            origin,
        }
    }

    /// 来源池的标识。
    pub fn pool_id(&self) -> u64 {
        self.origin.id()
    }

    /// 取出实例，不再归还。
    pub fn detach(mut self) -> T {
        self.origin.end_lease();
        match self.value.take() {
            Some(value) => value,
            None => unreachable!("lease value is only taken on consumption"),
        }
    }

    pub(crate) fn into_parts(mut self) -> (T, Arc<PoolCore<T>>) {
        let origin = Arc::clone(&self.origin);
        match self.value.take() {
            Some(value) => (value, origin),
            None => unreachable!("lease value is only taken on consumption"),
        }
    }
}

impl<T: Send + 'static> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.value {
            Some(value) => value,
            None => unreachable!("lease value is only taken on consumption"),
        }
    }
}

impl<T: Send + 'static> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.value {
            Some(value) => value,
            None => unreachable!("lease value is only taken on consumption"),
        }
    }
}

impl<T: Send + 'static> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.origin.reclaim(value);
        }
    }
}

impl<T: Send + fmt::Debug + 'static> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("pool", &self.origin.id())
            .field("value", &self.value)
            .finish()
    }
}
