use std::{borrow::Cow, fmt};

/// 管道阶段：按名称比较的有序分组。
///
/// 同一管道内阶段名唯一；两个同名 `Phase` 值视为同一阶段。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Phase(Cow<'static, str>);

impl Phase {
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub(crate) fn label(&self) -> Cow<'static, str> {
        self.0.clone()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 阶段加入管道时相对其他阶段的位置，合并时据此在目标管道中重建顺序。
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PhaseRelation {
    Last,
    Before(Phase),
    After(Phase),
}
