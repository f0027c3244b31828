use std::collections::{HashMap, HashSet};

use crate::TypeKey;

/// 显式声明的类型层级。
///
/// # 教案式说明
/// - **意图（Why）**：Rust 没有运行时继承关系，转换表需要的“父类型/接口”由调用方显式声明；
/// - **逻辑（How）**：每个类型记录按声明顺序排列的直接父类型（先主父类型，再各接口）；
///   [`linearize`](Self::linearize) 做后序深度优先遍历：先递归访问每个父类型，再输出自身，
///   已访问过的类型跳过，菱形层级中共同祖先只保留首次访问的位置；
/// - **契约（What）**：
///   - 输出中最抽象的类型在前、具体类型在最后，每个类型恰好出现一次；
///   - 未声明的类型只包含自身；
///   - 声明成环时遍历依然终止，但顺序无意义。
#[derive(Clone, Debug, Default)]
pub struct TypeHierarchy {
    parents: HashMap<TypeKey, Vec<TypeKey>>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明 `sub` 的直接父类型；重复声明时追加，已有父类型不重复记录。
    pub fn declare(&mut self, sub: TypeKey, supers: impl IntoIterator<Item = TypeKey>) {
        let entry = self.parents.entry(sub).or_default();
        for parent in supers {
            if !entry.contains(&parent) {
                entry.push(parent);
            }
        }
    }

    pub fn parents(&self, key: TypeKey) -> &[TypeKey] {
        self.parents.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `key` 及其全部祖先，按后序深度优先顺序排列。
    pub fn linearize(&self, key: TypeKey) -> Vec<TypeKey> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        self.visit(key, &mut visited, &mut order);
        order
    }

    /// `sub` 可以被当作 `sup` 使用。
    pub fn is_assignable(&self, sub: TypeKey, sup: TypeKey) -> bool {
        self.linearize(sub).contains(&sup)
    }

    fn visit(&self, key: TypeKey, visited: &mut HashSet<TypeKey>, order: &mut Vec<TypeKey>) {
        if !visited.insert(key) {
            return;
        }
        for parent in self.parents(key) {
            self.visit(*parent, visited, order);
        }
        order.push(key);
    }
}
