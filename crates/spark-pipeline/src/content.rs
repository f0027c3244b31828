use std::{
    any::{Any, TypeId, type_name},
    fmt,
    hash::{Hash, Hasher},
};

/// 运行时类型标识：`TypeId` 加上可读名称。
///
/// 相等与哈希只看 `TypeId`；名称用于日志与错误消息。接口一类的抽象类型用
/// `TypeKey::of::<dyn Trait>()` 表示。
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 类型擦除的消息体，在发送与接收管道中流转。
///
/// # 教案式说明
/// - **意图（Why）**：同一条发送管道要处理字符串、字节、通道以及任意业务对象，
///   拦截器按运行时类型决定如何渲染；
/// - **契约（What）**：`type_key` 永远是当前值的具体类型，替换值时随之更新。
pub struct Content {
    value: Box<dyn Any + Send + Sync>,
    key: TypeKey,
}

impl Content {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Box::new(value),
            key: TypeKey::of::<T>(),
        }
    }

    /// 空消息体占位。
    pub fn unit() -> Self {
        Self::new(())
    }

    pub fn type_key(&self) -> TypeKey {
        self.key
    }

    pub fn type_name(&self) -> &'static str {
        self.key.name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// 取出具体值；类型不符时原样返还。
    pub fn downcast<T: Any>(self) -> Result<T, Content> {
        let Self { value, key } = self;
        match value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self { value, key }),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Content").field("type", &self.key).finish()
    }
}

/// 接收管道的主体：期望的目标类型与当前值。
#[derive(Debug)]
pub struct ReceiveRequest {
    pub target: TypeKey,
    pub content: Content,
}

impl ReceiveRequest {
    pub fn new(target: TypeKey, content: Content) -> Self {
        Self { target, content }
    }

    /// 当前值已是目标类型。
    pub fn is_satisfied(&self) -> bool {
        self.content.type_key() == self.target
    }
}
