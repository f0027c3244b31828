// 教案级说明：分阶段拦截器管道
//
// ## 意图（Why）
// - 插件在启动期把拦截器挂到具名阶段上，调用分发层对每个逻辑请求、每个逻辑响应各执行一次管道；
// - 启动期可变、运行期只读：执行路径读取的是封存后的扁平快照，跨调用并发读取无需加锁。
//
// ## 解析逻辑（How）
// - 配置态为 `Vec<PhaseSlot>`，每个槽位记录阶段、加入时的相对位置与阶段内拦截器；
// - 首次 `execute` 把所有槽位按顺序拍平成 `Vec<InterceptorEntry>`，存入 `ArcSwapOption`，此后管道即封存；
// - 封存后任何配置变更返回 `PipelineError::Sealed`，不存在“缓存只更新了一半”的中间态。
//
// ## 契约（What）
// - 阶段按声明顺序执行，阶段内按注册顺序执行，与挂起次数无关；
// - `merge` 以管道标识记录已合并来源，同一来源重复合并不会复制拦截器。
use std::{
    borrow::Cow,
    collections::HashSet,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use arc_swap::ArcSwapOption;
use futures::future::BoxFuture;
use tracing::{Instrument, debug, debug_span};

use crate::{
    Attributes, Interceptor, Phase, PipelineContext, PipelineError, Result,
    interceptor::FnInterceptor, phase::PhaseRelation,
};

static NEXT_PIPELINE_ID: AtomicU64 = AtomicU64::new(1);

/// 管道的进程内唯一标识，用于合并去重。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineId(u64);

impl PipelineId {
    fn next() -> Self {
        Self(NEXT_PIPELINE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// 拦截器注册信息快照。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterceptorRegistration {
    pub phase: Phase,
    pub label: Cow<'static, str>,
}

/// 扁平化执行列表中的一项。
pub(crate) struct InterceptorEntry<S, C> {
    pub(crate) phase: Phase,
    pub(crate) interceptor: Arc<dyn Interceptor<S, C>>,
}

impl<S, C> Clone for InterceptorEntry<S, C> {
    fn clone(&self) -> Self {
        Self {
            phase: self.phase.clone(),
            interceptor: Arc::clone(&self.interceptor),
        }
    }
}

/// 登记在阶段内的拦截器及其最初注册所在的管道。
struct Registered<S, C> {
    origin: PipelineId,
    interceptor: Arc<dyn Interceptor<S, C>>,
}

impl<S, C> Clone for Registered<S, C> {
    fn clone(&self) -> Self {
        Self {
            origin: self.origin,
            interceptor: Arc::clone(&self.interceptor),
        }
    }
}

struct PhaseSlot<S, C> {
    phase: Phase,
    relation: PhaseRelation,
    interceptors: Vec<Registered<S, C>>,
}

impl<S, C> PhaseSlot<S, C> {
    /// 同名同位置、不带拦截器的槽位。
    fn empty_like(other: &Self) -> Self {
        Self {
            phase: other.phase.clone(),
            relation: other.relation.clone(),
            interceptors: Vec::new(),
        }
    }
}

/// 分阶段拦截器管道。
///
/// # 教案式说明
/// - **意图（Why）**：把“请求进来之后、响应出去之前”的横切逻辑组织成有序阶段，插件只需声明挂在哪个阶段；
/// - **逻辑（How）**：配置方法接收 `&mut self`，执行方法接收 `&self`；首次执行后管道封存；
/// - **契约（What）**：
///   - `add_phase` / `insert_phase_*` 对重名阶段返回 [`PipelineError::DuplicatePhase`]，锚点缺失返回
///     [`PipelineError::InvalidPhase`]；
///   - `intercept` 对未注册阶段返回 [`PipelineError::InvalidPhase`]；
///   - `execute` 返回最后一个修改主体的拦截器留下的值，无人修改时返回初始主体。
pub struct Pipeline<S, C> {
    id: PipelineId,
    phases: Vec<PhaseSlot<S, C>>,
    merged: HashSet<PipelineId>,
    attributes: Attributes,
    snapshot: ArcSwapOption<Vec<InterceptorEntry<S, C>>>,
}

impl<S, C> Pipeline<S, C>
where
    S: Send + 'static,
    C: Send + Sync + 'static,
{
    /// 以给定阶段顺序构造管道。
    pub fn new(phases: impl IntoIterator<Item = Phase>) -> Result<Self> {
        let mut pipeline = Self::empty();
        for phase in phases {
            pipeline.add_phase(phase)?;
        }
        Ok(pipeline)
    }

    pub fn empty() -> Self {
        Self {
            id: PipelineId::next(),
            phases: Vec::new(),
            merged: HashSet::new(),
            attributes: Attributes::new(),
            snapshot: ArcSwapOption::empty(),
        }
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    /// 管道级属性，供插件在安装期共享状态。
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn is_sealed(&self) -> bool {
        self.snapshot.load().is_some()
    }

    /// 阶段顺序快照。
    pub fn phases(&self) -> Vec<Phase> {
        self.phases.iter().map(|slot| slot.phase.clone()).collect()
    }

    pub fn has_phase(&self, phase: &Phase) -> bool {
        self.position(phase).is_some()
    }

    /// 没有任何拦截器。
    pub fn is_empty(&self) -> bool {
        self.phases.iter().all(|slot| slot.interceptors.is_empty())
    }

    pub fn interceptor_count(&self) -> usize {
        self.phases.iter().map(|slot| slot.interceptors.len()).sum()
    }

    /// 按执行顺序列出的拦截器注册信息。
    pub fn registry(&self) -> Vec<InterceptorRegistration> {
        self.phases
            .iter()
            .flat_map(|slot| {
                slot.interceptors.iter().map(|registered| InterceptorRegistration {
                    phase: slot.phase.clone(),
                    label: Cow::Owned(registered.interceptor.label().to_owned()),
                })
            })
            .collect()
    }

    /// 在末尾追加阶段。
    pub fn add_phase(&mut self, phase: Phase) -> Result<()> {
        self.ensure_open("add_phase")?;
        self.ensure_absent(&phase)?;
        debug!(pipeline.id = self.id.0, pipeline.phase = %phase, "phase added");
        self.phases.push(PhaseSlot {
            phase,
            relation: PhaseRelation::Last,
            interceptors: Vec::new(),
        });
        Ok(())
    }

    /// 在锚点阶段之前插入阶段；多次插入到同一锚点之前时按调用顺序排列。
    pub fn insert_phase_before(&mut self, anchor: &Phase, phase: Phase) -> Result<()> {
        self.ensure_open("insert_phase_before")?;
        self.ensure_absent(&phase)?;
        let index = self.require(anchor)?;
        debug!(pipeline.id = self.id.0, pipeline.phase = %phase, pipeline.anchor = %anchor, "phase inserted before anchor");
        self.phases.insert(
            index,
            PhaseSlot {
                phase,
                relation: PhaseRelation::Before(anchor.clone()),
                interceptors: Vec::new(),
            },
        );
        Ok(())
    }

    /// 在锚点阶段之后插入阶段；排在此前已插入到同一锚点之后的阶段后面。
    pub fn insert_phase_after(&mut self, anchor: &Phase, phase: Phase) -> Result<()> {
        self.ensure_open("insert_phase_after")?;
        self.ensure_absent(&phase)?;
        let index = self.after_index(anchor)?;
        debug!(pipeline.id = self.id.0, pipeline.phase = %phase, pipeline.anchor = %anchor, "phase inserted after anchor");
        self.phases.insert(
            index,
            PhaseSlot {
                phase,
                relation: PhaseRelation::After(anchor.clone()),
                interceptors: Vec::new(),
            },
        );
        Ok(())
    }

    /// 把拦截器追加到阶段末尾。
    pub fn intercept(
        &mut self,
        phase: &Phase,
        interceptor: impl Interceptor<S, C>,
    ) -> Result<()> {
        self.intercept_shared(phase, Arc::new(interceptor))
    }

    /// 注册共享的拦截器实例。
    pub fn intercept_shared(
        &mut self,
        phase: &Phase,
        interceptor: Arc<dyn Interceptor<S, C>>,
    ) -> Result<()> {
        self.ensure_open("intercept")?;
        let index = self.require(phase)?;
        debug!(
            pipeline.id = self.id.0,
            pipeline.phase = %phase,
            pipeline.interceptor = interceptor.label(),
            "interceptor registered"
        );
        self.phases[index].interceptors.push(Registered {
            origin: self.id,
            interceptor,
        });
        Ok(())
    }

    /// 以闭包注册拦截器。
    ///
    /// 闭包形如 `|ctx| Box::pin(async move { ...; Ok(()) })`。
    pub fn intercept_fn<F>(
        &mut self,
        phase: &Phase,
        label: impl Into<Cow<'static, str>>,
        body: F,
    ) -> Result<()>
    where
        F: for<'a> Fn(&'a mut PipelineContext<S, C>) -> BoxFuture<'a, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.intercept(phase, FnInterceptor::new(label.into(), body))
    }

    /// 合并另一条管道。
    ///
    /// # 契约说明（What）
    /// - 目标中缺失的阶段按其在来源中的相对位置补入；锚点稍后才补入的阶段会在锚点就位后重试，
    ///   锚点始终缺失时追加到末尾；
    /// - 双方都有的阶段，把来源的拦截器追加到目标已有拦截器之后；
    /// - 已合并过的来源（包括来源自身合并过的管道）再次合并时不做任何事；
    ///   来源中经由它合并进来、而本管道已经拥有的拦截器也会跳过。
    pub fn merge(&mut self, other: &Pipeline<S, C>) -> Result<()> {
        self.ensure_open("merge")?;
        if other.id == self.id || self.merged.contains(&other.id) {
            return Ok(());
        }

        self.merge_phases(other);
        for slot in &other.phases {
            let index = self.require(&slot.phase)?;
            let fresh: Vec<_> = slot
                .interceptors
                .iter()
                .filter(|registered| {
                    registered.origin != self.id && !self.merged.contains(&registered.origin)
                })
                .cloned()
                .collect();
            self.phases[index].interceptors.extend(fresh);
        }

        self.merged.insert(other.id);
        self.merged.extend(other.merged.iter().copied());
        debug!(
            pipeline.id = self.id.0,
            pipeline.merged = other.id.0,
            pipeline.interceptors = self.interceptor_count(),
            "pipeline merged"
        );
        Ok(())
    }

    /// 执行管道。
    ///
    /// # 契约说明（What）
    /// - 首次调用封存管道；
    /// - 拦截器错误立即终止执行并原样返回，剩余拦截器不再运行；
    /// - 上下文接受 `C` 或 `Arc<C>`。
    pub async fn execute(&self, context: impl Into<Arc<C>>, subject: S) -> Result<S> {
        let interceptors = self.sealed();
        if interceptors.is_empty() {
            return Ok(subject);
        }
        let span = debug_span!(
            "pipeline.execute",
            pipeline.id = self.id.0,
            pipeline.interceptors = interceptors.len()
        );
        let mut ctx = PipelineContext::new(context.into(), subject, interceptors);
        ctx.proceed().instrument(span).await?;
        Ok(ctx.into_subject())
    }

    fn sealed(&self) -> Arc<Vec<InterceptorEntry<S, C>>> {
        if let Some(snapshot) = self.snapshot.load_full() {
            return snapshot;
        }
        let flattened: Vec<InterceptorEntry<S, C>> = self
            .phases
            .iter()
            .flat_map(|slot| {
                slot.interceptors.iter().map(|registered| InterceptorEntry {
                    phase: slot.phase.clone(),
                    interceptor: Arc::clone(&registered.interceptor),
                })
            })
            .collect();
        let snapshot = Arc::new(flattened);
        self.snapshot.store(Some(Arc::clone(&snapshot)));
        debug!(
            pipeline.id = self.id.0,
            pipeline.interceptors = snapshot.len(),
            "pipeline sealed"
        );
        snapshot
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.is_sealed() {
            return Err(PipelineError::Sealed { operation });
        }
        Ok(())
    }

    fn ensure_absent(&self, phase: &Phase) -> Result<()> {
        if self.has_phase(phase) {
            return Err(PipelineError::DuplicatePhase {
                phase: phase.label(),
            });
        }
        Ok(())
    }

    /// 补入目标缺失的阶段。
    ///
    /// 锚点尚未就位的阶段留在待办列表中，每轮至少补入一个才继续；无法再推进时按来源顺序追加。
    fn merge_phases(&mut self, other: &Pipeline<S, C>) {
        let mut pending: Vec<&PhaseSlot<S, C>> = other
            .phases
            .iter()
            .filter(|slot| self.position(&slot.phase).is_none())
            .collect();
        while !pending.is_empty() {
            let before = pending.len();
            pending.retain(|slot| {
                let index = match &slot.relation {
                    PhaseRelation::Last => Some(self.phases.len()),
                    PhaseRelation::Before(anchor) => self.position(anchor),
                    PhaseRelation::After(anchor) => self.after_index(anchor).ok(),
                };
                match index {
                    Some(index) => {
                        self.phases.insert(index, PhaseSlot::empty_like(slot));
                        false
                    }
                    None => true,
                }
            });
            if pending.len() == before {
                for slot in pending.drain(..) {
                    self.phases.push(PhaseSlot::empty_like(slot));
                }
            }
        }
    }

    fn position(&self, phase: &Phase) -> Option<usize> {
        self.phases.iter().position(|slot| &slot.phase == phase)
    }

    fn require(&self, phase: &Phase) -> Result<usize> {
        self.position(phase).ok_or_else(|| PipelineError::InvalidPhase {
            phase: phase.label(),
        })
    }

    /// 锚点之后、且在此前已插入到同一锚点之后的阶段之后的位置。
    fn after_index(&self, anchor: &Phase) -> Result<usize> {
        let anchor_index = self.require(anchor)?;
        let last_related = self
            .phases
            .iter()
            .enumerate()
            .skip(anchor_index + 1)
            .filter(|(_, slot)| matches!(&slot.relation, PhaseRelation::After(a) if a == anchor))
            .map(|(index, _)| index)
            .last();
        Ok(last_related.unwrap_or(anchor_index) + 1)
    }
}

impl<S, C> fmt::Debug for Pipeline<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field(
                "phases",
                &self
                    .phases
                    .iter()
                    .map(|slot| (slot.phase.name(), slot.interceptors.len()))
                    .collect::<Vec<_>>(),
            )
            .field("sealed", &self.snapshot.load().is_some())
            .finish()
    }
}
