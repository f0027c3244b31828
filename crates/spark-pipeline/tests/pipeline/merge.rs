use proptest::prelude::*;
use spark_pipeline::{Phase, Pipeline};

const PHASES: [Phase; 3] = [Phase::new("A"), Phase::new("B"), Phase::new("C")];

/// 按 `(阶段下标, 序号)` 列表构造管道，标签带上前缀以区分来源。
fn build(prefix: &str, layout: &[usize]) -> Pipeline<(), ()> {
    let mut pipeline = Pipeline::new(PHASES).expect("构造管道失败");
    for (seq, phase) in layout.iter().enumerate() {
        pipeline
            .intercept_fn(
                &PHASES[*phase],
                format!("{prefix}{seq}"),
                |_ctx| Box::pin(async { Ok(()) }),
            )
            .expect("注册失败");
    }
    pipeline
}

fn labels(pipeline: &Pipeline<(), ()>) -> Vec<String> {
    pipeline
        .registry()
        .into_iter()
        .map(|registration| format!("{}:{}", registration.phase, registration.label))
        .collect()
}

proptest! {
    /// 同一来源合并两次与合并一次得到相同的扁平列表。
    #[test]
    fn merging_twice_equals_merging_once(
        own in prop::collection::vec(0usize..3, 0..8),
        other in prop::collection::vec(0usize..3, 0..8),
    ) {
        let source = build("s", &other);
        let mut once = build("t", &own);
        let mut twice = build("t", &own);

        once.merge(&source).expect("合并失败");
        twice.merge(&source).expect("合并失败");
        twice.merge(&source).expect("合并失败");

        prop_assert_eq!(labels(&once), labels(&twice));
        prop_assert_eq!(once.interceptor_count(), own.len() + other.len());
    }
}

/// 同一阶段内来源的拦截器排在目标自身拦截器之后。
#[test]
fn merged_interceptors_follow_own_within_phase() {
    let source = build("s", &[0, 1]);
    let mut target = build("t", &[0, 2]);
    target.merge(&source).expect("合并失败");
    assert_eq!(labels(&target), ["A:t0", "A:s0", "B:s1", "C:t1"]);
}

/// 经由中间管道间接合并过的来源不会被重复合并，与合并先后无关。
#[test]
fn transitive_merge_does_not_duplicate() {
    let base = build("b", &[0, 1]);
    let mut middle = build("m", &[2]);
    middle.merge(&base).expect("合并失败");

    let mut direct_first = build("t", &[]);
    direct_first.merge(&base).expect("合并失败");
    direct_first.merge(&middle).expect("合并失败");

    let mut middle_first = build("t", &[]);
    middle_first.merge(&middle).expect("合并失败");
    middle_first.merge(&base).expect("合并失败");

    assert_eq!(direct_first.interceptor_count(), 3);
    assert_eq!(middle_first.interceptor_count(), 3);
    assert_eq!(labels(&direct_first), labels(&middle_first));
}

/// 目标缺失的阶段按来源中的相对位置补入。
#[test]
fn missing_phase_is_inserted_relative_to_anchor() {
    let mut source: Pipeline<(), ()> = Pipeline::new(PHASES).expect("构造管道失败");
    source
        .insert_phase_after(&PHASES[0], Phase::new("A+"))
        .expect("插入失败");
    source
        .intercept_fn(&Phase::new("A+"), "late", |_ctx| Box::pin(async { Ok(()) }))
        .expect("注册失败");

    let mut target = build("t", &[1]);
    target.merge(&source).expect("合并失败");
    let names: Vec<_> = target
        .phases()
        .iter()
        .map(|phase| phase.name().to_owned())
        .collect();
    assert_eq!(names, ["A", "A+", "B", "C"]);
    assert_eq!(labels(&target), ["A+:late", "B:t0"]);
}

/// 锚点本身也需补入时，依赖它的阶段等锚点就位后再按相对位置插入。
#[test]
fn phase_anchored_on_merged_phase_keeps_source_order() {
    let a = Phase::new("A");
    let b = Phase::new("B");
    let c = Phase::new("C");
    let x = Phase::new("X");

    let mut source: Pipeline<(), ()> = Pipeline::new([a.clone(), b.clone()]).expect("构造管道失败");
    source.insert_phase_after(&a, c.clone()).expect("插入失败");
    source.insert_phase_before(&c, x.clone()).expect("插入失败");
    source
        .intercept_fn(&x, "x", |_ctx| Box::pin(async { Ok(()) }))
        .expect("注册失败");

    let mut target: Pipeline<(), ()> = Pipeline::new([a, b]).expect("构造管道失败");
    target.merge(&source).expect("合并失败");

    let names: Vec<_> = target
        .phases()
        .iter()
        .map(|phase| phase.name().to_owned())
        .collect();
    assert_eq!(names, ["A", "X", "C", "B"]);
    assert_eq!(labels(&target), ["X:x"]);
}
