use std::sync::{Arc, Mutex};

use spark_pipeline::{Content, TransformTable, TypeKey};

trait Shape {}
trait Left: Shape {}
trait Right: Shape {}

struct Both;

impl Shape for Both {}
impl Left for Both {}
impl Right for Both {}

/// 登记一个只记录声明类型、原样返回值的处理器。
fn record(table: &mut TransformTable, declared: TypeKey, seen: &Arc<Mutex<Vec<&'static str>>>) {
    let seen = Arc::clone(seen);
    let name = match declared {
        key if key == TypeKey::of::<dyn Shape>() => "I",
        key if key == TypeKey::of::<dyn Left>() => "L",
        key if key == TypeKey::of::<dyn Right>() => "R",
        _ => "B",
    };
    table.register(declared, None, move |content| {
        seen.lock().expect("记录锁中毒").push(name);
        Ok(content)
    });
}

/// 菱形层级 `B: L, R` 且 `L, R: I`：处理器按 `[I, L, R, B]` 执行，共同祖先只执行一次。
#[test]
fn diamond_applies_handlers_from_most_abstract() {
    let (i, l, r, b) = (
        TypeKey::of::<dyn Shape>(),
        TypeKey::of::<dyn Left>(),
        TypeKey::of::<dyn Right>(),
        TypeKey::of::<Both>(),
    );
    let mut table = TransformTable::new();
    table.declare(l, [i]);
    table.declare(r, [i]);
    table.declare(b, [l, r]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    // 登记顺序与期望顺序相反，结果只取决于类型层级。
    for declared in [b, r, l, i] {
        record(&mut table, declared, &seen);
    }

    let out = table.transform(Content::new(Both)).expect("转换失败");
    assert!(out.is::<Both>());
    assert_eq!(*seen.lock().expect("记录锁中毒"), ["I", "L", "R", "B"]);
}

/// 与值类型无关的处理器不会执行。
#[test]
fn unrelated_handlers_are_ignored() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut table = TransformTable::new();
    record(&mut table, TypeKey::of::<dyn Left>(), &seen);

    let out = table.transform(Content::new(7u8)).expect("转换失败");
    assert_eq!(out.downcast_ref::<u8>(), Some(&7));
    assert!(seen.lock().expect("记录锁中毒").is_empty());
}

/// 同一声明类型的多个处理器按登记顺序串联。
#[test]
fn handlers_for_same_type_chain_in_registration_order() {
    let mut table = TransformTable::new();
    table.register(TypeKey::of::<String>(), None, |content| {
        let text = content.downcast::<String>().map_err(|_| unreachable_type())?;
        Ok(Content::new(text + "-first"))
    });
    table.register(TypeKey::of::<String>(), None, |content| {
        let text = content.downcast::<String>().map_err(|_| unreachable_type())?;
        Ok(Content::new(text + "-second"))
    });

    let out = table
        .transform(Content::new("x".to_owned()))
        .expect("转换失败");
    assert_eq!(out.downcast_ref::<String>().map(String::as_str), Some("x-first-second"));
}

fn unreachable_type() -> spark_pipeline::PipelineError {
    spark_pipeline::PipelineError::Configuration("unexpected content type".to_owned())
}
