//! 組み込みのサブFutureリゾルバ

use crate::resolve::{ResolveContext, ResolverRegistry};
use crate::{SubFutureKind, SubFutures, TraceError, TraceResult, TypeCode, ValueError, ValueHandle};

/// `Pin` の型名プレフィックス
pub const PIN_PREFIX: &str = "core::pin::Pin<";

/// `Pin` がポインタを保持するフィールド名（新しい標準ライブラリでは `__pointer`）
const PIN_POINTER_FIELDS: &[&str] = &["pointer", "__pointer"];

/// `ManuallyDrop` の型名プレフィックス
pub const MANUALLY_DROP_PREFIX: &str = "core::mem::manually_drop::ManuallyDrop<";

/// futures-concurrency の配列版 race の型名プレフィックス
pub const ARRAY_RACE_PREFIX: &str = "futures_concurrency::future::race::array::Race<";

/// Futureを直接包むだけのラッパー型（型名プレフィックス, 中身のフィールド名）
const TRANSPARENT_WRAPPERS: &[(&str, &str)] = &[(MANUALLY_DROP_PREFIX, "value")];

/// 参照外しを試みる回数の上限（`Pin<Box<..>>` など）
const MAX_POINTER_HOPS: usize = 4;

/// 組み込みリゾルバを登録順に追加する
pub fn register_builtin_resolvers<V: ValueHandle>(registry: &mut ResolverRegistry<V>) {
    registry.register("pin", pin_resolver::<V>);
    registry.register("transparent-wrapper", transparent_wrapper_resolver::<V>);
    registry.register("pointer", pointer_resolver::<V>);
    registry.register("array-race", array_race_resolver::<V>);
}

fn dyn_future_error<V: ValueHandle>(value: &V) -> TraceError {
    TraceError::DynFuture(value.type_name().unwrap_or_else(|| "<unknown>".to_string()))
}

/// ポインタを保持するフィールドを参照外しする
fn deref_pointer_field<V: ValueHandle>(field: V) -> TraceResult<V> {
    match field.type_code() {
        TypeCode::Pointer | TypeCode::Reference => Ok(field.dereference()?),
        TypeCode::FatPointer => Err(dyn_future_error(&field)),
        _ => Err(ValueError::NotAPointer(field.type_name().unwrap_or_default()).into()),
    }
}

/// `Pin<P>` の `P` を取り出す
fn pin_pointer<V: ValueHandle>(pin: &V) -> TraceResult<V> {
    let name = PIN_POINTER_FIELDS
        .iter()
        .find(|name| pin.has_field(name))
        .unwrap_or(&PIN_POINTER_FIELDS[0]);
    Ok(pin.field(name)?)
}

/// `Pin<P>` を剥がし、`P` の指す先を解決する
pub fn pin_resolver<V: ValueHandle>(
    value: &V,
    cx: &ResolveContext<'_, V>,
) -> TraceResult<Option<SubFutures<V>>> {
    if !value.type_name_starts_with(PIN_PREFIX) {
        return Ok(None);
    }
    let target = deref_pointer_field(pin_pointer(value)?)?;
    cx.resolve(target).map(Some)
}

/// `ManuallyDrop<F>` などの透過的なラッパーを剥がす
pub fn transparent_wrapper_resolver<V: ValueHandle>(
    value: &V,
    cx: &ResolveContext<'_, V>,
) -> TraceResult<Option<SubFutures<V>>> {
    let name = match value.type_name() {
        Some(name) => name,
        None => return Ok(None),
    };
    match TRANSPARENT_WRAPPERS
        .iter()
        .find(|(prefix, _)| name.starts_with(prefix))
    {
        Some((_, field)) => cx.resolve(value.field(field)?).map(Some),
        None => Ok(None),
    }
}

/// ポインタ・参照を参照外しする
///
/// トレイトオブジェクトへのポインタは具体型が分からないため、未対応として報告します。
pub fn pointer_resolver<V: ValueHandle>(
    value: &V,
    cx: &ResolveContext<'_, V>,
) -> TraceResult<Option<SubFutures<V>>> {
    match value.type_code() {
        TypeCode::Pointer | TypeCode::Reference => cx.resolve(value.dereference()?).map(Some),
        TypeCode::FatPointer => Err(dyn_future_error(value)),
        _ => Ok(None),
    }
}

/// 配列の背後にあるポインタや `Pin` をたどる
fn locate_array<V: ValueHandle>(mut value: V) -> TraceResult<V> {
    for _ in 0..MAX_POINTER_HOPS {
        match value.type_code() {
            TypeCode::Array => return Ok(value),
            TypeCode::Pointer | TypeCode::Reference | TypeCode::FatPointer => {
                value = deref_pointer_field(value)?;
            }
            _ if value.type_name_starts_with(PIN_PREFIX) => {
                value = deref_pointer_field(pin_pointer(&value)?)?;
            }
            _ => break,
        }
    }
    if value.type_code() == TypeCode::Array {
        return Ok(value);
    }
    Err(ValueError::NotAnArray(value.type_name().unwrap_or_default()).into())
}

/// `futures_concurrency::future::race::array::Race` から各分岐のFutureを取り出す
pub fn array_race_resolver<V: ValueHandle>(
    value: &V,
    cx: &ResolveContext<'_, V>,
) -> TraceResult<Option<SubFutures<V>>> {
    if value.type_code() != TypeCode::Struct || !value.type_name_starts_with(ARRAY_RACE_PREFIX) {
        return Ok(None);
    }

    let combinator = value.type_name().unwrap_or_default();
    let futures = locate_array(value.field("futures")?)?;

    let mut branches = Vec::new();
    for index in futures.array_range()? {
        let child = cx.resolve(futures.index(index)?)?;
        if child.kind() != SubFutureKind::Simple {
            return Err(TraceError::NestedCombinator {
                combinator,
                index,
                kind: child.kind(),
            });
        }
        branches.extend(child.into_single());
    }

    Ok(Some(SubFutures::select(branches)))
}
