//! メモリ上に組み立てる合成値
//!
//! デバッガなしで分類器・リゾルバ・プリンタを検証するための [`ValueHandle`] 実装です。
//! 独自のリゾルバを書く場合のテストにも使えます。
//!
//! ```
//! use awaitree_core::synthetic::SyntheticValue;
//! use awaitree_core::ValueHandle;
//!
//! let leaf = SyntheticValue::opaque("futures_util::future::pending::Pending<u32>");
//! let boxed = SyntheticValue::pointer("alloc::boxed::Box<Pending<u32>>", leaf);
//! assert_eq!(
//!     boxed.dereference().unwrap().type_name().as_deref(),
//!     Some("futures_util::future::pending::Pending<u32>")
//! );
//! ```

use crate::{TypeCode, ValueError, ValueHandle, ValueResult};
use std::ops::Range;
use std::rc::Rc;

/// 合成値の中身
#[derive(Debug)]
enum Kind {
    Struct(Vec<(String, SyntheticValue)>),
    Pointer(SyntheticValue),
    Reference(SyntheticValue),
    FatPointer,
    Array(Vec<SyntheticValue>),
    Primitive(String),
    Unavailable,
}

#[derive(Debug)]
struct Inner {
    type_name: Option<String>,
    kind: Kind,
}

/// 合成値（安価にクローンできるハンドル）
#[derive(Debug, Clone)]
pub struct SyntheticValue(Rc<Inner>);

impl SyntheticValue {
    fn new(type_name: Option<String>, kind: Kind) -> Self {
        Self(Rc::new(Inner { type_name, kind }))
    }

    /// フィールドを持たない構造体
    pub fn opaque(type_name: &str) -> Self {
        Self::structure(type_name, Vec::new())
    }

    /// 型名を取得できない値
    pub fn unnamed() -> Self {
        Self::new(None, Kind::Struct(Vec::new()))
    }

    /// 構造体
    pub fn structure(type_name: &str, fields: Vec<(&str, SyntheticValue)>) -> Self {
        let fields = fields
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        Self::new(Some(type_name.to_string()), Kind::Struct(fields))
    }

    /// 基本型の値（`rendered` がそのまま文字列表現になる）
    pub fn primitive(type_name: &str, rendered: &str) -> Self {
        Self::new(
            Some(type_name.to_string()),
            Kind::Primitive(rendered.to_string()),
        )
    }

    /// u32の値
    pub fn u32(value: u32) -> Self {
        Self::primitive("u32", &value.to_string())
    }

    /// 生ポインタ
    pub fn pointer(type_name: &str, target: SyntheticValue) -> Self {
        Self::new(Some(type_name.to_string()), Kind::Pointer(target))
    }

    /// 参照
    pub fn reference(type_name: &str, target: SyntheticValue) -> Self {
        Self::new(Some(type_name.to_string()), Kind::Reference(target))
    }

    /// トレイトオブジェクトへのポインタ
    pub fn fat_pointer(type_name: &str) -> Self {
        Self::new(Some(type_name.to_string()), Kind::FatPointer)
    }

    /// 固定長配列
    pub fn array(type_name: &str, elements: Vec<SyntheticValue>) -> Self {
        Self::new(Some(type_name.to_string()), Kind::Array(elements))
    }

    /// メモリを読み取れない値
    pub fn unavailable(type_name: &str) -> Self {
        Self::new(Some(type_name.to_string()), Kind::Unavailable)
    }

    /// async fn の状態機械（現行のレイアウト）
    ///
    /// 型名は `{path}::{async_fn_env#0}` になり、`state` 番目のvariantに
    /// `locals` と（あれば）`__awaitee` が入ります。
    pub fn async_fn(
        path: &str,
        state: u32,
        locals: Vec<(&str, SyntheticValue)>,
        awaitee: Option<SyntheticValue>,
    ) -> Self {
        let variant = Self::suspend_variant(state, locals, awaitee);
        let state_name = state.to_string();
        Self::structure(
            &format!("{}::{{async_fn_env#0}}", path),
            vec![(state_name.as_str(), variant)],
        )
    }

    /// `GenFuture` で包まれた async fn（旧来のレイアウト）
    pub fn gen_future(
        path: &str,
        state: u32,
        locals: Vec<(&str, SyntheticValue)>,
        awaitee: Option<SyntheticValue>,
    ) -> Self {
        let env = Self::async_fn(path, state, locals, awaitee);
        let wrapper = format!(
            "core::future::from_generator::GenFuture<{}::{{async_fn_env#0}}>",
            path
        );
        Self::structure(&wrapper, vec![("__0", env)])
    }

    fn suspend_variant(
        state: u32,
        locals: Vec<(&str, SyntheticValue)>,
        awaitee: Option<SyntheticValue>,
    ) -> Self {
        let mut fields = locals;
        if let Some(awaitee) = awaitee {
            fields.push(("__awaitee", awaitee));
        }
        let name = match state {
            0 => "Unresumed".to_string(),
            1 => "Returned".to_string(),
            2 => "Panicked".to_string(),
            n => format!("Suspend{}", n - 3),
        };
        Self::structure(&name, fields)
    }

    /// 同一の値かどうか（ハンドルの同一性）
    pub fn ptr_eq(&self, other: &SyntheticValue) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn display_name(&self) -> String {
        self.0
            .type_name
            .clone()
            .unwrap_or_else(|| "<unknown>".to_string())
    }

    fn unavailable_error() -> ValueError {
        ValueError::MemoryUnavailable {
            address: 0,
            size: 0,
        }
    }
}

impl ValueHandle for SyntheticValue {
    fn type_name(&self) -> Option<String> {
        self.0.type_name.clone()
    }

    fn type_code(&self) -> TypeCode {
        match &self.0.kind {
            Kind::Struct(_) | Kind::Unavailable => TypeCode::Struct,
            Kind::Pointer(_) => TypeCode::Pointer,
            Kind::Reference(_) => TypeCode::Reference,
            Kind::FatPointer => TypeCode::FatPointer,
            Kind::Array(_) => TypeCode::Array,
            Kind::Primitive(_) => TypeCode::Primitive,
        }
    }

    fn field_names(&self) -> ValueResult<Vec<String>> {
        match &self.0.kind {
            Kind::Struct(fields) => Ok(fields.iter().map(|(name, _)| name.clone()).collect()),
            Kind::Unavailable => Err(Self::unavailable_error()),
            _ => Ok(Vec::new()),
        }
    }

    fn field(&self, name: &str) -> ValueResult<Self> {
        match &self.0.kind {
            Kind::Struct(fields) => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| ValueError::NoSuchField {
                    type_name: self.display_name(),
                    field: name.to_string(),
                }),
            Kind::Unavailable => Err(Self::unavailable_error()),
            _ => Err(ValueError::NoSuchField {
                type_name: self.display_name(),
                field: name.to_string(),
            }),
        }
    }

    fn dereference(&self) -> ValueResult<Self> {
        match &self.0.kind {
            Kind::Pointer(target) | Kind::Reference(target) => Ok(target.clone()),
            Kind::Unavailable => Err(Self::unavailable_error()),
            _ => Err(ValueError::NotAPointer(self.display_name())),
        }
    }

    fn array_range(&self) -> ValueResult<Range<u64>> {
        match &self.0.kind {
            Kind::Array(elements) => Ok(0..elements.len() as u64),
            Kind::Unavailable => Err(Self::unavailable_error()),
            _ => Err(ValueError::NotAnArray(self.display_name())),
        }
    }

    fn index(&self, index: u64) -> ValueResult<Self> {
        match &self.0.kind {
            Kind::Array(elements) => elements
                .get(index as usize)
                .cloned()
                .ok_or(ValueError::IndexOutOfBounds {
                    index,
                    len: elements.len() as u64,
                }),
            Kind::Unavailable => Err(Self::unavailable_error()),
            _ => Err(ValueError::NotAnArray(self.display_name())),
        }
    }

    fn render(&self) -> ValueResult<String> {
        match &self.0.kind {
            Kind::Primitive(rendered) => Ok(rendered.clone()),
            Kind::Struct(fields) => {
                let mut out = format!("{} {{ ", self.display_name());
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&format!("{}: {}", name, value.render()?));
                }
                out.push_str(" }");
                Ok(out)
            }
            Kind::Pointer(target) | Kind::Reference(target) => {
                Ok(format!("*{}", target.display_name()))
            }
            Kind::FatPointer => Ok(format!("{} {{ pointer, vtable }}", self.display_name())),
            Kind::Array(elements) => {
                let rendered = elements
                    .iter()
                    .map(|e| e.render())
                    .collect::<ValueResult<Vec<_>>>()?;
                Ok(format!("[{}]", rendered.join(", ")))
            }
            Kind::Unavailable => Err(Self::unavailable_error()),
        }
    }
}
