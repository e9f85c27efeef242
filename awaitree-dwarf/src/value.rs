//! DWARF型情報に基づく値ハンドル
//!
//! [`DwarfValue`] は（型, アドレス）の組で、読み取りは必要になった時点で
//! [`MemoryReader`] を通して行います。

use crate::decode::{read_uint, DecodeConfig, DisplayValue, ValueDecoder};
use crate::types::{TypeDef, TypeKind, TypeRef, TypeTable, Variant, VariantPart};
use crate::{MemoryReader, Result};
use awaitree_core::{TypeCode, ValueError, ValueHandle, ValueResult};
use std::fmt;
use std::ops::Range;
use std::rc::Rc;
use tracing::debug;

/// トレイトオブジェクトへのポインタのメンバ名
const FAT_POINTER_MEMBERS: [&str; 2] = ["pointer", "vtable"];

/// コンパイラが生成する状態機械の型名かどうか
///
/// 状態機械のvariantは、discriminant値を名前とするフィールドとして公開します。
fn is_state_machine(name: &str) -> bool {
    name.contains("{async_fn_env#") || name.contains("{async_block_env#")
}

/// 値の読み取りに必要なもの一式
pub struct DwarfContext {
    types: TypeTable,
    memory: Box<dyn MemoryReader>,
    decoder: ValueDecoder,
}

impl DwarfContext {
    /// 新しいコンテキストを作成する
    pub fn new(types: TypeTable, memory: Box<dyn MemoryReader>, config: DecodeConfig) -> Rc<Self> {
        Rc::new(Self {
            types,
            memory,
            decoder: ValueDecoder::new(config),
        })
    }

    /// 型情報テーブル
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// 型名とアドレスから値を作成する
    ///
    /// # Arguments
    /// * `type_name` - 完全修飾された型名
    /// * `address` - 値の先頭アドレス
    pub fn value(self: &Rc<Self>, type_name: &str, address: u64) -> Result<DwarfValue> {
        let ty = self
            .types
            .lookup(type_name)
            .ok_or_else(|| anyhow::anyhow!("No type named `{}` in debug info", type_name))?;
        Ok(DwarfValue::new(Rc::clone(self), ty, address))
    }
}

/// DWARF型情報に基づく値
#[derive(Clone)]
pub struct DwarfValue {
    cx: Rc<DwarfContext>,
    ty: TypeRef,
    address: u64,
}

impl DwarfValue {
    /// 新しい値を作成する（typedefは剥がされる）
    pub fn new(cx: Rc<DwarfContext>, ty: TypeRef, address: u64) -> Self {
        let ty = cx.types.strip_aliases(ty);
        Self { cx, ty, address }
    }

    /// 値の先頭アドレス
    pub fn address(&self) -> u64 {
        self.address
    }

    /// 型
    pub fn type_ref(&self) -> TypeRef {
        self.ty
    }

    fn def(&self) -> ValueResult<&TypeDef> {
        self.cx
            .types
            .get(self.ty)
            .ok_or_else(|| ValueError::TypeUnavailable(format!("<0x{:x}>", self.ty.offset())))
    }

    fn display_name(&self) -> String {
        self.cx
            .types
            .display_name(self.ty)
            .unwrap_or_else(|| "<unknown>".to_string())
    }

    /// 同じコンテキストで別の型・アドレスの値を作る
    fn at(&self, ty: Option<TypeRef>, address: u64, what: &str) -> ValueResult<Self> {
        let ty = ty.ok_or_else(|| ValueError::TypeUnavailable(what.to_string()))?;
        Ok(Self::new(Rc::clone(&self.cx), ty, address))
    }

    /// 先頭からのオフセットにあるアドレス（桁あふれは読み取り不能）
    fn offset_address(&self, offset: u64) -> ValueResult<u64> {
        self.address
            .checked_add(offset)
            .ok_or(ValueError::MemoryUnavailable {
                address: self.address,
                size: 0,
            })
    }

    /// 配列要素のアドレス
    fn element_address(&self, index: u64, element_size: u64) -> ValueResult<u64> {
        index
            .checked_mul(element_size)
            .and_then(|offset| self.address.checked_add(offset))
            .ok_or(ValueError::MemoryUnavailable {
                address: self.address,
                size: element_size as usize,
            })
    }

    fn read_at(&self, address: u64, size: usize) -> ValueResult<Vec<u8>> {
        self.cx.memory.read(address, size).map_err(|e| {
            debug!("memory read failed: {}", e);
            ValueError::MemoryUnavailable { address, size }
        })
    }

    fn read_uint_at(&self, address: u64, size: u64) -> ValueResult<u64> {
        let bytes = self.read_at(address, size as usize)?;
        read_uint(&bytes).ok_or_else(|| ValueError::TypeUnavailable(format!("{}-byte integer", size)))
    }

    fn size(&self) -> ValueResult<u64> {
        self.cx
            .types
            .size_of(self.ty)
            .ok_or_else(|| ValueError::TypeUnavailable(format!("size of `{}`", self.display_name())))
    }

    /// 現在有効なvariantをメモリ上のdiscriminantから決める
    fn active_variant<'p>(&self, part: &'p VariantPart) -> ValueResult<&'p Variant> {
        let discriminant = match &part.discriminant {
            Some(member) => member,
            None => {
                return part
                    .variants
                    .first()
                    .ok_or_else(|| ValueError::TypeUnavailable(self.display_name()))
            }
        };

        let size = discriminant
            .ty
            .and_then(|ty| self.cx.types.size_of(ty))
            .unwrap_or(4);
        let value = self.read_uint_at(self.offset_address(discriminant.offset)?, size)?;

        part.variants
            .iter()
            .find(|v| v.discr_value == Some(value))
            .or_else(|| part.variants.iter().find(|v| v.discr_value.is_none()))
            .ok_or_else(|| {
                ValueError::TypeUnavailable(format!(
                    "no variant of `{}` for discriminant {}",
                    self.display_name(),
                    value
                ))
            })
    }

    /// 有効なvariantを公開するフィールド名
    fn variant_field_name(&self, variant: &Variant) -> String {
        match variant.discr_value {
            Some(value) if is_state_machine(&self.display_name()) => value.to_string(),
            _ => variant.member.name.clone(),
        }
    }

    fn is_fat_pointer(def: &TypeDef) -> bool {
        match &def.kind {
            TypeKind::Struct {
                members,
                variant_part: None,
            } => {
                members.len() == FAT_POINTER_MEMBERS.len()
                    && members
                        .iter()
                        .zip(FAT_POINTER_MEMBERS)
                        .all(|(member, name)| member.name == name)
            }
            _ => false,
        }
    }

    /// `&str` の中身を読む
    fn display_str(&self) -> ValueResult<DisplayValue> {
        let ptr = self.field("data_ptr")?;
        let len = self.field("length")?;
        let address = read_uint(&self.read_at(ptr.address, 8)?).unwrap_or(0);
        let len = read_uint(&self.read_at(len.address, 8)?).unwrap_or(0);
        let bytes = self.read_at(address, self.cx.decoder.str_read_len(len))?;
        Ok(self.cx.decoder.decode_str(&bytes, len))
    }

    fn display(&self, depth: usize) -> ValueResult<DisplayValue> {
        let def = self.def()?;
        let name = self.display_name();

        match &def.kind {
            TypeKind::Base { encoding } => {
                let bytes = self.read_at(self.address, self.size()? as usize)?;
                Ok(self.cx.decoder.decode_base(&bytes, *encoding))
            }
            TypeKind::Pointer { .. } | TypeKind::Reference { .. } => {
                Ok(DisplayValue::Ptr(self.read_uint_at(self.address, self.size()?)?))
            }
            TypeKind::Enumeration { enumerators, .. } => {
                let raw = self.read_uint_at(self.address, self.size()?)?;
                match enumerators.iter().find(|e| e.value as u64 == raw) {
                    Some(e) => Ok(DisplayValue::Enum {
                        name,
                        variant: e.name.clone(),
                        fields: Vec::new(),
                    }),
                    None => Ok(DisplayValue::Uint(raw)),
                }
            }
            TypeKind::Struct { .. } if Self::is_fat_pointer(def) => {
                let pointer = self.field(FAT_POINTER_MEMBERS[0])?;
                Ok(DisplayValue::Ptr(self.read_uint_at(pointer.address, 8)?))
            }
            TypeKind::Struct { .. } if name == "&str" => self.display_str(),
            TypeKind::Struct { .. } if depth >= self.cx.decoder.config().max_depth => {
                Ok(DisplayValue::Elided(name))
            }
            TypeKind::Struct {
                members,
                variant_part: Some(part),
            } => {
                let variant = self.active_variant(part)?;
                let inner = self.at(
                    variant.member.ty,
                    self.offset_address(variant.member.offset)?,
                    &variant.member.name,
                )?;
                let mut fields = self.display_members(members, depth);
                if let DisplayValue::Struct { fields: inner_fields, .. } = inner.display(depth + 1)? {
                    fields.extend(inner_fields);
                }
                Ok(DisplayValue::Enum {
                    name,
                    variant: variant.member.name.clone(),
                    fields,
                })
            }
            TypeKind::Struct { members, .. } => Ok(DisplayValue::Struct {
                name,
                fields: self.display_members(members, depth),
            }),
            TypeKind::Array {
                element,
                count: Some(count),
            } if depth < self.cx.decoder.config().max_depth => {
                let (shown, truncated) = self.cx.decoder.array_display_len(*count);
                let element_size = element
                    .and_then(|e| self.cx.types.size_of(e))
                    .ok_or_else(|| ValueError::TypeUnavailable(format!("element of `{}`", name)))?;
                let mut elements = Vec::new();
                for i in 0..shown {
                    let value = self
                        .element_address(i, element_size)
                        .and_then(|address| self.at(*element, address, "element"))
                        .and_then(|value| value.display(depth + 1))
                        .unwrap_or(DisplayValue::Unavailable);
                    elements.push(value);
                }
                Ok(DisplayValue::Array(elements, truncated))
            }
            _ => Ok(DisplayValue::Elided(name)),
        }
    }

    fn display_members(
        &self,
        members: &[crate::types::Member],
        depth: usize,
    ) -> Vec<(String, DisplayValue)> {
        members
            .iter()
            .map(|member| {
                let value = self
                    .offset_address(member.offset)
                    .and_then(|address| self.at(member.ty, address, &member.name))
                    .and_then(|v| v.display(depth + 1))
                    .unwrap_or(DisplayValue::Unavailable);
                (member.name.clone(), value)
            })
            .collect()
    }
}

impl fmt::Debug for DwarfValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}} 0x{:x}", self.display_name(), self.address)
    }
}

impl ValueHandle for DwarfValue {
    fn type_name(&self) -> Option<String> {
        self.cx.types.display_name(self.ty)
    }

    fn type_code(&self) -> TypeCode {
        let def = match self.def() {
            Ok(def) => def,
            Err(_) => return TypeCode::Other,
        };
        match &def.kind {
            TypeKind::Base { .. } => TypeCode::Primitive,
            TypeKind::Pointer { .. } => {
                // rustc は参照も DW_TAG_pointer_type として出力する
                if def.name.as_deref().is_some_and(|name| name.starts_with('&')) {
                    TypeCode::Reference
                } else {
                    TypeCode::Pointer
                }
            }
            TypeKind::Reference { .. } => TypeCode::Reference,
            TypeKind::Struct { .. } if Self::is_fat_pointer(def) => TypeCode::FatPointer,
            TypeKind::Struct {
                variant_part: Some(_),
                ..
            } => TypeCode::Enum,
            TypeKind::Struct { .. } => TypeCode::Struct,
            TypeKind::Enumeration { .. } => TypeCode::Enum,
            TypeKind::Array { .. } => TypeCode::Array,
            TypeKind::Union { .. } | TypeKind::Alias { .. } | TypeKind::Other => TypeCode::Other,
        }
    }

    fn field_names(&self) -> ValueResult<Vec<String>> {
        match &self.def()?.kind {
            TypeKind::Struct {
                members,
                variant_part,
            } => {
                let mut names: Vec<String> = members.iter().map(|m| m.name.clone()).collect();
                if let Some(part) = variant_part {
                    names.push(self.variant_field_name(self.active_variant(part)?));
                }
                Ok(names)
            }
            TypeKind::Union { members } => Ok(members.iter().map(|m| m.name.clone()).collect()),
            _ => Ok(Vec::new()),
        }
    }

    fn field(&self, name: &str) -> ValueResult<Self> {
        let no_such_field = || ValueError::NoSuchField {
            type_name: self.display_name(),
            field: name.to_string(),
        };

        match &self.def()?.kind {
            TypeKind::Struct {
                members,
                variant_part,
            } => {
                if let Some(member) = members.iter().find(|m| m.name == name) {
                    return self.at(member.ty, self.offset_address(member.offset)?, name);
                }
                let part = variant_part.as_ref().ok_or_else(no_such_field)?;
                let variant = self.active_variant(part)?;
                if self.variant_field_name(variant) == name {
                    self.at(variant.member.ty, self.offset_address(variant.member.offset)?, name)
                } else {
                    Err(no_such_field())
                }
            }
            TypeKind::Union { members } => {
                let member = members.iter().find(|m| m.name == name).ok_or_else(no_such_field)?;
                self.at(member.ty, self.offset_address(member.offset)?, name)
            }
            _ => Err(no_such_field()),
        }
    }

    fn dereference(&self) -> ValueResult<Self> {
        let def = self.def()?;
        match &def.kind {
            TypeKind::Pointer { pointee } | TypeKind::Reference { pointee } => {
                let target = self.read_uint_at(self.address, self.size()?)?;
                if target == 0 {
                    return Err(ValueError::MemoryUnavailable {
                        address: 0,
                        size: pointee.and_then(|p| self.cx.types.size_of(p)).unwrap_or(0) as usize,
                    });
                }
                self.at(*pointee, target, "pointee")
            }
            TypeKind::Struct { .. } if Self::is_fat_pointer(def) => {
                self.field(FAT_POINTER_MEMBERS[0])?.dereference()
            }
            _ => Err(ValueError::NotAPointer(self.display_name())),
        }
    }

    fn array_range(&self) -> ValueResult<Range<u64>> {
        match &self.def()?.kind {
            TypeKind::Array {
                count: Some(count), ..
            } => Ok(0..*count),
            TypeKind::Array { count: None, .. } => Err(ValueError::TypeUnavailable(format!(
                "length of `{}`",
                self.display_name()
            ))),
            _ => Err(ValueError::NotAnArray(self.display_name())),
        }
    }

    fn index(&self, index: u64) -> ValueResult<Self> {
        let range = self.array_range()?;
        if !range.contains(&index) {
            return Err(ValueError::IndexOutOfBounds {
                index,
                len: range.end,
            });
        }
        let element = match &self.def()?.kind {
            TypeKind::Array { element, .. } => *element,
            _ => None,
        };
        let element_size = element
            .and_then(|e| self.cx.types.size_of(e))
            .ok_or_else(|| ValueError::TypeUnavailable(format!("element of `{}`", self.display_name())))?;
        self.at(element, self.element_address(index, element_size)?, "element")
    }

    fn render(&self) -> ValueResult<String> {
        self.display(0).map(|value| value.to_string())
    }
}
