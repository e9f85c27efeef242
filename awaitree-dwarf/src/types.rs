//! DWARF型情報のテーブル
//!
//! すべてのコンパイル単位を一度だけ走査し、型DIEを所有データに変換して保持します。
//! 型は名前空間を `::` で連結した完全修飾名で引けます。
//!
//! Rustのenumやasync fnの状態機械は `DW_TAG_variant_part` を持つ構造体として
//! 出力されるため、[`VariantPart`] としてdiscriminantと各variantを記録します。

use crate::Result;
use gimli::{AttributeValue, DebuggingInformationEntry, Reader};
use std::collections::HashMap;
use tracing::debug;

/// 型への参照（`.debug_info` 内のオフセット）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeRef(usize);

impl TypeRef {
    /// `.debug_info` 内のオフセット
    pub fn offset(self) -> usize {
        self.0
    }
}

/// 型の種類
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// 基本型
    Base { encoding: gimli::DwAte },
    /// ポインタ型（`*const T`, `&T`, `Box<T>` を含む）
    Pointer { pointee: Option<TypeRef> },
    /// 参照型
    Reference { pointee: Option<TypeRef> },
    /// 構造体型（Rustのenumもvariant partを持つ構造体として表現される）
    Struct {
        members: Vec<Member>,
        variant_part: Option<VariantPart>,
    },
    /// Union型
    Union { members: Vec<Member> },
    /// C言語風の列挙型
    Enumeration {
        underlying: Option<TypeRef>,
        enumerators: Vec<Enumerator>,
    },
    /// 配列型
    Array {
        element: Option<TypeRef>,
        count: Option<u64>,
    },
    /// typedef / const / volatile
    Alias { target: Option<TypeRef> },
    /// その他
    Other,
}

/// 型定義
#[derive(Debug, Clone)]
pub struct TypeDef {
    /// 完全修飾名
    pub name: Option<String>,
    /// バイトサイズ
    pub size: Option<u64>,
    /// 種類
    pub kind: TypeKind,
}

/// 構造体メンバ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// メンバ名
    pub name: String,
    /// 構造体先頭からのオフセット（バイト）
    pub offset: u64,
    /// 型
    pub ty: Option<TypeRef>,
}

/// variant part
#[derive(Debug, Clone)]
pub struct VariantPart {
    /// discriminantを保持するメンバ
    pub discriminant: Option<Member>,
    /// variantの一覧
    pub variants: Vec<Variant>,
}

/// variant
#[derive(Debug, Clone)]
pub struct Variant {
    /// Discriminant値。Noneならデフォルトvariant
    pub discr_value: Option<u64>,
    /// variantの中身
    pub member: Member,
}

/// 列挙子
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumerator {
    pub name: String,
    pub value: i64,
}

/// 型情報テーブル
#[derive(Debug, Default)]
pub struct TypeTable {
    types: HashMap<TypeRef, TypeDef>,
    by_name: HashMap<String, TypeRef>,
}

impl TypeTable {
    /// DWARFの全コンパイル単位から型情報を集める
    pub fn from_dwarf<R: Reader<Offset = usize>>(dwarf: &gimli::Dwarf<R>) -> Result<Self> {
        let mut table = Self::default();

        let mut units = dwarf.units();
        while let Some(header) = units.next()? {
            let unit = dwarf.unit(header)?;
            let mut tree = unit.entries_tree(None)?;
            let root = tree.root()?;

            let mut parser = UnitParser {
                dwarf,
                unit: &unit,
                table: &mut table,
            };
            parser.walk(root, &mut Vec::new())?;
        }

        debug!(
            "indexed {} types ({} named)",
            table.types.len(),
            table.by_name.len()
        );
        Ok(table)
    }

    /// 完全修飾名で型を探す
    pub fn lookup(&self, name: &str) -> Option<TypeRef> {
        self.by_name.get(name).copied()
    }

    /// 型定義を取得する
    pub fn get(&self, ty: TypeRef) -> Option<&TypeDef> {
        self.types.get(&ty)
    }

    /// typedef / const / volatile を剥がす
    pub fn strip_aliases(&self, mut ty: TypeRef) -> TypeRef {
        // 循環に備えて上限を設ける
        for _ in 0..16 {
            match self.get(ty).map(|def| &def.kind) {
                Some(TypeKind::Alias {
                    target: Some(target),
                }) => ty = *target,
                _ => break,
            }
        }
        ty
    }

    /// 型のバイトサイズ
    ///
    /// 配列は要素サイズ × 要素数、typedefは参照先のサイズになります。
    pub fn size_of(&self, ty: TypeRef) -> Option<u64> {
        let def = self.get(ty)?;
        if let Some(size) = def.size {
            return Some(size);
        }
        match &def.kind {
            TypeKind::Array {
                element: Some(element),
                count: Some(count),
            } => self.size_of(*element)?.checked_mul(*count),
            TypeKind::Alias {
                target: Some(target),
            } => self.size_of(*target),
            TypeKind::Pointer { .. } | TypeKind::Reference { .. } => Some(8),
            _ => None,
        }
    }

    /// 表示用の型名
    ///
    /// 名前のない配列やポインタは要素型から組み立てます。
    pub fn display_name(&self, ty: TypeRef) -> Option<String> {
        let def = self.get(ty)?;
        if let Some(name) = &def.name {
            return Some(name.clone());
        }
        match &def.kind {
            TypeKind::Array { element, count } => {
                let element = element
                    .and_then(|e| self.display_name(e))
                    .unwrap_or_else(|| "?".to_string());
                match count {
                    Some(count) => Some(format!("[{}; {}]", element, count)),
                    None => Some(format!("[{}]", element)),
                }
            }
            TypeKind::Pointer { pointee } => {
                let pointee = pointee
                    .and_then(|p| self.display_name(p))
                    .unwrap_or_else(|| "()".to_string());
                Some(format!("*const {}", pointee))
            }
            TypeKind::Alias {
                target: Some(target),
            } => self.display_name(*target),
            _ => None,
        }
    }

    /// 登録済みの型の数
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// 空かどうか
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// 名前付きの型の一覧
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(|name| name.as_str())
    }

    fn insert(&mut self, ty: TypeRef, def: TypeDef) {
        if let Some(name) = &def.name {
            self.by_name.entry(name.clone()).or_insert(ty);
        }
        self.types.insert(ty, def);
    }
}

/// 型を表すタグかどうか
fn is_type_tag(tag: gimli::DwTag) -> bool {
    matches!(
        tag,
        gimli::DW_TAG_base_type
            | gimli::DW_TAG_pointer_type
            | gimli::DW_TAG_reference_type
            | gimli::DW_TAG_rvalue_reference_type
            | gimli::DW_TAG_structure_type
            | gimli::DW_TAG_class_type
            | gimli::DW_TAG_union_type
            | gimli::DW_TAG_enumeration_type
            | gimli::DW_TAG_array_type
            | gimli::DW_TAG_typedef
            | gimli::DW_TAG_const_type
            | gimli::DW_TAG_volatile_type
            | gimli::DW_TAG_subroutine_type
    )
}

/// 1つのコンパイル単位の走査
struct UnitParser<'a, R: Reader<Offset = usize>> {
    dwarf: &'a gimli::Dwarf<R>,
    unit: &'a gimli::Unit<R>,
    table: &'a mut TypeTable,
}

impl<R: Reader<Offset = usize>> UnitParser<'_, R> {
    /// 子DIEを再帰的に走査する
    ///
    /// # Arguments
    /// * `node` - 走査するノード
    /// * `scope` - 現在の名前空間（完全修飾名の接頭辞）
    fn walk(&mut self, node: gimli::EntriesTreeNode<R>, scope: &mut Vec<String>) -> Result<()> {
        let mut children = node.children();
        while let Some(child) = children.next()? {
            let tag = child.entry().tag();
            if tag == gimli::DW_TAG_namespace {
                let name = self.name(child.entry())?.unwrap_or_default();
                scope.push(name);
                self.walk(child, scope)?;
                scope.pop();
            } else if is_type_tag(tag) {
                self.parse_type(child, scope)?;
            } else {
                self.walk(child, scope)?;
            }
        }
        Ok(())
    }

    /// 型DIEを1つ読み取り、テーブルに追加する
    fn parse_type(&mut self, node: gimli::EntriesTreeNode<R>, scope: &mut Vec<String>) -> Result<()> {
        let entry = node.entry().clone();
        let ty = match self.type_ref(entry.offset()) {
            Some(ty) => ty,
            None => return Ok(()),
        };

        // 宣言のみのDIEは定義ではない
        if let Some(AttributeValue::Flag(true)) = entry.attr_value(gimli::DW_AT_declaration)? {
            return Ok(());
        }

        let name = self.name(&entry)?;
        let qualified = name.as_ref().map(|name| qualify(scope, name));
        let size = entry
            .attr_value(gimli::DW_AT_byte_size)?
            .and_then(|attr| attr.udata_value());

        let kind = match entry.tag() {
            gimli::DW_TAG_base_type => {
                let encoding = match entry.attr_value(gimli::DW_AT_encoding)? {
                    Some(AttributeValue::Encoding(encoding)) => encoding,
                    _ => gimli::DwAte(0),
                };
                TypeKind::Base { encoding }
            }
            gimli::DW_TAG_pointer_type => TypeKind::Pointer {
                pointee: self.type_attr(&entry)?,
            },
            gimli::DW_TAG_reference_type | gimli::DW_TAG_rvalue_reference_type => {
                TypeKind::Reference {
                    pointee: self.type_attr(&entry)?,
                }
            }
            gimli::DW_TAG_structure_type | gimli::DW_TAG_class_type => {
                // 構造体の中にネストした型（variantの構造体など）は構造体名をスコープに加える
                scope.push(name.clone().unwrap_or_default());
                let result = self.parse_struct_children(node, scope);
                scope.pop();
                let (members, variant_part) = result?;
                TypeKind::Struct {
                    members,
                    variant_part,
                }
            }
            gimli::DW_TAG_union_type => {
                scope.push(name.clone().unwrap_or_default());
                let result = self.parse_struct_children(node, scope);
                scope.pop();
                let (members, _) = result?;
                TypeKind::Union { members }
            }
            gimli::DW_TAG_enumeration_type => TypeKind::Enumeration {
                underlying: self.type_attr(&entry)?,
                enumerators: self.parse_enumerators(node)?,
            },
            gimli::DW_TAG_array_type => TypeKind::Array {
                element: self.type_attr(&entry)?,
                count: self.parse_array_count(node)?,
            },
            gimli::DW_TAG_typedef | gimli::DW_TAG_const_type | gimli::DW_TAG_volatile_type => {
                TypeKind::Alias {
                    target: self.type_attr(&entry)?,
                }
            }
            _ => TypeKind::Other,
        };

        self.table.insert(
            ty,
            TypeDef {
                name: qualified,
                size,
                kind,
            },
        );
        Ok(())
    }

    /// 構造体の子DIE（メンバ, variant part, ネストした型）を読み取る
    fn parse_struct_children(
        &mut self,
        node: gimli::EntriesTreeNode<R>,
        scope: &mut Vec<String>,
    ) -> Result<(Vec<Member>, Option<VariantPart>)> {
        let mut members = Vec::new();
        let mut variant_part = None;

        let mut children = node.children();
        while let Some(child) = children.next()? {
            let tag = child.entry().tag();
            match tag {
                gimli::DW_TAG_member => {
                    // staticメンバはインスタンスに含まれない
                    if child.entry().attr_value(gimli::DW_AT_external)?.is_some() {
                        continue;
                    }
                    members.push(self.member(child.entry())?);
                }
                gimli::DW_TAG_variant_part => {
                    variant_part = Some(self.parse_variant_part(child)?);
                }
                tag if is_type_tag(tag) => self.parse_type(child, scope)?,
                _ => {}
            }
        }

        Ok((members, variant_part))
    }

    /// `DW_TAG_variant_part` を読み取る
    fn parse_variant_part(&mut self, node: gimli::EntriesTreeNode<R>) -> Result<VariantPart> {
        let discr_offset = match node.entry().attr_value(gimli::DW_AT_discr)? {
            Some(AttributeValue::UnitRef(offset)) => Some(offset),
            _ => None,
        };

        let mut discriminant = None;
        let mut variants = Vec::new();

        let mut children = node.children();
        while let Some(child) = children.next()? {
            let entry = child.entry();
            match entry.tag() {
                gimli::DW_TAG_member => {
                    let member = self.member(entry)?;
                    if discr_offset.is_none() || discr_offset == Some(entry.offset()) {
                        discriminant = Some(member);
                    }
                }
                gimli::DW_TAG_variant => {
                    let discr_value = entry
                        .attr_value(gimli::DW_AT_discr_value)?
                        .and_then(|attr| attr.udata_value());

                    let mut inner = child.children();
                    while let Some(variant_child) = inner.next()? {
                        if variant_child.entry().tag() == gimli::DW_TAG_member {
                            variants.push(Variant {
                                discr_value,
                                member: self.member(variant_child.entry())?,
                            });
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(VariantPart {
            discriminant,
            variants,
        })
    }

    /// 列挙子を読み取る
    fn parse_enumerators(&mut self, node: gimli::EntriesTreeNode<R>) -> Result<Vec<Enumerator>> {
        let mut enumerators = Vec::new();
        let mut children = node.children();
        while let Some(child) = children.next()? {
            let entry = child.entry();
            if entry.tag() != gimli::DW_TAG_enumerator {
                continue;
            }
            let name = self.name(entry)?.unwrap_or_default();
            let value = match entry.attr_value(gimli::DW_AT_const_value)? {
                Some(AttributeValue::Sdata(v)) => v,
                Some(attr) => attr.udata_value().map(|v| v as i64).unwrap_or(0),
                None => 0,
            };
            enumerators.push(Enumerator { name, value });
        }
        Ok(enumerators)
    }

    /// `DW_TAG_subrange_type` から配列の要素数を読み取る
    fn parse_array_count(&mut self, node: gimli::EntriesTreeNode<R>) -> Result<Option<u64>> {
        let mut children = node.children();
        while let Some(child) = children.next()? {
            let entry = child.entry();
            if entry.tag() != gimli::DW_TAG_subrange_type {
                continue;
            }
            if let Some(count) = entry
                .attr_value(gimli::DW_AT_count)?
                .and_then(|attr| attr.udata_value())
            {
                return Ok(Some(count));
            }
            if let Some(upper) = entry
                .attr_value(gimli::DW_AT_upper_bound)?
                .and_then(|attr| attr.udata_value())
            {
                let lower = entry
                    .attr_value(gimli::DW_AT_lower_bound)?
                    .and_then(|attr| attr.udata_value())
                    .unwrap_or(0);
                // 上限 -1（長さ0や可変長配列）や lower > upper は長さ不明とする
                return Ok(upper
                    .checked_add(1)
                    .and_then(|end| end.checked_sub(lower)));
            }
        }
        Ok(None)
    }

    /// メンバDIEを読み取る
    fn member(&self, entry: &DebuggingInformationEntry<R>) -> Result<Member> {
        let name = self.name(entry)?.unwrap_or_else(|| "<unnamed>".to_string());
        let offset = entry
            .attr_value(gimli::DW_AT_data_member_location)?
            .and_then(|attr| attr.udata_value())
            .unwrap_or(0);
        Ok(Member {
            name,
            offset,
            ty: self.type_attr(entry)?,
        })
    }

    /// DW_AT_name を取得する
    fn name(&self, entry: &DebuggingInformationEntry<R>) -> Result<Option<String>> {
        match entry.attr_value(gimli::DW_AT_name)? {
            Some(attr) => {
                let name = self.dwarf.attr_string(self.unit, attr)?;
                Ok(Some(name.to_string_lossy()?.into_owned()))
            }
            None => Ok(None),
        }
    }

    /// DW_AT_type を取得する
    fn type_attr(&self, entry: &DebuggingInformationEntry<R>) -> Result<Option<TypeRef>> {
        match entry.attr_value(gimli::DW_AT_type)? {
            Some(AttributeValue::UnitRef(offset)) => Ok(self.type_ref(offset)),
            Some(AttributeValue::DebugInfoRef(offset)) => Ok(Some(TypeRef(offset.0))),
            _ => Ok(None),
        }
    }

    /// ユニット内オフセットを `.debug_info` 内のオフセットに変換する
    fn type_ref(&self, offset: gimli::UnitOffset<usize>) -> Option<TypeRef> {
        offset
            .to_debug_info_offset(&self.unit.header)
            .map(|offset| TypeRef(offset.0))
    }
}

/// スコープと名前から完全修飾名を作る
fn qualify(scope: &[String], name: &str) -> String {
    let mut qualified = String::new();
    for part in scope.iter().filter(|part| !part.is_empty()) {
        qualified.push_str(part);
        qualified.push_str("::");
    }
    qualified.push_str(name);
    qualified
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify() {
        let scope = vec!["basic_async".to_string(), "foo".to_string()];
        assert_eq!(
            qualify(&scope, "{async_fn_env#0}"),
            "basic_async::foo::{async_fn_env#0}"
        );
        assert_eq!(qualify(&[], "u32"), "u32");
        assert_eq!(qualify(&["".to_string()], "Anon"), "Anon");
    }
}
