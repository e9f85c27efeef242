//! デモバイナリのDWARF読み込みテスト
//!
//! `cargo build -p basic_async` 済みの場合のみ実行されます。

use awaitree_dwarf::{DwarfLoader, TypeKind};
use std::path::Path;

const BINARY_PATH: &str = "../target/debug/basic_async";

fn load_demo() -> Option<DwarfLoader> {
    if !Path::new(BINARY_PATH).exists() {
        println!("skipping: {} is not built", BINARY_PATH);
        return None;
    }
    Some(DwarfLoader::load(BINARY_PATH).expect("Failed to load DWARF from basic_async binary"))
}

#[test]
fn test_demo_state_machines_are_indexed() {
    let Some(loader) = load_demo() else { return };
    let types = loader.type_table().expect("Failed to build type table");

    println!("indexed {} types", types.len());
    assert!(!types.is_empty());

    for function in ["foo", "bar", "baz"] {
        let name = format!("basic_async::{}::{{async_fn_env#0}}", function);
        let ty = types
            .lookup(&name)
            .unwrap_or_else(|| panic!("Should find {}", name));

        match &types.get(ty).unwrap().kind {
            TypeKind::Struct { variant_part, .. } => {
                assert!(variant_part.is_some(), "{} should have a variant part", name)
            }
            other => panic!("Expected struct for {}, got {:?}", name, other),
        }
    }
}

#[test]
fn test_demo_race_type() {
    let Some(loader) = load_demo() else { return };
    let types = loader.type_table().expect("Failed to build type table");

    let races: Vec<&str> = types
        .names()
        .filter(|name| name.starts_with("futures_concurrency::future::race::array::Race<"))
        .collect();
    println!("race types: {:?}", races);
    assert!(!races.is_empty(), "Should find the array race combinator");
}

#[test]
fn test_load_missing_file() {
    assert!(DwarfLoader::load("/nonexistent/awaitree-binary").is_err());
}
