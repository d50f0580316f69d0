//! Fuzz target for JSON tree parsing.
//!
//! Any input must either be rejected with an error or produce a tree whose
//! depth and node count agree with its JSON rendering.

#![no_main]

use hierarchical_vector_db::Tree;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(tree) = Tree::from_json_str(text) else {
        return;
    };

    let reparsed = Tree::from_json_value(&tree.to_json_value()).expect("rendered tree reparses");
    assert_eq!(reparsed.depth(), tree.depth());
    assert_eq!(reparsed.node_count(), tree.node_count());
    assert!(tree.depth() <= tree.node_count());
});
