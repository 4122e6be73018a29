//! Registration against the built-in catalog, end to end with the
//! configuration reader.

use straylight::config::read_operator_list;
use straylight::ops;
use straylight::registry::{Registry, RegistryError};

#[test]
fn configured_operators_register_in_file_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("operators.yaml");
    std::fs::write(
        &path,
        "operators:\n  - straylight.ops.Sequence\n  - straylight.ops.Sum\n  - straylight.ops.Mul\n",
    )
    .expect("write");

    let qualified = read_operator_list(&path).expect("operator list");
    let registry = Registry::build(&ops::catalog(), &qualified).expect("registry");

    let names: Vec<_> = registry.iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["Sequence", "Sum", "Mul"]);
}

#[test]
fn unknown_operator_in_config_aborts_startup() {
    let qualified = vec!["straylight.ops.Quotient".to_owned()];
    let error = Registry::build(&ops::catalog(), &qualified).expect_err("unknown symbol");
    assert!(matches!(error, RegistryError::AttributeMissing { .. }));
}

#[test]
fn registered_descriptors_are_concrete() {
    let qualified = vec!["straylight.ops.Sum".to_owned()];
    let registry = Registry::build(&ops::catalog(), &qualified).expect("registry");
    for (_, descriptor) in registry.iter() {
        assert!(!descriptor.is_abstract());
    }
}
