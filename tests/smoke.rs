//! Basic smoke test to verify the public API surface.

#[test]
fn crate_compiles() {
    // If this test runs, the public types are reachable from outside.
    let _ = std::any::type_name::<activation_keys::StoreConfig>();
    let _ = std::any::type_name::<activation_keys::LicensingError>();
    let _ = std::any::type_name::<activation_keys::LicensingClient>();
}
