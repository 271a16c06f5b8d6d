//! TypeScript Generation Tests
//!
//! Validates that host-facing mocap-live types can be exported to TypeScript
//! when the tauri feature is enabled.

#[cfg(feature = "tauri")]
#[test]
fn test_host_types_implement_specta_type() {
    use specta::Type;

    // If this compiles, the types are properly configured for TypeScript export.
    fn assert_type<T: Type>() {}

    assert_type::<mocap_live::ConnectionStatus>();
    assert_type::<mocap_live::UpdateRate>();
    assert_type::<mocap_live::DataSetId>();
    assert_type::<mocap_live::EntitySchema>();
    assert_type::<mocap_live::ActorSignature>();
    assert_type::<mocap_live::PropSignature>();
}

#[cfg(not(feature = "tauri"))]
#[test]
fn test_tauri_feature_disabled() {
    // Types still compile without specta::Type
    let _ = mocap_live::UpdateRate::Native;
    assert_eq!(mocap_live::ConnectionStatus::default(), mocap_live::ConnectionStatus::Disconnected);
}
