use storyforge_core::config::{ConfigurationError, ProviderConfig, ProvidersConfig};
use storyforge_core::providers::ProviderRegistry;

#[test]
fn test_default_configuration_resolves_every_capability() {
    let registry = ProviderRegistry::from_config(&ProvidersConfig::default()).unwrap();
    assert_eq!(registry.storyboard().name(), "ollama");
    assert_eq!(registry.image().name(), "http");
    assert_eq!(registry.speech().name(), "http");
    assert_eq!(registry.animation().name(), "http");
}

#[test]
fn test_unknown_backend_is_rejected() {
    let config = ProvidersConfig {
        image: ProviderConfig::new("comfyui", "http://127.0.0.1:8188"),
        ..Default::default()
    };
    let err = ProviderRegistry::from_config(&config).unwrap_err();
    assert!(matches!(
        err,
        ConfigurationError::UnknownBackend { ref capability, ref backend }
            if capability == "image" && backend == "comfyui"
    ));
}

#[test]
fn test_builder_requires_all_capabilities() {
    let err = ProviderRegistry::builder().build().unwrap_err();
    assert!(err.to_string().contains("providers.storyboard"), "{err}");
}
