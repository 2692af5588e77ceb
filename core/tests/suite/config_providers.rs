use std::collections::HashMap;

use kubeassist_core::ConfigLoader;
use kubeassist_core::ConfigOverrides;
use kubeassist_core::ModelFactory;
use kubeassist_core::model_provider::FactoryError;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn loader(home: &TempDir, env: &[(&str, &str)]) -> ConfigLoader {
    ConfigLoader::with_env(
        env.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
    )
    .with_home(home.path().to_path_buf())
}

#[test]
fn direct_key_priority_from_environment() {
    let home = TempDir::new().unwrap();
    let config = loader(
        &home,
        &[("GEMINI_API_KEY", "g"), ("ANTHROPIC_API_KEY", "a")],
    )
    .load(ConfigOverrides::default())
    .unwrap();

    let factory = ModelFactory::new(config.provider_registry(false), reqwest::Client::new(), None);
    let handle = factory.build_default(None).unwrap();
    assert_eq!(handle.provider_id(), "anthropic");
}

#[test]
fn explicit_unknown_provider_is_reported() {
    let home = TempDir::new().unwrap();
    let config = loader(&home, &[("KUBEASSIST_MODEL_PROVIDER", "mistral")])
        .load(ConfigOverrides::default())
        .unwrap();

    let factory = ModelFactory::new(config.provider_registry(false), reqwest::Client::new(), None);
    let provider = config.model_provider.as_deref().unwrap();
    let err = factory.build(provider, config.model.as_deref()).unwrap_err();
    assert!(matches!(err, FactoryError::UnknownProvider { .. }));
}

#[test]
fn flag_model_overrides_environment() {
    let home = TempDir::new().unwrap();
    let config = loader(
        &home,
        &[("OPENAI_API_KEY", "sk"), ("KUBEASSIST_MODEL", "gpt-env")],
    )
    .load(ConfigOverrides {
        model: Some("gpt-flag".to_string()),
        ..Default::default()
    })
    .unwrap();

    let factory = ModelFactory::new(config.provider_registry(false), reqwest::Client::new(), None);
    let handle = factory.build_default(config.model.as_deref()).unwrap();
    assert_eq!(handle.model(), "gpt-flag");
}
