//! Process-wide dispatcher state bundled into one explicit handle.

use std::sync::Arc;

use serde_json::Value;

use crate::{context::Context, keys, observer::Observer, settings::Settings};

const DEFAULT_INSTANCE_NAME: &str = "eel";

/// Root context plus the identity of the running instance.
///
/// Built once at start-up and passed to whatever serves requests. The root
/// context already holds the settings under [`keys::SETTINGS`] and the
/// custom properties under [`keys::CUSTOM_PROPERTIES`], so every
/// sub-context inherits both.
#[derive(Debug, Clone)]
pub struct Runtime {
    root: Arc<Context>,
    settings: Arc<Settings>,
    instance_name: String,
    env_name: String,
}

impl Runtime {
    /// Builds a runtime over a fresh root context.
    pub fn new(settings: Settings, env_name: impl Into<String>) -> Self {
        Self::with_root(Context::new(), settings, env_name)
    }

    /// Builds a runtime around an existing root context.
    pub fn with_root(root: Context, settings: Settings, env_name: impl Into<String>) -> Self {
        let settings = Arc::new(settings);
        root.put_config(keys::SETTINGS, Arc::clone(&settings));
        root.put_value(keys::CUSTOM_PROPERTIES, Value::Object(settings.custom_properties.clone()));

        let instance_name = if settings.name.is_empty() {
            DEFAULT_INSTANCE_NAME.to_string()
        } else {
            settings.name.clone()
        };

        Self { root: Arc::new(root), settings, instance_name, env_name: env_name.into() }
    }

    /// Registers the process observer on the root context.
    pub fn with_observer(self, observer: Arc<dyn Observer>) -> Self {
        self.root.register_observer(observer);
        self
    }

    /// The shared root context.
    pub fn root(&self) -> &Context {
        &self.root
    }

    /// Loaded settings.
    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Instance name, `"eel"` when settings leave it empty.
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Deployment environment name.
    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    /// Application id from settings.
    pub fn app_id(&self) -> &str {
        &self.settings.app_id
    }

    /// Fresh request context derived from the root.
    pub fn request_context(&self) -> Context {
        self.root.sub_context()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn root_carries_settings_and_custom_properties() {
        let settings =
            Settings::from_json(r#"{"Name": "eel-7", "CustomProperties": {"region": "eu"}}"#).unwrap();
        let runtime = Runtime::new(settings, "test");

        let ctx = runtime.request_context();
        assert_eq!(ctx.settings().map(|s| s.name.clone()).as_deref(), Some("eel-7"));
        assert_eq!(ctx.value(keys::CUSTOM_PROPERTIES), Some(json!({"region": "eu"})));
        assert_eq!(runtime.instance_name(), "eel-7");
        assert_eq!(runtime.env_name(), "test");
    }

    #[test]
    fn empty_name_falls_back_to_default() {
        let runtime = Runtime::new(Settings::default(), "");
        assert_eq!(runtime.instance_name(), "eel");
    }

    #[test]
    fn request_contexts_get_distinct_ids() {
        let runtime = Runtime::new(Settings::default(), "test");
        assert_ne!(runtime.request_context().id(), runtime.request_context().id());
        assert!(runtime.root().id().is_empty());
    }
}
