// default_backend.rs -- Process-wide default backend (Layer 3).
//
// Used by generators that were not given a backend explicitly. Reads are lock-free through
// arc-swap; lazy initialization from the environment happens once, under a mutex.

use std::sync::{Arc, LazyLock, Mutex};

use arc_swap::ArcSwap;

use promptgen_types::{Backend, Error, ModelSettings};

static DEFAULT_BACKEND: LazyLock<ArcSwap<Option<Arc<dyn Backend>>>> =
    LazyLock::new(|| ArcSwap::from_pointee(None));

/// Guard for the lazy-init path so two callers never both build a backend.
static INIT_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Install `backend` as the default for generators without their own.
pub fn set_default_backend(backend: Arc<dyn Backend>) {
    DEFAULT_BACKEND.store(Arc::new(Some(backend)));
}

/// The default backend, built from the environment on first use if none was set.
///
/// A missing credential is a `Configuration` error that also answers `is_no_provider`.
pub fn get_default_backend() -> Result<Arc<dyn Backend>, Error> {
    let guard = DEFAULT_BACKEND.load();
    if let Some(ref backend) = **guard {
        return Ok(Arc::clone(backend));
    }

    let _lock = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let guard = DEFAULT_BACKEND.load();
    if let Some(ref backend) = **guard {
        return Ok(Arc::clone(backend));
    }

    let backend = backend_from_env()?;
    tracing::debug!(backend = backend.name(), "initialized default backend from environment");
    DEFAULT_BACKEND.store(Arc::new(Some(Arc::clone(&backend))));
    Ok(backend)
}

/// Clear the default backend. For testing only.
#[cfg(any(test, feature = "testing"))]
pub fn reset_default_backend() {
    DEFAULT_BACKEND.store(Arc::new(None));
}

fn backend_from_env() -> Result<Arc<dyn Backend>, Error> {
    adapter_from_env(None)
}

/// A backend configured from the environment, with `settings` replacing the model
/// parameters. Built fresh on every call and never installed as the default.
pub(crate) fn backend_with_settings(settings: &ModelSettings) -> Result<Arc<dyn Backend>, Error> {
    adapter_from_env(Some(settings))
}

#[cfg(feature = "openai")]
fn adapter_from_env(settings: Option<&ModelSettings>) -> Result<Arc<dyn Backend>, Error> {
    use crate::providers::openai::OpenAiBackend;
    use promptgen_types::OpenAiConfig;

    let built = OpenAiConfig::from_env().and_then(|mut config| {
        if let Some(settings) = settings {
            config.settings = settings.clone();
        }
        OpenAiBackend::new(config)
    });
    match built {
        Ok(backend) => Ok(Arc::new(backend)),
        Err(err) if err.is_configuration() => Err(Error::configuration(format!(
            "no backend configured and default configuration failed: {}",
            err.message
        ))
        .with_source(err.with_source(Error::no_provider()))),
        Err(err) => Err(err),
    }
}

#[cfg(not(feature = "openai"))]
fn adapter_from_env(_settings: Option<&ModelSettings>) -> Result<Arc<dyn Backend>, Error> {
    Err(Error::no_provider())
}
