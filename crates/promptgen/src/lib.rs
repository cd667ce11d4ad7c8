// promptgen: Layers 2-4. Rendering, output strategies, hooks, backends, generators.
#![allow(clippy::result_large_err)]

pub mod default_backend;
pub mod generator;
pub mod hooks;
pub mod output;
pub mod providers;
pub mod render;
pub mod stream;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub(crate) mod util;

// --- Curated re-exports from promptgen-types (Layer 1) ---
pub use promptgen_types::{
    // Backend contract
    Backend,
    BackendSink,
    BackendStream,
    BoxFuture,
    // Call scope
    CallContext,
    // Errors
    Error,
    ErrorKind,
    // Hooks
    Hook,
    // Config
    AdapterTimeout,
    ModelSettings,
    OpenAiConfig,
};

// Callers build a `CallContext` from their own token with `CallContext::from_token`.
pub use tokio_util::sync::CancellationToken;

// --- Generator and streaming (Layer 4) ---
pub use generator::Generator;
pub use stream::{GenerationStream, StreamEvent, StreamOutcome, TokenReceiver};

// --- Output shapes ---
pub use output::{extract_json, Json, Output, OutputKind, OutputStrategy, SchemaValidator};

// --- Hooks and rendering ---
pub use hooks::{FnHook, HookChain, LoggingHook};
pub use render::Renderer;

// Default backend functions at crate root.
#[cfg(any(test, feature = "testing"))]
pub use default_backend::reset_default_backend;
pub use default_backend::{get_default_backend, set_default_backend};

#[cfg(feature = "openai")]
pub use providers::openai::OpenAiBackend;

#[cfg(feature = "testing")]
pub use testing::MockBackend;
