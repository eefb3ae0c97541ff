//! Core processor library
//!
//! Built-in processors that run in-process. Business logic is never
//! registered here; it lives behind the plugin host.

mod debug;
mod http;
mod io;
mod llm;
mod time;
mod transform;

pub use debug::{DebugLogFactory, DebugLogProcessor};
pub use http::{HttpRequestFactory, HttpRequestProcessor};
pub use io::{
    FileInputFactory, FileInputProcessor, FileOutputFactory, FileOutputProcessor,
    TextOutputFactory, TextOutputProcessor, UserInputFactory, UserInputProcessor,
};
pub use llm::{LlmStubFactory, LlmStubProcessor};
pub use time::{DelayFactory, DelayProcessor};
pub use transform::{
    DataTransformFactory, DataTransformProcessor, JsonParseFactory, JsonParseProcessor,
    JsonStringifyFactory, JsonStringifyProcessor, TextTransformFactory, TextTransformProcessor,
};

use relaycore::{Payload, RegistryError};
use relayruntime::{NodeRegistry, ProcessorFactory};
use std::sync::Arc;

/// Register all core processors with a registry
pub fn register_all(registry: &mut NodeRegistry) -> Result<(), RegistryError> {
    let factories: [(&str, Arc<dyn ProcessorFactory>); 12] = [
        ("input_user", Arc::new(UserInputFactory)),
        ("input_file", Arc::new(FileInputFactory)),
        ("output_text", Arc::new(TextOutputFactory)),
        ("output_file", Arc::new(FileOutputFactory)),
        ("text_transform", Arc::new(TextTransformFactory)),
        ("json_parse", Arc::new(JsonParseFactory)),
        ("json_stringify", Arc::new(JsonStringifyFactory)),
        ("data_transform", Arc::new(DataTransformFactory)),
        ("http_request", Arc::new(HttpRequestFactory)),
        ("llm_stub", Arc::new(LlmStubFactory)),
        ("delay", Arc::new(DelayFactory)),
        ("debug_log", Arc::new(DebugLogFactory)),
    ];

    for (name, factory) in factories {
        registry.register(name, factory)?;
    }
    Ok(())
}

/// A registry holding every core processor
pub fn default_registry() -> Result<NodeRegistry, RegistryError> {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry)?;
    Ok(registry)
}

/// Strings as-is, everything else as compact JSON
pub(crate) fn payload_text(value: &Payload) -> String {
    match value {
        Payload::String(s) => s.clone(),
        Payload::Null => String::new(),
        other => other.to_string(),
    }
}
