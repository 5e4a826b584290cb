//! Structured lifecycle event hooks (§6, §9 ambient logging).
//!
//! [`EventListener`] is the stable, explicit observer contract the spec
//! calls for. [`TracingListener`] is the default implementation, bridging
//! those callbacks onto the `tracing` crate so the engine gets structured
//! logs without callers having to write their own listener.

use crate::value::Value;

/// Optional observer over template loading, field decode/encode, and
/// codec-loading lifecycle events (§6).
pub trait EventListener: Send + Sync {
    fn reading_field(&self, _template_name: &str, _field_name: &str, _binding_kind: &str) {}
    fn read_field(&self, _template_name: &str, _field_name: &str, _value: &Value) {}

    fn evaluating_field(&self, _template_name: &str, _field_name: &str) {}
    fn evaluated_field(&self, _template_name: &str, _field_name: &str, _value: &Value) {}

    fn writing_field(&self, _template_name: &str, _field_name: &str, _binding_kind: &str) {}
    fn written_field(&self, _template_name: &str, _field_name: &str, _value: &Value) {}

    fn loading_templates_from(&self, _names: &[&str]) {}
    fn loaded_templates(&self, _count: usize) {}
    fn cannot_load_template(&self, _name: &str, _error: &str) {}

    fn loading_codecs(&self, _names: &[&str]) {}
    fn loaded_codecs(&self, _count: usize) {}
    fn cannot_create_codec(&self, _name: &str) {}
}

/// Zero-cost default: every hook is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl EventListener for NoopListener {}

/// Bridges [`EventListener`] callbacks onto `tracing` spans/events,
/// the crate's default ambient observability backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl EventListener for TracingListener {
    fn reading_field(&self, template_name: &str, field_name: &str, binding_kind: &str) {
        tracing::trace!(template = template_name, field = field_name, kind = binding_kind, "reading field");
    }

    fn read_field(&self, template_name: &str, field_name: &str, value: &Value) {
        tracing::debug!(template = template_name, field = field_name, %value, "read field");
    }

    fn evaluating_field(&self, template_name: &str, field_name: &str) {
        tracing::trace!(template = template_name, field = field_name, "evaluating field");
    }

    fn evaluated_field(&self, template_name: &str, field_name: &str, value: &Value) {
        tracing::debug!(template = template_name, field = field_name, %value, "evaluated field");
    }

    fn writing_field(&self, template_name: &str, field_name: &str, binding_kind: &str) {
        tracing::trace!(template = template_name, field = field_name, kind = binding_kind, "writing field");
    }

    fn written_field(&self, template_name: &str, field_name: &str, value: &Value) {
        tracing::debug!(template = template_name, field = field_name, %value, "written field");
    }

    fn loading_templates_from(&self, names: &[&str]) {
        tracing::info!(count = names.len(), "loading templates");
    }

    fn loaded_templates(&self, count: usize) {
        tracing::info!(count, "loaded templates");
    }

    fn cannot_load_template(&self, name: &str, error: &str) {
        tracing::warn!(template = name, error, "cannot load template");
    }

    fn loading_codecs(&self, names: &[&str]) {
        tracing::info!(count = names.len(), "loading codecs");
    }

    fn loaded_codecs(&self, count: usize) {
        tracing::info!(count, "loaded codecs");
    }

    fn cannot_create_codec(&self, name: &str) {
        tracing::warn!(codec = name, "cannot create codec");
    }
}
