//! Web worker entry point for tonesplit decomposition.
//!
//! This crate compiles to a standalone WASM module that runs inside a
//! `Worker`. It receives image file bytes via `postMessage`, runs
//! `tonesplit_pipeline::process` with the JPEG encoder, and posts the
//! four range images back.
//!
//! JPEG bytes are sent as raw `Uint8Array` buffers next to their
//! `data:` URL; thresholds, coverage, and timings travel as a small JSON
//! string. Progress messages are posted after every stage so the page
//! can drive a progress bar while the worker is busy.

use serde::{Deserialize, Serialize};
use tonesplit_export::{JpegArtifact, JpegEncoder};
use tonesplit_pipeline::diagnostics::{Clock, DecompositionDiagnostics, DiagnosticsRecorder};
use tonesplit_pipeline::{
    Dimensions, EngineConfig, PipelineError, ProcessOutcome, ProgressObserver, StageEvent,
    ThresholdSet, TonalRanges,
};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// The non-image portion of a finished decomposition, serialized as JSON.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub dimensions: Dimensions,
    pub thresholds: ThresholdSet,
    /// Pixels per range; `None` where rendering failed.
    pub coverage: TonalRanges<Option<u64>>,
    pub diagnostics: DecompositionDiagnostics,
}

/// Message protocol: the main thread sends a JS object with:
/// - `imageBytes`: `Uint8Array` containing the raw image file bytes
/// - `fileName`: `String` used to name the outputs
/// - `generation`: `f64` generation counter (passed through to responses)
///
/// While working the worker posts progress objects:
/// - `generation`: `f64`
/// - `progress`: `f64` percent complete
/// - `stage`: `String` describing the current step
///
/// On success the worker responds with:
/// - `generation`: `f64` matching the request generation
/// - `ok`: `true`
/// - `summaryJson`: `String` -- JSON-serialized [`Summary`]
/// - `images`: `Array` in processing order; each entry is either
///   `{ range, name, jpeg: Uint8Array, dataUrl }` or `{ range, error }`
///   where `error` is a JSON-serialized `PipelineError`
///
/// When the source cannot be validated or decoded the worker responds with:
/// - `generation`: `f64`
/// - `ok`: `false`
/// - `errorJson`: `String` -- JSON-serialized `PipelineError`
///
/// # Worker entry point
///
/// Called automatically when the WASM module is instantiated in the
/// worker context.
#[wasm_bindgen(start)]
pub fn worker_main() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);

    let global: web_sys::DedicatedWorkerGlobalScope = js_sys::global()
        .dyn_into()
        .expect_throw("not running in a DedicatedWorkerGlobalScope");

    let onmessage =
        Closure::<dyn FnMut(web_sys::MessageEvent)>::new(move |event: web_sys::MessageEvent| {
            handle_message(event);
        });
    global.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget(); // lives for the worker lifetime
}

/// Handle an incoming message from the main thread.
#[allow(clippy::needless_pass_by_value)]
fn handle_message(event: web_sys::MessageEvent) {
    let data = event.data();

    let image_bytes_val = js_sys::Reflect::get(&data, &JsValue::from_str("imageBytes"))
        .expect_throw("missing imageBytes field");
    let file_name_val = js_sys::Reflect::get(&data, &JsValue::from_str("fileName"))
        .expect_throw("missing fileName field");
    let generation_val = js_sys::Reflect::get(&data, &JsValue::from_str("generation"))
        .expect_throw("missing generation field");

    let image_bytes_js: js_sys::Uint8Array = image_bytes_val
        .dyn_into()
        .expect_throw("imageBytes is not a Uint8Array");
    let image_bytes = image_bytes_js.to_vec();
    let file_name = file_name_val.as_string().unwrap_or_default();
    let generation = generation_val
        .as_f64()
        .expect_throw("generation is not a number");

    log::info!(
        "decomposing {file_name} ({} bytes), generation {generation}",
        image_bytes.len()
    );

    let clock = WebClock;
    let mut recorder = DiagnosticsRecorder::new(&clock);
    let mut observer = |event: &StageEvent| {
        recorder.on_event(event);
        post_progress(generation, event);
    };

    // Synchronous: blocks this worker thread only.
    let outcome = tonesplit_pipeline::process(
        &image_bytes,
        &file_name,
        &EngineConfig::default(),
        &JpegEncoder::default(),
        &mut observer,
    );
    let diagnostics = recorder.finish();

    match outcome {
        Ok(outcome) => post_success_response(generation, outcome, diagnostics),
        Err(e) => {
            log::warn!("decomposition failed: {e}");
            post_error_json(generation, &error_json(&e));
        }
    }
}

fn error_json(error: &PipelineError) -> String {
    serde_json::to_string(error)
        .unwrap_or_else(|ser_err| format!("\"serialization error: {ser_err}\""))
}

/// JSON string describing a failure to serialize `what` for the page.
fn serialization_error_json(what: &str, error: &serde_json::Error) -> String {
    let message = format!("serialization error: failed to serialize {what}: {error}");
    serde_json::to_string(&message).unwrap_or_else(|_| "\"serialization error\"".into())
}

/// Post a progress update for one stage event.
fn post_progress(generation: f64, event: &StageEvent) {
    let message = js_sys::Object::new();
    let _ = js_sys::Reflect::set(
        &message,
        &JsValue::from_str("generation"),
        &JsValue::from_f64(generation),
    );
    let _ = js_sys::Reflect::set(
        &message,
        &JsValue::from_str("progress"),
        &JsValue::from_f64(event.progress()),
    );
    let _ = js_sys::Reflect::set(
        &message,
        &JsValue::from_str("stage"),
        &JsValue::from_str(&event.label()),
    );
    post(&message);
}

/// Post the four range images back to the main thread.
///
/// JPEG bytes are sent as raw `Uint8Array` buffers; the summary is a
/// small JSON string.
fn post_success_response(
    generation: f64,
    outcome: ProcessOutcome<JpegArtifact>,
    diagnostics: DecompositionDiagnostics,
) {
    let ProcessOutcome {
        dimensions,
        thresholds,
        coverage,
        images,
    } = outcome;

    let summary = Summary {
        dimensions,
        thresholds,
        coverage,
        diagnostics,
    };
    let summary_json = match serde_json::to_string(&summary) {
        Ok(json) => json,
        Err(e) => {
            log::error!("failed to serialize summary: {e}");
            post_error_json(generation, &serialization_error_json("summary", &e));
            return;
        }
    };

    let entries = js_sys::Array::new();
    for (range, result) in images.iter() {
        let entry = js_sys::Object::new();
        let set = |key: &str, val: &JsValue| {
            js_sys::Reflect::set(&entry, &JsValue::from_str(key), val)
                .expect_throw("failed to set image field");
        };
        set("range", &JsValue::from_str(range.name()));
        match result {
            Ok(processed) => {
                set("name", &JsValue::from_str(&processed.name));
                set(
                    "jpeg",
                    &js_sys::Uint8Array::from(processed.artifact.bytes.as_slice()),
                );
                set("dataUrl", &JsValue::from_str(&processed.artifact.data_url));
            }
            Err(e) => set("error", &JsValue::from_str(&error_json(e))),
        }
        entries.push(&entry);
    }

    let response = js_sys::Object::new();
    let set = |key: &str, val: &JsValue| {
        js_sys::Reflect::set(&response, &JsValue::from_str(key), val)
            .expect_throw("failed to set response field");
    };
    set("generation", &JsValue::from_f64(generation));
    set("ok", &JsValue::from_bool(true));
    set("summaryJson", &JsValue::from_str(&summary_json));
    set("images", &entries);

    post(&response);
}

/// Post a pre-serialized error JSON back to the main thread.
fn post_error_json(generation: f64, error_json: &str) {
    let response = js_sys::Object::new();
    let _ = js_sys::Reflect::set(
        &response,
        &JsValue::from_str("generation"),
        &JsValue::from_f64(generation),
    );
    let _ = js_sys::Reflect::set(
        &response,
        &JsValue::from_str("ok"),
        &JsValue::from_bool(false),
    );
    let _ = js_sys::Reflect::set(
        &response,
        &JsValue::from_str("errorJson"),
        &JsValue::from_str(error_json),
    );
    post(&response);
}

fn post(message: &JsValue) {
    if let Ok(global) = js_sys::global().dyn_into::<web_sys::DedicatedWorkerGlobalScope>() {
        let _ = global.post_message(message);
    }
}

/// [`Clock`] backed by `web_time::Instant` (`performance.now()` in the browser).
struct WebClock;

impl Clock for WebClock {
    type Instant = web_time::Instant;

    fn now(&self) -> web_time::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &web_time::Instant) -> std::time::Duration {
        since.elapsed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn summary_serialization_failure_is_not_reported_as_config_error() {
        let error = serde_json::from_str::<u8>("\"x\"").unwrap_err();
        let json = serialization_error_json("summary", &error);
        let message: String = serde_json::from_str(&json).unwrap();
        assert!(
            message.starts_with("serialization error: failed to serialize summary:"),
            "{message}"
        );
        assert!(serde_json::from_str::<PipelineError>(&json).is_err());
    }

    #[test]
    fn pipeline_errors_serialize_for_the_page() {
        let json = error_json(&PipelineError::EmptyInput);
        let back: PipelineError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PipelineError::EmptyInput);
    }
}
