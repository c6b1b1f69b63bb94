//! Minimal run-time metrics sink.
//!
//! Prometheus export is intentionally left out; instead we allow the host
//! process to register a raw callback that receives name/value pairs.

use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use once_cell::sync::OnceCell;
use std::ffi::CString;
use std::os::raw::{c_char, c_ulonglong};
use std::sync::Arc;

/// Signature for external collectors. `name` is NUL-terminated and only
/// valid for the duration of the call.
pub type StatsCallback = unsafe extern "C" fn(name: *const c_char, value: c_ulonglong);

static CALLBACK: OnceCell<StatsCallback> = OnceCell::new();

/// Register a callback from C/other languages. Only the first registration
/// sticks.
#[no_mangle]
pub unsafe extern "C" fn nrwl_register_stats_callback(cb: StatsCallback) {
    let _ = CALLBACK.set(cb);
}

fn forward(key: &Key, value: u64) {
    if let Some(cb) = CALLBACK.get() {
        if let Ok(name) = CString::new(key.name()) {
            unsafe { cb(name.as_ptr(), value as c_ulonglong) };
        }
    }
}

/// Forwarding recorder. Uses the callback **if** it was registered.
struct FfiRecorder;

#[derive(Clone)]
struct FfiMetric {
    key: Key,
}

impl Recorder for FfiRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(FfiMetric { key: key.clone() }))
    }
    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(Arc::new(FfiMetric { key: key.clone() }))
    }
    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(Arc::new(FfiMetric { key: key.clone() }))
    }
}

impl metrics::CounterFn for FfiMetric {
    fn increment(&self, value: u64) {
        forward(&self.key, value);
    }
    fn absolute(&self, value: u64) {
        forward(&self.key, value);
    }
}

impl metrics::GaugeFn for FfiMetric {
    fn set(&self, value: f64) {
        forward(&self.key, value as u64);
    }
    fn increment(&self, value: f64) {
        forward(&self.key, value as u64);
    }
    fn decrement(&self, value: f64) {
        forward(&self.key, value as u64);
    }
}

impl metrics::HistogramFn for FfiMetric {
    fn record(&self, value: f64) {
        forward(&self.key, value as u64);
    }
}

/// Install exactly **once**. Leaves an already installed host recorder alone.
pub fn init() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = metrics::set_global_recorder(FfiRecorder);
    });
}
