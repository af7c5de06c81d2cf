//! Build script for memscene.
//!
//! Reports which tracking features are compiled in, and warns about
//! combinations that are known to be slow or unsupported.

use std::env;

fn main() {
    // Re-run if features change
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DEBUG");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_PARKING_LOT");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DIAGNOSTICS");

    let debug_enabled = env::var("CARGO_FEATURE_DEBUG").is_ok();
    let parking_lot_enabled = env::var("CARGO_FEATURE_PARKING_LOT").is_ok();
    let diagnostics_enabled = env::var("CARGO_FEATURE_DIAGNOSTICS").is_ok();

    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let is_release = profile == "release";

    // =========================================================================
    // Feature-specific diagnostics
    // =========================================================================

    if debug_enabled {
        emit_info("Stack trace capture available (feature 'debug')");
        emit_note("Enable per tracker with TrackerConfig::with_stacktraces(true)");
        emit_note("or at runtime with MEMSCENE_STACKTRACES=1");

        if is_release {
            emit_warning("Stack capture in a release build walks the stack on every allocation");
            emit_note("Keep max_stack_frames small, or record scenes from a debug build.");
        }
    }

    if diagnostics_enabled {
        emit_info("Verbose anomaly logging enabled (feature 'diagnostics')");
        emit_note("Every MS001/MS002 anomaly is logged at warn level.");
    }

    if parking_lot_enabled {
        emit_info("Using parking_lot for registry shard locks");
    } else if is_release {
        emit_note("Tip: enable 'parking_lot' for cheaper registry locks on the hook path:");
        emit_note("  memscene = { version = \"0.3\", features = [\"parking_lot\"] }");
    }

    check_target();
}

// =============================================================================
// Diagnostic emission helpers
// =============================================================================

fn emit_info(msg: &str) {
    println!("cargo:warning=[memscene] {}", msg);
}

fn emit_note(msg: &str) {
    println!("cargo:warning=[memscene]    {}", msg);
}

fn emit_warning(msg: &str) {
    println!("cargo:warning=[memscene] warning: {}", msg);
}

// =============================================================================
// Target checks
// =============================================================================

fn check_target() {
    let target = env::var("TARGET").unwrap_or_default();

    if target.contains("wasm") {
        emit_warning("WebAssembly target detected");
        emit_note("The global hook works, but scene export needs a filesystem.");
        emit_note("Use ProfileSerializer::to_bytes and ship the buffer yourself.");
    }

    if env::var("CARGO_CFG_TARGET_POINTER_WIDTH").as_deref() == Ok("32") {
        emit_note("32-bit target: profiles recorded on 64-bit hosts cannot be imported here.");
    }
}
