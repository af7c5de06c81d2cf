//! Allocation stack-trace capture.
//!
//! Capture walks raw frame addresses only; symbol resolution is deferred to
//! snapshot time, off the allocation hot path. Without the `debug` feature
//! both functions are inert.

/// Frames belonging to the hook itself, skipped at the top of every trace.
#[cfg(feature = "debug")]
const HOOK_FRAMES: usize = 4;

/// The unsynchronized walker must not run concurrently with itself.
#[cfg(feature = "debug")]
static TRACE_LOCK: crate::sync::mutex::Mutex<()> = crate::sync::mutex::Mutex::new(());

/// Collect up to `max_frames` return addresses of the current call stack.
///
/// Must only be called with the re-entrancy guard held: the walker may
/// allocate.
#[cfg(feature = "debug")]
pub(crate) fn capture_frames(max_frames: usize) -> Vec<usize> {
    let mut frames = Vec::with_capacity(max_frames);
    if max_frames == 0 {
        return frames;
    }

    let _lock = TRACE_LOCK.lock();
    let mut skipped = 0;

    // Safety: serialized by TRACE_LOCK, and the caller holds the hook guard
    // so allocations made by the walker are not tracked.
    unsafe {
        backtrace::trace_unsynchronized(|frame| {
            if skipped < HOOK_FRAMES {
                skipped += 1;
                return true;
            }
            let ip = frame.ip() as usize;
            if ip != 0 {
                frames.push(ip);
            }
            frames.len() < max_frames
        });
    }

    frames
}

#[cfg(not(feature = "debug"))]
pub(crate) fn capture_frames(_max_frames: usize) -> Vec<usize> {
    Vec::new()
}

/// Render frame addresses as a multi-line, human readable stack trace.
#[cfg(feature = "debug")]
pub(crate) fn resolve_frames(frames: &[usize]) -> String {
    let mut lines = Vec::with_capacity(frames.len());

    for &ip in frames {
        let mut line = None;
        backtrace::resolve(ip as *mut std::ffi::c_void, |symbol| {
            if line.is_some() {
                return;
            }
            let name = symbol
                .name()
                .map(|n| n.to_string())
                .unwrap_or_else(|| format!("0x{ip:x}"));
            line = Some(match (symbol.filename(), symbol.lineno()) {
                (Some(file), Some(lineno)) => {
                    format!("{name} ({}:{lineno})", file.display())
                }
                _ => name,
            });
        });
        lines.push(line.unwrap_or_else(|| format!("0x{ip:x}")));
    }

    lines.join("\n")
}

#[cfg(not(feature = "debug"))]
pub(crate) fn resolve_frames(frames: &[usize]) -> String {
    frames
        .iter()
        .map(|ip| format!("0x{ip:x}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_unknown_frames_never_panics() {
        let text = resolve_frames(&[0x1, 0x2]);
        assert_eq!(text.lines().count(), 2);
    }

    #[cfg(feature = "debug")]
    #[test]
    fn test_capture_respects_limit() {
        let frames = capture_frames(3);
        assert!(frames.len() <= 3);
    }
}
