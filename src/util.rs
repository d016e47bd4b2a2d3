use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

static INIT_ONCE: std::sync::Once = std::sync::Once::new();

/// Install the global tracing subscriber once. Logs go to stderr so that
/// stdout only ever carries rows. `RUST_LOG` overrides the `warn` default.
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .try_init();
    });
}

/// Return true for transient/retriable I/O errors often seen on Windows when
/// filter drivers (AV/backup), USB/NAS volumes, or sharing violations occur.
fn is_retriable_io_error(e: &io::Error) -> bool {
    if cfg!(windows) {
        // 5 access denied (AV/share), 32 sharing violation, 33 lock violation,
        // 225 AV/PUA blocked, 21 device not ready
        matches!(e.raw_os_error(), Some(5) | Some(32) | Some(33) | Some(225) | Some(21))
    } else {
        e.kind() == io::ErrorKind::Interrupted
    }
}

/// True when the process (or the system) ran out of file descriptors.
/// EMFILE/ENFILE on Unix, ERROR_TOO_MANY_OPEN_FILES on Windows.
pub fn is_handle_exhaustion(e: &io::Error) -> bool {
    if cfg!(windows) {
        matches!(e.raw_os_error(), Some(4))
    } else {
        matches!(e.raw_os_error(), Some(24) | Some(23))
    }
}

fn with_backoff<T>(tries: usize, delay_ms: u64, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut last_err: Option<io::Error> = None;
    for i in 0..tries.max(1) {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if is_retriable_io_error(&e) => {
                last_err = Some(e);
                sleep(Duration::from_millis(delay_ms.saturating_mul((i + 1) as u64)));
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "open failed")))
}

/// Open a file for reading with retries/backoff for transient errors.
pub fn open_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_backoff(tries, delay_ms, || File::open(path))
}

/// Open (creating if needed) a file in append mode, retrying transient errors.
/// Handle exhaustion is not transient here; it is returned to the caller.
pub fn open_append_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_backoff(tries, delay_ms, || OpenOptions::new().create(true).append(true).open(path))
}
