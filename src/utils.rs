//! # Utility Functions Module
//!
//! Helpers that keep external tool invocations readable.

/// Builds a `Vec<String>` of command arguments from mixed `Display` values.
///
/// # Example
/// ```rust
/// use content_optimizer::args;
///
/// let bitrate = 2800;
/// let args = args!["-b:v", format!("{}k", bitrate), "-threads", 2];
/// assert_eq!(args, vec!["-b:v", "2800k", "-threads", "2"]);
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        vec![$(::std::string::ToString::to_string(&$item)),*]
    };
}

/// Format a path for a tool argument
pub fn path_arg(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Run CPU-bound work (decode, resize, hashing) on the blocking pool
pub async fn run_blocking<T, F>(work: F) -> crate::error::Result<T>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        crate::error::EngineError::TranscodeBackend(format!("blocking task failed: {}", e))
    })?
}
