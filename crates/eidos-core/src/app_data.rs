//! Where Eidos stores its own data (config, index snapshot).
//!
//! Uploaded documents come in through the API or CLI; only derived state
//! (chunks, embeddings, config) lives here.

use std::path::PathBuf;

/// Returns the directory where Eidos stores config and index artifacts.
/// On macOS: `~/Library/Application Support/Eidos/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("app", "Eidos", "Eidos")?.data_local_dir().to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_is_some() {
        assert!(app_data_dir().is_some());
    }
}
