use std::path::Path;

use anyhow::Context;
use tracing::info;

/// Loads a file and returns it as a string.
pub fn load_as_string<P>(file_path: P) -> anyhow::Result<String>
where
    P: AsRef<Path> + std::fmt::Debug,
{
    info!("load file as string: {file_path:?}");

    std::fs::read_to_string(file_path.as_ref())
        .with_context(|| format!("failed to read {:?}", file_path.as_ref()))
}

/// Loads `file_name` from the directory `base_dir` as a string. Absolute file
/// names ignore `base_dir`.
pub fn load_relative_as_string<B, P>(base_dir: B, file_name: P) -> anyhow::Result<String>
where
    B: AsRef<Path>,
    P: AsRef<Path> + std::fmt::Debug,
{
    load_as_string(base_dir.as_ref().join(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_reports_path() {
        let err = load_as_string("/definitely/not/here.obj").unwrap_err();
        assert!(format!("{err}").contains("here.obj"));
    }

    #[test]
    fn load_relative_to_directory() {
        let dir = std::env::temp_dir().join(format!("erpt-fileio-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("scene.mtl"), "newmtl red\n").unwrap();

        let text = load_relative_as_string(&dir, "scene.mtl").unwrap();
        assert_eq!("newmtl red\n", text);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
