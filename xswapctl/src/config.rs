use anyhow::Context;
use std::path::{Path, PathBuf};
use xswap::config::File;

/// Reads the config file at `config_file`, or at the default path if none
/// was given. A missing default file means all defaults.
pub fn read_config<T>(config_file: Option<&Path>, default_config_path: T) -> anyhow::Result<File>
where
    T: FnOnce() -> anyhow::Result<PathBuf>,
{
    let path = match config_file {
        Some(path) => {
            eprintln!("Using config file {}", path.display());
            Some(path.to_path_buf())
        }
        None => {
            let default_path = default_config_path()?;
            if default_path.exists() {
                eprintln!(
                    "Using config file at default path: {}",
                    default_path.display()
                );
                Some(default_path)
            } else {
                eprintln!("Config file default path is {}", default_path.display());
                None
            }
        }
    };

    match path {
        Some(path) => File::read(&path)
            .with_context(|| format!("failed to read config file {}", path.display())),
        None => Ok(File::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;
    use std::io::Write;

    #[test]
    fn missing_default_file_yields_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let default = dir.path().join("config.toml");

        let file = read_config(None, || Ok(default));

        assert_that(&file).is_ok_containing(File::default());
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");

        let file = read_config(Some(missing.as_path()), || unreachable!());

        assert_that(&file).is_err();
    }

    #[test]
    fn default_file_is_read_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let default = dir.path().join("config.toml");
        let mut handle = std::fs::File::create(&default).unwrap();
        writeln!(handle, "[retry]\nmax_attempts = 2").unwrap();

        let file = read_config(None, || Ok(default)).unwrap();

        assert_eq!(file.retry.unwrap().max_attempts, Some(2));
    }
}
