use std::{fs::File, io::Read, path::PathBuf};

use tracing::debug;

use super::error::ConfigResult;

/// Per-user application directory: `~/.config/lasertutor` on unix,
/// `%APPDATA%\lasertutor` on windows.
pub fn app_dir() -> Option<PathBuf> {
    #[cfg(unix)]
    let path = std::env::var_os("HOME");
    #[cfg(windows)]
    let path = std::env::var_os("APPDATA");
    #[cfg(not(any(unix, windows)))]
    let path: Option<std::ffi::OsString> = None;

    let mut path = PathBuf::from(path?);
    if cfg!(unix) {
        path = path.join(".config");
    }

    Some(path.join(crate::APPLICATION_NAME))
}

pub fn find_config_file(use_local: bool) -> PathBuf {
    if use_local {
        return PathBuf::from("./config.toml");
    }

    if let Some(dir) = app_dir() {
        let path = dir.join("config.toml");
        if path.exists() {
            return path;
        }
    }

    PathBuf::from("./config.toml")
}

pub fn read_config(use_local: bool) -> ConfigResult<Vec<u8>> {
    let filename = find_config_file(use_local);

    tracing::trace!("looking for config at: {}", filename.display());
    if !filename.exists() {
        return Err(crate::config::error::ConfigError::ConfigNotFound);
    }

    let filename = filename.canonicalize()?;
    debug!("using {} as configuration file", filename.display());

    let mut fd = File::open(filename)?;
    let mut buf = Vec::new();
    fd.read_to_end(&mut buf)?;

    Ok(buf)
}
