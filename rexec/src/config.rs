use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use rexec_common::{RexecConfig, RexecConfigStore};
use tracing::*;

pub fn load_config(path: &Path) -> Result<RexecConfig> {
    let file = path
        .to_str()
        .with_context(|| format!("Config path {path:?} is not valid UTF-8"))?;

    let store: RexecConfigStore = Config::builder()
        .add_source(File::new(file, FileFormat::Yaml).required(false))
        .add_source(
            Environment::with_prefix("REXEC")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .context("Could not load config")?
        .try_deserialize()
        .context("Could not parse config")?;

    let paths_relative_to = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().context("Could not determine the working directory")?,
    };

    let config = RexecConfig {
        store,
        paths_relative_to,
    };

    if path.exists() {
        debug!(?path, "Using config");
    } else {
        debug!(?path, "Config file not found, using defaults");
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rexec_common::ChannelClosePolicy;

    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.store.ssh.listen.port(), 2222);
        assert_eq!(config.paths_relative_to, dir.path());
    }

    #[test]
    fn reads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rexec.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "exec:\n  shell: sh\n  on_channel_close: hangup").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.store.exec.shell, "sh");
        assert_eq!(config.store.exec.on_channel_close, ChannelClosePolicy::Hangup);
        assert_eq!(config.keys_path(), dir.path().join("./data/keys"));
    }
}
