use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Global configuration loaded from `~/.config/dsup/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsupConfig {
    /// Downloader executable (looked up on PATH unless absolute).
    pub downloader_program: String,
    /// Format selection passed with `-f`.
    pub format_selector: String,
    /// Extractor client hint passed with `--extractor-args`.
    pub extractor_args: String,
    /// Base download directory. None = the user's download directory.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    /// Subfolder of the download directory that receives all output files.
    pub output_subdir: String,
    /// Maximum number of jobs loaded into the in-memory view and listed.
    pub list_limit: u32,
    /// Seconds to wait after SIGTERM before force-killing a paused download.
    pub kill_grace_secs: u64,
}

impl Default for DsupConfig {
    fn default() -> Self {
        Self {
            downloader_program: "yt-dlp".to_string(),
            format_selector: "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string(),
            extractor_args: "youtube:player_client=android".to_string(),
            download_dir: None,
            output_subdir: "dsup".to_string(),
            list_limit: 50,
            kill_grace_secs: 5,
        }
    }
}

impl DsupConfig {
    /// Directory the downloader writes into (`<download_dir>/<output_subdir>`).
    ///
    /// Falls back to `~/Downloads`-equivalent via `directories`, then to the
    /// current directory when no home is known.
    pub fn output_dir(&self) -> PathBuf {
        let base = self
            .download_dir
            .clone()
            .or_else(|| {
                directories::UserDirs::new().and_then(|d| d.download_dir().map(PathBuf::from))
            })
            .unwrap_or_else(|| PathBuf::from("."));
        base.join(&self.output_subdir)
    }
}

/// State directory holding the job database, log file and control socket
/// (`~/.local/state/dsup` on Debian).
pub fn state_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dsup")?;
    Ok(xdg_dirs.get_state_home())
}

/// Unix socket served by the process that owns the job store.
pub fn control_socket_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("control.sock"))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dsup")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DsupConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = DsupConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: DsupConfig = toml::from_str(&data)?;
    Ok(cfg)
}
