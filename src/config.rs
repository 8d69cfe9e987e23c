use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;

use crate::drain::ArchiveSettings;
use crate::stabilize::PollSettings;

// ---------------------------------------------------------------------------
// ConfigFile: deserialized from TOML (all fields optional)
// ---------------------------------------------------------------------------

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub output_dir: Option<PathBuf>,
    pub previous_dir: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
    pub source: SourceConfigFile,
    pub capture: CaptureConfigFile,
    pub poll: PollConfigFile,
    pub pacing: PacingConfigFile,
    pub drain: DrainConfigFile,
    pub browser: BrowserConfigFile,
    pub device: DeviceConfigFile,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct SourceConfigFile {
    pub queue_url: Option<String>,
    pub item_selector: Option<String>,
    pub link_selector: Option<String>,
    pub title_selector: Option<String>,
    pub author_selector: Option<String>,
    pub archive_selector: Option<String>,
    pub archive_label: Option<String>,
    pub content_selector: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct CaptureConfigFile {
    pub min_segment_width: Option<u32>,
    pub max_depth: Option<usize>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct PollConfigFile {
    pub interval_ms: Option<u64>,
    pub step: Option<u32>,
    pub max_steps: Option<u32>,
    pub timeout_ms: Option<u64>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct PacingConfigFile {
    pub load_settle_ms: Option<u64>,
    pub archive_settle_ms: Option<u64>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct DrainConfigFile {
    pub max_archive_attempts: Option<u32>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct BrowserConfigFile {
    pub executable: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,
    pub headless: Option<bool>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct DeviceConfigFile {
    pub root: Option<PathBuf>,
    pub subdir: Option<String>,
}

// ---------------------------------------------------------------------------
// Config: resolved (all fields concrete)
// ---------------------------------------------------------------------------

/// Viewport and page size for the whole run, in CSS pixels / PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
}

/// Where the queue lives and how its markup is shaped.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub queue_url: String,
    /// One queue entry.
    pub item_selector: String,
    /// Article link, inside an item.
    pub link_selector: String,
    /// Title, inside the link.
    pub title_selector: String,
    /// Author, inside an item.
    pub author_selector: String,
    /// Candidates for the archive control, inside an item.
    pub archive_selector: String,
    /// Text that identifies the archive control among the candidates.
    pub archive_label: String,
    /// Root of the article body on an article page.
    pub content_selector: String,
}

/// Fallback pauses for renderers that cannot signal readiness.
#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// After navigating to an article (images and fonts settling).
    pub load_settle: Duration,
    /// After clicking archive, before the queue is re-read (list animation).
    pub archive_settle: Duration,
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub executable: Option<PathBuf>,
    pub user_data_dir: PathBuf,
    pub headless: bool,
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub root: PathBuf,
    pub subdir: String,
}

pub struct Config {
    pub archive: ArchiveSettings,
    pub output_dir: PathBuf,
    pub previous_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub browser: BrowserConfig,
    pub device: DeviceConfig,
}

impl ConfigFile {
    /// Merge CLI values (overwrites non-None fields).
    pub fn merge_cli(
        &mut self,
        width: Option<u32>,
        height: Option<u32>,
        output_dir: Option<PathBuf>,
        headless: bool,
    ) {
        if let Some(v) = width {
            debug!("config: CLI override width={v}");
            self.width = width;
        }
        if let Some(v) = height {
            debug!("config: CLI override height={v}");
            self.height = height;
        }
        if let Some(ref v) = output_dir {
            debug!("config: CLI override output_dir={}", v.display());
            self.output_dir = output_dir;
        }
        if headless {
            debug!("config: CLI override headless=true");
            self.browser.headless = Some(true);
        }
    }

    /// Resolve to a Config by applying defaults to missing fields.
    pub fn resolve(self) -> Config {
        let capture = CaptureConfig {
            width: self.width.unwrap_or(800),
            height: self.height.unwrap_or(1000),
        };
        let s = self.source;
        let source = SourceConfig {
            queue_url: s
                .queue_url
                .unwrap_or_else(|| "https://medium.com/me/list/queue".into()),
            item_selector: s.item_selector.unwrap_or_else(|| "div.ey".into()),
            link_selector: s.link_selector.unwrap_or_else(|| "a".into()),
            title_selector: s.title_selector.unwrap_or_else(|| "h2".into()),
            author_selector: s.author_selector.unwrap_or_else(|| "h4".into()),
            archive_selector: s.archive_selector.unwrap_or_else(|| "h4".into()),
            archive_label: s.archive_label.unwrap_or_else(|| "Archive".into()),
            content_selector: s.content_selector.unwrap_or_else(|| "article".into()),
        };
        let config = Config {
            archive: ArchiveSettings {
                capture,
                source,
                min_segment_width: self.capture.min_segment_width.unwrap_or(100),
                max_depth: self.capture.max_depth.unwrap_or(64),
                poll: PollSettings {
                    interval: Duration::from_millis(self.poll.interval_ms.unwrap_or(500)),
                    step: self.poll.step.unwrap_or(900),
                    max_steps: self.poll.max_steps.unwrap_or(2000),
                    timeout: Duration::from_millis(self.poll.timeout_ms.unwrap_or(300_000)),
                },
                pacing: PacingConfig {
                    load_settle: Duration::from_millis(
                        self.pacing.load_settle_ms.unwrap_or(5000),
                    ),
                    archive_settle: Duration::from_millis(
                        self.pacing.archive_settle_ms.unwrap_or(3000),
                    ),
                },
                max_archive_attempts: self.drain.max_archive_attempts.unwrap_or(3),
            },
            output_dir: self.output_dir.unwrap_or_else(|| "./articles".into()),
            previous_dir: self.previous_dir.unwrap_or_else(|| "./articles_old".into()),
            scratch_dir: self.scratch_dir.unwrap_or_else(|| "./screenshots".into()),
            browser: BrowserConfig {
                executable: self.browser.executable,
                user_data_dir: self
                    .browser
                    .user_data_dir
                    .unwrap_or_else(|| "./chromium-data".into()),
                headless: self.browser.headless.unwrap_or(false),
            },
            device: DeviceConfig {
                root: self
                    .device
                    .root
                    .unwrap_or_else(|| "/Volumes/Kindle/documents".into()),
                subdir: self.device.subdir.unwrap_or_else(|| "Articles".into()),
            },
        };
        let a = &config.archive;
        info!(
            "config: resolved size={}x{}, queue_url={}, item_selector={:?}, \
             min_segment_width={}, max_depth={}, poll_step={}, poll_interval={}ms, \
             max_archive_attempts={}, output_dir={}, headless={}",
            a.capture.width,
            a.capture.height,
            a.source.queue_url,
            a.source.item_selector,
            a.min_segment_width,
            a.max_depth,
            a.poll.step,
            a.poll.interval.as_millis(),
            a.max_archive_attempts,
            config.output_dir.display(),
            config.browser.headless,
        );
        config
    }
}

/// Resolve the XDG config path for queuepress.
fn config_path() -> Option<PathBuf> {
    let config_dir = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(config_dir.join("queuepress").join("config.toml"))
}

/// Load config file. Returns `ConfigFile::default()` if no file exists.
/// Returns an error if the file exists but cannot be parsed.
pub fn load_config() -> anyhow::Result<ConfigFile> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            info!("config: no HOME or XDG_CONFIG_HOME set, using defaults");
            return Ok(ConfigFile::default());
        }
    };
    debug!("config: looking for {}", path.display());
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            info!("config: loaded from {}", path.display());
            let cfg: ConfigFile = toml::from_str(&text)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("config: {} not found, using defaults", path.display());
            Ok(ConfigFile::default())
        }
        Err(e) => Err(anyhow::anyhow!("failed to read {}: {e}", path.display())),
    }
}
