use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{AppError, Provider};

/// Selects which pane to open.
pub const PANE_ENV: &str = "USGS_PANE";
/// Optional JSON file replacing the built-in profile of the selected pane.
pub const CONFIG_ENV: &str = "USGS_PANE_CONFIG";
/// Overrides the folder that downloads are placed under.
pub const HOME_ENV: &str = "USGS_PANE_HOME";

const SCENE_IDENTIFIER_PATTERN: &str = r"L[A-Z]\d\d_L\d[A-Z]{2}_\d+_\d{8}_\d{8}_\d\d_[A-Z\d]{2}";
const BAND_FILE_PATTERN: &str = r".*B(\d+)\.(TIF|tif)$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaneKind {
    EarthExplorer,
    GloVis,
    Lidar,
}

impl PaneKind {
    pub fn title(&self) -> &'static str {
        match self {
            PaneKind::EarthExplorer => "EarthExplorer",
            PaneKind::GloVis => "GloVis",
            PaneKind::Lidar => "LiDAR Explorer",
        }
    }
}

impl FromStr for PaneKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "earthexplorer" | "ee" => Ok(PaneKind::EarthExplorer),
            "glovis" => Ok(PaneKind::GloVis),
            "lidar" => Ok(PaneKind::Lidar),
            other => Err(AppError::Config(format!("Unknown pane kind: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AllowedRoot {
    pub prefix: String,
    pub provider: Provider,
}

impl AllowedRoot {
    fn new(prefix: &str, provider: Provider) -> Self {
        Self {
            prefix: prefix.to_string(),
            provider,
        }
    }
}

/// External program standing in for the host's composite-bands tool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Serializable pane settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PaneConfig {
    pub kind: PaneKind,
    pub start_url: String,
    pub download_folder_name: String,
    pub allow_list: Vec<AllowedRoot>,
    /// Scene identifier pattern. `None` stores downloads flat in the downloads folder.
    #[serde(default)]
    pub product_pattern: Option<String>,
    #[serde(default = "default_band_pattern")]
    pub band_pattern: String,
    #[serde(default = "default_max_band")]
    pub max_band: u32,
    #[serde(default)]
    pub dispatch_bands: bool,
    #[serde(default)]
    pub tool_command: Option<ToolCommand>,
    #[serde(default)]
    pub laszip_path: Option<PathBuf>,
    #[serde(default)]
    pub home_folder: Option<PathBuf>,
}

fn default_band_pattern() -> String {
    BAND_FILE_PATTERN.to_string()
}

fn default_max_band() -> u32 {
    10
}

fn landsat_roots() -> Vec<AllowedRoot> {
    vec![
        AllowedRoot::new("https://landsatlook.usgs.gov/gen-bundle", Provider::EarthExplorerBundle),
        AllowedRoot::new("https://landsatlook.usgs.gov/data/collection", Provider::CollectionDownload),
        AllowedRoot::new("https://dds.cr.usgs.gov/download", Provider::DdsDownload),
    ]
}

impl PaneConfig {
    pub fn for_kind(kind: PaneKind) -> Self {
        match kind {
            PaneKind::EarthExplorer | PaneKind::GloVis => Self {
                kind,
                start_url: match kind {
                    PaneKind::GloVis => "https://glovis.usgs.gov/app".to_string(),
                    _ => "https://earthexplorer.usgs.gov/".to_string(),
                },
                download_folder_name: "EarthExplorerAddinDownloads".to_string(),
                allow_list: landsat_roots(),
                product_pattern: Some(SCENE_IDENTIFIER_PATTERN.to_string()),
                band_pattern: default_band_pattern(),
                max_band: default_max_band(),
                dispatch_bands: true,
                tool_command: None,
                laszip_path: None,
                home_folder: None,
            },
            PaneKind::Lidar => Self {
                kind,
                start_url: "https://apps.nationalmap.gov/lidar-explorer/#/".to_string(),
                download_folder_name: "LidarExplorerAddinDownloads".to_string(),
                // Tiles arrive through the explorer's own downloads, not new windows
                allow_list: Vec::new(),
                product_pattern: None,
                band_pattern: default_band_pattern(),
                max_band: default_max_band(),
                dispatch_bands: false,
                tool_command: None,
                laszip_path: None,
                home_folder: None,
            },
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| AppError::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Resolves the pane configuration from the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_json_file(Path::new(&path))?,
            None => {
                let kind = match std::env::var(PANE_ENV) {
                    Ok(value) => value.parse()?,
                    Err(_) => PaneKind::EarthExplorer,
                };
                Self::for_kind(kind)
            }
        };

        if let Some(home) = std::env::var_os(HOME_ENV) {
            config.home_folder = Some(PathBuf::from(home));
        }

        Ok(config)
    }
}

/// A `PaneConfig` with its patterns compiled and paths resolved.
#[derive(Debug, Clone)]
pub struct PaneProfile {
    pub kind: PaneKind,
    pub start_url: String,
    pub downloads_root: PathBuf,
    pub allow_list: Vec<AllowedRoot>,
    pub product_pattern: Option<Regex>,
    pub band_pattern: Regex,
    pub max_band: u32,
    pub dispatch_bands: bool,
    pub tool_command: Option<ToolCommand>,
    pub laszip_path: PathBuf,
}

impl PaneProfile {
    pub fn compile(config: &PaneConfig) -> Result<Self, AppError> {
        let product_pattern = config
            .product_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| AppError::Config(format!("Invalid product pattern: {}", e)))?;
        let band_pattern = Regex::new(&config.band_pattern)
            .map_err(|e| AppError::Config(format!("Invalid band pattern: {}", e)))?;

        let home = config
            .home_folder
            .clone()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            kind: config.kind,
            start_url: config.start_url.clone(),
            downloads_root: home.join(&config.download_folder_name),
            allow_list: config.allow_list.clone(),
            product_pattern,
            band_pattern,
            max_band: config.max_band,
            dispatch_bands: config.dispatch_bands,
            tool_command: config.tool_command.clone(),
            laszip_path: config
                .laszip_path
                .clone()
                .unwrap_or_else(default_laszip_path),
        })
    }

    pub fn builtin(kind: PaneKind) -> Self {
        // Built-in profiles only use the constant patterns above
        Self::compile(&PaneConfig::for_kind(kind)).expect("built-in patterns are valid")
    }
}

/// `laszip` shipped next to the executable under `Libs/`, else whatever is on `PATH`.
fn default_laszip_path() -> PathBuf {
    let name = if cfg!(windows) { "laszip.exe" } else { "laszip" };

    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("Libs").join(name)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pane_kind_parse() {
        assert_eq!("GloVis".parse::<PaneKind>().unwrap(), PaneKind::GloVis);
        assert_eq!(" lidar ".parse::<PaneKind>().unwrap(), PaneKind::Lidar);
        assert!("arcmap".parse::<PaneKind>().is_err());
    }

    #[test]
    fn test_imagery_panes_share_allow_list() {
        let ee = PaneConfig::for_kind(PaneKind::EarthExplorer);
        let glovis = PaneConfig::for_kind(PaneKind::GloVis);
        assert_eq!(ee.allow_list, glovis.allow_list);
        assert_eq!(ee.allow_list.len(), 3);
        assert!(ee.dispatch_bands);
    }

    #[test]
    fn test_lidar_profile_is_flat() {
        let lidar = PaneProfile::builtin(PaneKind::Lidar);
        assert!(lidar.product_pattern.is_none());
        assert!(!lidar.dispatch_bands);
        assert!(lidar.allow_list.is_empty());
        assert!(lidar.downloads_root.ends_with("LidarExplorerAddinDownloads"));
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "kind": "earthexplorer",
            "start_url": "https://earthexplorer.usgs.gov/",
            "download_folder_name": "Scenes",
            "allow_list": [{ "prefix": "https://dds.cr.usgs.gov/download", "provider": "DdsDownload" }],
            "product_pattern": "LC08_\\w+",
            "home_folder": "/data"
        }"#;
        let config: PaneConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_band, 10);
        assert!(!config.dispatch_bands);

        let profile = PaneProfile::compile(&config).unwrap();
        assert_eq!(profile.downloads_root, PathBuf::from("/data").join("Scenes"));
        assert!(profile.band_pattern.is_match("X_B4.TIF"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut config = PaneConfig::for_kind(PaneKind::EarthExplorer);
        config.product_pattern = Some("L[".to_string());
        assert!(matches!(PaneProfile::compile(&config), Err(AppError::Config(_))));
    }
}
