//! Settings for the CLI.
//!
//! Precedence for the OAuth client, lowest to highest:
//! 1. The built-in native app client
//! 2. `<config_dir>/config.toml`
//! 3. `GLOBUS_CLIENT_ID` / `GLOBUS_CLIENT_SECRET`

use crate::{output, Context, Service};
use anyhow::Context as _;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;

/// The public native app client the CLI uses when none is configured
pub const DEFAULT_CLIENT_ID: &str = "95fdeba8-fac2-42bd-a357-e068d82ff78e";
pub const DEFAULT_PROFILE: &str = "default";
const CONFIG_FILE: &str = "config.toml";

/// The contents of `config.toml`, everything is optional
#[derive(serde::Deserialize, Default, Debug)]
#[serde(default)]
pub struct FileSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub default_profile: Option<String>,
    pub output_format: Option<output::Format>,
    /// Base URL overrides, keyed by service name
    pub services: BTreeMap<String, String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientSource {
    Environment,
    ConfigFile,
    Default,
}

impl std::fmt::Display for ClientSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Environment => "environment",
            Self::ConfigFile => "config file",
            Self::Default => "default",
        })
    }
}

/// The OAuth client the CLI identifies as
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub source: ClientSource,
}

impl ClientConfig {
    /// Environment beats the config file, which beats the built-in client.
    /// The secret is resolved independently of the ID.
    pub fn resolve(file: &FileSettings, env: &::config::Config) -> Self {
        let from_env = |key: &str| env.get_string(key).ok().filter(|v| !v.is_empty());

        let (client_id, source) = if let Some(id) = from_env("client_id") {
            (id, ClientSource::Environment)
        } else if let Some(id) = file.client_id.clone() {
            (id, ClientSource::ConfigFile)
        } else {
            (DEFAULT_CLIENT_ID.to_owned(), ClientSource::Default)
        };

        let client_secret = from_env("client_secret").or_else(|| file.client_secret.clone());

        Self {
            client_id,
            client_secret,
            source,
        }
    }
}

#[derive(Debug)]
pub struct Settings {
    pub config_dir: Utf8PathBuf,
    pub client: ClientConfig,
    pub default_profile: String,
    pub output_format: output::Format,
    services: BTreeMap<Service, String>,
}

/// `~/.globus-cli`
pub fn default_config_dir() -> anyhow::Result<Utf8PathBuf> {
    let dirs = directories::BaseDirs::new().context("unable to determine the home directory")?;
    let home = Utf8PathBuf::from_path_buf(dirs.home_dir().to_owned())
        .map_err(|p| anyhow::anyhow!("home directory {} is not valid utf-8", p.display()))?;
    Ok(home.join(".globus-cli"))
}

fn load_file(path: &Utf8Path) -> anyhow::Result<FileSettings> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            toml::from_str(&contents).with_context(|| format!("failed to parse {path}"))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(FileSettings::default()),
        Err(err) => Err(err).with_context(|| format!("unable to read {path}")),
    }
}

impl Settings {
    pub fn load(config_dir: Option<Utf8PathBuf>) -> anyhow::Result<Self> {
        Self::load_with_env(config_dir, None)
    }

    /// Loads settings, reading `GLOBUS_*` variables from `env` instead of the
    /// process environment if it is provided
    pub fn load_with_env(
        config_dir: Option<Utf8PathBuf>,
        env: Option<::config::Map<String, String>>,
    ) -> anyhow::Result<Self> {
        let config_dir = match config_dir {
            Some(dir) => dir,
            None => default_config_dir()?,
        };

        let file = load_file(&config_dir.join(CONFIG_FILE))?;

        let env = ::config::Config::builder()
            .add_source(::config::Environment::with_prefix("GLOBUS").source(env))
            .build()
            .context("failed to read GLOBUS_* environment variables")?;

        let client = ClientConfig::resolve(&file, &env);

        let mut services = BTreeMap::new();
        for (name, url) in file.services {
            let service = Service::from_name(&name).with_context(|| {
                format!("unknown service '{name}' in the [services] table of {CONFIG_FILE}")
            })?;
            url::Url::parse(&url)
                .with_context(|| format!("invalid base url '{url}' for service '{name}'"))?;
            services.insert(service, url);
        }

        tracing::debug!(%config_dir, client_source = %client.source, "loaded settings");

        Ok(Self {
            config_dir,
            client,
            default_profile: file
                .default_profile
                .unwrap_or_else(|| DEFAULT_PROFILE.to_owned()),
            output_format: file.output_format.unwrap_or_default(),
            services,
        })
    }

    pub fn config_path(&self) -> Utf8PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// The base URL for a service, honoring any override from the config file
    pub fn base_url(&self, service: Service) -> &str {
        self.services
            .get(&service)
            .map(String::as_str)
            .unwrap_or_else(|| service.default_base_url())
    }
}

/// Inspect the CLI's own configuration
#[derive(clap::Subcommand)]
pub enum Args {
    /// Shows the effective configuration
    Show,
    /// Prints the locations of the config file and the profile's token cache
    Path,
}

#[derive(serde::Serialize)]
struct ServiceUrl {
    service: &'static str,
    base_url: String,
}

impl output::Tabular for ServiceUrl {
    const COLUMNS: &'static [&'static str] = &["Service", "Base URL"];

    fn row(&self) -> Vec<String> {
        vec![self.service.to_owned(), self.base_url.clone()]
    }
}

#[derive(serde::Serialize)]
struct EffectiveConfig {
    config_file: Utf8PathBuf,
    profile: String,
    client_id: String,
    client_source: ClientSource,
    client_secret: Option<&'static str>,
    output_format: output::Format,
    #[serde(skip)]
    services: Vec<ServiceUrl>,
}

impl output::Tabular for EffectiveConfig {
    const COLUMNS: &'static [&'static str] = &[
        "Config File",
        "Profile",
        "Client ID",
        "Client Source",
        "Client Secret",
        "Output Format",
    ];

    fn row(&self) -> Vec<String> {
        vec![
            self.config_file.to_string(),
            self.profile.clone(),
            self.client_id.clone(),
            self.client_source.to_string(),
            output::cell(&self.client_secret),
            self.output_format.to_string(),
        ]
    }
}

#[derive(serde::Serialize)]
struct Paths {
    config_file: Utf8PathBuf,
    token_cache: Utf8PathBuf,
}

impl output::Tabular for Paths {
    const COLUMNS: &'static [&'static str] = &["Config File", "Token Cache"];

    fn row(&self) -> Vec<String> {
        vec![self.config_file.to_string(), self.token_cache.to_string()]
    }
}

impl EffectiveConfig {
    fn new(ctx: &Context) -> Self {
        let settings = &ctx.settings;

        Self {
            config_file: settings.config_path(),
            profile: ctx.profile.clone(),
            client_id: settings.client.client_id.clone(),
            client_source: settings.client.source,
            client_secret: settings.client.client_secret.as_ref().map(|_| "********"),
            output_format: settings.output_format,
            services: Service::ALL
                .into_iter()
                .map(|s| ServiceUrl {
                    service: s.name(),
                    base_url: settings.base_url(s).to_owned(),
                })
                .collect(),
        }
    }

    /// The JSON form, with services as a name to base URL map
    fn to_json(&self) -> anyhow::Result<serde_json::Value> {
        let services: BTreeMap<_, _> = self
            .services
            .iter()
            .map(|s| (s.service, s.base_url.as_str()))
            .collect();
        let mut doc = serde_json::to_value(self).context("failed to serialize config")?;
        doc["services"] = serde_json::json!(services);
        Ok(doc)
    }
}

impl Paths {
    fn new(ctx: &Context) -> Self {
        let settings = &ctx.settings;

        Self {
            config_file: settings.config_path(),
            token_cache: crate::tokens::token_path(&settings.config_dir, &ctx.profile),
        }
    }
}

pub fn run(args: Args, ctx: &Context) -> anyhow::Result<()> {
    match args {
        Args::Show => {
            let cfg = EffectiveConfig::new(ctx);

            match ctx.format {
                output::Format::Json => output::print_json(&cfg.to_json()?)?,
                format => {
                    output::print_record(format, &cfg)?;
                    if format == output::Format::Text {
                        println!();
                        output::print_list(format, &cfg.services)?;
                    }
                }
            }
        }
        Args::Path => output::print_record(ctx.format, &Paths::new(ctx))?,
    }

    Ok(())
}
