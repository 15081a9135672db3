pub mod auth;
pub mod compute;
pub mod config;
pub mod flows;
pub mod groups;
pub mod http;
pub mod output;
pub mod search;
pub mod timers;
pub mod tokens;
pub mod transfer;

use anyhow::Context as _;
use camino::{Utf8Path, Utf8PathBuf};
use std::time::Duration;

/// Deadline for a single request/response command
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Deadline for commands that poll a resource until it completes
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// The Globus services this client talks to
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Service {
    Auth,
    Flows,
    Groups,
    Search,
    Timers,
    Compute,
    Transfer,
}

impl Service {
    pub const ALL: [Service; 7] = [
        Service::Auth,
        Service::Flows,
        Service::Groups,
        Service::Search,
        Service::Timers,
        Service::Compute,
        Service::Transfer,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Flows => "flows",
            Self::Groups => "groups",
            Self::Search => "search",
            Self::Timers => "timers",
            Self::Compute => "compute",
            Self::Transfer => "transfer",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// The resource server tokens for this service are issued for
    pub fn resource_server(self) -> &'static str {
        match self {
            Self::Auth => "auth.globus.org",
            Self::Flows => "flows.globus.org",
            Self::Groups => "groups.api.globus.org",
            Self::Search => "search.api.globus.org",
            Self::Timers => "524230d7-ea86-4a52-8312-86065a9e0417",
            Self::Compute => "funcx_service",
            Self::Transfer => "transfer.api.globus.org",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Auth => "https://auth.globus.org",
            Self::Flows => "https://flows.globus.org",
            Self::Groups => "https://groups.api.globus.org/v2",
            Self::Search => "https://search.api.globus.org",
            Self::Timers => "https://timer.automate.globus.org",
            Self::Compute => "https://compute.api.globus.org",
            Self::Transfer => "https://transfer.api.globus.org/v0.10",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Implemented by each service's subcommand set
pub trait ResourceServer {
    /// The service whose token the subcommands need
    fn service(&self) -> Service;

    /// The resource server whose token authorizes the command
    fn resource_server(&self) -> String {
        self.service().resource_server().to_owned()
    }

    /// True if the command polls until completion instead of making one request
    fn waits(&self) -> bool {
        false
    }
}

/// Returned by commands that exist on the CLI surface but can't be carried out
#[derive(Debug, thiserror::Error)]
#[error("'{operation}' is not yet supported: {reason}")]
pub struct NotSupported {
    pub operation: &'static str,
    pub reason: &'static str,
}

/// Options shared by every subcommand
#[derive(clap::Args, Debug)]
pub struct GlobalArgs {
    /// The named profile whose cached tokens are used
    #[arg(short, long, global = true, env = "GLOBUS_PROFILE")]
    pub profile: Option<String>,
    /// Output format, defaults to the config file's `output_format`, or text
    #[arg(short = 'F', long, global = true, value_enum)]
    pub format: Option<output::Format>,
    /// Directory holding config.toml and the token cache
    #[arg(long, global = true, env = "GLOBUS_CLI_HOME")]
    pub config_dir: Option<Utf8PathBuf>,
    /// Seconds a single request may take before the command is cancelled
    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout: u64,
    /// Increase log verbosity, can be repeated
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Everything a command needs beyond its own flags
pub struct Context {
    pub settings: config::Settings,
    pub profile: String,
    pub format: output::Format,
}

impl Context {
    pub fn new(global: &GlobalArgs) -> anyhow::Result<Self> {
        let settings = config::Settings::load(global.config_dir.clone())?;
        let profile = global
            .profile
            .clone()
            .unwrap_or_else(|| settings.default_profile.clone());
        let format = global.format.unwrap_or(settings.output_format);

        Ok(Self {
            settings,
            profile,
            format,
        })
    }

    pub fn tokens(&self) -> anyhow::Result<tokens::TokenStore> {
        tokens::TokenStore::load(&self.settings.config_dir, &self.profile)
    }

    /// Builds a client for `service` authorized with the profile's token for it
    pub fn client(&self, service: Service) -> anyhow::Result<http::ServiceClient> {
        self.client_for(service, service.resource_server())
    }

    /// Builds the client a subcommand set runs against
    pub fn client_for_command(
        &self,
        cmd: &impl ResourceServer,
    ) -> anyhow::Result<http::ServiceClient> {
        self.client_for(cmd.service(), &cmd.resource_server())
    }

    /// Like [`Self::client`], but with the token of a specific resource server,
    /// eg. a flow's own scope when starting a run
    pub fn client_for(
        &self,
        service: Service,
        resource_server: &str,
    ) -> anyhow::Result<http::ServiceClient> {
        let store = self.tokens()?;
        let token = store.access_token(resource_server)?;
        tracing::debug!(%service, resource_server, profile = %self.profile, "using cached token");

        http::ServiceClient::new(token, self.settings.base_url(service))
    }
}

/// Reads a JSON or YAML document from a file, or stdin if the path is `-`
pub fn load_document(path: &Utf8Path) -> anyhow::Result<serde_json::Value> {
    let contents = if path.as_str() == "-" {
        use std::io::Read;
        let mut contents = String::new();
        std::io::stdin()
            .read_to_string(&mut contents)
            .context("failed to read stdin")?;
        contents
    } else {
        std::fs::read_to_string(path).with_context(|| format!("unable to read {path}"))?
    };

    match path.extension() {
        Some("yaml" | "yml") => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse {path} as YAML")),
        _ => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {path} as JSON")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn service_names_round_trip() {
        for service in Service::ALL {
            assert_eq!(Service::from_name(service.name()), Some(service));
        }
        assert_eq!(Service::from_name("nope"), None);
    }

    #[test]
    fn loads_yaml_and_json_documents() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        let yaml = root.join("def.yaml");
        std::fs::write(&yaml, "StartAt: Go\nStates:\n  Go:\n    Type: Pass\n    End: true\n")
            .unwrap();
        let json = root.join("def.json");
        std::fs::write(&json, r#"{"StartAt": "Go"}"#).unwrap();

        assert_eq!(load_document(&yaml).unwrap()["States"]["Go"]["Type"], "Pass");
        assert_eq!(load_document(&json).unwrap()["StartAt"], "Go");

        let bad = root.join("bad.json");
        std::fs::write(&bad, "StartAt: Go").unwrap();
        let err = load_document(&bad).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}
