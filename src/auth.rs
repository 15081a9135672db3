use crate::{http::ServiceClient, output, tokens, Context, Service};
use anyhow::Context as _;
use clap::Parser;

#[derive(Parser)]
pub struct Introspect {
    /// The resource server whose cached token is introspected
    #[arg(long, default_value = "auth.globus.org")]
    resource_server: String,
}

/// Inspect the profile's cached tokens and the identity they belong to
#[derive(clap::Subcommand)]
pub enum Args {
    /// Lists the cached tokens and whether they are still valid
    Status,
    /// Shows the identity the profile is logged in as
    Whoami,
    /// Asks Globus Auth about a cached token, requires a client secret
    Introspect(Introspect),
}

#[derive(serde::Serialize)]
pub struct TokenStatus {
    pub resource_server: String,
    pub expires_at: String,
    pub valid: bool,
    pub scope: Option<String>,
}

impl output::Tabular for TokenStatus {
    const COLUMNS: &'static [&'static str] = &["Resource Server", "Expires At", "Status"];

    fn row(&self) -> Vec<String> {
        vec![
            self.resource_server.clone(),
            self.expires_at.clone(),
            if self.valid { "valid" } else { "expired" }.to_owned(),
        ]
    }
}

pub fn token_status(store: &tokens::TokenStore, now: i64) -> Vec<TokenStatus> {
    store
        .iter()
        .map(|(rs, tok)| TokenStatus {
            resource_server: rs.to_owned(),
            expires_at: tok.expires_at_rfc3339(),
            valid: tok.is_fresh_at(now),
            scope: tok.scope.clone(),
        })
        .collect()
}

#[derive(serde::Deserialize, serde::Serialize, Debug)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub identity_provider_display_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl output::Tabular for UserInfo {
    const COLUMNS: &'static [&'static str] =
        &["Username", "Name", "ID", "Email", "Identity Provider"];

    fn row(&self) -> Vec<String> {
        vec![
            output::cell(&self.preferred_username),
            output::cell(&self.name),
            self.sub.clone(),
            output::cell(&self.email),
            output::cell(&self.identity_provider_display_name),
        ]
    }
}

#[derive(serde::Deserialize, serde::Serialize, Debug)]
pub struct Introspection {
    pub active: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl output::Tabular for Introspection {
    const COLUMNS: &'static [&'static str] =
        &["Active", "Username", "Scope", "Client ID", "Expires At"];

    fn row(&self) -> Vec<String> {
        vec![
            self.active.to_string(),
            output::cell(&self.username),
            output::cell(&self.scope),
            output::cell(&self.client_id),
            self.exp.map(tokens::format_timestamp).unwrap_or_default(),
        ]
    }
}

pub async fn whoami(client: &ServiceClient) -> anyhow::Result<UserInfo> {
    client.get("/v2/oauth2/userinfo", &Vec::new()).await
}

/// <https://docs.globus.org/api/auth/reference/#token_introspection>
pub async fn introspect(
    auth: &ServiceClient,
    client: &crate::config::ClientConfig,
    token: &str,
) -> anyhow::Result<Introspection> {
    let secret = client.client_secret.as_deref().context(
        "token introspection requires a confidential client, set GLOBUS_CLIENT_SECRET",
    )?;

    let rb = auth
        .request(reqwest::Method::POST, "/v2/oauth2/token/introspect")?
        .basic_auth(&client.client_id, Some(secret))
        .form(&[("token", token)]);

    auth.execute(rb).await
}

pub async fn run(args: Args, ctx: &Context) -> anyhow::Result<()> {
    match args {
        Args::Status => {
            let store = ctx.tokens()?;
            let status = token_status(&store, tokens::now());
            anyhow::ensure!(
                !status.is_empty(),
                "profile '{}' has no cached tokens",
                store.profile()
            );
            output::print_list(ctx.format, &status)?;
        }
        Args::Whoami => {
            let client = ctx.client(Service::Auth)?;
            let info = whoami(&client).await.context("failed to get user info")?;
            output::print_record(ctx.format, &info)?;
        }
        Args::Introspect(args) => {
            let store = ctx.tokens()?;
            let token = store.access_token(&args.resource_server)?;
            let auth = ServiceClient::anonymous(ctx.settings.base_url(Service::Auth))?;
            let res = introspect(&auth, &ctx.settings.client, token)
                .await
                .context("failed to introspect token")?;
            output::print_record(ctx.format, &res)?;
        }
    }

    Ok(())
}
