use camino::Utf8PathBuf;
use globus_cli::{
    config::Settings,
    output::Format,
    tokens::{TokenError, TokenStore},
    Context, Service,
};
use serde_json::json;

const FLOW_ID: &str = "9c5b5a0e-2c3e-4d5e-8a57-0a2e6d5f1f70";

fn write_tokens(dir: &Utf8PathBuf, profile: &str, tokens: serde_json::Value) {
    let tokens_dir = dir.join("tokens");
    std::fs::create_dir_all(&tokens_dir).unwrap();
    std::fs::write(
        tokens_dir.join(format!("{profile}.json")),
        serde_json::to_vec(&json!({ "tokens": tokens })).unwrap(),
    )
    .unwrap();
}

fn context(profile: &str) -> (tempfile::TempDir, Context) {
    let td = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(td.path().to_owned()).unwrap();

    write_tokens(
        &dir,
        "default",
        json!({
            "flows.globus.org": {
                "access_token": "flows-token",
                "expires_at": 4102444800i64,
                "token_type": "Bearer",
            },
            "transfer.api.globus.org": {
                "access_token": "transfer-token",
                "refresh_token": "unused",
                "expires_at": 1000,
            },
        }),
    );

    let settings = Settings::load_with_env(Some(dir), Some(Default::default())).unwrap();
    let ctx = Context {
        settings,
        profile: profile.to_owned(),
        format: Format::Text,
    };

    (td, ctx)
}

fn token_error(err: anyhow::Error) -> TokenError {
    match err.downcast::<TokenError>() {
        Ok(te) => te,
        Err(err) => panic!("expected a token error, got {err:#}"),
    }
}

#[test]
fn fresh_tokens_build_clients() {
    let (_td, ctx) = context("default");

    let store = ctx.tokens().unwrap();
    assert_eq!(store.profile(), "default");
    assert_eq!(store.access_token("flows.globus.org").unwrap(), "flows-token");

    let client = ctx.client(Service::Flows).unwrap();
    assert_eq!(client.base(), "https://flows.globus.org");
}

#[test]
fn expired_tokens_are_refused() {
    let (_td, ctx) = context("default");

    match token_error(ctx.client(Service::Transfer).unwrap_err()) {
        TokenError::Expired {
            resource_server,
            expired_at,
        } => {
            assert_eq!(resource_server, "transfer.api.globus.org");
            assert_eq!(expired_at, "1970-01-01T00:16:40Z");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn flow_runs_need_the_flow_scope() {
    let (_td, ctx) = context("default");

    match token_error(ctx.client_for(Service::Flows, FLOW_ID).unwrap_err()) {
        TokenError::NoToken {
            profile,
            resource_server,
        } => {
            assert_eq!(profile, "default");
            assert_eq!(resource_server, FLOW_ID);
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn unknown_profiles() {
    let (_td, ctx) = context("work");

    assert!(matches!(
        token_error(ctx.client(Service::Flows).unwrap_err()),
        TokenError::ProfileNotFound { profile, .. } if profile == "work"
    ));
}

#[test]
fn malformed_caches_are_reported() {
    let td = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(td.path().to_owned()).unwrap();
    std::fs::create_dir_all(dir.join("tokens")).unwrap();
    std::fs::write(dir.join("tokens/default.json"), "{ not json").unwrap();

    let err = TokenStore::load(&dir, "default").unwrap_err();
    assert!(err.to_string().starts_with("failed to parse token cache"), "{err:#}");
}
