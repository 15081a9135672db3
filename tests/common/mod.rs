#![allow(dead_code)]

use camino::Utf8PathBuf;
use globus_cli::{config::Settings, http::ServiceClient, output::Format, Context};
use wiremock::MockServer;

pub const TOKEN: &str = "test-token";
pub const BEARER: &str = "Bearer test-token";

/// A client pointed at the mock server, authorized with [`TOKEN`]
pub fn client(server: &MockServer) -> ServiceClient {
    ServiceClient::new(TOKEN, &server.uri()).unwrap()
}

/// Same as [`client`], with the service's path prefix appended to the base
pub fn client_at(server: &MockServer, prefix: &str) -> ServiceClient {
    ServiceClient::new(TOKEN, &format!("{}{prefix}", server.uri())).unwrap()
}

/// A context backed by an empty config directory and no environment, for
/// driving a command's `run` directly
pub fn context() -> (tempfile::TempDir, Context) {
    let td = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(td.path().to_owned()).unwrap();

    let settings = Settings::load_with_env(Some(dir), Some(Default::default())).unwrap();
    let ctx = Context {
        settings,
        profile: "default".to_owned(),
        format: Format::Json,
    };
    (td, ctx)
}
