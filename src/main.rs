use anyhow::Context as _;
use clap::Parser;
use globus_cli::{Context, GlobalArgs, ResourceServer};
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(clap::Subcommand)]
enum Command {
    #[clap(subcommand)]
    Flows(globus_cli::flows::Args),
    #[clap(subcommand)]
    Group(globus_cli::groups::Args),
    #[clap(subcommand)]
    Search(globus_cli::search::Args),
    #[clap(subcommand)]
    Timer(globus_cli::timers::Args),
    #[clap(subcommand)]
    Compute(globus_cli::compute::Args),
    #[clap(subcommand)]
    Transfer(globus_cli::transfer::Args),
    #[clap(subcommand)]
    Auth(globus_cli::auth::Args),
    #[clap(subcommand)]
    Config(globus_cli::config::Args),
}

#[derive(Parser)]
#[clap(author, version, about)]
struct Args {
    #[clap(flatten)]
    global: GlobalArgs,
    #[clap(subcommand)]
    cmd: Command,
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    // RUST_LOG wins over -v so individual crates can be turned up or down
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity > 2)
        .with_filter(filter);

    tracing_subscriber::registry().with(fmt_layer).init();
}

/// Builds the client for a service command and runs it
macro_rules! service {
    ($module:ident, $args:expr, $ctx:expr) => {{
        let client = $ctx
            .client_for_command(&$args)
            .with_context(|| format!("unable to use the {} service", $args.service()))?;
        globus_cli::$module::run($args, client, $ctx).await
    }};
}

async fn real_main(cmd: Command, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        Command::Flows(args) => service!(flows, args, ctx),
        Command::Group(args) => service!(groups, args, ctx),
        Command::Search(args) => service!(search, args, ctx),
        Command::Timer(args) => service!(timers, args, ctx),
        Command::Compute(args) => service!(compute, args, ctx),
        Command::Transfer(args) => service!(transfer, args, ctx),
        Command::Auth(args) => globus_cli::auth::run(args, ctx).await,
        Command::Config(args) => globus_cli::config::run(args, ctx),
    }
}

impl Command {
    fn waits(&self) -> bool {
        match self {
            Self::Flows(a) => a.waits(),
            Self::Group(a) => a.waits(),
            Self::Search(a) => a.waits(),
            Self::Timer(a) => a.waits(),
            Self::Compute(a) => a.waits(),
            Self::Transfer(a) => a.waits(),
            Self::Auth(_) | Self::Config(_) => false,
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let ctx = Context::new(&args.global).context("failed to load configuration")?;

    let deadline = if args.cmd.waits() {
        globus_cli::WAIT_TIMEOUT
    } else {
        Duration::from_secs(args.global.timeout)
    };

    tracing::debug!(profile = %ctx.profile, format = %ctx.format, ?deadline, "starting command");

    with_deadline(deadline, real_main(args.cmd, &ctx)).await
}

async fn with_deadline(
    deadline: Duration,
    cmd: impl std::future::Future<Output = anyhow::Result<()>>,
) -> anyhow::Result<()> {
    tokio::time::timeout(deadline, cmd)
        .await
        .map_err(|_elapsed| anyhow::anyhow!("command timed out after {deadline:?}"))?
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    setup_logging(args.global.verbose);

    if let Err(err) = run(args).await {
        eprintln!("{} {err:#}", nu_ansi_term::Color::Red.paint("error:"));
        std::process::exit(1);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn wait_flags_extend_the_deadline() {
        const ID: &str = "3f1f3a44-5e5f-4d2c-9a57-2ad2b2f7bbfc";

        let args = Args::parse_from(["globus", "flows", "runs", "show", "--wait", ID]);
        assert!(args.cmd.waits());

        let args = Args::parse_from(["globus", "transfer", "task", "wait", ID]);
        assert!(args.cmd.waits());

        let args = Args::parse_from(["globus", "group", "list"]);
        assert!(!args.cmd.waits());
    }

    #[tokio::test(start_paused = true)]
    async fn deadlines_expire_into_errors() {
        let never = std::future::pending::<anyhow::Result<()>>();
        let err = with_deadline(Duration::from_secs(30), never)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "command timed out after 30s");
    }

    #[tokio::test(start_paused = true)]
    async fn command_errors_pass_through() {
        let failing = async { Err::<(), _>(anyhow::anyhow!("task failed")) };
        let err = with_deadline(Duration::from_secs(30), failing)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "task failed");
    }
}
