pub mod create;

use crate::{
    http::{Query, ServiceClient},
    output, Context, Service,
};
use anyhow::Context as _;
use serde_json::{json, Map, Value};
use uuid::Uuid;

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct Timer {
    pub job_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Seconds between runs, absent for one-off timers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ran_at: Option<String>,
    #[serde(default)]
    pub n_runs: u64,
    #[serde(default)]
    pub n_errors: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl output::Tabular for Timer {
    const COLUMNS: &'static [&'static str] =
        &["Timer ID", "Name", "Status", "Interval", "Next Run", "Runs"];

    fn row(&self) -> Vec<String> {
        vec![
            self.job_id.to_string(),
            output::cell(&self.name),
            output::cell(&self.status),
            self.interval
                .map(|secs| format!("{secs}s"))
                .unwrap_or_default(),
            output::cell(&self.next_run),
            self.n_runs.to_string(),
        ]
    }
}

#[derive(serde::Deserialize, Debug)]
pub struct TimerList {
    pub jobs: Vec<Timer>,
}

/// A typed client for <https://timer.automate.globus.org>
pub struct TimersClient(pub ServiceClient);

impl TimersClient {
    pub async fn list(&self) -> anyhow::Result<TimerList> {
        self.0.get("/jobs/", &Query::new()).await
    }

    pub async fn get(&self, id: Uuid) -> anyhow::Result<Timer> {
        self.0.get(&format!("/jobs/{id}"), &Query::new()).await
    }

    pub async fn update(&self, id: Uuid, name: &str) -> anyhow::Result<Timer> {
        self.0
            .patch(&format!("/jobs/{id}"), &json!({ "name": name }))
            .await
    }

    pub async fn delete(&self, id: Uuid) -> anyhow::Result<Value> {
        self.0.delete(&format!("/jobs/{id}"), &Query::new()).await
    }

    pub async fn pause(&self, id: Uuid) -> anyhow::Result<Value> {
        self.0.post_empty(&format!("/jobs/{id}/pause")).await
    }

    pub async fn resume(&self, id: Uuid, update_credentials: bool) -> anyhow::Result<Value> {
        self.0
            .post(
                &format!("/jobs/{id}/resume"),
                &json!({ "update_credentials": update_credentials }),
            )
            .await
    }
}

/// Schedule recurring transfers and flow runs
#[derive(clap::Subcommand)]
pub enum Args {
    /// Lists your timers
    List,
    /// Shows a single timer
    Show { timer_id: Uuid },
    /// Renames a timer
    Update {
        timer_id: Uuid,
        #[arg(long)]
        name: String,
    },
    /// Deletes a timer, any run in progress is not affected
    Delete { timer_id: Uuid },
    /// Stops a timer from running until it is resumed
    Pause { timer_id: Uuid },
    /// Resumes a paused timer
    Resume {
        timer_id: Uuid,
        /// Replace the timer's credentials with your current ones, needed
        /// when a timer was paused because its grant expired
        #[arg(long)]
        update_credentials: bool,
    },
    #[clap(subcommand)]
    Create(create::Args),
}

impl crate::ResourceServer for Args {
    fn service(&self) -> Service {
        Service::Timers
    }
}

pub async fn run(args: Args, client: ServiceClient, ctx: &Context) -> anyhow::Result<()> {
    let timers = TimersClient(client);

    match args {
        Args::List => {
            let res = timers.list().await.context("failed to list timers")?;
            output::print_list(ctx.format, &res.jobs)?;
        }
        Args::Show { timer_id } => {
            let timer = timers.get(timer_id).await.context("failed to get timer")?;
            output::print_record(ctx.format, &timer)?;
        }
        Args::Update { timer_id, name } => {
            let timer = timers
                .update(timer_id, &name)
                .await
                .context("failed to update timer")?;
            output::print_record(ctx.format, &timer)?;
        }
        Args::Delete { timer_id } => {
            let res = timers
                .delete(timer_id)
                .await
                .context("failed to delete timer")?;
            output::print_outcome(ctx.format, &format!("deleted timer {timer_id}"), &res)?;
        }
        Args::Pause { timer_id } => {
            let res = timers
                .pause(timer_id)
                .await
                .context("failed to pause timer")?;
            output::print_outcome(ctx.format, &format!("paused timer {timer_id}"), &res)?;
        }
        Args::Resume {
            timer_id,
            update_credentials,
        } => {
            let res = timers
                .resume(timer_id, update_credentials)
                .await
                .context("failed to resume timer")?;
            output::print_outcome(ctx.format, &format!("resumed timer {timer_id}"), &res)?;
        }
        Args::Create(args) => create::run(args, &timers.0, ctx).await?,
    }

    Ok(())
}
