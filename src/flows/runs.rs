use crate::{
    http::{self, Query, ServiceClient},
    output, Context,
};
use anyhow::Context as _;
use clap::Parser;
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct Run {
    pub run_id: Uuid,
    pub flow_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_title: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Run {
    /// Active runs may still change, anything else needs no more polling
    pub fn is_finished(&self) -> bool {
        self.status != "ACTIVE"
    }
}

impl output::Tabular for Run {
    const COLUMNS: &'static [&'static str] = &[
        "Run ID",
        "Flow Title",
        "Status",
        "Label",
        "Started At",
        "Completed At",
    ];

    fn row(&self) -> Vec<String> {
        vec![
            self.run_id.to_string(),
            output::cell(&self.flow_title),
            self.status.clone(),
            output::cell(&self.label),
            output::cell(&self.start_time),
            output::cell(&self.completion_time),
        ]
    }
}

#[derive(serde::Deserialize, Debug)]
pub struct RunList {
    pub runs: Vec<Run>,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub marker: Option<String>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug)]
pub struct LogEntry {
    #[serde(default)]
    pub time: Option<String>,
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl output::Tabular for LogEntry {
    const COLUMNS: &'static [&'static str] = &["Time", "Code", "Description"];

    fn row(&self) -> Vec<String> {
        vec![
            output::cell(&self.time),
            self.code.clone(),
            output::cell(&self.description),
        ]
    }
}

#[derive(serde::Deserialize, Debug)]
pub struct RunLog {
    pub entries: Vec<LogEntry>,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub marker: Option<String>,
}

#[derive(Default, Debug)]
pub struct ListRuns {
    pub filter_flow_id: Vec<Uuid>,
    pub filter_status: Vec<String>,
    pub filter_role: Option<String>,
    pub marker: Option<String>,
}

#[derive(serde::Serialize, Debug)]
pub struct RunUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// The run endpoints of the flows service
pub struct RunsClient<'c>(pub &'c ServiceClient);

impl RunsClient<'_> {
    pub async fn list(&self, req: &ListRuns) -> anyhow::Result<RunList> {
        let mut q = Query::new();
        http::push_list(&mut q, "filter_flow_id", &req.filter_flow_id);
        http::push_list(&mut q, "filter_status", &req.filter_status);
        http::push_opt(&mut q, "filter_role", req.filter_role.as_ref());
        http::push_opt(&mut q, "marker", req.marker.as_ref());
        self.0.get("/runs", &q).await
    }

    pub async fn get(&self, id: Uuid) -> anyhow::Result<Run> {
        self.0.get(&format!("/runs/{id}"), &Query::new()).await
    }

    pub async fn log(&self, id: Uuid, limit: Option<u32>, reverse: bool) -> anyhow::Result<RunLog> {
        let mut q = Query::new();
        http::push_opt(&mut q, "limit", limit);
        if reverse {
            q.push(("reverse_order", "true".to_owned()));
        }
        self.0.get(&format!("/runs/{id}/log"), &q).await
    }

    pub async fn update(&self, id: Uuid, update: &RunUpdate) -> anyhow::Result<Run> {
        self.0.put(&format!("/runs/{id}"), update).await
    }

    /// Posts to one of the run actions, `cancel`, `resume` or `release`
    pub async fn action(&self, id: Uuid, action: &str) -> anyhow::Result<Run> {
        self.0.post_empty(&format!("/runs/{id}/{action}")).await
    }
}

#[derive(Parser)]
pub struct List {
    /// Only list runs of this flow, can be repeated
    #[arg(long)]
    filter_flow_id: Vec<Uuid>,
    /// Only list runs with this status, eg. ACTIVE, SUCCEEDED, can be repeated
    #[arg(long)]
    filter_status: Vec<String>,
    /// Only list runs where you have this role, eg. run_owner, run_monitor
    #[arg(long)]
    filter_role: Option<String>,
    /// The marker of the page to fetch, from a previous listing
    #[arg(long)]
    marker: Option<String>,
}

#[derive(Parser)]
pub struct Show {
    run_id: Uuid,
    /// Polls the run until it is no longer active
    #[arg(long)]
    wait: bool,
    /// Seconds between polls when waiting
    #[arg(long, default_value = "5", value_parser = http::parse_polling_interval)]
    polling_interval: Duration,
}

#[derive(Parser)]
pub struct Log {
    run_id: Uuid,
    /// The maximum number of entries to return
    #[arg(long)]
    limit: Option<u32>,
    /// Newest entries first
    #[arg(long)]
    reverse: bool,
}

#[derive(Parser)]
pub struct Update {
    run_id: Uuid,
    #[arg(long)]
    label: Option<String>,
    /// Replaces the run's tags, can be repeated
    #[arg(long = "tag")]
    tags: Vec<String>,
}

/// Inspect and manage flow runs
#[derive(clap::Subcommand)]
pub enum Args {
    /// Lists runs visible to you
    List(List),
    /// Shows a single run
    Show(Show),
    /// Shows a run's event log
    Log(Log),
    /// Updates a run's label or tags
    Update(Update),
    /// Cancels an active run
    Cancel { run_id: Uuid },
    /// Resumes an inactive run, eg. after granting consent
    Resume { run_id: Uuid },
    /// Removes a completed run's record from the service
    Release { run_id: Uuid },
}

impl Args {
    pub fn waits(&self) -> bool {
        matches!(self, Self::Show(s) if s.wait)
    }
}

pub async fn run(args: Args, client: ServiceClient, ctx: &Context) -> anyhow::Result<()> {
    let runs = RunsClient(&client);

    match args {
        Args::List(list) => {
            let res = runs
                .list(&ListRuns {
                    filter_flow_id: list.filter_flow_id,
                    filter_status: list.filter_status,
                    filter_role: list.filter_role,
                    marker: list.marker,
                })
                .await
                .context("failed to list runs")?;

            output::print_list(ctx.format, &res.runs)?;
            if let (true, Some(marker)) = (res.has_next_page, &res.marker) {
                output::hint_next_page(ctx.format, "--marker", marker);
            }
        }
        Args::Show(show) => {
            let run = if show.wait {
                http::poll_until(show.polling_interval, || runs.get(show.run_id), Run::is_finished)
                    .await
            } else {
                runs.get(show.run_id).await
            }
            .context("failed to get run")?;

            output::print_record(ctx.format, &run)?;
        }
        Args::Log(log) => {
            let res = runs
                .log(log.run_id, log.limit, log.reverse)
                .await
                .context("failed to get run log")?;

            match ctx.format {
                output::Format::Json => output::print_json(&res.entries)?,
                format => output::print_list(format, &res.entries)?,
            }
        }
        Args::Update(update) => {
            let req = RunUpdate {
                label: update.label,
                tags: (!update.tags.is_empty()).then_some(update.tags),
            };
            anyhow::ensure!(
                req.label.is_some() || req.tags.is_some(),
                "nothing to update, specify --label or --tag"
            );

            let run = runs
                .update(update.run_id, &req)
                .await
                .context("failed to update run")?;
            output::print_record(ctx.format, &run)?;
        }
        Args::Cancel { run_id } => {
            let run = runs
                .action(run_id, "cancel")
                .await
                .context("failed to cancel run")?;
            output::print_record(ctx.format, &run)?;
        }
        Args::Resume { run_id } => {
            let run = runs
                .action(run_id, "resume")
                .await
                .context("failed to resume run")?;
            output::print_record(ctx.format, &run)?;
        }
        Args::Release { run_id } => {
            let run = runs
                .action(run_id, "release")
                .await
                .context("failed to release run")?;
            output::print_outcome(ctx.format, &format!("released run {run_id}"), &run)?;
        }
    }

    Ok(())
}
