use super::{Ack, DataList, TransferClient};
use crate::{
    http::{self, Query},
    output, Context,
};
use anyhow::Context as _;
use clap::Parser;
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct Task {
    pub task_id: Uuid,
    pub status: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_endpoint_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_endpoint_display_name: Option<String>,
    #[serde(default)]
    pub files: u64,
    #[serde(default)]
    pub files_transferred: u64,
    #[serde(default)]
    pub bytes_transferred: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn is_finished(&self) -> bool {
        matches!(self.status.as_str(), "SUCCEEDED" | "FAILED")
    }
}

impl output::Tabular for Task {
    const COLUMNS: &'static [&'static str] = &[
        "Task ID",
        "Status",
        "Type",
        "Source",
        "Destination",
        "Label",
    ];

    fn row(&self) -> Vec<String> {
        vec![
            self.task_id.to_string(),
            self.status.clone(),
            output::cell(&self.kind),
            output::cell(&self.source_endpoint_display_name),
            output::cell(&self.destination_endpoint_display_name),
            output::cell(&self.label),
        ]
    }
}

impl TransferClient {
    pub async fn task_list(
        &self,
        status: &[String],
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> anyhow::Result<DataList<Task>> {
        let mut q = Query::new();
        if !status.is_empty() {
            q.push(("filter", format!("status:{}", status.join(","))));
        }
        http::push_opt(&mut q, "limit", limit);
        http::push_opt(&mut q, "offset", offset);
        self.0.get("/task_list", &q).await
    }

    pub async fn task(&self, id: Uuid) -> anyhow::Result<Task> {
        self.0.get(&format!("/task/{id}"), &Query::new()).await
    }

    pub async fn cancel_task(&self, id: Uuid) -> anyhow::Result<Ack> {
        self.0.post_empty(&format!("/task/{id}/cancel")).await
    }
}

#[derive(Parser)]
pub struct List {
    /// Only list tasks with this status, eg. ACTIVE, SUCCEEDED, can be repeated
    #[arg(long = "filter-status")]
    status: Vec<String>,
    #[arg(long)]
    limit: Option<u32>,
    #[arg(long)]
    offset: Option<u32>,
}

#[derive(Parser)]
pub struct Wait {
    task_id: Uuid,
    /// Seconds between polls
    #[arg(long, default_value = "5", value_parser = http::parse_polling_interval)]
    polling_interval: Duration,
}

/// Inspect and manage transfer tasks
#[derive(clap::Subcommand)]
pub enum Args {
    /// Lists your recent tasks
    List(List),
    /// Shows a single task
    Show { task_id: Uuid },
    /// Cancels an active task
    Cancel { task_id: Uuid },
    /// Waits for a task to succeed or fail
    Wait(Wait),
}

pub async fn run(args: Args, transfer: &TransferClient, ctx: &Context) -> anyhow::Result<()> {
    match args {
        Args::List(list) => {
            let res = transfer
                .task_list(&list.status, list.limit, list.offset)
                .await
                .context("failed to list tasks")?;

            output::print_list(ctx.format, &res.data)?;
            if let (true, Some(offset)) = (res.has_next_page, res.offset) {
                output::hint_next_page(ctx.format, "--offset", offset + res.data.len() as u64);
            }
        }
        Args::Show { task_id } => {
            let task = transfer
                .task(task_id)
                .await
                .context("failed to get task")?;
            output::print_record(ctx.format, &task)?;
        }
        Args::Cancel { task_id } => {
            let ack = transfer
                .cancel_task(task_id)
                .await
                .context("failed to cancel task")?;
            output::print_outcome(ctx.format, &ack.message, &ack)?;
        }
        Args::Wait(wait) => {
            let task = http::poll_until(
                wait.polling_interval,
                || transfer.task(wait.task_id),
                Task::is_finished,
            )
            .await
            .context("failed to wait for task")?;

            output::print_record(ctx.format, &task)?;
            anyhow::ensure!(task.status == "SUCCEEDED", "task {} failed", task.task_id);
        }
    }

    Ok(())
}
