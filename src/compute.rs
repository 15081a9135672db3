use crate::{
    http::{self, Query, ServiceClient},
    output, Context, NotSupported, Service,
};
use anyhow::Context as _;
use clap::Parser;
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct Endpoint {
    #[serde(alias = "uuid")]
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Uuid>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl output::Tabular for Endpoint {
    const COLUMNS: &'static [&'static str] = &["Endpoint ID", "Name", "Display Name", "Owner"];

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            output::cell(&self.name),
            output::cell(&self.display_name),
            output::cell(&self.owner),
        ]
    }
}

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct EndpointStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl output::Tabular for EndpointStatus {
    const COLUMNS: &'static [&'static str] = &["Status"];

    fn row(&self) -> Vec<String> {
        vec![self.status.clone()]
    }
}

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct Function {
    pub function_uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl output::Tabular for Function {
    const COLUMNS: &'static [&'static str] = &["Function ID", "Name", "Description"];

    fn row(&self) -> Vec<String> {
        vec![
            self.function_uuid.to_string(),
            output::cell(&self.function_name),
            output::cell(&self.description),
        ]
    }
}

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct Task {
    pub task_id: Uuid,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_t: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    /// A task is final once it reports a terminal status, or once its result
    /// or exception has been attached
    pub fn is_final(&self) -> bool {
        matches!(self.status.as_deref(), Some("success" | "failed"))
            || self.result.is_some()
            || self.exception.is_some()
    }
}

impl output::Tabular for Task {
    const COLUMNS: &'static [&'static str] = &["Task ID", "Status", "Result", "Exception"];

    fn row(&self) -> Vec<String> {
        let json = |v: &Option<Value>| v.as_ref().map(Value::to_string).unwrap_or_default();

        vec![
            self.task_id.to_string(),
            output::cell(&self.status),
            json(&self.result),
            json(&self.exception),
        ]
    }
}

#[derive(clap::ValueEnum, Copy, Clone, Debug, Default)]
pub enum Role {
    /// Endpoints you own
    #[default]
    Owner,
    /// Every endpoint you can use
    Any,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Any => "any",
        }
    }
}

/// A typed client for <https://compute.api.globus.org>
pub struct ComputeClient(pub ServiceClient);

impl ComputeClient {
    pub async fn endpoints(&self, role: Role) -> anyhow::Result<Vec<Endpoint>> {
        let q = vec![("role", role.as_str().to_owned())];
        self.0.get("/v2/endpoints", &q).await
    }

    pub async fn endpoint(&self, id: Uuid) -> anyhow::Result<Endpoint> {
        self.0.get(&format!("/v2/endpoints/{id}"), &Query::new()).await
    }

    pub async fn endpoint_status(&self, id: Uuid) -> anyhow::Result<EndpointStatus> {
        self.0
            .get(&format!("/v2/endpoints/{id}/status"), &Query::new())
            .await
    }

    pub async fn delete_endpoint(&self, id: Uuid) -> anyhow::Result<Value> {
        self.0
            .delete(&format!("/v2/endpoints/{id}"), &Query::new())
            .await
    }

    pub async fn function(&self, id: Uuid) -> anyhow::Result<Function> {
        self.0.get(&format!("/v2/functions/{id}"), &Query::new()).await
    }

    pub async fn delete_function(&self, id: Uuid) -> anyhow::Result<Value> {
        self.0
            .delete(&format!("/v2/functions/{id}"), &Query::new())
            .await
    }

    pub async fn task(&self, id: Uuid) -> anyhow::Result<Task> {
        self.0.get(&format!("/v2/tasks/{id}"), &Query::new()).await
    }
}

/// Inspect and manage compute endpoints
#[derive(clap::Subcommand)]
pub enum EndpointArgs {
    /// Lists endpoints
    List {
        #[arg(long, value_enum, default_value_t)]
        role: Role,
    },
    /// Shows a single endpoint
    Show { endpoint_id: Uuid },
    /// Shows whether an endpoint is online
    Status { endpoint_id: Uuid },
    /// Deletes an endpoint registration
    Delete { endpoint_id: Uuid },
}

/// Inspect and manage registered functions
#[derive(clap::Subcommand)]
pub enum FunctionArgs {
    /// Shows a single function
    Show { function_id: Uuid },
    /// Deletes a function
    Delete { function_id: Uuid },
    /// Registers a function
    Register {
        /// The source file containing the function
        file: Option<String>,
    },
    /// Runs a function on an endpoint
    Run {
        function_id: Option<Uuid>,
        #[arg(long)]
        endpoint_id: Option<Uuid>,
    },
}

#[derive(Parser)]
pub struct TaskShow {
    task_id: Uuid,
    /// Polls the task until it has a result or an exception
    #[arg(long)]
    wait: bool,
    /// Seconds between polls when waiting
    #[arg(long, default_value = "5", value_parser = http::parse_polling_interval)]
    polling_interval: Duration,
}

#[derive(clap::Subcommand)]
pub enum TaskArgs {
    /// Shows a task's status and result
    Show(TaskShow),
}

/// Run functions on remote compute endpoints
#[derive(clap::Subcommand)]
pub enum Args {
    #[clap(subcommand)]
    Endpoint(EndpointArgs),
    #[clap(subcommand)]
    Function(FunctionArgs),
    #[clap(subcommand)]
    Task(TaskArgs),
}

impl crate::ResourceServer for Args {
    fn service(&self) -> Service {
        Service::Compute
    }

    fn waits(&self) -> bool {
        matches!(self, Self::Task(TaskArgs::Show(show)) if show.wait)
    }
}

pub async fn run(args: Args, client: ServiceClient, ctx: &Context) -> anyhow::Result<()> {
    let compute = ComputeClient(client);

    match args {
        Args::Endpoint(EndpointArgs::List { role }) => {
            let endpoints = compute
                .endpoints(role)
                .await
                .context("failed to list endpoints")?;
            output::print_list(ctx.format, &endpoints)?;
        }
        Args::Endpoint(EndpointArgs::Show { endpoint_id }) => {
            let ep = compute
                .endpoint(endpoint_id)
                .await
                .context("failed to get endpoint")?;
            output::print_record(ctx.format, &ep)?;
        }
        Args::Endpoint(EndpointArgs::Status { endpoint_id }) => {
            let status = compute
                .endpoint_status(endpoint_id)
                .await
                .context("failed to get endpoint status")?;
            output::print_record(ctx.format, &status)?;
        }
        Args::Endpoint(EndpointArgs::Delete { endpoint_id }) => {
            let res = compute
                .delete_endpoint(endpoint_id)
                .await
                .context("failed to delete endpoint")?;
            output::print_outcome(ctx.format, &format!("deleted endpoint {endpoint_id}"), &res)?;
        }
        Args::Function(FunctionArgs::Show { function_id }) => {
            let func = compute
                .function(function_id)
                .await
                .context("failed to get function")?;
            output::print_record(ctx.format, &func)?;
        }
        Args::Function(FunctionArgs::Delete { function_id }) => {
            let res = compute
                .delete_function(function_id)
                .await
                .context("failed to delete function")?;
            output::print_outcome(ctx.format, &format!("deleted function {function_id}"), &res)?;
        }
        Args::Function(FunctionArgs::Register { .. }) => {
            return Err(NotSupported {
                operation: "compute function register",
                reason: "functions must be serialized by the Python SDK",
            }
            .into());
        }
        Args::Function(FunctionArgs::Run { .. }) => {
            return Err(NotSupported {
                operation: "compute function run",
                reason: "task arguments must be serialized by the Python SDK",
            }
            .into());
        }
        Args::Task(TaskArgs::Show(show)) => {
            let task = if show.wait {
                http::poll_until(
                    show.polling_interval,
                    || compute.task(show.task_id),
                    Task::is_final,
                )
                .await
            } else {
                compute.task(show.task_id).await
            }
            .context("failed to get task")?;

            output::print_record(ctx.format, &task)?;
        }
    }

    Ok(())
}
