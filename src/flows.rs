pub mod runs;

use crate::{
    http::{self, Query, ServiceClient},
    output, Context, Service,
};
use anyhow::Context as _;
use camino::Utf8PathBuf;
use clap::Parser;
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct Flow {
    pub id: Uuid,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_owner: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl output::Tabular for Flow {
    const COLUMNS: &'static [&'static str] =
        &["Flow ID", "Title", "Owner", "Created At", "Updated At"];

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.title.clone(),
            output::cell(&self.flow_owner),
            output::cell(&self.created_at),
            output::cell(&self.updated_at),
        ]
    }
}

#[derive(serde::Deserialize, Debug)]
pub struct FlowList {
    pub flows: Vec<Flow>,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub marker: Option<String>,
}

/// The fields of a flow that can be set on create and update. Fields that
/// are `None` are left out of the request.
#[derive(serde::Serialize, Default, Debug, PartialEq)]
pub struct FlowFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_viewers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_starters: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_administrators: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_managers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_monitors: Option<Vec<String>>,
}

#[derive(serde::Serialize, Debug, PartialEq)]
pub struct RunRequest {
    pub body: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Default, Debug)]
pub struct ListFlows {
    pub filter_role: Option<String>,
    pub filter_fulltext: Option<String>,
    pub orderby: Option<String>,
    pub marker: Option<String>,
}

/// A typed client for <https://globusonline.github.io/globus-flows/>
pub struct FlowsClient(pub ServiceClient);

impl FlowsClient {
    pub async fn list(&self, req: &ListFlows) -> anyhow::Result<FlowList> {
        let mut q = Query::new();
        http::push_opt(&mut q, "filter_role", req.filter_role.as_ref());
        http::push_opt(&mut q, "filter_fulltext", req.filter_fulltext.as_ref());
        http::push_opt(&mut q, "orderby", req.orderby.as_ref());
        http::push_opt(&mut q, "marker", req.marker.as_ref());
        self.0.get("/flows", &q).await
    }

    pub async fn get(&self, id: Uuid) -> anyhow::Result<Flow> {
        self.0.get(&format!("/flows/{id}"), &Query::new()).await
    }

    pub async fn create(&self, fields: &FlowFields) -> anyhow::Result<Flow> {
        self.0.post("/flows", fields).await
    }

    pub async fn update(&self, id: Uuid, fields: &FlowFields) -> anyhow::Result<Flow> {
        self.0.put(&format!("/flows/{id}"), fields).await
    }

    pub async fn delete(&self, id: Uuid) -> anyhow::Result<Value> {
        self.0.delete(&format!("/flows/{id}"), &Query::new()).await
    }

    pub async fn validate(
        &self,
        definition: Value,
        input_schema: Option<Value>,
    ) -> anyhow::Result<Value> {
        let fields = FlowFields {
            definition: Some(definition),
            input_schema,
            ..Default::default()
        };
        self.0.post("/flows/validate", &fields).await
    }

    /// Starts a run. The client must carry a token for the flow's own scope.
    pub async fn run(&self, id: Uuid, req: &RunRequest) -> anyhow::Result<runs::Run> {
        self.0.post(&format!("/flows/{id}/run"), req).await
    }
}

/// Flags for the optional, descriptive fields of a flow
#[derive(Parser, Debug, Default)]
pub struct FlowOptions {
    /// A short subtitle shown under the title
    #[arg(long)]
    subtitle: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// A keyword to help discover the flow, can be repeated
    #[arg(long = "keyword")]
    keywords: Vec<String>,
    /// A principal URN allowed to see the flow, can be repeated
    #[arg(long = "viewer")]
    viewers: Vec<String>,
    /// A principal URN allowed to run the flow, can be repeated
    #[arg(long = "starter")]
    starters: Vec<String>,
    /// A principal URN allowed to administer the flow, can be repeated
    #[arg(long = "administrator")]
    administrators: Vec<String>,
    /// A principal URN allowed to manage runs of the flow, can be repeated
    #[arg(long = "run-manager")]
    run_managers: Vec<String>,
    /// A principal URN allowed to monitor runs of the flow, can be repeated
    #[arg(long = "run-monitor")]
    run_monitors: Vec<String>,
}

#[inline]
fn non_empty(v: Vec<String>) -> Option<Vec<String>> {
    (!v.is_empty()).then_some(v)
}

impl FlowOptions {
    fn into_fields(self) -> FlowFields {
        FlowFields {
            subtitle: self.subtitle,
            description: self.description,
            keywords: non_empty(self.keywords),
            flow_viewers: non_empty(self.viewers),
            flow_starters: non_empty(self.starters),
            flow_administrators: non_empty(self.administrators),
            run_managers: non_empty(self.run_managers),
            run_monitors: non_empty(self.run_monitors),
            ..Default::default()
        }
    }
}

#[derive(Parser)]
pub struct List {
    /// Only list flows where you have this role, eg. flow_owner, flow_starter
    #[arg(long)]
    filter_role: Option<String>,
    /// Only list flows whose text fields match
    #[arg(long)]
    filter_fulltext: Option<String>,
    /// Sort order, eg. "updated_at DESC"
    #[arg(long)]
    orderby: Option<String>,
    /// The marker of the page to fetch, from a previous listing
    #[arg(long)]
    marker: Option<String>,
}

#[derive(Parser)]
pub struct Create {
    #[arg(long)]
    title: String,
    /// A JSON or YAML file with the flow definition, `-` for stdin
    #[arg(long)]
    definition: Utf8PathBuf,
    /// A JSON or YAML file with the JSON schema for the run input
    #[arg(long)]
    input_schema: Option<Utf8PathBuf>,
    #[clap(flatten)]
    options: FlowOptions,
}

#[derive(Parser)]
pub struct Update {
    flow_id: Uuid,
    #[arg(long)]
    title: Option<String>,
    /// A JSON or YAML file with the new flow definition
    #[arg(long)]
    definition: Option<Utf8PathBuf>,
    /// A JSON or YAML file with the new input schema
    #[arg(long)]
    input_schema: Option<Utf8PathBuf>,
    #[clap(flatten)]
    options: FlowOptions,
}

#[derive(Parser)]
pub struct Validate {
    /// A JSON or YAML file with the flow definition
    #[arg(long)]
    definition: Utf8PathBuf,
    #[arg(long)]
    input_schema: Option<Utf8PathBuf>,
}

#[derive(Parser)]
pub struct Run {
    flow_id: Uuid,
    /// A JSON or YAML file with the run's input, `-` for stdin
    #[arg(long)]
    input: Utf8PathBuf,
    /// A label for the run
    #[arg(long)]
    label: Option<String>,
    /// A tag for the run, can be repeated
    #[arg(long = "tag")]
    tags: Vec<String>,
}

/// Manage and run flows
#[derive(clap::Subcommand)]
pub enum Args {
    /// Lists flows visible to you
    List(List),
    /// Shows a single flow
    Show { flow_id: Uuid },
    /// Creates a new flow
    Create(Create),
    /// Updates the given fields of a flow
    Update(Update),
    /// Deletes a flow
    Delete { flow_id: Uuid },
    /// Checks a flow definition without creating it
    Validate(Validate),
    /// Starts a run of a flow
    Run(Run),
    /// Inspect and manage runs
    #[clap(subcommand)]
    Runs(runs::Args),
}

impl crate::ResourceServer for Args {
    fn service(&self) -> Service {
        Service::Flows
    }

    /// Runs are authorized by the flow's own scope, not the flows service's
    fn resource_server(&self) -> String {
        match self {
            Self::Run(run) => run.flow_id.to_string(),
            _ => Service::Flows.resource_server().to_owned(),
        }
    }

    fn waits(&self) -> bool {
        matches!(self, Self::Runs(r) if r.waits())
    }
}

fn load_schema(path: Option<&Utf8PathBuf>) -> anyhow::Result<Option<Value>> {
    path.map(|p| crate::load_document(p).context("failed to read input schema"))
        .transpose()
}

pub async fn run(args: Args, client: ServiceClient, ctx: &Context) -> anyhow::Result<()> {
    let flows = FlowsClient(client);

    match args {
        Args::List(list) => {
            let res = flows
                .list(&ListFlows {
                    filter_role: list.filter_role,
                    filter_fulltext: list.filter_fulltext,
                    orderby: list.orderby,
                    marker: list.marker,
                })
                .await
                .context("failed to list flows")?;

            output::print_list(ctx.format, &res.flows)?;
            if let (true, Some(marker)) = (res.has_next_page, &res.marker) {
                output::hint_next_page(ctx.format, "--marker", marker);
            }
        }
        Args::Show { flow_id } => {
            let flow = flows.get(flow_id).await.context("failed to get flow")?;
            print_flow(ctx.format, &flow)?;
        }
        Args::Create(create) => {
            let definition =
                crate::load_document(&create.definition).context("failed to read flow definition")?;
            // The service requires a schema, an empty one accepts any input
            let input_schema = load_schema(create.input_schema.as_ref())?
                .unwrap_or_else(|| serde_json::json!({}));

            let fields = FlowFields {
                title: Some(create.title),
                definition: Some(definition),
                input_schema: Some(input_schema),
                ..create.options.into_fields()
            };

            let flow = flows.create(&fields).await.context("failed to create flow")?;
            print_flow(ctx.format, &flow)?;
        }
        Args::Update(update) => {
            let definition = update
                .definition
                .as_ref()
                .map(|p| crate::load_document(p).context("failed to read flow definition"))
                .transpose()?;

            let fields = FlowFields {
                title: update.title,
                definition,
                input_schema: load_schema(update.input_schema.as_ref())?,
                ..update.options.into_fields()
            };

            anyhow::ensure!(
                fields != FlowFields::default(),
                "nothing to update, specify at least one field"
            );

            let flow = flows
                .update(update.flow_id, &fields)
                .await
                .context("failed to update flow")?;
            print_flow(ctx.format, &flow)?;
        }
        Args::Delete { flow_id } => {
            let res = flows.delete(flow_id).await.context("failed to delete flow")?;
            output::print_outcome(ctx.format, &format!("deleted flow {flow_id}"), &res)?;
        }
        Args::Validate(validate) => {
            let definition = crate::load_document(&validate.definition)
                .context("failed to read flow definition")?;
            let input_schema = load_schema(validate.input_schema.as_ref())?;

            let res = flows
                .validate(definition, input_schema)
                .await
                .context("flow validation failed")?;
            output::print_outcome(ctx.format, "the flow definition is valid", &res)?;
        }
        Args::Run(run) => {
            let body = crate::load_document(&run.input).context("failed to read run input")?;

            let started = flows
                .run(
                    run.flow_id,
                    &RunRequest {
                        body,
                        label: run.label,
                        tags: run.tags,
                    },
                )
                .await
                .context("failed to start run")?;
            output::print_record(ctx.format, &started)?;
        }
        Args::Runs(args) => runs::run(args, flows.0, ctx).await?,
    }

    Ok(())
}

fn print_flow(format: output::Format, flow: &Flow) -> anyhow::Result<()> {
    output::print_record(format, flow)?;
    if format == output::Format::Text {
        if let Some(definition) = flow.extra.get("definition") {
            println!("\nDefinition:");
            output::print_json(definition)?;
        }
    }
    Ok(())
}
