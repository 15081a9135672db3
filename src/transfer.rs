pub mod task;

use crate::{
    http::{self, Query, ServiceClient},
    output, Context, Service,
};
use anyhow::Context as _;
use clap::Parser;
use serde_json::{json, Map, Value};
use uuid::Uuid;

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct Endpoint {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl output::Tabular for Endpoint {
    const COLUMNS: &'static [&'static str] = &["ID", "Owner", "Display Name", "Entity Type"];

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            output::cell(&self.owner_string),
            output::cell(&self.display_name),
            output::cell(&self.entity_type),
        ]
    }
}

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
}

impl output::Tabular for DirEntry {
    const COLUMNS: &'static [&'static str] = &["Name", "Type", "Size", "Last Modified"];

    fn row(&self) -> Vec<String> {
        let name = if self.kind == "dir" {
            format!("{}/", self.name)
        } else {
            self.name.clone()
        };

        vec![
            name,
            self.kind.clone(),
            self.size.to_string(),
            output::cell(&self.last_modified),
        ]
    }
}

/// Transfer wraps most collections in a `DATA` array
#[derive(serde::Deserialize, Debug)]
pub struct DataList<T> {
    #[serde(rename = "DATA")]
    pub data: Vec<T>,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
}

/// The `{code, message}` acknowledgement most Transfer actions answer with
#[derive(serde::Deserialize, serde::Serialize, Debug)]
pub struct Ack {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl output::Tabular for Ack {
    const COLUMNS: &'static [&'static str] = &["Code", "Message", "Task ID"];

    fn row(&self) -> Vec<String> {
        vec![
            self.code.clone(),
            self.message.clone(),
            output::cell(&self.task_id),
        ]
    }
}

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncLevel {
    /// Only copy files missing at the destination
    Exists,
    /// Copy files whose size differs
    Size,
    /// Copy files whose modification time is newer
    Mtime,
    /// Copy files whose checksum differs
    Checksum,
}

impl SyncLevel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Exists => "exists",
            Self::Size => "size",
            Self::Mtime => "mtime",
            Self::Checksum => "checksum",
        }
    }
}

/// One source/destination pair of a transfer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferItem {
    pub source_path: String,
    pub destination_path: String,
    pub recursive: bool,
}

/// The flags that describe a transfer, shared by `transfer submit` and
/// `timer create transfer`
#[derive(Parser, Debug)]
pub struct TransferOptions {
    #[arg(long)]
    pub source_endpoint: Uuid,
    #[arg(long)]
    pub destination_endpoint: Uuid,
    /// A source and destination path pair, can be repeated. Sources ending
    /// with `/` are transferred recursively
    #[arg(long = "item", num_args = 2, value_names = ["SOURCE", "DESTINATION"], required = true)]
    pub items: Vec<String>,
    /// Transfer every item recursively
    #[arg(long)]
    pub recursive: bool,
    /// A label for the task
    #[arg(long)]
    pub label: Option<String>,
    /// Only copy files that differ at the destination
    #[arg(long, value_enum)]
    pub sync_level: Option<SyncLevel>,
    /// Verify checksums after each file is transferred
    #[arg(long)]
    pub verify_checksum: bool,
    /// Preserve source modification times
    #[arg(long)]
    pub preserve_timestamp: bool,
    /// Encrypt the data channel
    #[arg(long)]
    pub encrypt_data: bool,
    /// Delete destination files that are not in the source
    #[arg(long)]
    pub delete: bool,
}

impl TransferOptions {
    pub fn items(&self) -> anyhow::Result<Vec<TransferItem>> {
        anyhow::ensure!(
            !self.items.is_empty() && self.items.len() % 2 == 0,
            "each --item needs a source and a destination path"
        );

        Ok(self
            .items
            .chunks(2)
            .map(|pair| TransferItem {
                recursive: self.recursive || pair[0].ends_with('/'),
                source_path: pair[0].clone(),
                destination_path: pair[1].clone(),
            })
            .collect())
    }

    /// The transfer document, without a submission ID
    pub fn document(&self) -> anyhow::Result<Value> {
        let data: Vec<_> = self
            .items()?
            .into_iter()
            .map(|item| {
                json!({
                    "DATA_TYPE": "transfer_item",
                    "source_path": item.source_path,
                    "destination_path": item.destination_path,
                    "recursive": item.recursive,
                })
            })
            .collect();

        let mut doc = json!({
            "DATA_TYPE": "transfer",
            "source_endpoint": self.source_endpoint,
            "destination_endpoint": self.destination_endpoint,
            "DATA": data,
            "verify_checksum": self.verify_checksum,
            "preserve_timestamp": self.preserve_timestamp,
            "encrypt_data": self.encrypt_data,
            "delete_destination_extra": self.delete,
        });

        if let Some(label) = &self.label {
            doc["label"] = label.as_str().into();
        }
        if let Some(sync) = self.sync_level {
            doc["sync_level"] = sync.as_str().into();
        }

        Ok(doc)
    }
}

/// A typed client for <https://docs.globus.org/api/transfer/>
pub struct TransferClient(pub ServiceClient);

impl TransferClient {
    pub async fn endpoint_search(
        &self,
        text: &str,
        scope: Option<&str>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> anyhow::Result<DataList<Endpoint>> {
        let mut q = vec![("filter_fulltext", text.to_owned())];
        http::push_opt(&mut q, "filter_scope", scope);
        http::push_opt(&mut q, "limit", limit);
        http::push_opt(&mut q, "offset", offset);
        self.0.get("/endpoint_search", &q).await
    }

    pub async fn endpoint(&self, id: Uuid) -> anyhow::Result<Endpoint> {
        self.0.get(&format!("/endpoint/{id}"), &Query::new()).await
    }

    pub async fn ls(
        &self,
        endpoint: Uuid,
        path: Option<&str>,
        show_hidden: bool,
    ) -> anyhow::Result<DataList<DirEntry>> {
        let mut q = Query::new();
        http::push_opt(&mut q, "path", path);
        if show_hidden {
            q.push(("show_hidden", "true".to_owned()));
        }
        self.0
            .get(&format!("/operation/endpoint/{endpoint}/ls"), &q)
            .await
    }

    pub async fn mkdir(&self, endpoint: Uuid, path: &str) -> anyhow::Result<Ack> {
        self.0
            .post(
                &format!("/operation/endpoint/{endpoint}/mkdir"),
                &json!({"DATA_TYPE": "mkdir", "path": path}),
            )
            .await
    }

    /// Submissions must carry an ID minted by the service so retries are idempotent
    pub async fn submission_id(&self) -> anyhow::Result<String> {
        #[derive(serde::Deserialize)]
        struct SubmissionId {
            value: String,
        }

        let id: SubmissionId = self.0.get("/submission_id", &Query::new()).await?;
        Ok(id.value)
    }

    pub async fn submit(&self, mut doc: Value) -> anyhow::Result<Ack> {
        let submission_id = self
            .submission_id()
            .await
            .context("failed to get a submission id")?;
        doc["submission_id"] = submission_id.into();

        self.0.post("/transfer", &doc).await
    }
}

#[derive(Parser)]
pub struct EndpointSearch {
    /// Text matched against endpoint names, descriptions and owners
    filter_fulltext: String,
    /// Narrows the search, eg. my-endpoints, shared-with-me, recently-used
    #[arg(long)]
    filter_scope: Option<String>,
    #[arg(long)]
    limit: Option<u32>,
    #[arg(long)]
    offset: Option<u32>,
}

/// Find and inspect endpoints and collections
#[derive(clap::Subcommand)]
pub enum EndpointArgs {
    /// Searches for endpoints and collections
    Search(EndpointSearch),
    /// Shows a single endpoint or collection
    Show { endpoint_id: Uuid },
}

/// Browse endpoints and move data between them
#[derive(clap::Subcommand)]
pub enum Args {
    #[clap(subcommand)]
    Endpoint(EndpointArgs),
    /// Lists a directory on an endpoint
    Ls {
        endpoint_id: Uuid,
        /// Defaults to the endpoint's default directory
        path: Option<String>,
        /// Include hidden files
        #[arg(long)]
        all: bool,
    },
    /// Creates a directory on an endpoint
    Mkdir { endpoint_id: Uuid, path: String },
    /// Submits a transfer task
    Submit(TransferOptions),
    #[clap(subcommand)]
    Task(task::Args),
}

impl crate::ResourceServer for Args {
    fn service(&self) -> Service {
        Service::Transfer
    }

    fn waits(&self) -> bool {
        matches!(self, Self::Task(task::Args::Wait(_)))
    }
}

pub async fn run(args: Args, client: ServiceClient, ctx: &Context) -> anyhow::Result<()> {
    let transfer = TransferClient(client);

    match args {
        Args::Endpoint(EndpointArgs::Search(search)) => {
            let res = transfer
                .endpoint_search(
                    &search.filter_fulltext,
                    search.filter_scope.as_deref(),
                    search.limit,
                    search.offset,
                )
                .await
                .context("failed to search endpoints")?;

            output::print_list(ctx.format, &res.data)?;
            if let (true, Some(offset)) = (res.has_next_page, res.offset) {
                output::hint_next_page(ctx.format, "--offset", offset + res.data.len() as u64);
            }
        }
        Args::Endpoint(EndpointArgs::Show { endpoint_id }) => {
            let ep = transfer
                .endpoint(endpoint_id)
                .await
                .context("failed to get endpoint")?;
            output::print_record(ctx.format, &ep)?;
        }
        Args::Ls {
            endpoint_id,
            path,
            all,
        } => {
            let res = transfer
                .ls(endpoint_id, path.as_deref(), all)
                .await
                .context("failed to list directory")?;
            output::print_list(ctx.format, &res.data)?;
        }
        Args::Mkdir { endpoint_id, path } => {
            let ack = transfer
                .mkdir(endpoint_id, &path)
                .await
                .context("failed to make directory")?;
            output::print_outcome(ctx.format, &ack.message, &ack)?;
        }
        Args::Submit(opts) => {
            let doc = opts.document()?;
            let ack = transfer
                .submit(doc)
                .await
                .context("failed to submit transfer")?;
            output::print_record(ctx.format, &ack)?;
        }
        Args::Task(args) => task::run(args, &transfer, ctx).await?,
    }

    Ok(())
}
