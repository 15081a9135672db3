use crate::{
    http::{self, Query, ServiceClient},
    output, Context, Service,
};
use anyhow::Context as _;
use camino::Utf8PathBuf;
use clap::Parser;
use serde_json::{json, Map, Value};
use uuid::Uuid;

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct Index {
    pub id: Uuid,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_subjects: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl output::Tabular for Index {
    const COLUMNS: &'static [&'static str] =
        &["Index ID", "Display Name", "Status", "Subjects", "Created"];

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.display_name.clone(),
            output::cell(&self.status),
            output::cell(&self.num_subjects),
            output::cell(&self.creation_date),
        ]
    }
}

#[derive(serde::Deserialize, Debug)]
pub struct IndexList {
    pub index_list: Vec<Index>,
}

/// All the entries of one subject
#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct GMetaResult {
    pub subject: String,
    #[serde(default)]
    pub entries: Vec<Value>,
}

impl output::Tabular for GMetaResult {
    const COLUMNS: &'static [&'static str] = &["Subject", "Entries"];

    fn row(&self) -> Vec<String> {
        vec![self.subject.clone(), self.entries.len().to_string()]
    }
}

#[derive(serde::Deserialize, serde::Serialize, Debug)]
pub struct SearchResult {
    pub gmeta: Vec<GMetaResult>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug)]
pub struct TaskSubmitted {
    pub task_id: Uuid,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl output::Tabular for TaskSubmitted {
    const COLUMNS: &'static [&'static str] = &["Task ID"];

    fn row(&self) -> Vec<String> {
        vec![self.task_id.to_string()]
    }
}

#[derive(serde::Deserialize, serde::Serialize, Debug)]
pub struct Task {
    pub task_id: Uuid,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl output::Tabular for Task {
    const COLUMNS: &'static [&'static str] =
        &["Task ID", "Type", "State", "Created", "Completed", "Message"];

    fn row(&self) -> Vec<String> {
        vec![
            self.task_id.to_string(),
            output::cell(&self.task_type),
            self.state.clone(),
            output::cell(&self.creation_date),
            output::cell(&self.completion_date),
            output::cell(&self.message),
        ]
    }
}

#[derive(serde::Deserialize, Debug)]
pub struct TaskList {
    pub tasks: Vec<Task>,
}

/// Wraps a document in a GIngest unless it already is one
pub fn ingest_document(doc: Value) -> anyhow::Result<Value> {
    if doc.get("ingest_type").is_some() {
        Ok(doc)
    } else if doc.get("gmeta").map_or(false, Value::is_array) {
        Ok(json!({"ingest_type": "GMetaList", "ingest_data": doc}))
    } else if doc.get("subject").is_some() {
        Ok(json!({"ingest_type": "GMetaEntry", "ingest_data": doc}))
    } else {
        anyhow::bail!("the document is not a GIngest, GMetaList or GMetaEntry")
    }
}

#[derive(Debug, Default)]
pub struct SimpleQuery {
    pub q: String,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub advanced: bool,
}

/// A typed client for <https://docs.globus.org/api/search/>
pub struct SearchClient(pub ServiceClient);

impl SearchClient {
    pub async fn list_indices(&self) -> anyhow::Result<IndexList> {
        self.0.get("/v1/index_list", &Query::new()).await
    }

    pub async fn get_index(&self, id: Uuid) -> anyhow::Result<Index> {
        self.0.get(&format!("/v1/index/{id}"), &Query::new()).await
    }

    pub async fn create_index(
        &self,
        display_name: &str,
        description: &str,
    ) -> anyhow::Result<Index> {
        self.0
            .post(
                "/v1/index",
                &json!({"display_name": display_name, "description": description}),
            )
            .await
    }

    pub async fn delete_index(&self, id: Uuid) -> anyhow::Result<Value> {
        self.0.delete(&format!("/v1/index/{id}"), &Query::new()).await
    }

    pub async fn search(&self, index: Uuid, query: &SimpleQuery) -> anyhow::Result<SearchResult> {
        let mut q = vec![("q", query.q.clone())];
        http::push_opt(&mut q, "limit", query.limit);
        http::push_opt(&mut q, "offset", query.offset);
        if query.advanced {
            q.push(("advanced", "true".to_owned()));
        }
        self.0.get(&format!("/v1/index/{index}/search"), &q).await
    }

    /// Runs a structured query document, eg. one with filters or facets
    pub async fn post_search(&self, index: Uuid, doc: &Value) -> anyhow::Result<SearchResult> {
        self.0.post(&format!("/v1/index/{index}/search"), doc).await
    }

    pub async fn ingest(&self, index: Uuid, doc: &Value) -> anyhow::Result<TaskSubmitted> {
        self.0.post(&format!("/v1/index/{index}/ingest"), doc).await
    }

    pub async fn get_subject(&self, index: Uuid, subject: &str) -> anyhow::Result<GMetaResult> {
        self.0
            .get(
                &format!("/v1/index/{index}/subject"),
                &vec![("subject", subject.to_owned())],
            )
            .await
    }

    pub async fn delete_subject(
        &self,
        index: Uuid,
        subject: &str,
    ) -> anyhow::Result<TaskSubmitted> {
        self.0
            .delete(
                &format!("/v1/index/{index}/subject"),
                &vec![("subject", subject.to_owned())],
            )
            .await
    }

    pub async fn delete_by_query(&self, index: Uuid, doc: &Value) -> anyhow::Result<TaskSubmitted> {
        self.0
            .post(&format!("/v1/index/{index}/delete_by_query"), doc)
            .await
    }

    pub async fn get_task(&self, id: Uuid) -> anyhow::Result<Task> {
        self.0.get(&format!("/v1/task/{id}"), &Query::new()).await
    }

    pub async fn list_tasks(&self, index: Uuid) -> anyhow::Result<TaskList> {
        self.0
            .get(&format!("/v1/task_list/{index}"), &Query::new())
            .await
    }
}

/// Manage search indices
#[derive(clap::Subcommand)]
pub enum IndexArgs {
    /// Lists the indices you have a role on
    List,
    /// Shows a single index
    Show { index_id: Uuid },
    /// Creates a new index
    Create {
        display_name: String,
        description: String,
    },
    /// Marks an index for deletion
    Delete { index_id: Uuid },
}

/// Inspect or delete a single subject's entries
#[derive(clap::Subcommand)]
pub enum SubjectArgs {
    /// Shows all the entries for a subject
    Show { index_id: Uuid, subject: String },
    /// Deletes all the entries for a subject
    Delete { index_id: Uuid, subject: String },
}

/// Inspect the asynchronous tasks of an index
#[derive(clap::Subcommand)]
pub enum TaskArgs {
    /// Shows a single task
    Show { task_id: Uuid },
    /// Lists the most recent tasks of an index
    List { index_id: Uuid },
}

#[derive(clap::Args)]
#[group(required = true, multiple = false)]
pub struct QuerySource {
    /// A query string
    #[arg(short)]
    q: Option<String>,
    /// A JSON or YAML file with a structured query document
    #[arg(long)]
    query_document: Option<Utf8PathBuf>,
}

#[derive(Parser)]
pub struct SearchQuery {
    index_id: Uuid,
    #[clap(flatten)]
    source: QuerySource,
    /// The maximum number of results
    #[arg(long)]
    limit: Option<u32>,
    /// The number of results to skip
    #[arg(long)]
    offset: Option<u32>,
    /// Parses the query string with the advanced syntax
    #[arg(long)]
    advanced: bool,
}

#[derive(Parser)]
pub struct DeleteByQuery {
    index_id: Uuid,
    #[clap(flatten)]
    source: QuerySource,
}

/// Query and manage search indices
#[derive(clap::Subcommand)]
pub enum Args {
    #[clap(subcommand)]
    Index(IndexArgs),
    /// Searches an index
    Query(SearchQuery),
    /// Ingests a GIngest, GMetaList or GMetaEntry document into an index
    Ingest {
        index_id: Uuid,
        /// A JSON or YAML file, `-` for stdin
        document: Utf8PathBuf,
    },
    #[clap(subcommand)]
    Subject(SubjectArgs),
    /// Deletes every entry matching a query
    DeleteByQuery(DeleteByQuery),
    #[clap(subcommand)]
    Task(TaskArgs),
}

impl crate::ResourceServer for Args {
    fn service(&self) -> Service {
        Service::Search
    }
}

fn query_document(source: &QuerySource) -> anyhow::Result<Value> {
    match (&source.q, &source.query_document) {
        (_, Some(path)) => crate::load_document(path).context("failed to read query document"),
        (Some(q), None) => Ok(json!({"q": q})),
        (None, None) => anyhow::bail!("either -q or --query-document is required"),
    }
}

pub async fn run(args: Args, client: ServiceClient, ctx: &Context) -> anyhow::Result<()> {
    let search = SearchClient(client);

    match args {
        Args::Index(IndexArgs::List) => {
            let list = search
                .list_indices()
                .await
                .context("failed to list indices")?;
            output::print_list(ctx.format, &list.index_list)?;
        }
        Args::Index(IndexArgs::Show { index_id }) => {
            let index = search
                .get_index(index_id)
                .await
                .context("failed to get index")?;
            output::print_record(ctx.format, &index)?;
        }
        Args::Index(IndexArgs::Create {
            display_name,
            description,
        }) => {
            let index = search
                .create_index(&display_name, &description)
                .await
                .context("failed to create index")?;
            output::print_record(ctx.format, &index)?;
        }
        Args::Index(IndexArgs::Delete { index_id }) => {
            let res = search
                .delete_index(index_id)
                .await
                .context("failed to delete index")?;
            output::print_outcome(
                ctx.format,
                &format!("index {index_id} is pending deletion"),
                &res,
            )?;
        }
        Args::Query(query) => {
            let res = if query.source.q.is_some() && query.source.query_document.is_none() {
                search
                    .search(
                        query.index_id,
                        &SimpleQuery {
                            q: query.source.q.unwrap_or_default(),
                            limit: query.limit,
                            offset: query.offset,
                            advanced: query.advanced,
                        },
                    )
                    .await
            } else {
                let mut doc = query_document(&query.source)?;
                let obj = doc
                    .as_object_mut()
                    .context("the query document must be a JSON object")?;
                if let Some(limit) = query.limit {
                    obj.insert("limit".to_owned(), limit.into());
                }
                if let Some(offset) = query.offset {
                    obj.insert("offset".to_owned(), offset.into());
                }
                if query.advanced {
                    obj.insert("advanced".to_owned(), true.into());
                }
                search.post_search(query.index_id, &doc).await
            }
            .context("search query failed")?;

            match ctx.format {
                output::Format::Json => output::print_json(&res)?,
                format => {
                    output::print_list(format, &res.gmeta)?;
                    if format == output::Format::Text {
                        println!("\n{} of {} results", res.count, res.total);
                    }
                    if res.has_next_page {
                        output::hint_next_page(format, "--offset", res.offset + res.count);
                    }
                }
            }
        }
        Args::Ingest { index_id, document } => {
            let doc = crate::load_document(&document).context("failed to read ingest document")?;
            let doc = ingest_document(doc)?;
            let task = search
                .ingest(index_id, &doc)
                .await
                .context("failed to ingest document")?;
            output::print_record(ctx.format, &task)?;
        }
        Args::Subject(SubjectArgs::Show { index_id, subject }) => {
            let res = search
                .get_subject(index_id, &subject)
                .await
                .context("failed to get subject")?;
            output::print_json(&res)?;
        }
        Args::Subject(SubjectArgs::Delete { index_id, subject }) => {
            let task = search
                .delete_subject(index_id, &subject)
                .await
                .context("failed to delete subject")?;
            output::print_record(ctx.format, &task)?;
        }
        Args::DeleteByQuery(dbq) => {
            let doc = query_document(&dbq.source)?;
            let task = search
                .delete_by_query(dbq.index_id, &doc)
                .await
                .context("failed to delete by query")?;
            output::print_record(ctx.format, &task)?;
        }
        Args::Task(TaskArgs::Show { task_id }) => {
            let task = search
                .get_task(task_id)
                .await
                .context("failed to get task")?;
            output::print_record(ctx.format, &task)?;
        }
        Args::Task(TaskArgs::List { index_id }) => {
            let list = search
                .list_tasks(index_id)
                .await
                .context("failed to list tasks")?;
            output::print_list(ctx.format, &list.tasks)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wraps_bare_documents_for_ingest() {
        let entry = json!({
            "subject": "https://example.org/a",
            "visible_to": ["public"],
            "content": {},
        });
        assert_eq!(ingest_document(entry.clone()).unwrap()["ingest_type"], "GMetaEntry");

        let list = json!({"gmeta": [entry]});
        let wrapped = ingest_document(list).unwrap();
        assert_eq!(wrapped["ingest_type"], "GMetaList");
        assert_eq!(wrapped["ingest_data"]["gmeta"][0]["subject"], "https://example.org/a");

        let already = json!({"ingest_type": "GMetaEntry", "ingest_data": {}});
        assert_eq!(ingest_document(already.clone()).unwrap(), already);

        assert!(ingest_document(json!({"content": {}})).is_err());
    }
}
