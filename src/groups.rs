use crate::{
    http::{Query, ServiceClient},
    output, Context, Service,
};
use anyhow::Context as _;
use clap::Parser;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(clap::ValueEnum, serde::Serialize, serde::Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Manager,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Member => "member",
            Self::Manager => "manager",
            Self::Admin => "admin",
        })
    }
}

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct Membership {
    pub identity_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub role: String,
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl output::Tabular for Membership {
    const COLUMNS: &'static [&'static str] = &["Identity ID", "Username", "Role", "Status"];

    fn row(&self) -> Vec<String> {
        vec![
            self.identity_id.to_string(),
            output::cell(&self.username),
            self.role.clone(),
            self.status.clone(),
        ]
    }
}

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_type: Option<String>,
    /// Only present when listing your own groups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub my_memberships: Vec<Membership>,
    /// Only present when requested with `include=memberships`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memberships: Vec<Membership>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl output::Tabular for Group {
    const COLUMNS: &'static [&'static str] = &["Group ID", "Name", "Type", "Roles"];

    fn row(&self) -> Vec<String> {
        let mut roles: Vec<_> = self.my_memberships.iter().map(|m| m.role.as_str()).collect();
        roles.sort_unstable();
        roles.dedup();

        vec![
            self.id.to_string(),
            self.name.clone(),
            output::cell(&self.group_type),
            roles.join(","),
        ]
    }
}

#[derive(clap::ValueEnum, serde::Serialize, serde::Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Authenticated,
    Private,
}

#[derive(clap::ValueEnum, serde::Serialize, serde::Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MembersVisibility {
    Members,
    Managers,
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct Policies {
    pub is_high_assurance: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_assurance_timeout: Option<u64>,
    pub group_visibility: Visibility,
    pub group_members_visibility: MembersVisibility,
    pub join_requests: bool,
    #[serde(default)]
    pub signup_fields: Vec<String>,
}

impl output::Tabular for Policies {
    const COLUMNS: &'static [&'static str] = &[
        "High Assurance",
        "Authentication Timeout",
        "Visibility",
        "Members Visibility",
        "Join Requests",
        "Signup Fields",
    ];

    fn row(&self) -> Vec<String> {
        vec![
            self.is_high_assurance.to_string(),
            output::cell(&self.authentication_assurance_timeout),
            serialized_name(&self.group_visibility),
            serialized_name(&self.group_members_visibility),
            self.join_requests.to_string(),
            self.signup_fields.join(","),
        ]
    }
}

/// The serialized name of a unit enum variant
fn serialized_name<T: serde::Serialize>(v: &T) -> String {
    match serde_json::to_value(v) {
        Ok(Value::String(s)) => s,
        _ => String::new(),
    }
}

#[derive(serde::Serialize, Debug, PartialEq)]
struct MemberAction {
    identity_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
}

/// The body of the batch membership endpoint
#[derive(serde::Serialize, Default, Debug, PartialEq)]
pub struct BatchRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    add: Vec<MemberAction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    remove: Vec<MemberAction>,
}

impl BatchRequest {
    pub fn add(identity_id: Uuid, role: Role) -> Self {
        Self {
            add: vec![MemberAction {
                identity_id,
                role: Some(role),
            }],
            ..Default::default()
        }
    }

    pub fn remove(identity_id: Uuid) -> Self {
        Self {
            remove: vec![MemberAction {
                identity_id,
                role: None,
            }],
            ..Default::default()
        }
    }
}

#[derive(serde::Deserialize, Debug)]
pub struct BatchError {
    pub code: String,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub identity_id: Option<Uuid>,
}

#[derive(serde::Deserialize, Debug)]
pub struct BatchResponse {
    #[serde(default)]
    pub add: Vec<Membership>,
    #[serde(default)]
    pub remove: Vec<Membership>,
    /// Keyed by action, eg. `add`
    #[serde(default)]
    pub errors: BTreeMap<String, Vec<BatchError>>,
}

impl BatchResponse {
    /// The batch endpoint answers 200 even if an action failed
    pub fn into_result(self) -> anyhow::Result<Vec<Membership>> {
        if let Some((action, err)) = self
            .errors
            .iter()
            .find_map(|(action, errs)| errs.first().map(|e| (action, e)))
        {
            anyhow::bail!(
                "failed to {action} {}: {} {}",
                err.identity_id.map(|i| i.to_string()).unwrap_or_default(),
                err.code,
                err.detail.as_deref().unwrap_or_default(),
            );
        }

        Ok(self.add.into_iter().chain(self.remove).collect())
    }
}

#[derive(serde::Serialize, Debug)]
struct GroupFields<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<Uuid>,
}

/// A typed client for <https://groups.api.globus.org/redoc>
pub struct GroupsClient(pub ServiceClient);

impl GroupsClient {
    pub async fn my_groups(&self) -> anyhow::Result<Vec<Group>> {
        self.0.get("/groups/my_groups", &Query::new()).await
    }

    pub async fn get(&self, id: Uuid, include_memberships: bool) -> anyhow::Result<Group> {
        let mut q = Query::new();
        if include_memberships {
            q.push(("include", "memberships".to_owned()));
        }
        self.0.get(&format!("/groups/{id}"), &q).await
    }

    pub async fn create(
        &self,
        name: &str,
        description: Option<&str>,
        parent_id: Option<Uuid>,
    ) -> anyhow::Result<Group> {
        let fields = GroupFields {
            name,
            description,
            parent_id,
        };
        self.0.post("/groups", &fields).await
    }

    pub async fn update(
        &self,
        id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> anyhow::Result<Group> {
        let fields = GroupFields {
            name,
            description,
            parent_id: None,
        };
        self.0.put(&format!("/groups/{id}"), &fields).await
    }

    pub async fn delete(&self, id: Uuid) -> anyhow::Result<Value> {
        self.0.delete(&format!("/groups/{id}"), &Query::new()).await
    }

    pub async fn batch(&self, id: Uuid, req: &BatchRequest) -> anyhow::Result<BatchResponse> {
        self.0.post(&format!("/groups/{id}"), req).await
    }

    pub async fn policies(&self, id: Uuid) -> anyhow::Result<Policies> {
        self.0
            .get(&format!("/groups/{id}/policies"), &Query::new())
            .await
    }

    pub async fn set_policies(&self, id: Uuid, policies: &Policies) -> anyhow::Result<Policies> {
        self.0.put(&format!("/groups/{id}/policies"), policies).await
    }
}

#[derive(Parser)]
pub struct Create {
    name: String,
    #[arg(long)]
    description: Option<String>,
    /// Makes the new group a subgroup of this one
    #[arg(long)]
    parent_id: Option<Uuid>,
}

#[derive(Parser)]
pub struct Update {
    group_id: Uuid,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Parser)]
pub struct SetPolicies {
    group_id: Uuid,
    /// Who can see the group
    #[arg(long, value_enum)]
    visibility: Option<Visibility>,
    /// Who can see the group's members
    #[arg(long, value_enum)]
    members_visibility: Option<MembersVisibility>,
    /// Whether users may ask to join
    #[arg(long)]
    join_requests: Option<bool>,
    /// A field users fill in when asking to join, can be repeated
    #[arg(long = "signup-field")]
    signup_fields: Vec<String>,
    /// Whether the group requires high assurance sessions
    #[arg(long)]
    high_assurance: Option<bool>,
    /// Seconds a high assurance session stays valid
    #[arg(long)]
    authentication_timeout: Option<u64>,
}

impl SetPolicies {
    fn apply(self, mut current: Policies) -> Policies {
        if let Some(v) = self.visibility {
            current.group_visibility = v;
        }
        if let Some(v) = self.members_visibility {
            current.group_members_visibility = v;
        }
        if let Some(v) = self.join_requests {
            current.join_requests = v;
        }
        if !self.signup_fields.is_empty() {
            current.signup_fields = self.signup_fields;
        }
        if let Some(v) = self.high_assurance {
            current.is_high_assurance = v;
        }
        if let Some(v) = self.authentication_timeout {
            current.authentication_assurance_timeout = Some(v);
        }
        current
    }
}

/// Manage group memberships
#[derive(clap::Subcommand)]
pub enum MemberArgs {
    /// Lists the members of a group
    List {
        group_id: Uuid,
        /// Only list members with this role, can be repeated
        #[arg(long, value_enum)]
        role: Vec<Role>,
    },
    /// Adds an identity to a group
    Add {
        group_id: Uuid,
        identity_id: Uuid,
        #[arg(long, value_enum, default_value_t = Role::Member)]
        role: Role,
    },
    /// Removes an identity from a group
    Remove { group_id: Uuid, identity_id: Uuid },
}

/// Manage groups
#[derive(clap::Subcommand)]
pub enum Args {
    /// Lists the groups you are a member of
    List,
    /// Shows a single group
    Show { group_id: Uuid },
    /// Creates a new group
    Create(Create),
    /// Updates a group's name or description
    Update(Update),
    /// Deletes a group
    Delete { group_id: Uuid },
    #[clap(subcommand)]
    Member(MemberArgs),
    /// Changes a group's policies, unspecified policies are kept
    SetPolicies(SetPolicies),
}

impl crate::ResourceServer for Args {
    fn service(&self) -> Service {
        Service::Groups
    }
}

pub async fn run(args: Args, client: ServiceClient, ctx: &Context) -> anyhow::Result<()> {
    let groups = GroupsClient(client);

    match args {
        Args::List => {
            let list = groups.my_groups().await.context("failed to list groups")?;
            output::print_list(ctx.format, &list)?;
        }
        Args::Show { group_id } => {
            let group = groups
                .get(group_id, false)
                .await
                .context("failed to get group")?;
            output::print_record(ctx.format, &group)?;
        }
        Args::Create(create) => {
            let group = groups
                .create(&create.name, create.description.as_deref(), create.parent_id)
                .await
                .context("failed to create group")?;
            output::print_record(ctx.format, &group)?;
        }
        Args::Update(update) => {
            anyhow::ensure!(
                update.name.is_some() || update.description.is_some(),
                "nothing to update, specify --name or --description"
            );

            // The endpoint replaces the group, so fill in what wasn't given
            let current = groups
                .get(update.group_id, false)
                .await
                .context("failed to get group")?;
            let name = update.name.unwrap_or(current.name);
            let description = update.description.or(current.description);

            let group = groups
                .update(update.group_id, &name, description.as_deref())
                .await
                .context("failed to update group")?;
            output::print_record(ctx.format, &group)?;
        }
        Args::Delete { group_id } => {
            let res = groups
                .delete(group_id)
                .await
                .context("failed to delete group")?;
            output::print_outcome(ctx.format, &format!("deleted group {group_id}"), &res)?;
        }
        Args::Member(MemberArgs::List { group_id, role }) => {
            let group = groups
                .get(group_id, true)
                .await
                .context("failed to get group members")?;

            let members: Vec<_> = group
                .memberships
                .into_iter()
                .filter(|m| role.is_empty() || role.iter().any(|r| r.to_string() == m.role))
                .collect();
            output::print_list(ctx.format, &members)?;
        }
        Args::Member(MemberArgs::Add {
            group_id,
            identity_id,
            role,
        }) => {
            let added = groups
                .batch(group_id, &BatchRequest::add(identity_id, role))
                .await
                .context("failed to add member")?
                .into_result()?;
            output::print_list(ctx.format, &added)?;
        }
        Args::Member(MemberArgs::Remove {
            group_id,
            identity_id,
        }) => {
            let removed = groups
                .batch(group_id, &BatchRequest::remove(identity_id))
                .await
                .context("failed to remove member")?
                .into_result()?;
            output::print_list(ctx.format, &removed)?;
        }
        Args::SetPolicies(set) => {
            let group_id = set.group_id;
            let current = groups
                .policies(group_id)
                .await
                .context("failed to get group policies")?;
            let policies = groups
                .set_policies(group_id, &set.apply(current))
                .await
                .context("failed to set group policies")?;
            output::print_record(ctx.format, &policies)?;
        }
    }

    Ok(())
}
