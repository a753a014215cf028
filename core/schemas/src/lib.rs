use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// ID Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InsightId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssignmentId(pub i64);

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for InsightId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Entity Kinds
// ============================================================================

/// The record categories that can carry tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "workflow")]
    Workflow,
    #[serde(rename = "execution")]
    Execution,
    #[serde(rename = "insight")]
    Insight,
    #[serde(rename = "model")]
    Model,
}

impl EntityKind {
    /// Label stored in `tag_assignments.target_type`
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Workflow => "workflow",
            EntityKind::Execution => "execution",
            EntityKind::Insight => "insight",
            EntityKind::Model => "model",
        }
    }

    /// Backing table for records of this kind
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Workflow => "workflows",
            EntityKind::Execution => "executions",
            EntityKind::Insight => "insights",
            EntityKind::Model => "models",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Entity Schemas
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub created_at: String, // RFC3339
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub name: String,
    pub created_at: String, // RFC3339
    pub workflow_id: WorkflowId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: ModelId,
    pub name: String,
    pub model_version: String,
    pub created_at: String, // RFC3339
    /// Cleared when the parent execution is deleted
    pub execution_id: Option<ExecutionId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: InsightId,
    pub name: String,
    pub data: Option<String>,
    pub created_at: String, // RFC3339
    pub workflow_id: Option<WorkflowId>,
    pub execution_id: Option<ExecutionId>,
    pub model_id: Option<ModelId>,
}

// ============================================================================
// Tagging Schemas
// ============================================================================

/// A deduplicated (key, value) label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub key: String,
    pub value: String,
    pub created_at: String, // RFC3339
}

/// Link from one tag to a (kind label, id) target.
///
/// `target_type` is kept as the raw label: assignments are not checked
/// against the entity tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagAssignment {
    pub id: AssignmentId,
    pub tag_id: TagId,
    pub target_type: String,
    pub target_id: i64,
}

/// Exact (key, value) pair used to restrict a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFilter {
    pub key: String,
    pub value: String,
}

impl TagFilter {
    /// Filtering is only active when both halves are present and non-empty.
    pub fn from_parts(key: Option<&str>, value: Option<&str>) -> Option<Self> {
        match (key, value) {
            (Some(key), Some(value)) if !key.is_empty() && !value.is_empty() => Some(Self {
                key: key.to_string(),
                value: value.to_string(),
            }),
            _ => None,
        }
    }
}

// ============================================================================
// Mutation Inputs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInput {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionInput {
    pub name: String,
    pub workflow_id: WorkflowId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInput {
    pub name: String,
    pub model_version: String,
    pub execution_id: ExecutionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightInput {
    pub name: String,
    pub data: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<WorkflowId>,
    #[serde(default)]
    pub execution_id: Option<ExecutionId>,
    #[serde(default)]
    pub model_id: Option<ModelId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagInput {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagAssignmentInput {
    pub tag_id: TagId,
    pub target_type: String,
    pub target_id: i64,
}

// ============================================================================
// Operation Requests
// ============================================================================

/// Arguments shared by the tag-filterable list operations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListArgs {
    #[serde(default)]
    pub tag_key: Option<String>,
    #[serde(default)]
    pub tag_value: Option<String>,
}

impl ListArgs {
    pub fn tag_filter(&self) -> Option<TagFilter> {
        TagFilter::from_parts(self.tag_key.as_deref(), self.tag_value.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListModelsArgs {
    #[serde(default)]
    pub tag_key: Option<String>,
    #[serde(default)]
    pub tag_value: Option<String>,
    #[serde(default)]
    pub model_version: Option<String>,
}

impl ListModelsArgs {
    pub fn tag_filter(&self) -> Option<TagFilter> {
        TagFilter::from_parts(self.tag_key.as_deref(), self.tag_value.as_deref())
    }
}

/// Named operations accepted by the catalog surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    // Queries
    GetWorkflow { id: WorkflowId },
    GetExecution { id: ExecutionId },
    GetModel { id: ModelId },
    GetInsight { id: InsightId },
    GetTag { id: TagId },
    ListWorkflows(ListArgs),
    ListExecutions(ListArgs),
    ListInsights(ListArgs),
    ListModels(ListModelsArgs),
    ListTags,
    TagsFor { target_type: String, target_id: i64 },

    // Mutations
    CreateWorkflow { input: WorkflowInput },
    CreateExecution { input: ExecutionInput },
    CreateModel { input: ModelInput },
    CreateInsight { input: InsightInput },
    CreateTag { input: TagInput },
    AssignTag { input: TagAssignmentInput },

    // Administration
    ClearAllData,
    PopulateSampleData,
    DropAllTables,
    CreateAllTables,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::GetWorkflow { .. } => "get_workflow",
            Operation::GetExecution { .. } => "get_execution",
            Operation::GetModel { .. } => "get_model",
            Operation::GetInsight { .. } => "get_insight",
            Operation::GetTag { .. } => "get_tag",
            Operation::ListWorkflows(_) => "list_workflows",
            Operation::ListExecutions(_) => "list_executions",
            Operation::ListInsights(_) => "list_insights",
            Operation::ListModels(_) => "list_models",
            Operation::ListTags => "list_tags",
            Operation::TagsFor { .. } => "tags_for",
            Operation::CreateWorkflow { .. } => "create_workflow",
            Operation::CreateExecution { .. } => "create_execution",
            Operation::CreateModel { .. } => "create_model",
            Operation::CreateInsight { .. } => "create_insight",
            Operation::CreateTag { .. } => "create_tag",
            Operation::AssignTag { .. } => "assign_tag",
            Operation::ClearAllData => "clear_all_data",
            Operation::PopulateSampleData => "populate_sample_data",
            Operation::DropAllTables => "drop_all_tables",
            Operation::CreateAllTables => "create_all_tables",
        }
    }
}

/// Nested set of relationship fields to resolve on a response object.
///
/// `{"executions": {"tags": {}}}` resolves each workflow's executions and
/// the tags of every execution. Scalar attributes are always returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(pub BTreeMap<String, Selection>);

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder helper: select `field` with a nested selection
    pub fn with(mut self, field: &str, nested: Selection) -> Self {
        self.0.insert(field.to_string(), nested);
        self
    }

    /// Builder helper: select `field` with no nested fields
    pub fn field(self, field: &str) -> Self {
        self.with(field, Selection::new())
    }

    /// Top-level selection from a comma separated list (`"executions,tags"`)
    pub fn from_csv(raw: &str) -> Self {
        raw.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .fold(Selection::new(), |sel, name| sel.field(name))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Selection)> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRequest {
    pub operation: Operation,
    #[serde(default)]
    pub select: Selection,
}

/// Ids created by the sample-data seed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedSummary {
    pub workflow_id: WorkflowId,
    pub execution_ids: Vec<ExecutionId>,
    pub insight_id: InsightId,
    pub model_ids: Vec<ModelId>,
    pub tag_id: TagId,
    pub assignments: usize,
}
