//! Named-operation dispatcher.
//!
//! Each response object is serialized from its record, then every field in
//! the request's [`Selection`] is resolved on demand through the type's
//! resolver. Relationships that are not selected are never queried.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error};
use workflow_catalog_schemas::{
    EntityKind, Execution, Insight, Model, Operation, OperationRequest, Selection, Tag, Workflow,
};

use crate::database::Database;
use crate::error::OperationError;
use crate::seed::populate_sample_data;

type Resolved = Result<Value, OperationError>;

/// A response type with lazily resolved relationship fields
trait Resolve: Serialize {
    const TYPE_NAME: &'static str;

    fn resolve_field(&self, db: &Database, field: &str, nested: &Selection) -> Resolved;
}

fn unknown_field(type_name: &str, field: &str) -> OperationError {
    OperationError::InvalidRequest(format!("unknown field '{}' on {}", field, type_name))
}

fn render<T: Resolve>(db: &Database, item: &T, selection: &Selection) -> Resolved {
    let mut value = serde_json::to_value(item)?;
    if let Value::Object(fields) = &mut value {
        for (field, nested) in selection.iter() {
            // Scalars are always present; selecting one is a no-op
            if fields.contains_key(field) && nested.is_empty() {
                continue;
            }
            let resolved = item.resolve_field(db, field, nested)?;
            fields.insert(field.clone(), resolved);
        }
    }
    Ok(value)
}

fn render_list<T: Resolve>(db: &Database, items: &[T], selection: &Selection) -> Resolved {
    let rendered = items
        .iter()
        .map(|item| render(db, item, selection))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(rendered))
}

fn render_opt<T: Resolve>(db: &Database, item: Option<T>, selection: &Selection) -> Resolved {
    match item {
        Some(item) => render(db, &item, selection),
        None => Ok(Value::Null),
    }
}

/// Results of these operations have no relationship fields to select
fn reject_selection(type_name: &str, selection: &Selection) -> Result<(), OperationError> {
    match selection.iter().next() {
        Some((field, _)) => Err(unknown_field(type_name, field)),
        None => Ok(()),
    }
}

fn tags_of(db: &Database, kind: EntityKind, id: i64, nested: &Selection) -> Resolved {
    let tags = db.tags_for(kind.as_str(), id)?;
    render_list(db, &tags, nested)
}

impl Resolve for Workflow {
    const TYPE_NAME: &'static str = "Workflow";

    fn resolve_field(&self, db: &Database, field: &str, nested: &Selection) -> Resolved {
        match field {
            "executions" => render_list(db, &db.executions_for_workflow(self.id)?, nested),
            "insights" => render_list(db, &db.insights_for_workflow(self.id)?, nested),
            "models" => render_list(db, &db.models_for_workflow(self.id)?, nested),
            "model_count" => Ok(json!(db.model_count_for_workflow(self.id)?)),
            "tags" => tags_of(db, EntityKind::Workflow, self.id.0, nested),
            _ => Err(unknown_field(Self::TYPE_NAME, field)),
        }
    }
}

impl Resolve for Execution {
    const TYPE_NAME: &'static str = "Execution";

    fn resolve_field(&self, db: &Database, field: &str, nested: &Selection) -> Resolved {
        match field {
            "workflow" => render_opt(db, db.get_workflow(self.workflow_id)?, nested),
            "insights" => render_list(db, &db.insights_for_execution(self.id)?, nested),
            "models" => render_list(db, &db.models_for_execution(self.id)?, nested),
            "model_count" => Ok(json!(db.model_count_for_execution(self.id)?)),
            "tags" => tags_of(db, EntityKind::Execution, self.id.0, nested),
            _ => Err(unknown_field(Self::TYPE_NAME, field)),
        }
    }
}

impl Resolve for Model {
    const TYPE_NAME: &'static str = "Model";

    fn resolve_field(&self, db: &Database, field: &str, nested: &Selection) -> Resolved {
        match field {
            "execution" => {
                let execution = match self.execution_id {
                    Some(id) => db.get_execution(id)?,
                    None => None,
                };
                render_opt(db, execution, nested)
            }
            "workflow" => {
                let workflow = match self.execution_id {
                    Some(id) => db.workflow_for_execution(id)?,
                    None => None,
                };
                render_opt(db, workflow, nested)
            }
            "insights" => render_list(db, &db.insights_for_model(self.id)?, nested),
            "tags" => tags_of(db, EntityKind::Model, self.id.0, nested),
            _ => Err(unknown_field(Self::TYPE_NAME, field)),
        }
    }
}

impl Resolve for Insight {
    const TYPE_NAME: &'static str = "Insight";

    fn resolve_field(&self, db: &Database, field: &str, nested: &Selection) -> Resolved {
        match field {
            "workflow" => {
                let workflow = match self.workflow_id {
                    Some(id) => db.get_workflow(id)?,
                    None => None,
                };
                render_opt(db, workflow, nested)
            }
            "execution" => {
                let execution = match self.execution_id {
                    Some(id) => db.get_execution(id)?,
                    None => None,
                };
                render_opt(db, execution, nested)
            }
            "model" => {
                let model = match self.model_id {
                    Some(id) => db.get_model(id)?,
                    None => None,
                };
                render_opt(db, model, nested)
            }
            "tags" => tags_of(db, EntityKind::Insight, self.id.0, nested),
            _ => Err(unknown_field(Self::TYPE_NAME, field)),
        }
    }
}

impl Resolve for Tag {
    const TYPE_NAME: &'static str = "Tag";

    fn resolve_field(&self, _db: &Database, field: &str, _nested: &Selection) -> Resolved {
        Err(unknown_field(Self::TYPE_NAME, field))
    }
}

/// Run one operation against the store and serialize its result.
///
/// Storage errors are passed through unchanged; the caller decides how to
/// present them.
pub fn execute(db: &Database, request: &OperationRequest) -> Resolved {
    let op = &request.operation;
    debug!("Executing operation: {}", op.name());

    let result = dispatch(db, op, &request.select);
    if let Err(e) = &result {
        error!("Operation {} failed: {}", op.name(), e);
    }
    result
}

fn dispatch(db: &Database, op: &Operation, select: &Selection) -> Resolved {
    match op {
        Operation::GetWorkflow { id } => render_opt(db, db.get_workflow(*id)?, select),
        Operation::GetExecution { id } => render_opt(db, db.get_execution(*id)?, select),
        Operation::GetModel { id } => render_opt(db, db.get_model(*id)?, select),
        Operation::GetInsight { id } => render_opt(db, db.get_insight(*id)?, select),
        Operation::GetTag { id } => render_opt(db, db.get_tag(*id)?, select),

        Operation::ListWorkflows(args) => {
            render_list(db, &db.list_workflows(args.tag_filter().as_ref())?, select)
        }
        Operation::ListExecutions(args) => {
            render_list(db, &db.list_executions(args.tag_filter().as_ref())?, select)
        }
        Operation::ListInsights(args) => {
            render_list(db, &db.list_insights(args.tag_filter().as_ref())?, select)
        }
        Operation::ListModels(args) => {
            let models = db.list_models(
                args.tag_filter().as_ref(),
                args.model_version.as_deref(),
            )?;
            render_list(db, &models, select)
        }
        Operation::ListTags => render_list(db, &db.list_tags()?, select),
        Operation::TagsFor {
            target_type,
            target_id,
        } => render_list(db, &db.tags_for(target_type, *target_id)?, select),

        Operation::CreateWorkflow { input } => render(db, &db.create_workflow(input)?, select),
        Operation::CreateExecution { input } => {
            render(db, &db.create_execution(input)?, select)
        }
        Operation::CreateModel { input } => render(db, &db.create_model(input)?, select),
        Operation::CreateInsight { input } => render(db, &db.create_insight(input)?, select),
        Operation::CreateTag { input } => {
            render(db, &db.ensure_tag(&input.key, &input.value)?, select)
        }
        Operation::AssignTag { input } => {
            reject_selection("TagAssignment", select)?;
            let assignment = db.assign_tag(input.tag_id, &input.target_type, input.target_id)?;
            Ok(serde_json::to_value(assignment)?)
        }

        Operation::ClearAllData => {
            reject_selection("Boolean", select)?;
            db.clear_all_data()?;
            Ok(Value::Bool(true))
        }
        Operation::PopulateSampleData => {
            reject_selection("SeedSummary", select)?;
            Ok(serde_json::to_value(populate_sample_data(db)?)?)
        }
        Operation::DropAllTables => {
            reject_selection("Boolean", select)?;
            db.drop_all_tables()?;
            Ok(Value::Bool(true))
        }
        Operation::CreateAllTables => {
            reject_selection("Boolean", select)?;
            db.create_all_tables()?;
            Ok(Value::Bool(true))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;
    use workflow_catalog_schemas::{ExecutionInput, TagAssignmentInput, TagId, WorkflowInput};

    fn request(operation: Operation, select: Selection) -> OperationRequest {
        OperationRequest { operation, select }
    }

    #[test]
    fn test_unselected_relationships_are_absent() {
        let db = Database::open_in_memory().unwrap();
        let wf = db
            .create_workflow(&WorkflowInput { name: "W".into() })
            .unwrap();

        let value = execute(
            &db,
            &request(Operation::GetWorkflow { id: wf.id }, Selection::new()),
        )
        .unwrap();

        assert_eq!(value["name"], "W");
        assert!(value.get("executions").is_none());
        assert!(value.get("tags").is_none());
    }

    #[test]
    fn test_nested_selection() {
        let db = Database::open_in_memory().unwrap();
        let wf = db
            .create_workflow(&WorkflowInput { name: "W".into() })
            .unwrap();
        let run = db
            .create_execution(&ExecutionInput {
                name: "E".into(),
                workflow_id: wf.id,
            })
            .unwrap();
        let tag = db.ensure_tag("env", "prod").unwrap();
        db.assign_tag(tag.id, "execution", run.id.0).unwrap();

        let select = Selection::new()
            .with("executions", Selection::new().field("tags").field("workflow"))
            .field("model_count");
        let value = execute(&db, &request(Operation::GetWorkflow { id: wf.id }, select)).unwrap();

        assert_eq!(value["model_count"], 0);
        let executions = value["executions"].as_array().unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0]["tags"][0]["key"], "env");
        assert_eq!(executions[0]["workflow"]["id"], wf.id.0);
    }

    #[test]
    fn test_unknown_field_is_invalid_request() {
        let db = Database::open_in_memory().unwrap();
        let tag = db.ensure_tag("env", "prod").unwrap();

        let err = execute(
            &db,
            &request(Operation::GetTag { id: tag.id }, Selection::new().field("targets")),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }

    #[test]
    fn test_selecting_scalar_is_allowed() {
        let db = Database::open_in_memory().unwrap();
        let tag = db.ensure_tag("env", "prod").unwrap();

        let value = execute(
            &db,
            &request(Operation::GetTag { id: tag.id }, Selection::new().field("key")),
        )
        .unwrap();
        assert_eq!(value["key"], "env");
    }

    #[test]
    fn test_missing_record_is_null() {
        let db = Database::open_in_memory().unwrap();
        let value = execute(
            &db,
            &request(
                Operation::GetModel {
                    id: workflow_catalog_schemas::ModelId(5),
                },
                Selection::new().field("tags"),
            ),
        )
        .unwrap();
        assert!(value.is_null());
    }

    #[test]
    #[traced_test]
    fn test_store_failures_are_logged() {
        let db = Database::open_in_memory().unwrap();
        let assign = Operation::AssignTag {
            input: TagAssignmentInput {
                tag_id: TagId(77),
                target_type: "workflow".into(),
                target_id: 1,
            },
        };

        let err = execute(&db, &request(assign, Selection::new())).unwrap_err();
        assert_eq!(err.kind(), "reference");
        assert!(logs_contain("Operation assign_tag failed"));
        assert!(logs_contain("tag 77 does not exist"));
    }

    #[test]
    fn test_selection_on_fieldless_results_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let tag = db.ensure_tag("env", "prod").unwrap();

        let assign = Operation::AssignTag {
            input: TagAssignmentInput {
                tag_id: tag.id,
                target_type: "workflow".into(),
                target_id: 1,
            },
        };
        let err = execute(&db, &request(assign, Selection::new().field("owners"))).unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
        assert_eq!(db.count_rows("tag_assignments").unwrap(), 0);

        let err = execute(
            &db,
            &request(Operation::ClearAllData, Selection::new().field("tags")),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
        assert_eq!(db.count_rows("tags").unwrap(), 1);
    }
}
