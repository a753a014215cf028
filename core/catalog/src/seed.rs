use tracing::info;
use workflow_catalog_schemas::{
    EntityKind, ExecutionInput, InsightInput, ModelInput, SeedSummary, WorkflowInput,
};

use crate::database::Database;
use crate::error::Result;

/// Insert the fixed sample data set.
///
/// Runs as independent statements: a failure partway through leaves the
/// earlier rows in place.
pub fn populate_sample_data(db: &Database) -> Result<SeedSummary> {
    let workflow = db.create_workflow(&WorkflowInput {
        name: "Boring WF".to_string(),
    })?;

    let run1 = db.create_execution(&ExecutionInput {
        name: "Run 1".to_string(),
        workflow_id: workflow.id,
    })?;
    let run2 = db.create_execution(&ExecutionInput {
        name: "Run 2".to_string(),
        workflow_id: workflow.id,
    })?;

    let insight = db.create_insight(&InsightInput {
        name: "QA".to_string(),
        data: Some("Looks good".to_string()),
        workflow_id: None,
        execution_id: Some(run1.id),
        model_id: None,
    })?;

    let model1 = db.create_model(&ModelInput {
        name: "TinyModel".to_string(),
        model_version: "v1.2".to_string(),
        execution_id: run1.id,
    })?;
    let model2 = db.create_model(&ModelInput {
        name: "TinyModel".to_string(),
        model_version: "v2.2".to_string(),
        execution_id: run1.id,
    })?;

    let tag = db.ensure_tag("modelType", "BAM")?;

    let targets = [
        (EntityKind::Workflow, workflow.id.0),
        (EntityKind::Execution, run1.id.0),
        (EntityKind::Execution, run2.id.0),
        (EntityKind::Insight, insight.id.0),
        (EntityKind::Model, model1.id.0),
        (EntityKind::Model, model2.id.0),
    ];
    for (kind, target_id) in targets {
        db.assign_tag(tag.id, kind.as_str(), target_id)?;
    }

    info!(
        "Populated sample data: workflow {}, {} tag assignments",
        workflow.id,
        targets.len()
    );

    Ok(SeedSummary {
        workflow_id: workflow.id,
        execution_ids: vec![run1.id, run2.id],
        insight_id: insight.id,
        model_ids: vec![model1.id, model2.id],
        tag_id: tag.id,
        assignments: targets.len(),
    })
}
