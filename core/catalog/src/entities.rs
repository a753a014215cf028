use rusqlite::{params, OptionalExtension, Params, Row, ToSql};
use tracing::{debug, info};
use workflow_catalog_schemas::{
    EntityKind, Execution, ExecutionId, ExecutionInput, Insight, InsightId, InsightInput, Model,
    ModelId, ModelInput, TagFilter, Workflow, WorkflowId, WorkflowInput,
};

use crate::database::{now_timestamp, Database};
use crate::error::Result;

/// A row type stored in one of the entity tables.
///
/// Lets lookups and the tag-filtered listing be written once for every kind:
/// the SQL differs only by table name, column list and kind label.
pub trait Record: Sized {
    const KIND: EntityKind;
    /// Column list matching the positions read by `from_row`
    const COLUMNS: &'static str;

    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

impl Record for Workflow {
    const KIND: EntityKind = EntityKind::Workflow;
    const COLUMNS: &'static str = "id, name, created_at";

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Workflow {
            id: WorkflowId(row.get(0)?),
            name: row.get(1)?,
            created_at: row.get(2)?,
        })
    }
}

impl Record for Execution {
    const KIND: EntityKind = EntityKind::Execution;
    const COLUMNS: &'static str = "id, name, created_at, workflow_id";

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Execution {
            id: ExecutionId(row.get(0)?),
            name: row.get(1)?,
            created_at: row.get(2)?,
            workflow_id: WorkflowId(row.get(3)?),
        })
    }
}

impl Record for Model {
    const KIND: EntityKind = EntityKind::Model;
    const COLUMNS: &'static str = "id, name, model_version, created_at, execution_id";

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Model {
            id: ModelId(row.get(0)?),
            name: row.get(1)?,
            model_version: row.get(2)?,
            created_at: row.get(3)?,
            execution_id: row.get::<_, Option<i64>>(4)?.map(ExecutionId),
        })
    }
}

impl Record for Insight {
    const KIND: EntityKind = EntityKind::Insight;
    const COLUMNS: &'static str =
        "id, name, data, created_at, workflow_id, execution_id, model_id";

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Insight {
            id: InsightId(row.get(0)?),
            name: row.get(1)?,
            data: row.get(2)?,
            created_at: row.get(3)?,
            workflow_id: row.get::<_, Option<i64>>(4)?.map(WorkflowId),
            execution_id: row.get::<_, Option<i64>>(5)?.map(ExecutionId),
            model_id: row.get::<_, Option<i64>>(6)?.map(ModelId),
        })
    }
}

impl Database {
    // ========== GENERIC LOOKUPS ==========

    fn select_one<R: Record, P: Params>(&self, clause: &str, params: P) -> Result<Option<R>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            R::COLUMNS,
            R::KIND.table(),
            clause
        );
        let record = self.conn.query_row(&sql, params, R::from_row).optional()?;
        Ok(record)
    }

    fn select_many<R: Record, P: Params>(&self, clause: &str, params: P) -> Result<Vec<R>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY id",
            R::COLUMNS,
            R::KIND.table(),
            clause
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params, R::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn insert_returning<R: Record, P: Params>(&self, columns: &str, params: P) -> Result<R> {
        let placeholders = (1..=columns.split(',').count())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            R::KIND.table(),
            columns,
            placeholders,
            R::COLUMNS
        );
        let record = self.conn.query_row(&sql, params, R::from_row)?;
        Ok(record)
    }

    /// Fetch a record of any kind by id; `None` when absent
    pub fn get_record<R: Record>(&self, id: i64) -> Result<Option<R>> {
        self.select_one("id = ?1", params![id])
    }

    /// List records of one kind, newest first.
    ///
    /// With a tag filter only records holding at least one assignment to the
    /// exact (key, value) tag are returned, each once. `extra` adds column
    /// equality conditions, ANDed with the tag filter.
    pub fn list_records<R: Record>(
        &self,
        tag: Option<&TagFilter>,
        extra: &[(&str, &dyn ToSql)],
    ) -> Result<Vec<R>> {
        let kind_label = R::KIND.as_str();
        let mut conditions: Vec<String> = Vec::new();
        let mut values: Vec<&dyn ToSql> = Vec::new();

        if let Some(filter) = tag {
            let base = values.len();
            conditions.push(format!(
                "id IN (
                    SELECT ta.target_id FROM tag_assignments ta
                    JOIN tags t ON t.id = ta.tag_id
                    WHERE ta.target_type = ?{} AND t.key = ?{} AND t.value = ?{}
                )",
                base + 1,
                base + 2,
                base + 3
            ));
            values.push(&kind_label);
            values.push(&filter.key);
            values.push(&filter.value);
        }

        for (column, value) in extra {
            values.push(*value);
            conditions.push(format!("{} = ?{}", column, values.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT {} FROM {} {} ORDER BY created_at DESC, id DESC",
            R::COLUMNS,
            R::KIND.table(),
            where_clause
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(values.as_slice(), R::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!(
            "Listed {} {} records (tag filter: {:?})",
            records.len(),
            kind_label,
            tag
        );
        Ok(records)
    }

    // ========== WORKFLOWS ==========

    pub fn create_workflow(&self, input: &WorkflowInput) -> Result<Workflow> {
        let workflow: Workflow =
            self.insert_returning("name, created_at", params![input.name, now_timestamp()])?;

        info!("Created workflow: {} ({})", workflow.name, workflow.id);
        Ok(workflow)
    }

    pub fn get_workflow(&self, id: WorkflowId) -> Result<Option<Workflow>> {
        self.get_record(id.0)
    }

    pub fn list_workflows(&self, tag: Option<&TagFilter>) -> Result<Vec<Workflow>> {
        self.list_records(tag, &[])
    }

    pub fn executions_for_workflow(&self, id: WorkflowId) -> Result<Vec<Execution>> {
        self.select_many("workflow_id = ?1", params![id.0])
    }

    pub fn insights_for_workflow(&self, id: WorkflowId) -> Result<Vec<Insight>> {
        self.select_many("workflow_id = ?1", params![id.0])
    }

    /// Models produced by any execution of the workflow
    pub fn models_for_workflow(&self, id: WorkflowId) -> Result<Vec<Model>> {
        self.select_many(
            "execution_id IN (SELECT id FROM executions WHERE workflow_id = ?1)",
            params![id.0],
        )
    }

    pub fn model_count_for_workflow(&self, id: WorkflowId) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM models
             WHERE execution_id IN (SELECT id FROM executions WHERE workflow_id = ?1)",
            params![id.0],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ========== EXECUTIONS ==========

    /// Fails with a reference error when the workflow does not exist
    pub fn create_execution(&self, input: &ExecutionInput) -> Result<Execution> {
        let execution: Execution = self.insert_returning(
            "name, workflow_id, created_at",
            params![input.name, input.workflow_id.0, now_timestamp()],
        )?;

        info!(
            "Created execution: {} ({}) under workflow {}",
            execution.name, execution.id, execution.workflow_id
        );
        Ok(execution)
    }

    pub fn get_execution(&self, id: ExecutionId) -> Result<Option<Execution>> {
        self.get_record(id.0)
    }

    pub fn list_executions(&self, tag: Option<&TagFilter>) -> Result<Vec<Execution>> {
        self.list_records(tag, &[])
    }

    pub fn models_for_execution(&self, id: ExecutionId) -> Result<Vec<Model>> {
        self.select_many("execution_id = ?1", params![id.0])
    }

    pub fn model_count_for_execution(&self, id: ExecutionId) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM models WHERE execution_id = ?1",
            params![id.0],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn insights_for_execution(&self, id: ExecutionId) -> Result<Vec<Insight>> {
        self.select_many("execution_id = ?1", params![id.0])
    }

    /// Workflow owning the given execution
    pub fn workflow_for_execution(&self, id: ExecutionId) -> Result<Option<Workflow>> {
        self.select_one(
            "id = (SELECT workflow_id FROM executions WHERE id = ?1)",
            params![id.0],
        )
    }

    // ========== MODELS ==========

    pub fn create_model(&self, input: &ModelInput) -> Result<Model> {
        let model: Model = self.insert_returning(
            "name, model_version, execution_id, created_at",
            params![
                input.name,
                input.model_version,
                input.execution_id.0,
                now_timestamp()
            ],
        )?;

        info!(
            "Created model: {} {} ({})",
            model.name, model.model_version, model.id
        );
        Ok(model)
    }

    pub fn get_model(&self, id: ModelId) -> Result<Option<Model>> {
        self.get_record(id.0)
    }

    pub fn list_models(
        &self,
        tag: Option<&TagFilter>,
        model_version: Option<&str>,
    ) -> Result<Vec<Model>> {
        match model_version {
            Some(version) if !version.is_empty() => {
                let version: &dyn ToSql = &version;
                self.list_records(tag, &[("model_version", version)])
            }
            _ => self.list_records(tag, &[]),
        }
    }

    pub fn insights_for_model(&self, id: ModelId) -> Result<Vec<Insight>> {
        self.select_many("model_id = ?1", params![id.0])
    }

    // ========== INSIGHTS ==========

    /// Every parent reference is optional; the ones given must exist
    pub fn create_insight(&self, input: &InsightInput) -> Result<Insight> {
        let insight: Insight = self.insert_returning(
            "name, data, workflow_id, execution_id, model_id, created_at",
            params![
                input.name,
                input.data,
                input.workflow_id.map(|id| id.0),
                input.execution_id.map(|id| id.0),
                input.model_id.map(|id| id.0),
                now_timestamp()
            ],
        )?;

        info!("Created insight: {} ({})", insight.name, insight.id);
        Ok(insight)
    }

    pub fn get_insight(&self, id: InsightId) -> Result<Option<Insight>> {
        self.get_record(id.0)
    }

    pub fn list_insights(&self, tag: Option<&TagFilter>) -> Result<Vec<Insight>> {
        self.list_records(tag, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use tempfile::NamedTempFile;

    fn workflow(db: &Database, name: &str) -> Workflow {
        db.create_workflow(&WorkflowInput { name: name.into() })
            .unwrap()
    }

    fn execution(db: &Database, workflow_id: WorkflowId, name: &str) -> Execution {
        db.create_execution(&ExecutionInput {
            name: name.into(),
            workflow_id,
        })
        .unwrap()
    }

    fn model(db: &Database, execution_id: ExecutionId, version: &str) -> Model {
        db.create_model(&ModelInput {
            name: "TinyModel".into(),
            model_version: version.into(),
            execution_id,
        })
        .unwrap()
    }

    #[test]
    fn test_workflow_create_and_get() {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::new(temp.path()).unwrap();

        let created = workflow(&db, "Nightly");
        assert_eq!(created.name, "Nightly");
        assert!(!created.created_at.is_empty());

        let fetched = db.get_workflow(created.id).unwrap();
        assert_eq!(fetched, Some(created));
        assert!(db.get_workflow(WorkflowId(999)).unwrap().is_none());
    }

    #[test]
    fn test_lists_are_newest_first() {
        let db = Database::open_in_memory().unwrap();

        let first = workflow(&db, "first");
        let second = workflow(&db, "second");
        let third = workflow(&db, "third");

        let listed: Vec<_> = db
            .list_workflows(None)
            .unwrap()
            .into_iter()
            .map(|w| w.id)
            .collect();
        assert_eq!(listed, vec![third.id, second.id, first.id]);
    }

    #[test]
    fn test_execution_requires_existing_workflow() {
        let db = Database::open_in_memory().unwrap();

        let err = db
            .create_execution(&ExecutionInput {
                name: "orphan".into(),
                workflow_id: WorkflowId(42),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Reference(_)));
        assert_eq!(db.count_rows("executions").unwrap(), 0);
    }

    #[test]
    fn test_parent_and_child_lookups() {
        let db = Database::open_in_memory().unwrap();

        let wf = workflow(&db, "W");
        let other = workflow(&db, "other");
        let run1 = execution(&db, wf.id, "Run 1");
        let run2 = execution(&db, wf.id, "Run 2");
        execution(&db, other.id, "elsewhere");

        let m1 = model(&db, run1.id, "v1");
        let m2 = model(&db, run2.id, "v2");

        let executions = db.executions_for_workflow(wf.id).unwrap();
        assert_eq!(
            executions.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![run1.id, run2.id]
        );

        let models = db.models_for_workflow(wf.id).unwrap();
        assert_eq!(
            models.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![m1.id, m2.id]
        );
        assert_eq!(db.model_count_for_workflow(wf.id).unwrap(), 2);
        assert_eq!(db.model_count_for_workflow(other.id).unwrap(), 0);

        assert_eq!(db.models_for_execution(run1.id).unwrap(), vec![m1.clone()]);
        assert_eq!(db.model_count_for_execution(run2.id).unwrap(), 1);

        let owner = db.workflow_for_execution(run2.id).unwrap().unwrap();
        assert_eq!(owner.id, wf.id);
        assert!(db.workflow_for_execution(ExecutionId(999)).unwrap().is_none());
    }

    #[test]
    fn test_insight_optional_parents() {
        let db = Database::open_in_memory().unwrap();

        let wf = workflow(&db, "W");
        let run = execution(&db, wf.id, "Run");
        let m = model(&db, run.id, "v1");

        let detached = db
            .create_insight(&InsightInput {
                name: "loose".into(),
                data: None,
                workflow_id: None,
                execution_id: None,
                model_id: None,
            })
            .unwrap();
        assert!(detached.workflow_id.is_none());

        let attached = db
            .create_insight(&InsightInput {
                name: "QA".into(),
                data: Some("Looks good".into()),
                workflow_id: Some(wf.id),
                execution_id: Some(run.id),
                model_id: Some(m.id),
            })
            .unwrap();

        assert_eq!(db.insights_for_workflow(wf.id).unwrap(), vec![attached.clone()]);
        assert_eq!(db.insights_for_execution(run.id).unwrap(), vec![attached.clone()]);
        assert_eq!(db.insights_for_model(m.id).unwrap(), vec![attached]);

        let err = db
            .create_insight(&InsightInput {
                name: "dangling".into(),
                data: None,
                workflow_id: None,
                execution_id: None,
                model_id: Some(ModelId(999)),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Reference(_)));
    }

    #[test]
    fn test_list_models_by_version() {
        let db = Database::open_in_memory().unwrap();

        let wf = workflow(&db, "W");
        let run = execution(&db, wf.id, "Run");
        let old = model(&db, run.id, "v1.2");
        model(&db, run.id, "v2.2");

        let matched = db.list_models(None, Some("v1.2")).unwrap();
        assert_eq!(matched, vec![old]);
        assert_eq!(db.list_models(None, Some("")).unwrap().len(), 2);
        assert_eq!(db.list_models(None, None).unwrap().len(), 2);
    }
}
