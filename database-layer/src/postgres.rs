// Postgres-backed CareStore
use async_trait::async_trait;
use audit_engine::{AuditEntry, EntityType, NewAuditEntry};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use sqlx::postgres::{PgQueryResult, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use std::fmt::Display;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;
use workflow_engine::{
    Attachment, Case, CaseWrite, ChangeSet, ClinicalReport, DoctorAction, LabOrder, LabOrderWrite,
    LabReport, LabReportWrite,
};

use crate::connection::DatabasePool;
use crate::error::{DatabaseError, DatabaseResult};
use crate::store::CareStore;

const CASE_COLUMNS: &str = "id, service_type, status, patient_id, nurse_id, doctor_id, \
     is_immediate, scheduled_time, created_at, updated_at";

const LAB_ORDER_COLUMNS: &str = "id, case_id, patient_id, doctor_id, tests, urgency, \
     requires_fasting, collector_id, scheduled_collection_at, status, created_at, updated_at";

const AUDIT_COLUMNS: &str = "sequence, id, actor_id, actor_role, action, entity_type, entity_id, \
     from_state, to_state, metadata, recorded_at";

/// CareStore over the schema in `migrations/`
///
/// Every `commit` runs in one transaction; status updates carry the expected
/// prior status in their `WHERE` clause and create-once inserts rely on the
/// unique constraints, so a lost race surfaces as `Conflict` or `Duplicate`
/// and the whole transaction rolls back.
#[derive(Clone)]
pub struct PostgresCareStore {
    db: DatabasePool,
}

impl PostgresCareStore {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.db
    }

    async fn write_case(tx: &mut Transaction<'_, Postgres>, write: &CaseWrite) -> DatabaseResult<()> {
        match write {
            CaseWrite::Insert(case) => {
                let sql = format!(
                    "INSERT INTO cases ({CASE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                     ON CONFLICT DO NOTHING"
                );
                let result = sqlx::query(&sql)
                    .bind(case.id)
                    .bind(case.service_type.as_str())
                    .bind(case.status.as_str())
                    .bind(case.patient_id)
                    .bind(case.nurse_id)
                    .bind(case.doctor_id)
                    .bind(case.is_immediate)
                    .bind(case.scheduled_time)
                    .bind(case.created_at)
                    .bind(case.updated_at)
                    .execute(&mut **tx)
                    .await?;
                expect_one(&result, "case", case.id)
            }
            CaseWrite::Update { case, expected } => {
                let result = sqlx::query(
                    "UPDATE cases SET status = $2, nurse_id = $3, doctor_id = $4, updated_at = $5 \
                     WHERE id = $1 AND status = $6",
                )
                .bind(case.id)
                .bind(case.status.as_str())
                .bind(case.nurse_id)
                .bind(case.doctor_id)
                .bind(case.updated_at)
                .bind(expected.as_str())
                .execute(&mut **tx)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(stale(tx, "cases", "case", case.id, expected.as_str()).await);
                }
                Ok(())
            }
        }
    }

    async fn write_lab_order(tx: &mut Transaction<'_, Postgres>, write: &LabOrderWrite) -> DatabaseResult<()> {
        match write {
            LabOrderWrite::Insert(order) => {
                let sql = format!(
                    "INSERT INTO lab_orders ({LAB_ORDER_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) ON CONFLICT DO NOTHING"
                );
                let result = sqlx::query(&sql)
                    .bind(order.id)
                    .bind(order.case_id)
                    .bind(order.patient_id)
                    .bind(order.doctor_id)
                    .bind(&order.tests)
                    .bind(to_text(&order.urgency)?)
                    .bind(order.requires_fasting)
                    .bind(order.collector_id)
                    .bind(order.scheduled_collection_at)
                    .bind(order.status.as_str())
                    .bind(order.created_at)
                    .bind(order.updated_at)
                    .execute(&mut **tx)
                    .await?;
                expect_one(&result, "lab_order", order.id)
            }
            LabOrderWrite::Update { order, expected } => {
                let result = sqlx::query(
                    "UPDATE lab_orders SET status = $2, collector_id = $3, scheduled_collection_at = $4, \
                     updated_at = $5 WHERE id = $1 AND status = $6",
                )
                .bind(order.id)
                .bind(order.status.as_str())
                .bind(order.collector_id)
                .bind(order.scheduled_collection_at)
                .bind(order.updated_at)
                .bind(expected.as_str())
                .execute(&mut **tx)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(stale(tx, "lab_orders", "lab_order", order.id, expected.as_str()).await);
                }
                Ok(())
            }
        }
    }

    async fn write_lab_report(tx: &mut Transaction<'_, Postgres>, write: &LabReportWrite) -> DatabaseResult<()> {
        match write {
            LabReportWrite::Insert(report) => {
                let result = sqlx::query(
                    "INSERT INTO lab_reports (id, lab_order_id, artifact_ref, uploaded_by, uploaded_at, \
                     review_notes, reviewed_by, reviewed_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                     ON CONFLICT DO NOTHING",
                )
                .bind(report.id)
                .bind(report.lab_order_id)
                .bind(&report.artifact_ref)
                .bind(report.uploaded_by)
                .bind(report.uploaded_at)
                .bind(&report.review_notes)
                .bind(report.reviewed_by)
                .bind(report.reviewed_at)
                .execute(&mut **tx)
                .await?;
                expect_one(&result, "lab_report", report.lab_order_id)
            }
            LabReportWrite::Update(report) => {
                let result = sqlx::query(
                    "UPDATE lab_reports SET review_notes = $2, reviewed_by = $3, reviewed_at = $4 \
                     WHERE lab_order_id = $1",
                )
                .bind(report.lab_order_id)
                .bind(&report.review_notes)
                .bind(report.reviewed_by)
                .bind(report.reviewed_at)
                .execute(&mut **tx)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(DatabaseError::NotFound {
                        entity: "lab_report",
                        id: report.lab_order_id,
                    });
                }
                Ok(())
            }
        }
    }

    async fn insert_clinical_report(tx: &mut Transaction<'_, Postgres>, report: &ClinicalReport) -> DatabaseResult<()> {
        let result = sqlx::query(
            "INSERT INTO clinical_reports (id, case_id, nurse_id, vitals, triage_severity, attachments, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT DO NOTHING",
        )
        .bind(report.id)
        .bind(report.case_id)
        .bind(report.nurse_id)
        .bind(Json(&report.vitals))
        .bind(to_text(&report.triage_severity)?)
        .bind(Json(&report.attachments))
        .bind(report.created_at)
        .execute(&mut **tx)
        .await?;
        expect_one(&result, "clinical_report", report.case_id)
    }

    async fn insert_doctor_action(tx: &mut Transaction<'_, Postgres>, action: &DoctorAction) -> DatabaseResult<()> {
        let result = sqlx::query(
            "INSERT INTO doctor_actions (id, case_id, doctor_id, diagnosis, notes, referral, lab_tests, \
             follow_up_date, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) ON CONFLICT DO NOTHING",
        )
        .bind(action.id)
        .bind(action.case_id)
        .bind(action.doctor_id)
        .bind(&action.diagnosis)
        .bind(&action.notes)
        .bind(&action.referral)
        .bind(&action.lab_tests)
        .bind(action.follow_up_date)
        .bind(action.created_at)
        .execute(&mut **tx)
        .await?;
        expect_one(&result, "doctor_action", action.case_id)
    }

    async fn append_audit(tx: &mut Transaction<'_, Postgres>, draft: &NewAuditEntry) -> DatabaseResult<i64> {
        let sequence: i64 = sqlx::query_scalar(
            "INSERT INTO audit_log (id, actor_id, actor_role, action, entity_type, entity_id, from_state, \
             to_state, metadata, recorded_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING sequence",
        )
        .bind(draft.id)
        .bind(draft.actor_id)
        .bind(draft.actor_role.as_str())
        .bind(draft.action.as_str())
        .bind(draft.entity_type.as_str())
        .bind(draft.entity_id)
        .bind(&draft.from_state)
        .bind(&draft.to_state)
        .bind(Json(&draft.metadata))
        .bind(draft.timestamp)
        .fetch_one(&mut **tx)
        .await?;
        Ok(sequence)
    }

    async fn audit_where(&self, filter: &str, first: Uuid, entity_type: Option<EntityType>) -> DatabaseResult<Vec<AuditEntry>> {
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_log WHERE {filter} ORDER BY sequence");
        let mut query = sqlx::query(&sql).bind(first);
        if let Some(entity_type) = entity_type {
            query = query.bind(entity_type.as_str());
        }
        let rows = query.fetch_all(self.db.pool()).await?;
        rows.iter().map(audit_from_row).collect()
    }
}

#[async_trait]
impl CareStore for PostgresCareStore {
    async fn get_case(&self, id: Uuid) -> DatabaseResult<Option<Case>> {
        let sql = format!("SELECT {CASE_COLUMNS} FROM cases WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(self.db.pool()).await?;
        row.as_ref().map(case_from_row).transpose()
    }

    async fn get_clinical_report(&self, case_id: Uuid) -> DatabaseResult<Option<ClinicalReport>> {
        let row = sqlx::query(
            "SELECT id, case_id, nurse_id, vitals, triage_severity, attachments, created_at \
             FROM clinical_reports WHERE case_id = $1",
        )
        .bind(case_id)
        .fetch_optional(self.db.pool())
        .await?;
        row.as_ref().map(clinical_report_from_row).transpose()
    }

    async fn get_doctor_action(&self, case_id: Uuid) -> DatabaseResult<Option<DoctorAction>> {
        let row = sqlx::query(
            "SELECT id, case_id, doctor_id, diagnosis, notes, referral, lab_tests, follow_up_date, created_at \
             FROM doctor_actions WHERE case_id = $1",
        )
        .bind(case_id)
        .fetch_optional(self.db.pool())
        .await?;
        row.as_ref().map(doctor_action_from_row).transpose()
    }

    async fn get_lab_order(&self, id: Uuid) -> DatabaseResult<Option<LabOrder>> {
        let sql = format!("SELECT {LAB_ORDER_COLUMNS} FROM lab_orders WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(self.db.pool()).await?;
        row.as_ref().map(lab_order_from_row).transpose()
    }

    async fn lab_orders_for_case(&self, case_id: Uuid) -> DatabaseResult<Vec<LabOrder>> {
        let sql = format!("SELECT {LAB_ORDER_COLUMNS} FROM lab_orders WHERE case_id = $1 ORDER BY created_at");
        let rows = sqlx::query(&sql).bind(case_id).fetch_all(self.db.pool()).await?;
        rows.iter().map(lab_order_from_row).collect()
    }

    async fn get_lab_report(&self, lab_order_id: Uuid) -> DatabaseResult<Option<LabReport>> {
        let row = sqlx::query(
            "SELECT id, lab_order_id, artifact_ref, uploaded_by, uploaded_at, review_notes, reviewed_by, \
             reviewed_at FROM lab_reports WHERE lab_order_id = $1",
        )
        .bind(lab_order_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.map(|row| -> DatabaseResult<LabReport> {
            Ok(LabReport {
                id: row.try_get("id")?,
                lab_order_id: row.try_get("lab_order_id")?,
                artifact_ref: row.try_get("artifact_ref")?,
                uploaded_by: row.try_get("uploaded_by")?,
                uploaded_at: row.try_get("uploaded_at")?,
                review_notes: row.try_get("review_notes")?,
                reviewed_by: row.try_get("reviewed_by")?,
                reviewed_at: row.try_get("reviewed_at")?,
            })
        })
        .transpose()
    }

    async fn commit(&self, changes: ChangeSet) -> DatabaseResult<Vec<AuditEntry>> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Failed to begin transaction: {}", e)))?;

        if let Some(write) = &changes.case {
            Self::write_case(&mut tx, write).await?;
        }
        if let Some(report) = &changes.clinical_report {
            Self::insert_clinical_report(&mut tx, report).await?;
        }
        if let Some(action) = &changes.doctor_action {
            Self::insert_doctor_action(&mut tx, action).await?;
        }
        for write in &changes.lab_orders {
            Self::write_lab_order(&mut tx, write).await?;
        }
        if let Some(write) = &changes.lab_report {
            Self::write_lab_report(&mut tx, write).await?;
        }

        let mut sequences = Vec::with_capacity(changes.audit.len());
        for draft in &changes.audit {
            sequences.push(Self::append_audit(&mut tx, draft).await?);
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Failed to commit transaction: {}", e)))?;
        debug!(audit_records = sequences.len(), "Change set committed");

        Ok(changes
            .audit
            .into_iter()
            .zip(sequences)
            .map(|(draft, sequence)| draft.commit(sequence))
            .collect())
    }

    async fn audit_for_entity(&self, entity_type: EntityType, entity_id: Uuid) -> DatabaseResult<Vec<AuditEntry>> {
        self.audit_where("entity_id = $1 AND entity_type = $2", entity_id, Some(entity_type))
            .await
    }

    async fn audit_for_actor(&self, actor_id: Uuid) -> DatabaseResult<Vec<AuditEntry>> {
        self.audit_where("actor_id = $1", actor_id, None).await
    }

    async fn is_healthy(&self) -> bool {
        self.db.is_healthy().await
    }
}

fn expect_one(result: &PgQueryResult, entity: &'static str, id: Uuid) -> DatabaseResult<()> {
    if result.rows_affected() == 0 {
        return Err(DatabaseError::Duplicate { entity, id });
    }
    Ok(())
}

/// Explain a zero-row optimistic update
async fn stale(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    entity: &'static str,
    id: Uuid,
    expected: &str,
) -> DatabaseError {
    let sql = format!("SELECT status FROM {table} WHERE id = $1");
    match sqlx::query_scalar::<_, String>(&sql).bind(id).fetch_optional(&mut **tx).await {
        Ok(Some(actual)) => DatabaseError::Conflict {
            entity,
            id,
            expected: expected.to_string(),
            actual,
        },
        Ok(None) => DatabaseError::NotFound { entity, id },
        Err(e) => DatabaseError::SqlxError(e),
    }
}

fn to_text<T: Serialize>(value: &T) -> DatabaseResult<String> {
    match serde_json::to_value(value) {
        Ok(Value::String(text)) => Ok(text),
        Ok(other) => Err(DatabaseError::Decode(format!("expected a string enum, got {other}"))),
        Err(e) => Err(DatabaseError::Decode(e.to_string())),
    }
}

fn from_text<T: DeserializeOwned>(text: String) -> DatabaseResult<T> {
    serde_json::from_value(Value::String(text)).map_err(|e| DatabaseError::Decode(e.to_string()))
}

fn parse_column<T>(row: &PgRow, column: &str) -> DatabaseResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    let text: String = row.try_get(column)?;
    text.parse()
        .map_err(|e: T::Err| DatabaseError::Decode(format!("{column}: {e}")))
}

fn case_from_row(row: &PgRow) -> DatabaseResult<Case> {
    Ok(Case {
        id: row.try_get("id")?,
        service_type: parse_column(row, "service_type")?,
        status: parse_column(row, "status")?,
        patient_id: row.try_get("patient_id")?,
        nurse_id: row.try_get("nurse_id")?,
        doctor_id: row.try_get("doctor_id")?,
        is_immediate: row.try_get("is_immediate")?,
        scheduled_time: row.try_get("scheduled_time")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn clinical_report_from_row(row: &PgRow) -> DatabaseResult<ClinicalReport> {
    let Json(vitals): Json<Map<String, Value>> = row.try_get("vitals")?;
    let Json(attachments): Json<Vec<Attachment>> = row.try_get("attachments")?;
    Ok(ClinicalReport {
        id: row.try_get("id")?,
        case_id: row.try_get("case_id")?,
        nurse_id: row.try_get("nurse_id")?,
        vitals,
        triage_severity: from_text(row.try_get("triage_severity")?)?,
        attachments,
        created_at: row.try_get("created_at")?,
    })
}

fn doctor_action_from_row(row: &PgRow) -> DatabaseResult<DoctorAction> {
    let follow_up_date: Option<NaiveDate> = row.try_get("follow_up_date")?;
    Ok(DoctorAction {
        id: row.try_get("id")?,
        case_id: row.try_get("case_id")?,
        doctor_id: row.try_get("doctor_id")?,
        diagnosis: row.try_get("diagnosis")?,
        notes: row.try_get("notes")?,
        referral: row.try_get("referral")?,
        lab_tests: row.try_get("lab_tests")?,
        follow_up_date,
        created_at: row.try_get("created_at")?,
    })
}

fn lab_order_from_row(row: &PgRow) -> DatabaseResult<LabOrder> {
    Ok(LabOrder {
        id: row.try_get("id")?,
        case_id: row.try_get("case_id")?,
        patient_id: row.try_get("patient_id")?,
        doctor_id: row.try_get("doctor_id")?,
        tests: row.try_get("tests")?,
        urgency: from_text(row.try_get("urgency")?)?,
        requires_fasting: row.try_get("requires_fasting")?,
        collector_id: row.try_get("collector_id")?,
        scheduled_collection_at: row.try_get("scheduled_collection_at")?,
        status: parse_column(row, "status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn audit_from_row(row: &PgRow) -> DatabaseResult<AuditEntry> {
    let Json(metadata): Json<Value> = row.try_get("metadata")?;
    let timestamp: DateTime<Utc> = row.try_get("recorded_at")?;
    Ok(AuditEntry {
        sequence: row.try_get("sequence")?,
        id: row.try_get("id")?,
        actor_id: row.try_get("actor_id")?,
        actor_role: parse_column(row, "actor_role")?,
        action: parse_column(row, "action")?,
        entity_type: parse_column(row, "entity_type")?,
        entity_id: row.try_get("entity_id")?,
        from_state: row.try_get("from_state")?,
        to_state: row.try_get("to_state")?,
        metadata,
        timestamp,
    })
}
