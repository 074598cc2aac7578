//! Interview questions per (discipline, stage, competency).

use crate::core::error::{self, LedgerError};
use crate::core::schemas;
use crate::core::store::{Store, UpsertOutcome};
use crate::core::time::{self, Stamp};
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub discipline: String,
    pub stage: String,
    pub competency: String,
    pub question: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NewQuestion {
    pub discipline: String,
    pub stage: String,
    pub competency: String,
    pub question: String,
}

pub fn initialize_questions_db(conn: &Connection) -> Result<(), LedgerError> {
    conn.execute(schemas::QUESTIONS_DB_SCHEMA, [])?;
    conn.execute(schemas::QUESTIONS_DB_SCHEMA_INDEX_DISCIPLINE, [])?;
    Ok(())
}

fn question_from_row(row: &Row<'_>) -> rusqlite::Result<Question> {
    Ok(Question {
        id: row.get(0)?,
        discipline: row.get(1)?,
        stage: row.get(2)?,
        competency: row.get(3)?,
        question: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Insert unless the exact question already exists for the stage and
/// competency; an existing row is left as is.
pub fn insert_question(
    conn: &Connection,
    q: &NewQuestion,
    ts: &str,
) -> Result<UpsertOutcome, LedgerError> {
    if [&q.discipline, &q.stage, &q.competency, &q.question]
        .iter()
        .any(|v| v.trim().is_empty())
    {
        return Err(LedgerError::ValidationError(
            "question requires discipline, stage, competency and text".to_string(),
        ));
    }
    let n = conn.execute(
        "INSERT INTO questions(id, discipline, stage, competency, question, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(discipline, stage, competency, question) DO NOTHING",
        params![
            time::new_id(),
            q.discipline,
            q.stage,
            q.competency,
            q.question,
            ts
        ],
    )?;
    Ok(if n == 0 {
        UpsertOutcome::Unchanged
    } else {
        UpsertOutcome::Inserted
    })
}

pub fn add_question(
    store: &Store,
    q: &NewQuestion,
    stamp: &Stamp,
) -> Result<UpsertOutcome, LedgerError> {
    store
        .broker()
        .with_tx(&stamp.actor, "questions.add", |conn| {
            insert_question(conn, q, &stamp.at)
        })
}

/// Replace the text of one question. `NotFound` for an unknown id;
/// `ConflictError` when the new text duplicates a sibling question.
pub fn update_question(
    store: &Store,
    id: &str,
    text: &str,
    actor: &str,
) -> Result<Question, LedgerError> {
    if text.trim().is_empty() {
        return Err(LedgerError::ValidationError(
            "question text is required".to_string(),
        ));
    }
    store.broker().with_tx(actor, "questions.update", |conn| {
        let n = conn
            .execute(
                "UPDATE questions SET question = ?1 WHERE id = ?2",
                params![text, id],
            )
            .map_err(|e| error::conflict_on_unique(e, || format!("question '{}'", text)))?;
        if n == 0 {
            return Err(LedgerError::NotFound(format!("question {}", id)));
        }
        Ok(conn.query_row(
            "SELECT id, discipline, stage, competency, question, created_at FROM questions WHERE id = ?1",
            params![id],
            question_from_row,
        )?)
    })
}

pub fn list_questions(
    store: &Store,
    discipline: &str,
    stage: Option<&str>,
    competency: Option<&str>,
) -> Result<Vec<Question>, LedgerError> {
    store.broker().with_conn("ledger", "questions.list", |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, discipline, stage, competency, question, created_at FROM questions
             WHERE discipline = ?1
               AND (?2 IS NULL OR stage = ?2)
               AND (?3 IS NULL OR competency = ?3)
             ORDER BY stage, competency, rowid",
        )?;
        let rows = stmt.query_map(params![discipline, stage, competency], question_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

pub(crate) fn delete_for_discipline(
    conn: &Connection,
    discipline: &str,
) -> Result<usize, LedgerError> {
    Ok(conn.execute(
        "DELETE FROM questions WHERE discipline = ?1",
        params![discipline],
    )?)
}
