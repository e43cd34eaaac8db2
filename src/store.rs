use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::core::{
    AutoSource, Budget, BudgetBreakdown, Category, ContributionSchedule, Frequency, MonthKey,
    PlanEntry, SourceKind, SourceStatus, SourceType,
};

/// Which optional budget columns the underlying database actually has.
///
/// Resolved once when the store opens, by probing `PRAGMA table_info`; every
/// write payload is built against this descriptor, so a legacy database
/// missing the newer columns keeps working without any error-driven retry.
#[derive(Copy, Clone, Debug)]
pub struct Capabilities {
    pub source_type: bool,
    pub is_projected: bool,
    pub metadata: bool,
}

impl Capabilities {
    fn probe(conn: &Connection) -> rusqlite::Result<Self> {
        Ok(Self {
            source_type: table_has_column(conn, "budgets", "source_type")?,
            is_projected: table_has_column(conn, "budgets", "is_projected")?,
            metadata: table_has_column(conn, "budgets", "metadata")?,
        })
    }
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// How a budget batch lands in storage.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WriteMode {
    /// Last writer wins on the (owner, category, year, month) key.
    Upsert,
    /// Atomic insert-if-absent: a conflicting row is left untouched and
    /// reported back, never treated as an error.
    InsertIfAbsent,
}

/// Outcome of one batched write.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BatchWrite {
    pub written: usize,
    /// Rows that lost an insert-if-absent conflict (someone got there first).
    pub conflicted: usize,
}

/// A budget row about to be written; identity comes from the natural key.
#[derive(Clone, Debug)]
pub struct BudgetWrite {
    pub owner_id: i64,
    pub category_id: i64,
    pub month: MonthKey,
    pub amount_planned_cents: i64,
    pub minimum_amount_planned_cents: i64,
    pub auto_contributions_cents: i64,
    pub source_type: Option<SourceType>,
    pub is_auto_generated: bool,
    pub is_projected: bool,
    pub breakdown: Option<BudgetBreakdown>,
}

pub struct Store {
    conn: Connection,
    caps: Capabilities,
}

impl Store {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wraps an existing connection: ensures the schema, then resolves the
    /// capability descriptor against whatever columns are really there.
    pub fn from_connection(conn: Connection) -> rusqlite::Result<Self> {
        init_schema(&conn)?;
        let caps = Capabilities::probe(&conn)?;
        Ok(Self { conn, caps })
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    // ---- budgets ----

    pub fn get_budget(&self, id: i64) -> rusqlite::Result<Option<Budget>> {
        let sql = format!("SELECT {} FROM budgets WHERE id = ?1", self.budget_columns());
        self.conn
            .query_row(&sql, params![id], |row| budget_from_row(self.caps, row))
            .optional()
    }

    pub fn find_budget(
        &self,
        owner_id: i64,
        category_id: i64,
        month: MonthKey,
    ) -> rusqlite::Result<Option<Budget>> {
        let sql = format!(
            "SELECT {} FROM budgets WHERE owner_id = ?1 AND category_id = ?2 AND year = ?3 AND month = ?4",
            self.budget_columns()
        );
        self.conn
            .query_row(
                &sql,
                params![owner_id, category_id, month.year, month.month],
                |row| budget_from_row(self.caps, row),
            )
            .optional()
    }

    pub fn budgets_for_month(&self, owner_id: i64, month: MonthKey) -> rusqlite::Result<Vec<Budget>> {
        let sql = format!(
            "SELECT {} FROM budgets WHERE owner_id = ?1 AND year = ?2 AND month = ?3 ORDER BY category_id",
            self.budget_columns()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner_id, month.year, month.month], |row| {
            budget_from_row(self.caps, row)
        })?;
        rows.collect()
    }

    /// Which of the target months already have a row for this category,
    /// looked up in one query batched over the distinct years touched.
    pub fn existing_months(
        &self,
        owner_id: i64,
        category_id: i64,
        targets: &[MonthKey],
    ) -> rusqlite::Result<HashSet<MonthKey>> {
        if targets.is_empty() {
            return Ok(HashSet::new());
        }
        let mut years: Vec<i64> = targets.iter().map(|m| m.year as i64).collect();
        years.sort_unstable();
        years.dedup();

        let placeholders = vec!["?"; years.len()].join(", ");
        let sql = format!(
            "SELECT year, month FROM budgets WHERE owner_id = ? AND category_id = ? AND year IN ({placeholders})"
        );
        let mut values = vec![Value::Integer(owner_id), Value::Integer(category_id)];
        values.extend(years.into_iter().map(Value::Integer));

        let wanted: HashSet<MonthKey> = targets.iter().copied().collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| {
            Ok(MonthKey {
                year: row.get::<_, i64>(0)? as i32,
                month: row.get::<_, i64>(1)? as u32,
            })
        })?;

        let mut existing = HashSet::new();
        for month in rows {
            let month = month?;
            if wanted.contains(&month) {
                existing.insert(month);
            }
        }
        Ok(existing)
    }

    /// Most recent planned amount for a category, by calendar month.
    pub fn latest_planned_amount(
        &self,
        owner_id: i64,
        category_id: i64,
    ) -> rusqlite::Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT amount_planned_cents FROM budgets
                 WHERE owner_id = ?1 AND category_id = ?2
                 ORDER BY year DESC, month DESC LIMIT 1",
                params![owner_id, category_id],
                |row| row.get(0),
            )
            .optional()
    }

    /// Persists a batch of budget rows in a single transaction.
    pub fn write_budgets(
        &mut self,
        rows: &[BudgetWrite],
        mode: WriteMode,
    ) -> rusqlite::Result<BatchWrite> {
        if rows.is_empty() {
            return Ok(BatchWrite::default());
        }
        let sql = self.write_sql(mode);
        let caps = self.caps;
        let now = Utc::now().timestamp_millis();

        let tx = self.conn.transaction()?;
        let mut result = BatchWrite::default();
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                let affected = stmt.execute(params_from_iter(write_values(caps, row, now)))?;
                if affected == 0 {
                    result.conflicted += 1;
                } else {
                    result.written += 1;
                }
            }
        }
        tx.commit()?;
        Ok(result)
    }

    /// Writes an edited budget row back, honoring the capability descriptor.
    pub fn update_budget(&mut self, budget: &Budget) -> rusqlite::Result<bool> {
        let mut sets = vec![
            "amount_planned_cents = ?",
            "minimum_amount_planned_cents = ?",
            "auto_contributions_cents = ?",
            "amount_actual_cents = ?",
            "is_auto_generated = ?",
        ];
        let mut values = vec![
            Value::Integer(budget.amount_planned_cents),
            Value::Integer(budget.minimum_amount_planned_cents),
            Value::Integer(budget.auto_contributions_cents),
            Value::Integer(budget.amount_actual_cents),
            Value::Integer(budget.is_auto_generated as i64),
        ];
        if self.caps.source_type {
            sets.push("source_type = ?");
            values.push(text_or_null(budget.source_type.map(SourceType::as_str)));
        }
        if self.caps.is_projected {
            sets.push("is_projected = ?");
            values.push(Value::Integer(budget.is_projected as i64));
        }
        if self.caps.metadata {
            sets.push("metadata = ?");
            values.push(metadata_value(budget.breakdown.as_ref()));
        }
        sets.push("updated_ts_utc = ?");
        values.push(Value::Integer(Utc::now().timestamp_millis()));
        values.push(Value::Integer(budget.id));

        let sql = format!("UPDATE budgets SET {} WHERE id = ?", sets.join(", "));
        let affected = self.conn.execute(&sql, params_from_iter(values))?;
        Ok(affected > 0)
    }

    pub fn delete_budget(&mut self, id: i64) -> rusqlite::Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM budgets WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    // ---- categories ----

    pub fn insert_category(
        &mut self,
        owner_id: i64,
        name: &str,
        source_type: Option<SourceType>,
    ) -> rusqlite::Result<Category> {
        self.conn.execute(
            "INSERT INTO categories (owner_id, name, source_type) VALUES (?1, ?2, ?3)",
            params![owner_id, name, source_type.map(SourceType::as_str)],
        )?;
        Ok(Category {
            id: self.conn.last_insert_rowid(),
            owner_id,
            name: name.to_string(),
            source_type,
        })
    }

    pub fn get_category(&self, id: i64) -> rusqlite::Result<Option<Category>> {
        self.conn
            .query_row(
                "SELECT id, owner_id, name, source_type FROM categories WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Category {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        name: row.get(2)?,
                        source_type: row
                            .get::<_, Option<String>>(3)?
                            .as_deref()
                            .and_then(SourceType::parse),
                    })
                },
            )
            .optional()
    }

    // ---- automatic sources (recorded by the goal/debt subsystems) ----

    pub fn insert_auto_source(&mut self, source: &AutoSource) -> rusqlite::Result<i64> {
        let (frequency, installment_count) = match source.schedule.frequency {
            Frequency::Monthly => ("monthly", None),
            Frequency::Biweekly => ("biweekly", None),
            Frequency::Installments(count) => ("installments", Some(count as i64)),
        };
        let plan_entries = source
            .schedule
            .plan_entries
            .as_ref()
            .and_then(|entries| serde_json::to_string(entries).ok());

        self.conn.execute(
            "INSERT INTO auto_sources (
                owner_id, category_id, kind, label, status, include_in_plan, is_negotiated,
                frequency, amount_cents, start_year, start_month, end_year, end_month,
                installment_count, plan_entries
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                source.owner_id,
                source.category_id,
                source.kind.as_str(),
                source.label,
                source.status.as_str(),
                source.include_in_plan,
                source.is_negotiated,
                frequency,
                source.schedule.amount_cents,
                source.schedule.start.year,
                source.schedule.start.month,
                source.schedule.end.map(|m| m.year),
                source.schedule.end.map(|m| m.month),
                installment_count,
                plan_entries,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn auto_sources_for_category(
        &self,
        owner_id: i64,
        category_id: i64,
    ) -> rusqlite::Result<Vec<AutoSource>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, owner_id, category_id, kind, label, status, include_in_plan,
                    is_negotiated, frequency, amount_cents, start_year, start_month,
                    end_year, end_month, installment_count, plan_entries
             FROM auto_sources WHERE owner_id = ?1 AND category_id = ?2 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![owner_id, category_id], auto_source_from_row)?;
        rows.collect()
    }

    // ---- helpers ----

    fn budget_columns(&self) -> String {
        let mut cols = vec![
            "id",
            "owner_id",
            "category_id",
            "year",
            "month",
            "amount_planned_cents",
            "minimum_amount_planned_cents",
            "auto_contributions_cents",
            "amount_actual_cents",
            "is_auto_generated",
            "created_ts_utc",
            "updated_ts_utc",
        ];
        if self.caps.source_type {
            cols.push("source_type");
        }
        if self.caps.is_projected {
            cols.push("is_projected");
        }
        if self.caps.metadata {
            cols.push("metadata");
        }
        cols.join(", ")
    }

    fn write_sql(&self, mode: WriteMode) -> String {
        let mut cols = vec![
            "owner_id",
            "category_id",
            "year",
            "month",
            "amount_planned_cents",
            "minimum_amount_planned_cents",
            "auto_contributions_cents",
            "is_auto_generated",
        ];
        if self.caps.source_type {
            cols.push("source_type");
        }
        if self.caps.is_projected {
            cols.push("is_projected");
        }
        if self.caps.metadata {
            cols.push("metadata");
        }
        cols.push("created_ts_utc");
        cols.push("updated_ts_utc");

        let placeholders = vec!["?"; cols.len()].join(", ");
        let conflict = match mode {
            WriteMode::InsertIfAbsent => "DO NOTHING".to_string(),
            WriteMode::Upsert => {
                let sets = cols
                    .iter()
                    .filter(|col| {
                        !matches!(
                            **col,
                            "owner_id" | "category_id" | "year" | "month" | "created_ts_utc"
                        )
                    })
                    .map(|col| format!("{col} = excluded.{col}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("DO UPDATE SET {sets}")
            }
        };
        format!(
            "INSERT INTO budgets ({}) VALUES ({placeholders})
             ON CONFLICT(owner_id, category_id, year, month) {conflict}",
            cols.join(", ")
        )
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS budgets (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          owner_id INTEGER NOT NULL,
          category_id INTEGER NOT NULL,
          year INTEGER NOT NULL,
          month INTEGER NOT NULL,
          amount_planned_cents INTEGER NOT NULL,
          minimum_amount_planned_cents INTEGER NOT NULL DEFAULT 0,
          auto_contributions_cents INTEGER NOT NULL DEFAULT 0,
          amount_actual_cents INTEGER NOT NULL DEFAULT 0,
          source_type TEXT,
          is_auto_generated INTEGER NOT NULL DEFAULT 0,
          is_projected INTEGER NOT NULL DEFAULT 0,
          metadata TEXT,
          created_ts_utc INTEGER NOT NULL,
          updated_ts_utc INTEGER NOT NULL,
          UNIQUE (owner_id, category_id, year, month)
        );
        CREATE TABLE IF NOT EXISTS categories (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          owner_id INTEGER NOT NULL,
          name TEXT NOT NULL,
          source_type TEXT
        );
        CREATE TABLE IF NOT EXISTS auto_sources (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          owner_id INTEGER NOT NULL,
          category_id INTEGER NOT NULL,
          kind TEXT NOT NULL,
          label TEXT NOT NULL,
          status TEXT NOT NULL,
          include_in_plan INTEGER NOT NULL DEFAULT 1,
          is_negotiated INTEGER NOT NULL DEFAULT 0,
          frequency TEXT NOT NULL,
          amount_cents INTEGER NOT NULL,
          start_year INTEGER NOT NULL,
          start_month INTEGER NOT NULL,
          end_year INTEGER,
          end_month INTEGER,
          installment_count INTEGER,
          plan_entries TEXT
        );",
    )
}

fn budget_from_row(caps: Capabilities, row: &rusqlite::Row<'_>) -> rusqlite::Result<Budget> {
    let mut idx = 12;
    let mut next = || {
        let i = idx;
        idx += 1;
        i
    };
    let source_type = if caps.source_type {
        row.get::<_, Option<String>>(next())?
            .as_deref()
            .and_then(SourceType::parse)
    } else {
        None
    };
    let is_projected = if caps.is_projected {
        row.get::<_, i64>(next())? != 0
    } else {
        false
    };
    let breakdown = if caps.metadata {
        row.get::<_, Option<String>>(next())?
            .as_deref()
            .and_then(parse_metadata)
    } else {
        None
    };

    Ok(Budget {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        category_id: row.get(2)?,
        month: MonthKey {
            year: row.get::<_, i64>(3)? as i32,
            month: row.get::<_, i64>(4)? as u32,
        },
        amount_planned_cents: row.get(5)?,
        minimum_amount_planned_cents: row.get(6)?,
        auto_contributions_cents: row.get(7)?,
        amount_actual_cents: row.get(8)?,
        source_type,
        is_auto_generated: row.get::<_, i64>(9)? != 0,
        is_projected,
        breakdown,
        created_ts_utc: row.get(10)?,
        updated_ts_utc: row.get(11)?,
    })
}

fn auto_source_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AutoSource> {
    let kind: String = row.get(3)?;
    let status: String = row.get(5)?;
    let frequency: String = row.get(8)?;
    let installment_count: Option<i64> = row.get(14)?;

    let frequency = match frequency.as_str() {
        "biweekly" => Frequency::Biweekly,
        "installments" => Frequency::Installments(installment_count.unwrap_or(0) as u32),
        _ => Frequency::Monthly,
    };
    let end = match (row.get::<_, Option<i64>>(12)?, row.get::<_, Option<i64>>(13)?) {
        (Some(year), Some(month)) => Some(MonthKey {
            year: year as i32,
            month: month as u32,
        }),
        _ => None,
    };
    let plan_entries = row
        .get::<_, Option<String>>(15)?
        .as_deref()
        .and_then(|json| serde_json::from_str::<Vec<PlanEntry>>(json).ok());

    Ok(AutoSource {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        category_id: row.get(2)?,
        kind: SourceKind::parse(&kind).unwrap_or(SourceKind::Goal),
        label: row.get(4)?,
        status: SourceStatus::parse(&status).unwrap_or(SourceStatus::Done),
        include_in_plan: row.get(6)?,
        is_negotiated: row.get(7)?,
        schedule: ContributionSchedule {
            frequency,
            amount_cents: row.get(9)?,
            start: MonthKey {
                year: row.get::<_, i64>(10)? as i32,
                month: row.get::<_, i64>(11)? as u32,
            },
            end,
            plan_entries,
        },
    })
}

fn write_values(caps: Capabilities, row: &BudgetWrite, now: i64) -> Vec<Value> {
    let mut values = vec![
        Value::Integer(row.owner_id),
        Value::Integer(row.category_id),
        Value::Integer(row.month.year as i64),
        Value::Integer(row.month.month as i64),
        Value::Integer(row.amount_planned_cents),
        Value::Integer(row.minimum_amount_planned_cents),
        Value::Integer(row.auto_contributions_cents),
        Value::Integer(row.is_auto_generated as i64),
    ];
    if caps.source_type {
        values.push(text_or_null(row.source_type.map(SourceType::as_str)));
    }
    if caps.is_projected {
        values.push(Value::Integer(row.is_projected as i64));
    }
    if caps.metadata {
        values.push(metadata_value(row.breakdown.as_ref()));
    }
    values.push(Value::Integer(now));
    values.push(Value::Integer(now));
    values
}

fn text_or_null(value: Option<&str>) -> Value {
    match value {
        Some(text) => Value::Text(text.to_string()),
        None => Value::Null,
    }
}

fn metadata_value(breakdown: Option<&BudgetBreakdown>) -> Value {
    breakdown
        .and_then(|b| serde_json::to_string(&serde_json::json!({ "budget_breakdown": b })).ok())
        .map(Value::Text)
        .unwrap_or(Value::Null)
}

fn parse_metadata(json: &str) -> Option<BudgetBreakdown> {
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    serde_json::from_value(value.get("budget_breakdown")?.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BreakdownItem;

    const MAR: MonthKey = MonthKey { year: 2025, month: 3 };

    fn write(month: MonthKey, amount_cents: i64) -> BudgetWrite {
        BudgetWrite {
            owner_id: 1,
            category_id: 7,
            month,
            amount_planned_cents: amount_cents,
            minimum_amount_planned_cents: 0,
            auto_contributions_cents: 0,
            source_type: Some(SourceType::Manual),
            is_auto_generated: false,
            is_projected: false,
            breakdown: None,
        }
    }

    #[test]
    fn fresh_schema_reports_all_capabilities() {
        let store = Store::open_in_memory().expect("open store");
        let caps = store.capabilities();
        assert!(caps.source_type);
        assert!(caps.is_projected);
        assert!(caps.metadata);
    }

    #[test]
    fn insert_if_absent_reports_conflicts_instead_of_failing() {
        let mut store = Store::open_in_memory().expect("open store");
        let first = store
            .write_budgets(&[write(MAR, 50_000)], WriteMode::InsertIfAbsent)
            .expect("first write");
        assert_eq!(first, BatchWrite { written: 1, conflicted: 0 });

        let second = store
            .write_budgets(&[write(MAR, 99_999)], WriteMode::InsertIfAbsent)
            .expect("second write");
        assert_eq!(second, BatchWrite { written: 0, conflicted: 1 });

        let kept = store
            .find_budget(1, 7, MAR)
            .expect("lookup")
            .expect("row exists");
        assert_eq!(kept.amount_planned_cents, 50_000);
    }

    #[test]
    fn upsert_overwrites_amount_but_keeps_actuals() {
        let mut store = Store::open_in_memory().expect("open store");
        store
            .write_budgets(&[write(MAR, 50_000)], WriteMode::InsertIfAbsent)
            .expect("seed");
        let mut row = store.find_budget(1, 7, MAR).expect("lookup").expect("row");
        row.amount_actual_cents = 12_345;
        store.update_budget(&row).expect("record actuals");

        store
            .write_budgets(&[write(MAR, 60_000)], WriteMode::Upsert)
            .expect("upsert");
        let row = store.find_budget(1, 7, MAR).expect("lookup").expect("row");
        assert_eq!(row.amount_planned_cents, 60_000);
        assert_eq!(row.amount_actual_cents, 12_345);
    }

    #[test]
    fn breakdown_metadata_survives_a_round_trip() {
        let mut store = Store::open_in_memory().expect("open store");
        let mut budget_write = write(MAR, 42_500);
        budget_write.breakdown = Some(BudgetBreakdown {
            enabled: true,
            items: vec![
                BreakdownItem { id: None, label: "Rent".to_string(), amount_cents: 30_000 },
                BreakdownItem { id: None, label: "Utilities".to_string(), amount_cents: 12_500 },
            ],
        });
        store
            .write_budgets(&[budget_write], WriteMode::InsertIfAbsent)
            .expect("write");

        let row = store.find_budget(1, 7, MAR).expect("lookup").expect("row");
        let breakdown = row.breakdown.expect("breakdown kept");
        assert!(breakdown.enabled);
        assert_eq!(breakdown.total_cents(), 42_500);
    }

    #[test]
    fn existing_months_batches_across_year_boundary() {
        let mut store = Store::open_in_memory().expect("open store");
        let nov = MonthKey { year: 2025, month: 11 };
        let feb = MonthKey { year: 2026, month: 2 };
        store
            .write_budgets(&[write(nov, 1), write(feb, 2)], WriteMode::InsertIfAbsent)
            .expect("seed");

        let targets: Vec<MonthKey> = (0..6).map(|i| nov.plus_months(i)).collect();
        let existing = store.existing_months(1, 7, &targets).expect("lookup");
        assert_eq!(existing.len(), 2);
        assert!(existing.contains(&nov));
        assert!(existing.contains(&feb));
    }

    #[test]
    fn latest_planned_amount_orders_by_calendar_month() {
        let mut store = Store::open_in_memory().expect("open store");
        store
            .write_budgets(
                &[
                    write(MonthKey { year: 2024, month: 12 }, 10_000),
                    write(MonthKey { year: 2025, month: 2 }, 30_000),
                    write(MonthKey { year: 2025, month: 1 }, 20_000),
                ],
                WriteMode::InsertIfAbsent,
            )
            .expect("seed");
        assert_eq!(store.latest_planned_amount(1, 7).expect("lookup"), Some(30_000));
        assert_eq!(store.latest_planned_amount(1, 99).expect("lookup"), None);
    }

    #[test]
    fn legacy_table_without_optional_columns_still_accepts_writes() {
        let conn = Connection::open_in_memory().expect("open connection");
        conn.execute_batch(
            "CREATE TABLE budgets (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              owner_id INTEGER NOT NULL,
              category_id INTEGER NOT NULL,
              year INTEGER NOT NULL,
              month INTEGER NOT NULL,
              amount_planned_cents INTEGER NOT NULL,
              minimum_amount_planned_cents INTEGER NOT NULL DEFAULT 0,
              auto_contributions_cents INTEGER NOT NULL DEFAULT 0,
              amount_actual_cents INTEGER NOT NULL DEFAULT 0,
              is_auto_generated INTEGER NOT NULL DEFAULT 0,
              created_ts_utc INTEGER NOT NULL,
              updated_ts_utc INTEGER NOT NULL,
              UNIQUE (owner_id, category_id, year, month)
            );",
        )
        .expect("legacy schema");

        let mut store = Store::from_connection(conn).expect("attach");
        let caps = store.capabilities();
        assert!(!caps.source_type);
        assert!(!caps.is_projected);
        assert!(!caps.metadata);

        let mut budget_write = write(MAR, 50_000);
        budget_write.breakdown = Some(BudgetBreakdown {
            enabled: true,
            items: vec![BreakdownItem { id: None, label: "Rent".to_string(), amount_cents: 50_000 }],
        });
        let result = store
            .write_budgets(&[budget_write], WriteMode::InsertIfAbsent)
            .expect("reduced payload accepted");
        assert_eq!(result.written, 1);

        let row = store.find_budget(1, 7, MAR).expect("lookup").expect("row");
        assert_eq!(row.amount_planned_cents, 50_000);
        assert!(row.source_type.is_none());
        assert!(row.breakdown.is_none());

        let mut row = row;
        row.amount_planned_cents = 55_000;
        assert!(store.update_budget(&row).expect("update accepted"));
    }

    #[test]
    fn auto_source_round_trips_schedule_details() {
        let mut store = Store::open_in_memory().expect("open store");
        let source = AutoSource {
            id: 0,
            owner_id: 1,
            category_id: 7,
            kind: SourceKind::Debt,
            label: "Car loan".to_string(),
            status: SourceStatus::Negotiating,
            include_in_plan: true,
            is_negotiated: true,
            schedule: ContributionSchedule {
                frequency: Frequency::Installments(12),
                amount_cents: 15_000,
                start: MAR,
                end: None,
                plan_entries: None,
            },
        };
        store.insert_auto_source(&source).expect("insert");

        let sources = store.auto_sources_for_category(1, 7).expect("lookup");
        assert_eq!(sources.len(), 1);
        let got = &sources[0];
        assert_eq!(got.kind, SourceKind::Debt);
        assert_eq!(got.status, SourceStatus::Negotiating);
        assert_eq!(got.schedule.frequency, Frequency::Installments(12));
        assert_eq!(got.schedule.start, MAR);
        assert!(got.counts_toward_minimum());
    }
}
