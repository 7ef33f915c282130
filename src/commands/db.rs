use crate::models::child::{Child, Gender};
use crate::models::growth_result::GrowthResult;
use crate::models::measurement::Measurement;
use crate::models::reference::{
    AgeUnit, GrowthMetric, ImportSummary, IntervalBoundary, ReferenceBundle, ReferencePoint,
    ReferenceRow, ReferenceVelocityRow, VelocityMetric,
};
use crate::models::subscription::{ActionLimit, Plan, QuotaAction, Subscription, Tier};
use crate::models::velocity::GrowthVelocityResult;
use crate::store::{
    ConfigAccess, MeasurementStore, ReferenceTableAccess, StoreError, StoreResult,
    SubscriptionStore, WEIGHT_FOR_LENGTH_MAX_GAP_CM,
};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::{Path, PathBuf};

const DB_SCHEMA_VERSION: i64 = 2;

pub const DATA_DIR_NAME: &str = ".growthlens";

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, message) = &err {
            if code.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || code.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return StoreError::Duplicate(
                    message.clone().unwrap_or_else(|| "unique constraint violated".to_string()),
                );
            }
        }
        StoreError::Db(err.to_string())
    }
}

pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;

    let mut version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        apply_migration_1(conn)?;
        version = 1;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version < 2 {
        apply_migration_2(conn)?;
        version = 2;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version > DB_SCHEMA_VERSION {
        log::warn!("database schema v{version} is newer than v{DB_SCHEMA_VERSION}");
    }

    Ok(())
}

fn apply_migration_1(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS children (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            birth_date INTEGER NOT NULL,
            gender TEXT NOT NULL CHECK(gender IN ('male', 'female')),
            velocity_json TEXT,
            velocity_computed_at INTEGER
        );

        CREATE TABLE IF NOT EXISTS measurements (
            id TEXT PRIMARY KEY,
            child_id TEXT NOT NULL REFERENCES children(id) ON DELETE CASCADE,
            taken_at INTEGER NOT NULL,
            height REAL,
            weight REAL,
            head_circumference REAL,
            arm_circumference REAL,
            growth_result_json TEXT,
            updated_at INTEGER NOT NULL DEFAULT 0,
            UNIQUE (child_id, taken_at)
        );

        CREATE TABLE IF NOT EXISTS reference_rows (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            metric TEXT NOT NULL,
            gender TEXT NOT NULL,
            age_in_days INTEGER,
            age_in_months INTEGER,
            height REAL,
            l REAL NOT NULL,
            m REAL NOT NULL,
            s REAL NOT NULL,
            values_json TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS reference_velocity_rows (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            metric TEXT NOT NULL,
            gender TEXT NOT NULL,
            first_months INTEGER NOT NULL DEFAULT 0,
            first_weeks INTEGER NOT NULL DEFAULT 0,
            first_days INTEGER NOT NULL DEFAULT 0,
            last_months INTEGER NOT NULL DEFAULT 0,
            last_weeks INTEGER NOT NULL DEFAULT 0,
            last_days INTEGER NOT NULL DEFAULT 0,
            l REAL NOT NULL,
            m REAL NOT NULL,
            s REAL NOT NULL,
            delta REAL NOT NULL DEFAULT 0,
            values_json TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS tiers (
            tier_level INTEGER PRIMARY KEY,
            children_limit INTEGER NOT NULL,
            update_value INTEGER NOT NULL,
            update_days INTEGER NOT NULL,
            update_description TEXT NOT NULL DEFAULT '',
            view_value INTEGER NOT NULL,
            view_days INTEGER NOT NULL,
            view_description TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS plans (
            id TEXT PRIMARY KEY,
            tier_level INTEGER NOT NULL,
            duration_days INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS subscriptions (
            user_id TEXT PRIMARY KEY,
            tier_level INTEGER NOT NULL DEFAULT 0,
            start_date INTEGER,
            end_date INTEGER,
            current_plan_id TEXT,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS quota_actions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            action TEXT NOT NULL CHECK(action IN ('UPDATE', 'VIEW')),
            occurred_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS app_config (
            key TEXT PRIMARY KEY,
            value REAL NOT NULL
        );
        ",
    )
}

fn apply_migration_2(conn: &Connection) -> rusqlite::Result<()> {
    add_column_if_missing(conn, "measurements", "arm_circumference REAL")?;
    add_column_if_missing(conn, "measurements", "updated_at INTEGER NOT NULL DEFAULT 0")?;
    add_column_if_missing(conn, "children", "velocity_computed_at INTEGER")?;

    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_measurements_child_taken ON measurements(child_id, taken_at);
        CREATE INDEX IF NOT EXISTS idx_quota_actions_lookup ON quota_actions(user_id, action, occurred_at);
        CREATE INDEX IF NOT EXISTS idx_reference_rows_days ON reference_rows(gender, age_in_days);
        CREATE INDEX IF NOT EXISTS idx_reference_rows_months ON reference_rows(gender, age_in_months);
        CREATE INDEX IF NOT EXISTS idx_reference_rows_height ON reference_rows(metric, gender, height);
        ",
    )
}

fn add_column_if_missing(conn: &Connection, table: &str, column_def: &str) -> rusqlite::Result<()> {
    let column_name = column_def
        .split_whitespace()
        .next()
        .unwrap_or(column_def)
        .to_string();

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(|res| res.ok())
        .any(|name| name == column_name);

    if !exists {
        conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column_def}"), [])?;
    }

    Ok(())
}

pub fn data_dir_path(data_dir: &str) -> PathBuf {
    Path::new(data_dir).join(DATA_DIR_NAME)
}

pub fn get_db_connection(data_dir: &str) -> StoreResult<Connection> {
    let dir = data_dir_path(data_dir);
    fs::create_dir_all(&dir)
        .map_err(|e| StoreError::Db(format!("Failed to create {DATA_DIR_NAME} directory: {e}")))?;
    let conn = Connection::open(dir.join("growth.db"))?;
    initialize_schema(&conn)?;
    Ok(conn)
}

/// Run `f` against a store bound to one transaction. Commits on `Ok`, rolls back on `Err`.
pub fn in_transaction<T, E, F>(conn: &Connection, f: F) -> Result<T, E>
where
    E: From<StoreError>,
    F: FnOnce(&SqliteStore<'_>) -> Result<T, E>,
{
    let tx = conn.unchecked_transaction().map_err(StoreError::from)?;
    let outcome = {
        let store = SqliteStore::new(&tx);
        f(&store)
    };

    match outcome {
        Ok(value) => {
            tx.commit().map_err(StoreError::from)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                log::error!("rollback failed: {rollback_err}");
            }
            Err(err)
        }
    }
}

/// Every store trait over a borrowed connection or transaction.
pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn column_error(idx: usize, ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, message.into())
}

fn millis_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| column_error(idx, Type::Integer, format!("timestamp {ms} out of range")))
}

fn optional_millis_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(_) => millis_at(row, idx).map(Some),
        None => Ok(None),
    }
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| column_error(idx, Type::Text, e.to_string()))
}

fn gender_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Gender> {
    let raw: String = row.get(idx)?;
    raw.parse::<Gender>()
        .map_err(|e| column_error(idx, Type::Text, e))
}

fn child_from_row(row: &Row<'_>) -> rusqlite::Result<Child> {
    Ok(Child {
        id: row.get(0)?,
        birth_date: millis_at(row, 1)?,
        gender: gender_column(row, 2)?,
    })
}

fn measurement_from_row(row: &Row<'_>) -> rusqlite::Result<Measurement> {
    let growth_result = match row.get::<_, Option<String>>(7)? {
        Some(raw) => Some(
            serde_json::from_str::<GrowthResult>(&raw)
                .map_err(|e| column_error(7, Type::Text, e.to_string()))?,
        ),
        None => None,
    };
    Ok(Measurement {
        id: row.get(0)?,
        child_id: row.get(1)?,
        taken_at: millis_at(row, 2)?,
        height: row.get(3)?,
        weight: row.get(4)?,
        head_circumference: row.get(5)?,
        arm_circumference: row.get(6)?,
        growth_result,
    })
}

const MEASUREMENT_COLUMNS: &str =
    "id, child_id, taken_at, height, weight, head_circumference, arm_circumference, growth_result_json";

const REFERENCE_COLUMNS: &str =
    "metric, gender, age_in_days, age_in_months, height, l, m, s, values_json";

fn reference_row_from_row(row: &Row<'_>) -> rusqlite::Result<ReferenceRow> {
    let metric_raw: String = row.get(0)?;
    let metric = GrowthMetric::parse(&metric_raw)
        .ok_or_else(|| column_error(0, Type::Text, format!("unknown metric '{metric_raw}'")))?;
    Ok(ReferenceRow {
        metric,
        gender: gender_column(row, 1)?,
        age_in_days: row.get(2)?,
        age_in_months: row.get(3)?,
        height: row.get(4)?,
        l: row.get(5)?,
        m: row.get(6)?,
        s: row.get(7)?,
        values: json_column::<Vec<ReferencePoint>>(row, 8)?,
    })
}

fn velocity_row_from_row(row: &Row<'_>) -> rusqlite::Result<ReferenceVelocityRow> {
    let metric_raw: String = row.get(0)?;
    let metric = VelocityMetric::parse(&metric_raw)
        .ok_or_else(|| column_error(0, Type::Text, format!("unknown velocity metric '{metric_raw}'")))?;
    Ok(ReferenceVelocityRow {
        metric,
        gender: gender_column(row, 1)?,
        first_interval: IntervalBoundary {
            months: row.get(2)?,
            weeks: row.get(3)?,
            days: row.get(4)?,
        },
        last_interval: IntervalBoundary {
            months: row.get(5)?,
            weeks: row.get(6)?,
            days: row.get(7)?,
        },
        l: row.get(8)?,
        m: row.get(9)?,
        s: row.get(10)?,
        delta: row.get(11)?,
        values: json_column::<Vec<ReferencePoint>>(row, 12)?,
    })
}

fn tier_from_row(row: &Row<'_>) -> rusqlite::Result<Tier> {
    Ok(Tier {
        tier_level: row.get(0)?,
        children_limit: row.get(1)?,
        update_limit: ActionLimit {
            value: row.get(2)?,
            time_days: row.get(3)?,
            description: row.get(4)?,
        },
        view_limit: ActionLimit {
            value: row.get(5)?,
            time_days: row.get(6)?,
            description: row.get(7)?,
        },
    })
}

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        user_id: row.get(0)?,
        tier_level: row.get(1)?,
        start_date: optional_millis_at(row, 2)?,
        end_date: optional_millis_at(row, 3)?,
        current_plan_id: row.get(4)?,
        created_at: millis_at(row, 5)?,
    })
}

impl ReferenceTableAccess for SqliteStore<'_> {
    fn growth_metrics_for_age(
        &self,
        gender: Gender,
        age_key: u32,
        unit: AgeUnit,
    ) -> StoreResult<Vec<ReferenceRow>> {
        let age_column = match unit {
            AgeUnit::Days => "age_in_days",
            AgeUnit::Months => "age_in_months",
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REFERENCE_COLUMNS} FROM reference_rows
             WHERE gender = ?1 AND {age_column} = ?2 AND metric != 'weight_for_length'"
        ))?;
        let rows = stmt
            .query_map(params![gender.as_str(), age_key], reference_row_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn growth_velocity(&self, gender: Gender) -> StoreResult<Vec<ReferenceVelocityRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT metric, gender, first_months, first_weeks, first_days,
                    last_months, last_weeks, last_days, l, m, s, delta, values_json
             FROM reference_velocity_rows WHERE gender = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![gender.as_str()], velocity_row_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn weight_for_length(&self, gender: Gender, height: f64) -> StoreResult<Vec<ReferenceRow>> {
        let gap = WEIGHT_FOR_LENGTH_MAX_GAP_CM + 1e-9;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REFERENCE_COLUMNS} FROM reference_rows
             WHERE metric = 'weight_for_length' AND gender = ?1
               AND height BETWEEN ?2 - ?3 AND ?2 + ?3
             ORDER BY ABS(height - ?2) ASC, height ASC"
        ))?;
        let candidates = stmt
            .query_map(params![gender.as_str(), height, gap], reference_row_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let Some(nearest) = candidates.first().and_then(|row| row.height) else {
            return Ok(Vec::new());
        };
        Ok(candidates
            .into_iter()
            .filter(|row| row.height.map(|h| (h - nearest).abs() < 1e-9).unwrap_or(false))
            .collect())
    }
}

impl ConfigAccess for SqliteStore<'_> {
    fn get_number(&self, key: &str) -> StoreResult<Option<f64>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM app_config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

impl MeasurementStore for SqliteStore<'_> {
    fn child(&self, child_id: &str) -> StoreResult<Option<Child>> {
        let child = self
            .conn
            .query_row(
                "SELECT id, birth_date, gender FROM children WHERE id = ?1",
                params![child_id],
                child_from_row,
            )
            .optional()?;
        Ok(child)
    }

    fn child_owner(&self, child_id: &str) -> StoreResult<Option<String>> {
        let owner = self
            .conn
            .query_row(
                "SELECT owner_id FROM children WHERE id = ?1",
                params![child_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    fn insert_child(&self, owner_id: &str, child: &Child) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO children (id, owner_id, birth_date, gender) VALUES (?1, ?2, ?3, ?4)",
            params![child.id, owner_id, to_millis(child.birth_date), child.gender.as_str()],
        )?;
        Ok(())
    }

    fn measurement(&self, measurement_id: &str) -> StoreResult<Option<Measurement>> {
        let measurement = self
            .conn
            .query_row(
                &format!("SELECT {MEASUREMENT_COLUMNS} FROM measurements WHERE id = ?1"),
                params![measurement_id],
                measurement_from_row,
            )
            .optional()?;
        Ok(measurement)
    }

    fn list_by_child(&self, child_id: &str) -> StoreResult<Vec<Measurement>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEASUREMENT_COLUMNS} FROM measurements WHERE child_id = ?1 ORDER BY taken_at ASC, id ASC"
        ))?;
        let rows = stmt
            .query_map(params![child_id], measurement_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn create(&self, measurement: &Measurement) -> StoreResult<()> {
        let growth_json = measurement
            .growth_result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            "INSERT INTO measurements (
                id, child_id, taken_at, height, weight, head_circumference,
                arm_circumference, growth_result_json, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                measurement.id,
                measurement.child_id,
                to_millis(measurement.taken_at),
                measurement.height,
                measurement.weight,
                measurement.head_circumference,
                measurement.arm_circumference,
                growth_json,
                to_millis(Utc::now()),
            ],
        )?;
        Ok(())
    }

    fn update(&self, measurement: &Measurement) -> StoreResult<()> {
        let growth_json = measurement
            .growth_result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let changed = self.conn.execute(
            "UPDATE measurements SET
                taken_at = ?2, height = ?3, weight = ?4, head_circumference = ?5,
                arm_circumference = ?6, growth_result_json = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                measurement.id,
                to_millis(measurement.taken_at),
                measurement.height,
                measurement.weight,
                measurement.head_circumference,
                measurement.arm_circumference,
                growth_json,
                to_millis(Utc::now()),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("measurement {}", measurement.id)));
        }
        Ok(())
    }

    fn delete(&self, measurement_id: &str) -> StoreResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM measurements WHERE id = ?1", params![measurement_id])?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("measurement {measurement_id}")));
        }
        Ok(())
    }

    fn save_velocity(
        &self,
        child_id: &str,
        results: &[GrowthVelocityResult],
        computed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let json = serde_json::to_string(results)?;
        let changed = self.conn.execute(
            "UPDATE children SET velocity_json = ?2, velocity_computed_at = ?3 WHERE id = ?1",
            params![child_id, json, to_millis(computed_at)],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("child {child_id}")));
        }
        Ok(())
    }

    fn load_velocity(&self, child_id: &str) -> StoreResult<Option<Vec<GrowthVelocityResult>>> {
        let raw: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT velocity_json FROM children WHERE id = ?1",
                params![child_id],
                |row| row.get(0),
            )
            .optional()?;
        match raw.flatten() {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

impl SubscriptionStore for SqliteStore<'_> {
    fn subscription(&self, user_id: &str) -> StoreResult<Option<Subscription>> {
        let subscription = self
            .conn
            .query_row(
                "SELECT user_id, tier_level, start_date, end_date, current_plan_id, created_at
                 FROM subscriptions WHERE user_id = ?1",
                params![user_id],
                subscription_from_row,
            )
            .optional()?;
        Ok(subscription)
    }

    fn tier(&self, tier_level: u8) -> StoreResult<Option<Tier>> {
        let tier = self
            .conn
            .query_row(
                "SELECT tier_level, children_limit, update_value, update_days, update_description,
                        view_value, view_days, view_description
                 FROM tiers WHERE tier_level = ?1",
                params![tier_level],
                tier_from_row,
            )
            .optional()?;
        Ok(tier)
    }

    fn plan(&self, plan_id: &str) -> StoreResult<Option<Plan>> {
        let plan = self
            .conn
            .query_row(
                "SELECT id, tier_level, duration_days FROM plans WHERE id = ?1",
                params![plan_id],
                |row| {
                    Ok(Plan {
                        id: row.get(0)?,
                        tier_level: row.get(1)?,
                        duration_days: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(plan)
    }

    fn count_actions(
        &self,
        user_id: &str,
        kind: QuotaAction,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM quota_actions
             WHERE user_id = ?1 AND action = ?2 AND occurred_at >= ?3 AND occurred_at < ?4",
            params![user_id, kind.as_str(), to_millis(start), to_millis(end)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn record_action(&self, user_id: &str, kind: QuotaAction, at: DateTime<Utc>) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO quota_actions (user_id, action, occurred_at) VALUES (?1, ?2, ?3)",
            params![user_id, kind.as_str(), to_millis(at)],
        )?;
        Ok(())
    }

    fn count_children(&self, user_id: &str) -> StoreResult<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM children WHERE owner_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

pub fn upsert_tier(conn: &Connection, tier: &Tier) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO tiers (
            tier_level, children_limit, update_value, update_days, update_description,
            view_value, view_days, view_description
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(tier_level) DO UPDATE SET
            children_limit = excluded.children_limit,
            update_value = excluded.update_value,
            update_days = excluded.update_days,
            update_description = excluded.update_description,
            view_value = excluded.view_value,
            view_days = excluded.view_days,
            view_description = excluded.view_description",
        params![
            tier.tier_level,
            tier.children_limit,
            tier.update_limit.value,
            tier.update_limit.time_days,
            tier.update_limit.description,
            tier.view_limit.value,
            tier.view_limit.time_days,
            tier.view_limit.description,
        ],
    )?;
    Ok(())
}

pub fn upsert_plan(conn: &Connection, plan: &Plan) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO plans (id, tier_level, duration_days) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET
            tier_level = excluded.tier_level,
            duration_days = excluded.duration_days",
        params![plan.id, plan.tier_level, plan.duration_days],
    )?;
    Ok(())
}

pub fn upsert_subscription(conn: &Connection, subscription: &Subscription) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO subscriptions (user_id, tier_level, start_date, end_date, current_plan_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(user_id) DO UPDATE SET
            tier_level = excluded.tier_level,
            start_date = excluded.start_date,
            end_date = excluded.end_date,
            current_plan_id = excluded.current_plan_id",
        params![
            subscription.user_id,
            subscription.tier_level,
            subscription.start_date.map(to_millis),
            subscription.end_date.map(to_millis),
            subscription.current_plan_id,
            to_millis(subscription.created_at),
        ],
    )?;
    Ok(())
}

pub fn set_config_value(conn: &Connection, key: &str, value: f64) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO app_config (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Replace both reference tables with `bundle`. Point lists are stored sorted by value.
pub fn replace_reference_tables(conn: &Connection, bundle: &ReferenceBundle) -> StoreResult<ImportSummary> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM reference_rows", [])?;
    tx.execute("DELETE FROM reference_velocity_rows", [])?;

    for row in &bundle.rows {
        tx.execute(
            "INSERT INTO reference_rows (metric, gender, age_in_days, age_in_months, height, l, m, s, values_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.metric.as_str(),
                row.gender.as_str(),
                row.age_in_days,
                row.age_in_months,
                row.height,
                row.l,
                row.m,
                row.s,
                serde_json::to_string(&sorted_points(&row.values))?,
            ],
        )?;
    }

    for row in &bundle.velocity_rows {
        tx.execute(
            "INSERT INTO reference_velocity_rows (
                metric, gender, first_months, first_weeks, first_days,
                last_months, last_weeks, last_days, l, m, s, delta, values_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                row.metric.as_str(),
                row.gender.as_str(),
                row.first_interval.months,
                row.first_interval.weeks,
                row.first_interval.days,
                row.last_interval.months,
                row.last_interval.weeks,
                row.last_interval.days,
                row.l,
                row.m,
                row.s,
                row.delta,
                serde_json::to_string(&sorted_points(&row.values))?,
            ],
        )?;
    }

    tx.commit()?;
    Ok(ImportSummary {
        row_count: bundle.rows.len(),
        velocity_row_count: bundle.velocity_rows.len(),
    })
}

fn sorted_points(points: &[ReferencePoint]) -> Vec<ReferencePoint> {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.value.total_cmp(&b.value));
    sorted
}
