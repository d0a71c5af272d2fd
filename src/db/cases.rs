use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

/// `EVOLUCAO` value recorded for a death caused by the notified condition.
pub const OUTCOME_DEATH: i64 = 2;
/// Flag value meaning "yes" for `UTI` / `VACINA_COV` / `VACINA`.
pub const FLAG_YES: i64 = 1;
/// Sentinel for a missing or unreadable categorical code.
pub const IGNORED: i64 = 9;

const INSERT_CHUNK: usize = 1000;

/// One surveillance case. Immutable once loaded; field order drives the
/// canonical sort applied before records are written.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CaseRecord {
    pub onset_date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub year_week: String,
    pub epi_week: i64,
    pub outcome_code: i64,
    pub icu_flag: i64,
    pub covid_vaccine_flag: i64,
    pub flu_vaccine_flag: i64,
    pub classification_code: i64,
}

/// Case counts for one `(year, month)` group. Lives for one query call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct MonthBucket {
    pub year: i64,
    pub month: i64,
    pub total_cases: i64,
    pub subset_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DailyCount {
    pub day: String,
    pub cases: i64,
}

/// Which records of a month group are counted into `subset_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
    None,
    Deaths,
    Icu,
    CovidVaccinated,
}

impl Subset {
    fn predicate(self) -> String {
        match self {
            Subset::None => "0".to_string(),
            Subset::Deaths => format!("outcome_code = {OUTCOME_DEATH}"),
            Subset::Icu => format!("icu_flag = {FLAG_YES}"),
            Subset::CovidVaccinated => format!("covid_vaccine_flag = {FLAG_YES}"),
        }
    }
}

pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS case_records (
            onset_date TEXT NOT NULL,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            year_week TEXT NOT NULL,
            epi_week INTEGER NOT NULL,
            outcome_code INTEGER NOT NULL,
            icu_flag INTEGER NOT NULL,
            covid_vaccine_flag INTEGER NOT NULL,
            flu_vaccine_flag INTEGER NOT NULL,
            classification_code INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_case_records_month ON case_records (year, month)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_case_records_onset ON case_records (onset_date)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Replaces the whole table with `records` in one transaction.
#[tracing::instrument(name = "db.cases.replace_all", skip_all, fields(rows = records.len()))]
pub async fn replace_all(pool: &SqlitePool, records: &[CaseRecord]) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM case_records")
        .execute(&mut *tx)
        .await?;

    let mut inserted = 0;
    for chunk in records.chunks(INSERT_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO case_records \
             (onset_date, year, month, year_week, epi_week, outcome_code, \
              icu_flag, covid_vaccine_flag, flu_vaccine_flag, classification_code) ",
        );
        builder.push_values(chunk, |mut row, record| {
            row.push_bind(record.onset_date)
                .push_bind(record.year)
                .push_bind(i64::from(record.month))
                .push_bind(record.year_week.clone())
                .push_bind(record.epi_week)
                .push_bind(record.outcome_code)
                .push_bind(record.icu_flag)
                .push_bind(record.covid_vaccine_flag)
                .push_bind(record.flu_vaccine_flag)
                .push_bind(record.classification_code);
        });
        inserted += builder.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;

    Ok(inserted)
}

#[tracing::instrument(name = "db.cases.count", skip(pool))]
pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM case_records")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// The `limit` most recent `(year, month)` groups, newest first.
#[tracing::instrument(
    name = "db.cases.month_buckets",
    skip(pool),
    fields(bucket_count)
)]
pub async fn month_buckets(
    pool: &SqlitePool,
    subset: Subset,
    limit: i64,
) -> Result<Vec<MonthBucket>, sqlx::Error> {
    let sql = format!(
        "SELECT year, month, COUNT(*) AS total_cases, \
                SUM(CASE WHEN {} THEN 1 ELSE 0 END) AS subset_count \
         FROM case_records \
         GROUP BY year, month \
         ORDER BY year DESC, month DESC \
         LIMIT ?",
        subset.predicate()
    );

    let buckets = sqlx::query_as::<_, MonthBucket>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    tracing::Span::current().record("bucket_count", buckets.len());

    Ok(buckets)
}

/// Cases per onset day over the `days` days ending at the latest onset date
/// present in the table.
#[tracing::instrument(name = "db.cases.daily_counts", skip(pool), fields(day_count))]
pub async fn daily_counts(pool: &SqlitePool, days: u32) -> Result<Vec<DailyCount>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DailyCount>(
        "SELECT onset_date AS day, COUNT(*) AS cases \
         FROM case_records \
         WHERE onset_date > date((SELECT MAX(onset_date) FROM case_records), ?) \
         GROUP BY onset_date \
         ORDER BY onset_date",
    )
    .bind(format!("-{days} days"))
    .fetch_all(pool)
    .await?;

    tracing::Span::current().record("day_count", rows.len());

    Ok(rows)
}


#[cfg(test)]
mod tests {
    use super::fixtures::{case, month};
    use super::*;
    use crate::db::pool::memory_pool;

    #[tokio::test]
    async fn test_replace_all_overwrites_previous_rows() {
        let pool = memory_pool().await;

        replace_all(&pool, &month("2024-11-10", 1500, 0, 0, 0))
            .await
            .unwrap();
        assert_eq!(count(&pool).await.unwrap(), 1500);

        let inserted = replace_all(&pool, &month("2024-12-10", 3, 1, 0, 0))
            .await
            .unwrap();
        assert_eq!(inserted, 3);
        assert_eq!(count(&pool).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_month_buckets_newest_first_with_subset() {
        let pool = memory_pool().await;
        let mut records = month("2024-11-05", 5, 1, 0, 0);
        records.extend(month("2024-12-05", 6, 3, 2, 0));
        records.extend(month("2025-01-05", 2, 0, 0, 0));
        replace_all(&pool, &records).await.unwrap();

        let buckets = month_buckets(&pool, Subset::Deaths, 3).await.unwrap();
        assert_eq!(
            buckets,
            vec![
                MonthBucket { year: 2025, month: 1, total_cases: 2, subset_count: 0 },
                MonthBucket { year: 2024, month: 12, total_cases: 6, subset_count: 3 },
                MonthBucket { year: 2024, month: 11, total_cases: 5, subset_count: 1 },
            ]
        );

        let icu = month_buckets(&pool, Subset::Icu, 2).await.unwrap();
        assert_eq!(icu.len(), 2);
        assert_eq!(icu[1].subset_count, 2);

        let plain = month_buckets(&pool, Subset::None, 3).await.unwrap();
        assert!(plain.iter().all(|b| b.subset_count == 0));
    }

    #[tokio::test]
    async fn test_month_buckets_empty_table() {
        let pool = memory_pool().await;
        let buckets = month_buckets(&pool, Subset::CovidVaccinated, 2).await.unwrap();
        assert!(buckets.is_empty());
    }

    #[tokio::test]
    async fn test_daily_counts_window_ends_at_latest_onset() {
        let pool = memory_pool().await;
        let records = vec![
            case("2024-01-01", 1, 2, 2),
            case("2024-03-01", 1, 2, 2),
            case("2024-03-01", 1, 2, 2),
            case("2024-03-05", 1, 2, 2),
        ];
        replace_all(&pool, &records).await.unwrap();

        let rows = daily_counts(&pool, 30).await.unwrap();
        assert_eq!(
            rows,
            vec![
                DailyCount { day: "2024-03-01".to_string(), cases: 2 },
                DailyCount { day: "2024-03-05".to_string(), cases: 1 },
            ]
        );
    }
}
