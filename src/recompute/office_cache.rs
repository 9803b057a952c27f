use std::collections::{BTreeSet, HashMap};

use crate::error::AppResult;
use crate::recompute::models::{OfficeInfo, Record};
use crate::store::{placeholders, OfficeRow, RecomputeStore, SqlValue, Statement};

const SITE_LOOKUP_SQL: &str = "\
SELECT CAST(t.id AS UNSIGNED) AS row_id, t.site_code AS lookup_code, \
m.main_code AS main_code, COALESCE(m.name, '') AS main_name, \
s.sub_code AS sub_code, COALESCE(s.name, '') AS sub_name \
FROM data_office_site t \
JOIN data_office_sub s ON s.id = t.office_sub_id \
JOIN data_office_main m ON m.id = s.office_main_id \
WHERE t.deleted_at IS NULL AND s.deleted_at IS NULL AND m.deleted_at IS NULL \
AND t.site_code IN ({codes}) \
ORDER BY t.id DESC";

const SUB_LOOKUP_SQL: &str = "\
SELECT CAST(s.id AS UNSIGNED) AS row_id, s.sub_code AS lookup_code, \
m.main_code AS main_code, COALESCE(m.name, '') AS main_name, \
s.sub_code AS sub_code, COALESCE(s.name, '') AS sub_name \
FROM data_office_sub s \
JOIN data_office_main m ON m.id = s.office_main_id \
WHERE s.deleted_at IS NULL AND m.deleted_at IS NULL \
AND s.sub_code IN ({codes}) \
ORDER BY s.id DESC";

/// Office hierarchy lookups for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfficeCache {
    by_site: HashMap<String, OfficeInfo>,
    by_sub: HashMap<String, OfficeInfo>,
}

impl OfficeCache {
    pub fn site(&self, code: &str) -> Option<&OfficeInfo> {
        self.by_site.get(code)
    }

    pub fn sub(&self, code: &str) -> Option<&OfficeInfo> {
        self.by_sub.get(code)
    }

    /// Build from raw rows. The newest row (highest primary key) wins on a
    /// duplicated code, whatever order the rows arrive in.
    pub fn from_rows(site_rows: Vec<OfficeRow>, sub_rows: Vec<OfficeRow>) -> Self {
        Self {
            by_site: newest_by_code(site_rows, true),
            by_sub: newest_by_code(sub_rows, false),
        }
    }
}

fn newest_by_code(rows: Vec<OfficeRow>, is_site: bool) -> HashMap<String, OfficeInfo> {
    let mut newest: HashMap<String, (u64, OfficeInfo)> = HashMap::new();
    for row in rows {
        if newest
            .get(&row.lookup_code)
            .is_some_and(|(row_id, _)| *row_id >= row.row_id)
        {
            continue;
        }
        let info = OfficeInfo {
            main_code: row.main_code,
            main_name: row.main_name,
            sub_code: row.sub_code,
            sub_name: row.sub_name,
            site_code: is_site.then(|| row.lookup_code.clone()),
        };
        newest.insert(row.lookup_code, (row.row_id, info));
    }
    newest.into_iter().map(|(code, (_, info))| (code, info)).collect()
}

/// Distinct non-empty (site codes, sub codes) of a batch
pub fn collect_codes<'a>(
    records: impl IntoIterator<Item = &'a Record>,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut sites = BTreeSet::new();
    let mut subs = BTreeSet::new();
    for record in records {
        if let Some(site) = record.site_code.as_deref().filter(|code| !code.is_empty()) {
            sites.insert(site.to_string());
        }
        if let Some(sub) = record.sub_code.as_deref().filter(|code| !code.is_empty()) {
            subs.insert(sub.to_string());
        }
    }
    (sites, subs)
}

fn lookup_statement(template: &str, codes: &BTreeSet<String>) -> Statement {
    Statement::new(
        template.replace("{codes}", &placeholders(codes.len())),
        codes.iter().map(|code| SqlValue::Text(code.clone())).collect(),
    )
}

pub fn site_lookup_statement(codes: &BTreeSet<String>) -> Statement {
    lookup_statement(SITE_LOOKUP_SQL, codes)
}

pub fn sub_lookup_statement(codes: &BTreeSet<String>) -> Statement {
    lookup_statement(SUB_LOOKUP_SQL, codes)
}

/// Resolve every site and sub code of a batch. An empty code set issues no query.
pub async fn build_office_cache(
    store: &dyn RecomputeStore,
    records: &HashMap<u64, Record>,
) -> AppResult<OfficeCache> {
    let (sites, subs) = collect_codes(records.values());

    let site_rows = if sites.is_empty() {
        Vec::new()
    } else {
        store.fetch_offices(&site_lookup_statement(&sites)).await?
    };

    let sub_rows = if subs.is_empty() {
        Vec::new()
    } else {
        store.fetch_offices(&sub_lookup_statement(&subs)).await?
    };

    Ok(OfficeCache::from_rows(site_rows, sub_rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::sync::atomic::Ordering;

    fn office_row(row_id: u64, code: &str, main: &str) -> OfficeRow {
        OfficeRow {
            row_id,
            lookup_code: code.to_string(),
            main_code: main.to_string(),
            main_name: format!("{} office", main),
            sub_code: "SUB1".to_string(),
            sub_name: "Sub One".to_string(),
        }
    }

    fn record(id: u64, site: Option<&str>, sub: Option<&str>) -> Record {
        Record {
            id,
            site_code: site.map(str::to_string),
            sub_code: sub.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_newest_row_wins_on_duplicate_code() {
        let rows = vec![office_row(3, "S1", "OLD"), office_row(9, "S1", "NEW"), office_row(5, "S1", "MID")];
        let cache = OfficeCache::from_rows(rows, vec![]);
        let info = cache.site("S1").unwrap();
        assert_eq!(info.main_code, "NEW");
        assert_eq!(info.site_code.as_deref(), Some("S1"));
    }

    #[test]
    fn test_sub_rows_carry_no_site() {
        let cache = OfficeCache::from_rows(vec![], vec![office_row(1, "SUB1", "M1")]);
        assert_eq!(cache.sub("SUB1").unwrap().site_code, None);
        assert!(cache.site("SUB1").is_none());
    }

    #[test]
    fn test_collect_codes_skips_empty() {
        let records = vec![
            record(1, Some("S1"), Some("B1")),
            record(2, Some(""), None),
            record(3, Some("S1"), Some("B2")),
        ];
        let (sites, subs) = collect_codes(&records);
        assert_eq!(sites.into_iter().collect::<Vec<_>>(), vec!["S1"]);
        assert_eq!(subs.into_iter().collect::<Vec<_>>(), vec!["B1", "B2"]);
    }

    #[test]
    fn test_lookup_statements_bind_codes() {
        let codes: BTreeSet<String> = ["A".to_string(), "B".to_string()].into();
        let site = site_lookup_statement(&codes);
        assert!(site.sql.contains("t.site_code IN (?, ?)"));
        assert!(site.sql.ends_with("ORDER BY t.id DESC"));
        assert!(site.check_arity().is_ok());

        let sub = sub_lookup_statement(&codes);
        assert!(sub.sql.contains("s.sub_code IN (?, ?)"));
        assert!(!sub.sql.contains("data_office_site"));
    }

    #[tokio::test]
    async fn test_no_codes_means_no_queries() {
        let store = MemoryStore::default();
        let records: HashMap<u64, Record> = [(1, record(1, None, None))].into();
        let cache = build_office_cache(&store, &records).await.unwrap();
        assert_eq!(cache, OfficeCache::default());
        assert_eq!(store.office_queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_builds_both_maps() {
        let store = MemoryStore {
            site_offices: vec![office_row(1, "S1", "M1")],
            sub_offices: vec![office_row(2, "SUB9", "M2")],
            ..Default::default()
        };
        let records: HashMap<u64, Record> = [
            (1, record(1, Some("S1"), None)),
            (2, record(2, None, Some("SUB9"))),
            (3, record(3, Some("S404"), None)),
        ]
        .into();

        let cache = build_office_cache(&store, &records).await.unwrap();
        assert_eq!(store.office_queries.load(Ordering::SeqCst), 2);
        assert_eq!(cache.site("S1").unwrap().main_code, "M1");
        assert_eq!(cache.sub("SUB9").unwrap().main_code, "M2");
        assert!(cache.site("S404").is_none());
    }
}
