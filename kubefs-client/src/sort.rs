use std::cmp::Ordering;

use crate::kind::ResourceKind;
use crate::row::{Column, Row};
use crate::structs::{KindOrder, SortOrder};

/// Case-normalized name order, falling back to the raw bytes so the order
/// stays total.
pub fn cmp_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Sorts rows in place. Creation order breaks ties by name ascending, and
/// rows without a timestamp sort as the oldest.
#[tracing::instrument(skip(rows, columns), fields(rows = rows.len()))]
pub fn sort_rows(rows: &mut [Row], columns: &[Column], order: SortOrder) {
    rows.sort_by(|a, b| {
        let by_name = || {
            cmp_names(&a.name(columns), &b.name(columns))
                .then_with(|| a.namespace().cmp(&b.namespace()))
        };
        match order {
            SortOrder::NameAsc => by_name(),
            SortOrder::NameDesc => by_name().reverse(),
            SortOrder::CreatedAsc => a.created().cmp(&b.created()).then_with(by_name),
            SortOrder::CreatedDesc => b.created().cmp(&a.created()).then_with(by_name),
        }
    });
}

/// Core group first, then groups alphabetically.
fn cmp_groups(a: &ResourceKind, b: &ResourceKind) -> Ordering {
    match (a.group().is_empty(), b.group().is_empty()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.group().cmp(b.group()),
    }
}

fn cmp_kinds(a: &ResourceKind, b: &ResourceKind) -> Ordering {
    cmp_names(a.kind(), b.kind()).then_with(|| cmp_groups(a, b))
}

pub fn sort_kinds(kinds: &mut [ResourceKind], order: KindOrder, favorites: &[String]) {
    match order {
        KindOrder::Alphabetical => kinds.sort_by(cmp_kinds),
        KindOrder::Grouped => kinds.sort_by(|a, b| cmp_groups(a, b).then_with(|| cmp_kinds(a, b))),
        KindOrder::FavoritesFirst => {
            let rank = |k: &ResourceKind| {
                favorites
                    .iter()
                    .position(|f| k.matches(f))
                    .unwrap_or(usize::MAX)
            };
            kinds.sort_by(|a, b| rank(a).cmp(&rank(b)).then_with(|| cmp_kinds(a, b)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

    fn row(name: &str, minute: u32) -> Row {
        Row {
            meta: ObjectMeta {
                name: Some(name.to_string()),
                creation_timestamp: Some(Time(
                    Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap(),
                )),
                ..Default::default()
            },
            cells: vec![],
            kind: "Pod".into(),
        }
    }

    fn names(rows: &[Row]) -> Vec<String> {
        rows.iter().map(|r| r.name(&[])).collect()
    }

    fn sorted(order: SortOrder) -> Vec<String> {
        // created: b first, then a, then c
        let mut rows = vec![row("b", 1), row("a", 2), row("c", 3)];
        sort_rows(&mut rows, &[], order);
        names(&rows)
    }

    #[test]
    fn test_sort_orders() {
        assert_eq!(sorted(SortOrder::NameAsc), vec!["a", "b", "c"]);
        assert_eq!(sorted(SortOrder::NameDesc), vec!["c", "b", "a"]);
        assert_eq!(sorted(SortOrder::CreatedAsc), vec!["b", "a", "c"]);
        assert_eq!(sorted(SortOrder::CreatedDesc), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_name_order_ignores_case_and_creation_ties_use_name() {
        let mut rows = vec![row("Beta", 5), row("alpha", 5), row("gamma", 5)];
        sort_rows(&mut rows, &[], SortOrder::CreatedDesc);
        assert_eq!(names(&rows), vec!["alpha", "Beta", "gamma"]);
    }

    #[test]
    fn test_kind_orders() {
        let mut kinds = vec![
            ResourceKind::from_parts("apps", "v1", "Deployment", true),
            ResourceKind::from_parts("", "v1", "Pod", true),
            ResourceKind::from_parts("batch", "v1", "CronJob", true),
            ResourceKind::from_parts("", "v1", "ConfigMap", true),
        ];
        let keys = |ks: &[ResourceKind]| ks.iter().map(|k| k.kind().to_string()).collect::<Vec<_>>();

        sort_kinds(&mut kinds, KindOrder::Alphabetical, &[]);
        assert_eq!(keys(&kinds), vec!["ConfigMap", "CronJob", "Deployment", "Pod"]);

        sort_kinds(&mut kinds, KindOrder::Grouped, &[]);
        assert_eq!(keys(&kinds), vec!["ConfigMap", "Pod", "Deployment", "CronJob"]);

        sort_kinds(
            &mut kinds,
            KindOrder::FavoritesFirst,
            &["pods".to_string(), "deployments.apps".to_string()],
        );
        assert_eq!(keys(&kinds), vec!["Pod", "Deployment", "ConfigMap", "CronJob"]);
    }
}
