//! Citation network of a resolved patent set.
//!
//! The *local* network keeps only edges whose two endpoints are in the set.
//! The *global* ranking counts every edge that targets the set, wherever
//! the citing side lives.

use std::collections::{HashMap, HashSet};

use crate::models::{Citation, PatentSummary};
use crate::results::{CitationEdge, CitationSection, RankedPatent};

pub const TOP_CITED: usize = 10;

pub fn build(
    ids: &[i64],
    citations: &[Citation],
    summaries: &HashMap<i64, PatentSummary>,
) -> CitationSection {
    let set: HashSet<i64> = ids.iter().copied().collect();
    let in_set = |id: Option<i64>| id.filter(|id| set.contains(id));

    let mut graph = Vec::new();
    let mut local: HashMap<i64, u64> = HashMap::new();
    let mut global: HashMap<i64, u64> = HashMap::new();

    for citation in citations {
        let Some(cited) = in_set(citation.cited_patent_id) else {
            continue;
        };
        *global.entry(cited).or_insert(0) += 1;

        let Some(citing) = in_set(citation.citing_patent_id) else {
            continue;
        };
        *local.entry(cited).or_insert(0) += 1;
        if let (Some(from), Some(to)) = (summaries.get(&citing), summaries.get(&cited)) {
            graph.push(CitationEdge {
                citing: from.clone(),
                cited: to.clone(),
            });
        }
    }
    graph.sort_by(|a, b| (a.citing.id, a.cited.id).cmp(&(b.citing.id, b.cited.id)));

    CitationSection {
        graph,
        most_cited_local: rank(local, summaries),
        most_cited_global: rank(global, summaries),
    }
}

fn rank(counts: HashMap<i64, u64>, summaries: &HashMap<i64, PatentSummary>) -> Vec<RankedPatent> {
    let mut ranked: Vec<(i64, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(TOP_CITED);
    ranked
        .into_iter()
        .map(|(id, count)| RankedPatent {
            id,
            label: summaries
                .get(&id)
                .map(|s| format!("{} - {}", s.code, s.title))
                .unwrap_or_else(|| id.to_string()),
            count,
        })
        .collect()
}
