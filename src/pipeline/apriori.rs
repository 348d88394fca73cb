use std::collections::{HashMap, HashSet};

use serde::Serialize;

/// One-hot item/transaction matrix stored as sorted item-id lists per transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Baskets {
    pub items: Vec<String>,
    pub transactions: Vec<Vec<u32>>,
}

impl Baskets {
    pub fn n_transactions(&self) -> usize {
        self.transactions.len()
    }

    pub fn label(&self, id: u32) -> &str {
        self.items.get(id as usize).map(|s| s.as_str()).unwrap_or("")
    }

    pub fn labels(&self, ids: &[u32]) -> Vec<String> {
        ids.iter().map(|&id| self.label(id).to_string()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequentItemset {
    pub items: Vec<u32>,
    pub count: usize,
    pub support: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub antecedent: Vec<u32>,
    pub consequent: Vec<u32>,
    pub antecedent_support: f64,
    pub consequent_support: f64,
    pub support: f64,
    pub confidence: f64,
    pub lift: f64,
    pub leverage: f64,
    /// `None` when confidence is 1 (infinite conviction).
    pub conviction: Option<f64>,
}

/// Level-wise Apriori with subset pruning and transaction-list intersection.
pub fn apriori(baskets: &Baskets, min_support: f64, max_len: Option<usize>) -> Vec<FrequentItemset> {
    let n = baskets.n_transactions();
    if n == 0 || baskets.items.is_empty() {
        return Vec::new();
    }
    let max_len = max_len.unwrap_or(usize::MAX);
    let support_of = |count: usize| count as f64 / n as f64;

    let mut tids: Vec<Vec<u32>> = vec![Vec::new(); baskets.items.len()];
    for (t, items) in baskets.transactions.iter().enumerate() {
        for &item in items {
            if let Some(list) = tids.get_mut(item as usize) {
                list.push(t as u32);
            }
        }
    }

    let mut out = Vec::new();
    let mut level: Vec<(Vec<u32>, Vec<u32>)> = Vec::new();
    for (item, list) in tids.into_iter().enumerate() {
        if !list.is_empty() && support_of(list.len()) >= min_support {
            level.push((vec![item as u32], list));
        }
    }

    let mut k = 1usize;
    while !level.is_empty() {
        for (items, list) in &level {
            out.push(FrequentItemset {
                items: items.clone(),
                count: list.len(),
                support: support_of(list.len()),
            });
        }
        if k >= max_len {
            break;
        }

        let known = level
            .iter()
            .map(|(items, _)| items.clone())
            .collect::<HashSet<_>>();
        let mut next = Vec::new();
        for i in 0..level.len() {
            for j in (i + 1)..level.len() {
                let (a, a_tids) = &level[i];
                let (b, b_tids) = &level[j];
                if a[..k - 1] != b[..k - 1] {
                    // level is sorted lexicographically, so no later j shares the prefix
                    break;
                }
                let mut candidate = a.clone();
                candidate.push(b[k - 1]);
                if !all_subsets_known(&candidate, &known) {
                    continue;
                }
                let joined = intersect_sorted(a_tids, b_tids);
                if !joined.is_empty() && support_of(joined.len()) >= min_support {
                    next.push((candidate, joined));
                }
            }
        }
        level = next;
        k += 1;
    }
    out
}

fn all_subsets_known(candidate: &[u32], known: &HashSet<Vec<u32>>) -> bool {
    if candidate.len() <= 2 {
        return true;
    }
    (0..candidate.len()).all(|skip| {
        let subset = candidate
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != skip)
            .map(|(_, &v)| v)
            .collect::<Vec<_>>();
        known.contains(&subset)
    })
}

pub fn intersect_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0usize, 0usize);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Every split of every frequent itemset (size >= 2) whose confidence meets `min_confidence`.
pub fn association_rules(itemsets: &[FrequentItemset], min_confidence: f64) -> Vec<Rule> {
    let support = itemsets
        .iter()
        .map(|s| (s.items.clone(), s.support))
        .collect::<HashMap<_, _>>();

    let mut rules = Vec::new();
    for set in itemsets.iter().filter(|s| s.items.len() >= 2) {
        let len = set.items.len();
        if len >= 64 {
            continue;
        }
        for mask in 1u64..((1u64 << len) - 1) {
            let mut antecedent = Vec::new();
            let mut consequent = Vec::new();
            for (bit, &item) in set.items.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    antecedent.push(item);
                } else {
                    consequent.push(item);
                }
            }
            let (Some(&sa), Some(&sc)) = (support.get(&antecedent), support.get(&consequent))
            else {
                continue;
            };
            if sa <= 0.0 || sc <= 0.0 {
                continue;
            }
            let confidence = set.support / sa;
            if confidence < min_confidence {
                continue;
            }
            let conviction = if confidence >= 1.0 {
                None
            } else {
                Some((1.0 - sc) / (1.0 - confidence))
            };
            rules.push(Rule {
                antecedent,
                consequent,
                antecedent_support: sa,
                consequent_support: sc,
                support: set.support,
                confidence,
                lift: confidence / sc,
                leverage: set.support - sa * sc,
                conviction,
            });
        }
    }
    rules
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/apriori.rs"]
mod tests;
