//! Stage alignment between two pipeline runs.
//!
//! Stage numbering can shift between pipeline versions, so stages are
//! matched by stage name, not by number: pl1's stages are walked in numeric
//! order and each takes the first not-yet-claimed pl2 stage with an
//! identical name. Matches are greedy and consumed; unmatched stages on
//! either side are dropped from the comparison.

use plstat_model::{Group, Node};
use tracing::warn;

/// Stage numbers of a STAGE group in numeric order.
///
/// Non-numeric keys sort after numeric ones, lexically.
pub fn ordered_stage_numbers(stages: &Group) -> Vec<&String> {
    let mut numbers: Vec<&String> = stages.keys().collect();
    numbers.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    });
    numbers
}

fn stage_name(stages: &Group, number: &str) -> Option<String> {
    stages
        .get(number)?
        .as_group()?
        .get("stage_name")?
        .as_leaf()?
        .value
        .as_str()
        .map(String::from)
}

/// Build the stage map: pairs of (pl1 stage number, pl2 stage number)
/// matched by stage name.
///
/// Repeated stage names (e.g. hif_makeimages) pair up in numeric order on
/// both sides; no pl2 stage is matched twice.
pub fn stage_map(stages1: &Group, stages2: &Group) -> Vec<(String, String)> {
    let numbers2 = ordered_stage_numbers(stages2);
    let mut claimed = vec![false; numbers2.len()];
    let mut map = Vec::new();

    for n1 in ordered_stage_numbers(stages1) {
        let Some(name1) = stage_name(stages1, n1) else {
            warn!(stage = %n1, "stage without a name, skipping");
            continue;
        };
        let matched = numbers2.iter().enumerate().find(|(i, n2)| {
            !claimed[*i] && stage_name(stages2, n2).as_deref() == Some(name1.as_str())
        });
        match matched {
            Some((i, n2)) => {
                claimed[i] = true;
                map.push((n1.clone(), (*n2).clone()));
            }
            None => warn!(stage = %n1, name = %name1, "stage has no counterpart, skipping"),
        }
    }
    map
}
