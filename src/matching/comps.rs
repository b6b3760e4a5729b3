use std::collections::HashMap;

use crate::matching::similarity::{normalize_title, token_set_ratio};
use crate::types::{Comp, CompSet, Listing};

/// Cluster sold listings into price baselines.
///
/// Single pass, greedy: each normalized title joins the *first* existing
/// exemplar scoring `>= sim_threshold`, otherwise it becomes a new exemplar.
/// Results depend on input order. Cost is O(n·k) for k exemplars.
pub fn compute_comps(listings: &[Listing], sim_threshold: u8) -> CompSet {
    let threshold = f64::from(sim_threshold);
    let mut exemplars: Vec<String> = Vec::new();
    let mut bins: HashMap<usize, Vec<f64>> = HashMap::new();

    for listing in listings {
        let title = normalize_title(&listing.title);
        let found = exemplars
            .iter()
            .position(|key| token_set_ratio(&title, key) >= threshold);
        let chosen = match found {
            Some(i) => i,
            None => {
                exemplars.push(title);
                exemplars.len() - 1
            }
        };
        bins.entry(chosen).or_default().push(listing.price);
    }

    exemplars
        .into_iter()
        .enumerate()
        .filter_map(|(i, key_title)| {
            let mut prices = bins.remove(&i)?;
            prices.sort_by(f64::total_cmp);
            Some(Comp {
                key_title,
                avg_price: mean(&prices),
                median_price: median_of_sorted(&prices),
                count: prices.len(),
            })
        })
        .collect()
}

fn mean(prices: &[f64]) -> f64 {
    if prices.is_empty() {
        return 0.0;
    }
    prices.iter().sum::<f64>() / prices.len() as f64
}

/// Middle value for odd counts, mean of the two central values for even counts.
pub fn median_of_sorted(prices: &[f64]) -> f64 {
    let n = prices.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => prices[n / 2],
        _ => (prices[n / 2 - 1] + prices[n / 2]) / 2.0,
    }
}
