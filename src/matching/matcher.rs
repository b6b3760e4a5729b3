use crate::matching::similarity::{normalize_title, token_set_ratio};
use crate::types::{CompSet, Listing, MatchRow, NO_CANDIDATES};

/// Score every live listing against the comp set. One row per listing.
pub fn match_live(live: &[Listing], comps: &CompSet, sim_threshold: u8) -> Vec<MatchRow> {
    live.iter()
        .map(|listing| match_one(listing, comps, sim_threshold))
        .collect()
}

pub fn match_one(listing: &Listing, comps: &CompSet, sim_threshold: u8) -> MatchRow {
    let title = normalize_title(&listing.title);

    // Strict `>` keeps the first exemplar on ties.
    let mut best_key: Option<&str> = None;
    let mut best_score = NO_CANDIDATES;
    for comp in comps.iter() {
        let score = token_set_ratio(&title, &comp.key_title);
        if score > best_score {
            best_key = Some(&comp.key_title);
            best_score = score;
        }
    }

    let comp = best_key
        .filter(|_| best_score >= f64::from(sim_threshold))
        .and_then(|key| comps.get(key));

    let (discount_vs_avg_pct, discount_vs_median_pct) = match comp {
        Some(c) if c.avg_price > 0.0 => (
            Some(discount_pct(listing.price, c.avg_price)),
            (c.median_price > 0.0).then(|| discount_pct(listing.price, c.median_price)),
        ),
        _ => (None, None),
    };

    MatchRow {
        source: listing.source.clone(),
        title: listing.title.clone(),
        url: listing.url.clone(),
        price: listing.price,
        currency: listing.currency.clone(),
        best_match_key: best_key.map(str::to_string),
        similarity: best_score,
        avg_price: comp.map(|c| c.avg_price),
        median_price: comp.map(|c| c.median_price),
        comp_count: comp.map(|c| c.count).unwrap_or(0),
        discount_vs_avg_pct,
        discount_vs_median_pct,
    }
}

/// `100 · (1 − price / baseline)`, rounded to 2 decimal places.
pub fn discount_pct(price: f64, baseline: f64) -> f64 {
    round2(100.0 * (1.0 - price / baseline))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
