use std::collections::BTreeSet;

/// Collapse runs of whitespace, trim, lower-case.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Token-set similarity on a 0–100 scale.
///
/// Both strings are split on whitespace into token sets. If the sets intersect
/// and one is a subset of the other the score is 100. Otherwise the score is the
/// best normalized indel similarity among `sect` vs `sect+diff_ab`,
/// `sect` vs `sect+diff_ba` and `sect+diff_ab` vs `sect+diff_ba`, where the
/// differences are joined in sorted order. Token order and repeated tokens do
/// not affect the result.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let sect: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let diff_ab: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let diff_ba: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    if !sect.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 100.0;
    }

    let diff_ab_joined = diff_ab.join(" ");
    let diff_ba_joined = diff_ba.join(" ");
    let ab_len = diff_ab_joined.chars().count();
    let ba_len = diff_ba_joined.chars().count();
    let sect_len = sect.join(" ").chars().count();

    // Lengths of "sect diff_ab" and "sect diff_ba"; the separator only exists
    // when the intersection is non-empty.
    let sep = usize::from(sect_len != 0);
    let sect_ab_len = sect_len + sep + ab_len;
    let sect_ba_len = sect_len + sep + ba_len;

    // The shared prefix cancels out, so the indel distance between the two
    // combined strings equals the distance between the two differences.
    let dist = indel_distance(&diff_ab_joined, &diff_ba_joined);
    let result = norm_similarity(dist, sect_ab_len + sect_ba_len);
    if sect_len == 0 {
        return result;
    }

    // `sect` vs `sect diff_x` differs only by the appended suffix.
    let sect_ab_ratio = norm_similarity(sep + ab_len, sect_len + sect_ab_len);
    let sect_ba_ratio = norm_similarity(sep + ba_len, sect_len + sect_ba_len);

    result.max(sect_ab_ratio).max(sect_ba_ratio)
}

fn norm_similarity(dist: usize, len_sum: usize) -> f64 {
    if len_sum == 0 {
        return 100.0;
    }
    100.0 * (1.0 - dist as f64 / len_sum as f64)
}

/// Insertions + deletions needed to turn `a` into `b`: `|a| + |b| - 2·LCS(a, b)`.
fn indel_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return a.len() + b.len();
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in &a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let lcs = prev[b.len()];
    a.len() + b.len() - 2 * lcs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn normalize_collapses_and_lowercases() {
        assert_eq!(normalize_title("  Boss   DS-1\tDistortion \n"), "boss ds-1 distortion");
        assert_eq!(normalize_title(""), "");
    }

    #[test]
    fn identical_and_reordered_titles_score_100() {
        assert_eq!(token_set_ratio("widget a", "widget a"), 100.0);
        assert_eq!(token_set_ratio("a widget", "widget a"), 100.0);
        assert_eq!(token_set_ratio("widget widget a", "widget a"), 100.0);
    }

    #[test]
    fn subset_scores_100() {
        assert_eq!(token_set_ratio("rtx 3060", "rtx 3060 12gb gaming"), 100.0);
    }

    #[test]
    fn punctuation_variant_scores_high() {
        // sect="widget", ab="a!!", ba="a" → 100·(1 − 2/18)
        assert!(approx(token_set_ratio("widget a!!", "widget a"), 88.89));
    }

    #[test]
    fn disjoint_tokens_score_low() {
        assert!(token_set_ratio("nintendo switch", "dewalt drill") < 40.0);
    }

    #[test]
    fn empty_input_scores_zero() {
        assert_eq!(token_set_ratio("", "widget"), 0.0);
        assert_eq!(token_set_ratio("   ", "widget"), 0.0);
    }

    #[test]
    fn symmetric() {
        let pairs = [("boss ds-1 pedal", "boss ds-2 pedal"), ("gpu rtx", "rtx 3070 ti")];
        for (a, b) in pairs {
            assert!(approx(token_set_ratio(a, b), token_set_ratio(b, a)));
        }
    }

    #[test]
    fn indel_counts_insertions_and_deletions() {
        assert_eq!(indel_distance("abc", "abc"), 0);
        assert_eq!(indel_distance("a!!", "a"), 2);
        assert_eq!(indel_distance("abc", "xyz"), 6);
        assert_eq!(indel_distance("", "abc"), 3);
    }
}
