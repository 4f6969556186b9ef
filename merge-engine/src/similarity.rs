//! String and position similarity measures used by fuzzy matching.
//!
//! Lengths are counted in `char`s, so multi-byte text compares the way it
//! reads. All measures return values in `[0, 1]`.

/// Edit distance with unit-cost insert, delete and substitute.
///
/// Two-row dynamic programming, O(n * m) time and O(m) space.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let n = a.len();
    let m = b.len();
    if n == 0 {
        return m;
    }
    if m == 0 {
        return n;
    }

    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr = vec![0usize; m + 1];
    for i in 1..=n {
        curr[0] = i;
        for j in 1..=m {
            let substitution = prev[j - 1] + usize::from(a[i - 1] != b[j - 1]);
            curr[j] = substitution.min(prev[j] + 1).min(curr[j - 1] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[m]
}

/// `1 - levenshtein / max_len`; both empty is 1.0, exactly one empty is 0.0.
pub fn content_similarity(a: &str, b: &str) -> f64 {
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    match (len_a, len_b) {
        (0, 0) => 1.0,
        (0, _) | (_, 0) => 0.0,
        _ => 1.0 - levenshtein(a, b) as f64 / len_a.max(len_b) as f64,
    }
}

/// `min_len / max_len`; both empty counts as equal length (1.0).
pub fn length_similarity(a: &str, b: &str) -> f64 {
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    match (len_a, len_b) {
        (0, 0) => 1.0,
        (0, _) | (_, 0) => 0.0,
        _ => len_a.min(len_b) as f64 / len_a.max(len_b) as f64,
    }
}

/// Fractional position of `index` in a list of `count` items.
///
/// Single-element (and empty) lists sit at 0.
pub fn relative_position(index: usize, count: usize) -> f64 {
    if count <= 1 {
        0.0
    } else {
        index as f64 / (count - 1) as f64
    }
}

/// `1 - |pos_a - pos_b|` of the two relative positions.
pub fn position_similarity(index_a: usize, count_a: usize, index_b: usize, count_b: usize) -> f64 {
    let pos_a = relative_position(index_a, count_a);
    let pos_b = relative_position(index_b, count_b);
    1.0 - (pos_a - pos_b).abs()
}
