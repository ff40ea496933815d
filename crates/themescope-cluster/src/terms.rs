//! Class-based TF-IDF over tokenized documents.
//!
//! Each cluster is treated as one large document. A term scores
//! `tf(t, c) / |c| * ln(1 + A / f(t))` where `|c|` is the class token count,
//! `A` the average class token count and `f(t)` the term's frequency across
//! all classes. The noise group takes part as a class so that terms common in
//! noise are penalised everywhere.

use std::collections::{BTreeMap, HashMap};

/// Top `top_n` terms for each class in `classes`.
///
/// `tokens[i]` holds the tokens of document `i`; `classes` lists member
/// indices per cluster. Terms whose relative frequency in `noise` exceeds
/// `noise_ratio` times their relative frequency in the class are skipped.
/// Ties are broken alphabetically.
pub fn class_top_terms(
    tokens: &[Vec<String>],
    classes: &[Vec<usize>],
    noise: &[usize],
    top_n: usize,
    noise_ratio: f64,
) -> Vec<Vec<String>> {
    let class_counts: Vec<(BTreeMap<&str, usize>, usize)> = classes
        .iter()
        .map(|members| count_terms(tokens, members))
        .collect();
    let (noise_tf, noise_total) = count_terms(tokens, noise);

    let mut global: HashMap<&str, usize> = HashMap::new();
    for tf in class_counts.iter().map(|(tf, _)| tf).chain(std::iter::once(&noise_tf)) {
        for (term, n) in tf {
            *global.entry(*term).or_default() += n;
        }
    }

    let class_sizes: Vec<usize> = class_counts
        .iter()
        .map(|(_, total)| *total)
        .chain((noise_total > 0).then_some(noise_total))
        .collect();
    let avg_len = if class_sizes.is_empty() {
        0.0
    } else {
        class_sizes.iter().sum::<usize>() as f64 / class_sizes.len() as f64
    };

    class_counts
        .iter()
        .map(|(tf, total)| {
            if *total == 0 {
                return Vec::new();
            }
            let mut scored: Vec<(f64, &str)> = tf
                .iter()
                .filter(|(term, n)| {
                    let in_noise = noise_tf.get(*term).copied().unwrap_or(0);
                    if in_noise == 0 || noise_total == 0 {
                        return true;
                    }
                    let rel_noise = in_noise as f64 / noise_total as f64;
                    let rel_class = **n as f64 / *total as f64;
                    rel_noise <= noise_ratio * rel_class
                })
                .map(|(term, n)| {
                    let f = global.get(term).copied().unwrap_or(1).max(1) as f64;
                    let score = (*n as f64 / *total as f64) * (1.0 + avg_len / f).ln();
                    (score, *term)
                })
                .collect();
            scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
            scored
                .into_iter()
                .take(top_n)
                .map(|(_, t)| t.to_string())
                .collect()
        })
        .collect()
}

fn count_terms<'a>(tokens: &'a [Vec<String>], members: &[usize]) -> (BTreeMap<&'a str, usize>, usize) {
    let mut tf: BTreeMap<&str, usize> = BTreeMap::new();
    let mut total = 0usize;
    for &i in members {
        for t in tokens.get(i).into_iter().flatten() {
            *tf.entry(t.as_str()).or_default() += 1;
            total += 1;
        }
    }
    (tf, total)
}
