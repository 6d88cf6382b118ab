//! Vector similarity and Maximal Marginal Relevance selection.
//!
//! MMR = λ × similarity(query, doc) - (1-λ) × max(similarity(doc, selected))
//!
//! λ = 1.0: pure relevance, λ = 0.0: pure diversity.

/// Cosine similarity of two vectors; `0.0` when either has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Pick up to `k` of `candidates` by MMR and return their indices in
/// selection order. The first pick is always the candidate most similar to
/// the query; ties keep the earlier candidate.
pub fn maximal_marginal_relevance(
    query: &[f32],
    candidates: &[&[f32]],
    k: usize,
    lambda: f32,
) -> Vec<usize> {
    let k = k.min(candidates.len());
    if k == 0 {
        return Vec::new();
    }

    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(k);
    // highest similarity to anything selected so far, per candidate
    let mut redundancy = vec![f32::NEG_INFINITY; candidates.len()];

    while selected.len() < k {
        let mut best: Option<(usize, f32)> = None;

        for (i, &score) in relevance.iter().enumerate() {
            if selected.contains(&i) {
                continue;
            }
            let mmr = if selected.is_empty() {
                score
            } else {
                lambda * score - (1.0 - lambda) * redundancy[i]
            };
            if best.is_none_or(|(_, best_score)| mmr > best_score) {
                best = Some((i, mmr));
            }
        }

        let Some((picked, _)) = best else { break };
        selected.push(picked);

        for (i, candidate) in candidates.iter().enumerate() {
            let sim = cosine_similarity(candidates[picked], candidate);
            if sim > redundancy[i] {
                redundancy[i] = sim;
            }
        }
    }

    selected
}
