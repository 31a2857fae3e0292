/// Cosine similarity between two vectors
///
/// Returns 0.0 when the lengths differ or either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Highest-scoring corpus entry for a query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestMatch {
    pub index: usize,
    pub score: f32,
}

/// Arg-max of cosine similarity over `candidates`
///
/// The earliest candidate wins ties and NaN scores never win. Returns `None`
/// only when there are no candidates.
pub fn best_match(query: &[f32], candidates: &[Vec<f32>]) -> Option<BestMatch> {
    let mut best: Option<BestMatch> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        let score = cosine_similarity(query, candidate);
        match best {
            None => best = Some(BestMatch { index, score }),
            Some(current) if score > current.score || (current.score.is_nan() && !score.is_nan()) => {
                best = Some(BestMatch { index, score })
            }
            _ => {}
        }
    }

    best
}

/// All candidates ordered by descending similarity
///
/// The sort is stable, so equal scores keep corpus order.
pub fn rank(query: &[f32], candidates: &[Vec<f32>]) -> Vec<BestMatch> {
    let mut ranked: Vec<BestMatch> = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| BestMatch {
            index,
            score: cosine_similarity(query, candidate),
        })
        .collect();

    ranked.sort_by(|a, b| match (a.score.is_nan(), b.score.is_nan()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => b
            .score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal),
    });
    ranked
}
