//! Beam search with optional stochastic candidate selection.
//!
//! The search is independent of the network: a `step` closure receives the
//! live decoder sequences and returns next-token logits for each of them.
//! Scores are cumulative log-probabilities; finished hypotheses are ranked by
//! score divided by length.

use anyhow::{Result, anyhow, ensure};
use rand::Rng;

use crate::models::traits::GenerationParams;

#[derive(Debug, Clone)]
struct Hypothesis {
    tokens: Vec<u32>,
    score: f64,
}

impl Hypothesis {
    fn normalized_score(&self) -> f64 {
        self.score / self.tokens.len().max(1) as f64
    }
}

/// Keeps the best `capacity` finished hypotheses.
struct FinishedPool {
    capacity: usize,
    hypotheses: Vec<Hypothesis>,
}

impl FinishedPool {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            hypotheses: Vec::with_capacity(capacity + 1),
        }
    }

    fn push(&mut self, hypothesis: Hypothesis) {
        self.hypotheses.push(hypothesis);
        sort_best_first(&mut self.hypotheses);
        self.hypotheses.truncate(self.capacity);
    }

    fn worst_score(&self) -> f64 {
        self.hypotheses
            .last()
            .map(Hypothesis::normalized_score)
            .unwrap_or(f64::NEG_INFINITY)
    }

    /// No running beam can beat the finished ones any more.
    fn is_done(&self, best_running_score: f64, cur_len: usize) -> bool {
        self.hypotheses.len() >= self.capacity
            && self.worst_score() >= best_running_score / cur_len.max(1) as f64
    }
}

fn sort_best_first(hypotheses: &mut [Hypothesis]) {
    hypotheses.sort_by(|a, b| b.normalized_score().total_cmp(&a.normalized_score()));
}

/// Runs beam search and returns `num_return_sequences` sequences best-first,
/// without the decoder start token.
pub fn beam_sample<F, R>(
    params: &GenerationParams,
    start_token: u32,
    eos_token: u32,
    mut step: F,
    rng: &mut R,
) -> Result<Vec<Vec<u32>>>
where
    F: FnMut(&[Vec<u32>]) -> Result<Vec<Vec<f32>>>,
    R: Rng + ?Sized,
{
    let num_beams = params.num_beams;
    ensure!(num_beams >= 1, "num_beams must be at least 1");
    ensure!(
        params.num_return_sequences >= 1,
        "num_return_sequences must be at least 1"
    );
    ensure!(
        params.num_return_sequences <= num_beams,
        "num_return_sequences ({}) has to be smaller or equal to num_beams ({})",
        params.num_return_sequences,
        num_beams
    );
    ensure!(
        params.temperature.is_finite() && params.temperature > 0.0,
        "temperature must be a strictly positive float, got {}",
        params.temperature
    );

    let mut running = vec![Hypothesis {
        tokens: vec![start_token],
        score: 0.0,
    }];
    let mut finished = FinishedPool::new(num_beams);

    while !running.is_empty() && running[0].tokens.len() < params.max_length.max(2) {
        let sequences: Vec<Vec<u32>> = running.iter().map(|h| h.tokens.clone()).collect();
        let logits = step(&sequences)?;
        ensure!(
            logits.len() == running.len(),
            "model returned logits for {} sequences, expected {}",
            logits.len(),
            running.len()
        );

        let mut candidates = Vec::new();
        for (beam, row) in logits.iter().enumerate() {
            let log_probs = log_softmax(row);
            let base = running[beam].score;
            candidates.extend(
                log_probs
                    .into_iter()
                    .enumerate()
                    .filter(|(_, lp)| lp.is_finite())
                    .map(|(token, lp)| (beam, token as u32, base + lp)),
            );
        }
        ensure!(!candidates.is_empty(), "model produced no finite logits");

        let picks = if params.do_sample {
            sample_candidates(&candidates, 2 * num_beams, params.temperature, rng)
        } else {
            top_candidates(&candidates, 2 * num_beams)
        };

        let mut next = Vec::with_capacity(num_beams);
        for (rank, (beam, token, score)) in picks.into_iter().enumerate() {
            let mut tokens = running[beam].tokens.clone();
            tokens.push(token);
            if token == eos_token {
                if rank < num_beams {
                    finished.push(Hypothesis { tokens, score });
                }
                continue;
            }
            next.push(Hypothesis { tokens, score });
            if next.len() == num_beams {
                break;
            }
        }

        running = next;
        let best_running = running
            .iter()
            .map(|h| h.score)
            .fold(f64::NEG_INFINITY, f64::max);
        let cur_len = running.first().map(|h| h.tokens.len()).unwrap_or(0);
        if finished.is_done(best_running, cur_len) {
            break;
        }
    }

    let mut pool = finished.hypotheses;
    pool.extend(running);
    sort_best_first(&mut pool);

    if pool.len() < params.num_return_sequences {
        return Err(anyhow!(
            "beam search produced {} sequences, expected {}",
            pool.len(),
            params.num_return_sequences
        ));
    }

    Ok(pool
        .into_iter()
        .take(params.num_return_sequences)
        .map(|mut h| {
            h.tokens.remove(0);
            h.tokens
        })
        .collect())
}

fn log_softmax(logits: &[f32]) -> Vec<f64> {
    let max = logits
        .iter()
        .copied()
        .map(f64::from)
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return vec![f64::NEG_INFINITY; logits.len()];
    }
    let sum: f64 = logits.iter().map(|&l| (f64::from(l) - max).exp()).sum();
    let log_sum = sum.ln() + max;
    logits.iter().map(|&l| f64::from(l) - log_sum).collect()
}

fn top_candidates(candidates: &[(usize, u32, f64)], k: usize) -> Vec<(usize, u32, f64)> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| b.2.total_cmp(&a.2));
    sorted.truncate(k);
    sorted
}

/// Draws `k` distinct candidates with probability proportional to
/// `exp(score / temperature)` (Efraimidis-Spirakis keys), returned best score
/// first.
fn sample_candidates<R: Rng + ?Sized>(
    candidates: &[(usize, u32, f64)],
    k: usize,
    temperature: f64,
    rng: &mut R,
) -> Vec<(usize, u32, f64)> {
    let max = candidates
        .iter()
        .map(|c| c.2 / temperature)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut keyed: Vec<(f64, (usize, u32, f64))> = candidates
        .iter()
        .map(|&candidate| {
            let weight = (candidate.2 / temperature - max).exp();
            let u: f64 = rng.random::<f64>();
            let key = if weight > 0.0 {
                u.ln() / weight
            } else {
                f64::NEG_INFINITY
            };
            (key, candidate)
        })
        .collect();

    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
    keyed.truncate(k);

    let mut picks: Vec<(usize, u32, f64)> = keyed.into_iter().map(|(_, c)| c).collect();
    picks.sort_by(|a, b| b.2.total_cmp(&a.2));
    picks
}
