//! Shuffle helpers for the context sequence.
//!
//! All randomness goes through a seedable [`StdRng`] owned by the engine so tests can
//! pin the permutation.

use rand::Rng;
use rand::rngs::StdRng;

use echo_types::Track;

/// In-place Fisher–Yates shuffle.
pub fn fisher_yates<T>(items: &mut [T], rng: &mut StdRng) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// Shuffle a collection for playback starting at `start`: the start track is placed
/// first and the rest follow in random order.
pub fn shuffled_from(tracks: &[Track], start: usize, rng: &mut StdRng) -> Vec<Track> {
    let mut out = Vec::with_capacity(tracks.len());
    if tracks.is_empty() {
        return out;
    }
    let start = start.min(tracks.len() - 1);
    out.push(tracks[start].clone());
    let mut rest: Vec<Track> = tracks
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != start)
        .map(|(_, track)| track.clone())
        .collect();
    fisher_yates(&mut rest, rng);
    out.extend(rest);
    out
}

/// Fresh permutation of `original` for refilling a shuffled context.
///
/// Avoids starting the refill with `avoid` so the same track never plays twice in a row
/// across the seam.
pub fn refill_batch(original: &[Track], avoid: Option<&Track>, rng: &mut StdRng) -> Vec<Track> {
    let mut batch = original.to_vec();
    fisher_yates(&mut batch, rng);
    if batch.len() > 1 {
        if let Some(avoid) = avoid {
            if batch[0].id == avoid.id {
                let swap_with = rng.gen_range(1..batch.len());
                batch.swap(0, swap_with);
            }
        }
    }
    batch
}
