// ============================================================
// Layer 7 — Cross-Recurrence and Qmax
// ============================================================
// Two chroma sequences → one alignment distance.
//
//   1. OTI: rotate the second sequence's pitch classes so its
//      global profile best matches the first (key invariance)
//   2. delay-embed both sequences (embed_dim frames, tau apart)
//   3. cross-recurrence plot: cell (i, j) is set when j is among
//      the kappa-fraction nearest neighbours of i AND i is among
//      those of j
//   4. Qmax: longest curved diagonal through the plot, paying
//      gap_onset to open and gap_extension to extend a gap
//   5. distance = sqrt(columns) / Qmax

use ndarray::{Array1, Array2, Axis};

use crate::similarity::chroma::N_CHROMA;

#[derive(Debug, Clone, Copy)]
pub struct QmaxParams {
    pub embed_dim:     usize,
    pub tau:           usize,
    pub kappa:         f64,
    pub gap_onset:     f32,
    pub gap_extension: f32,
}

impl Default for QmaxParams {
    fn default() -> Self {
        Self { embed_dim: 9, tau: 1, kappa: 0.095, gap_onset: 5.0, gap_extension: 0.5 }
    }
}

/// Summed profile scaled to a peak of 1.
fn global_profile(chroma: &Array2<f32>) -> Array1<f32> {
    let sum  = chroma.sum_axis(Axis(0));
    let peak = sum.fold(0.0f32, |m, &v| m.max(v));
    if peak > f32::EPSILON { sum / peak } else { sum }
}

/// Optimal transposition index: the rotation of `b` that best
/// matches `a`'s global profile.
pub fn oti(a: &Array2<f32>, b: &Array2<f32>) -> usize {
    let ga = global_profile(a);
    let gb = global_profile(b);
    (0..N_CHROMA)
        .map(|shift| {
            let score: f32 = (0..N_CHROMA).map(|j| ga[j] * gb[(j + N_CHROMA - shift) % N_CHROMA]).sum();
            (shift, score)
        })
        .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best })
        .0
}

/// Rotate pitch classes right by `shift`.
pub fn transpose(chroma: &Array2<f32>, shift: usize) -> Array2<f32> {
    Array2::from_shape_fn(chroma.raw_dim(), |(i, j)| chroma[[i, (j + N_CHROMA - shift) % N_CHROMA]])
}

/// Stack `dim` frames `tau` apart into one row per time step.
pub fn embed(chroma: &Array2<f32>, dim: usize, tau: usize) -> Array2<f32> {
    let span = (dim.max(1) - 1) * tau;
    let rows = chroma.nrows().saturating_sub(span);
    let cols = chroma.ncols();
    Array2::from_shape_fn((rows, cols * dim.max(1)), |(i, k)| chroma[[i + (k / cols) * tau, k % cols]])
}

/// Value at rank `k` (0-based) of `values`.
fn kth_smallest(mut values: Vec<f32>, k: usize) -> f32 {
    let (_, v, _) = values.select_nth_unstable_by(k, |a, b| a.total_cmp(b));
    *v
}

fn neighbour_count(kappa: f64, n: usize) -> usize {
    ((kappa * n as f64).round() as usize).clamp(1, n)
}

/// Binary cross-recurrence plot of two embedded sequences.
pub fn cross_recurrence(a: &Array2<f32>, b: &Array2<f32>, kappa: f64) -> Array2<bool> {
    let (n, m) = (a.nrows(), b.nrows());
    if n == 0 || m == 0 {
        return Array2::from_elem((n, m), false);
    }

    let dist = Array2::from_shape_fn((n, m), |(i, j)| {
        a.row(i)
            .iter()
            .zip(b.row(j))
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    });

    let k_row = neighbour_count(kappa, m) - 1;
    let k_col = neighbour_count(kappa, n) - 1;
    let row_thr: Vec<f32> = dist.outer_iter().map(|r| kth_smallest(r.to_vec(), k_row)).collect();
    let col_thr: Vec<f32> = dist.axis_iter(Axis(1)).map(|c| kth_smallest(c.to_vec(), k_col)).collect();

    Array2::from_shape_fn((n, m), |(i, j)| {
        let d = dist[[i, j]];
        d <= row_thr[i] && d <= col_thr[j]
    })
}

/// Highest alignment score in the plot.
pub fn qmax(crp: &Array2<bool>, gap_onset: f32, gap_extension: f32) -> f32 {
    let (n, m) = crp.dim();
    let mut q  = Array2::<f32>::zeros((n, m));
    let gap    = |i: usize, j: usize| if crp[[i, j]] { gap_onset } else { gap_extension };

    let mut best = 0.0f32;
    for i in 2..n {
        for j in 2..m {
            let prev = [(i - 1, j - 1), (i - 2, j - 1), (i - 1, j - 2)];
            let score = if crp[[i, j]] {
                prev.iter().map(|&p| q[p]).fold(0.0f32, f32::max) + 1.0
            } else {
                prev.iter().map(|&p| q[p] - gap(p.0, p.1)).fold(0.0f32, f32::max)
            };
            q[[i, j]] = score;
            best = best.max(score);
        }
    }
    best
}

/// Distance between two chroma sequences; `None` when no two
/// frames align at all.
pub fn qmax_distance(original: &Array2<f32>, cover: &Array2<f32>, params: &QmaxParams) -> Option<f64> {
    let cover = transpose(cover, oti(original, cover));
    let a     = embed(original, params.embed_dim, params.tau);
    let b     = embed(&cover, params.embed_dim, params.tau);
    let crp   = cross_recurrence(&a, &b, params.kappa);
    let q     = qmax(&crp, params.gap_onset, params.gap_extension);
    (q > 0.0).then(|| (crp.ncols() as f64).sqrt() / q as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_chroma(seed: u64, frames: usize) -> Array2<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_fn((frames, N_CHROMA), |_| rng.gen::<f32>())
    }

    #[test]
    fn oti_recovers_a_transposition() {
        let a = random_chroma(1, 40);
        let b = transpose(&a, 5);
        // rotating b by the OTI must undo the shift
        assert_eq!(transpose(&b, oti(&a, &b)), a);
    }

    #[test]
    fn embedding_shape() {
        let e = embed(&random_chroma(2, 20), 9, 1);
        assert_eq!(e.dim(), (12, 108));
        assert_eq!(embed(&random_chroma(2, 5), 9, 1).nrows(), 0);
    }

    #[test]
    fn self_recurrence_contains_the_diagonal() {
        let a   = embed(&random_chroma(3, 30), 3, 1);
        let crp = cross_recurrence(&a, &a, 0.095);
        for i in 0..a.nrows() {
            assert!(crp[[i, i]]);
        }
    }

    #[test]
    fn qmax_counts_an_unbroken_diagonal() {
        let crp = Array2::from_shape_fn((10, 10), |(i, j)| i == j);
        assert_eq!(qmax(&crp, 5.0, 0.5), 8.0);
        assert_eq!(qmax(&Array2::from_elem((10, 10), false), 5.0, 0.5), 0.0);
    }

    #[test]
    fn identical_scores_closer_than_unrelated() {
        let params    = QmaxParams::default();
        let original  = random_chroma(10, 60);
        let same      = qmax_distance(&original, &original, &params).unwrap();
        let unrelated = qmax_distance(&original, &random_chroma(99, 60), &params);

        assert!(same < 0.5, "self distance {same}");
        assert!(unrelated.map_or(true, |d| d > same));
    }

    #[test]
    fn transposed_cover_matches_like_the_original() {
        let params   = QmaxParams::default();
        let original = random_chroma(7, 50);
        let same     = qmax_distance(&original, &original, &params).unwrap();
        let shifted  = qmax_distance(&original, &transpose(&original, 3), &params).unwrap();
        assert!((same - shifted).abs() < 1e-9);
    }
}
