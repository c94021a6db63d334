use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

/// Random layer for a new HNSW node: floor(-ln(uniform(0,1)) * ml).
pub(crate) fn generate_random_level(ml: f64, rng: &mut impl Rng) -> usize {
    // Avoid exactly 0 for ln
    let uniform_random: f64 = rng.gen_range(f64::EPSILON..=1.0);
    (-uniform_random.ln() * ml).floor() as usize
}

/// Creates a seeded random number generator or an entropy-seeded one.
pub(crate) fn create_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Cuts `text` to at most `max_chars` characters without splitting a code point.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_reproducible_with_seed() {
        let mut a = create_rng(Some(7));
        let mut b = create_rng(Some(7));
        let la: Vec<usize> = (0..32).map(|_| generate_random_level(0.5, &mut a)).collect();
        let lb: Vec<usize> = (0..32).map(|_| generate_random_level(0.5, &mut b)).collect();
        assert_eq!(la, lb);
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("héllo wörld", 4), "héll");
        assert_eq!(preview("short", 500), "short");
    }
}
