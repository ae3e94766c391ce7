use rand::{rngs::SmallRng, SeedableRng};

/// Small RNG that is reproducible when a seed is given and entropy-seeded otherwise.
#[derive(Debug)]
pub struct MaybeSeededRng {
    pub seed: Option<u64>,
    rng: SmallRng,
}

impl MaybeSeededRng {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = if let Some(seed) = seed {
            SmallRng::seed_from_u64(seed)
        } else {
            SmallRng::from_os_rng()
        };

        Self { seed, rng }
    }

    pub fn get_rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn seeded_is_reproducible() {
        let mut a = MaybeSeededRng::new(Some(1234));
        let mut b = MaybeSeededRng::new(Some(1234));
        let xs: Vec<f64> = (0..5).map(|_| a.get_rng().random()).collect();
        let ys: Vec<f64> = (0..5).map(|_| b.get_rng().random()).collect();
        assert_eq!(xs, ys);
        assert_eq!(a.seed, Some(1234));
    }
}
