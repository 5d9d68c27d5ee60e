//! Seedable randomness shared by agents and the conductor.
//!
//! Every draw goes through [`Randomness`] so a whole performance is reproducible
//! from one seed.

use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const GRAD_2D: [[f32; 2]; 8] = [
    [1.0, 1.0],
    [-1.0, 1.0],
    [1.0, -1.0],
    [-1.0, -1.0],
    [1.0, 0.0],
    [-1.0, 0.0],
    [0.0, 1.0],
    [0.0, -1.0],
];

#[derive(Debug, Clone)]
pub struct Randomness {
    rng: SmallRng,
    perm: Option<Box<[u8; 512]>>,
}

impl Randomness {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            perm: None,
        }
    }

    /// Derive an independent stream, e.g. one per agent.
    pub fn fork(&mut self, salt: u64) -> Self {
        let seed = self.rng.random::<u64>() ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        Self::from_seed(seed)
    }

    /// Uniform in [0, 1).
    pub fn random(&mut self) -> f32 {
        self.rng.random::<f32>()
    }

    /// Uniform in [min, max); returns `min` when the range is empty.
    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        if max <= min {
            return min;
        }
        min + self.random() * (max - min)
    }

    /// Uniform integer in [min, max] inclusive.
    pub fn range_int(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        self.rng.random_range(min..=max)
    }

    pub fn chance(&mut self, probability: f32) -> bool {
        self.random() < probability
    }

    pub fn choice<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.rng.random_range(0..items.len());
        items.get(idx)
    }

    /// Pick one value with probability proportional to its weight.
    ///
    /// Non-positive or non-finite weights are treated as zero; if nothing has
    /// weight the last item is returned.
    pub fn weighted_choice<T: Copy>(&mut self, items: &[(T, f32)]) -> Option<T> {
        let last = items.last()?.0;
        let weights = items
            .iter()
            .map(|(_, w)| if w.is_finite() && *w > 0.0 { *w } else { 0.0 });
        match WeightedIndex::new(weights) {
            Ok(dist) => Some(items[dist.sample(&mut self.rng)].0),
            Err(_) => Some(last),
        }
    }

    /// Normal sample via Box-Muller.
    pub fn gaussian(&mut self, mean: f32, std_dev: f32) -> f32 {
        // 1 - U keeps u1 in (0, 1] so ln never sees zero.
        let u1 = 1.0 - self.random();
        let u2 = self.random();
        let z0 = (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos();
        z0 * std_dev + mean
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }

    fn perm(&mut self) -> &[u8; 512] {
        let rng = &mut self.rng;
        self.perm.get_or_insert_with(|| {
            let mut base: Vec<u8> = (0..=255u8).collect();
            base.shuffle(rng);
            let mut table = Box::new([0u8; 512]);
            for (i, slot) in table.iter_mut().enumerate() {
                *slot = base[i & 255];
            }
            table
        })
    }

    fn fade(t: f32) -> f32 {
        t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
    }

    fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a + t * (b - a)
    }

    /// 1D gradient noise in [-1, 1].
    pub fn perlin1d(&mut self, x: f32) -> f32 {
        let perm = self.perm();
        let xi = (x.floor() as i64 & 255) as usize;
        let xf = x - x.floor();
        let u = Self::fade(xf);
        let g = |hash: u8, x: f32| if hash & 1 == 0 { x } else { -x };
        Self::lerp(g(perm[xi], xf), g(perm[xi + 1], xf - 1.0), u)
    }

    /// 2D gradient noise, roughly in [-1, 1].
    pub fn perlin2d(&mut self, x: f32, y: f32) -> f32 {
        let perm = self.perm();
        let xi = (x.floor() as i64 & 255) as usize;
        let yi = (y.floor() as i64 & 255) as usize;
        let xf = x - x.floor();
        let yf = y - y.floor();
        let u = Self::fade(xf);
        let v = Self::fade(yf);

        let aa = perm[perm[xi] as usize + yi];
        let ab = perm[perm[xi] as usize + yi + 1];
        let ba = perm[perm[xi + 1] as usize + yi];
        let bb = perm[perm[xi + 1] as usize + yi + 1];

        let grad = |hash: u8, x: f32, y: f32| {
            let g = GRAD_2D[(hash & 7) as usize];
            g[0] * x + g[1] * y
        };
        let x1 = Self::lerp(grad(aa, xf, yf), grad(ba, xf - 1.0, yf), u);
        let x2 = Self::lerp(grad(ab, xf, yf - 1.0), grad(bb, xf - 1.0, yf - 1.0), u);
        Self::lerp(x1, x2, v)
    }

    /// Fractal Brownian motion over `octaves` layers of 2D noise, normalized.
    pub fn fbm(&mut self, x: f32, y: f32, octaves: u32, persistence: f32) -> f32 {
        let mut total = 0.0;
        let mut frequency = 1.0;
        let mut amplitude = 1.0;
        let mut max_value = 0.0;
        for _ in 0..octaves.max(1) {
            total += self.perlin2d(x * frequency, y * frequency) * amplitude;
            max_value += amplitude;
            amplitude *= persistence;
            frequency *= 2.0;
        }
        total / max_value
    }

    /// Slowly varying value in [min, max] driven by 1D noise.
    pub fn smooth_value(&mut self, time: f32, speed: f32, min: f32, max: f32) -> f32 {
        let n = (self.perlin1d(time * speed) + 1.0) * 0.5;
        min + n * (max - min)
    }
}
