use dyn_clone::DynClone;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Defines a space in which a action, observation, or other may exist
pub trait Space<T>: DynClone {
    /// tests whether the sample is contained within the space
    fn contains(&self, sample: &T) -> bool;

    /// randomly samples from the space
    fn sample(&mut self) -> T;

    /// returns some semantic representation of the space,
    /// e.g. the number of actions or the lower bound of a box
    fn shape(&self) -> T;

    /// reseeds the random generator used by `sample`
    fn seed(&mut self, seed: u64);
}

dyn_clone::clone_trait_object!(<T> Space<T>);

/// Defines a Discrete Space.
///
/// A Discrete space is a space on `usize` where samples
/// are drawn uniformly from `[0, n)`.
#[derive(Debug, Clone)]
pub struct Discrete {
    /// The upper bound on the space
    n: usize,
    rng: StdRng,
}

impl From<usize> for Discrete {
    fn from(value: usize) -> Self {
        Self {
            n: value,
            rng: StdRng::from_entropy(),
        }
    }
}

impl Space<usize> for Discrete {
    fn contains(&self, sample: &usize) -> bool {
        *sample < self.n
    }

    fn sample(&mut self) -> usize {
        self.rng.gen_range(0..self.n)
    }

    fn shape(&self) -> usize {
        self.n
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

/// Defines a `BoxSpace<T>`.
///
/// A `BoxSpace` is an n-dimensional container on
/// some generic `T`, where `T` is classically some
/// form of number. Bounds are inclusive on both ends.
#[derive(Debug, Clone)]
pub struct BoxSpace<T> {
    /// The lower bound on the space
    low: T,

    /// The upper bound on the space
    high: T,

    rng: StdRng,
}

impl BoxSpace<Vec<f32>> {
    /// Returns `None` when the bounds differ in length.
    pub fn new(low: Vec<f32>, high: Vec<f32>) -> Option<Self> {
        if low.len() != high.len() {
            return None;
        }

        Some(Self {
            low,
            high,
            rng: StdRng::from_entropy(),
        })
    }
}

impl<const N: usize> From<([f32; N], [f32; N])> for BoxSpace<Vec<f32>> {
    fn from(value: ([f32; N], [f32; N])) -> Self {
        Self {
            low: value.0.to_vec(),
            high: value.1.to_vec(),
            rng: StdRng::from_entropy(),
        }
    }
}

impl Space<Vec<f32>> for BoxSpace<Vec<f32>> {
    fn contains(&self, sample: &Vec<f32>) -> bool {
        if sample.len() != self.low.len() {
            return false;
        }

        sample
            .iter()
            .zip(self.low.iter())
            .zip(self.high.iter())
            .all(|((&s, &l), &h)| l <= s && s <= h)
    }

    fn sample(&mut self) -> Vec<f32> {
        // unbounded dimensions are clamped to a finite range so the
        // uniform draw stays well defined
        self.low
            .iter()
            .zip(self.high.iter())
            .map(|(&l, &h)| {
                let l = l.max(f32::MIN / 4.0);
                let h = h.min(f32::MAX / 4.0);
                if l == h {
                    l
                } else {
                    self.rng.gen_range(l..=h)
                }
            })
            .collect()
    }

    fn shape(&self) -> Vec<f32> {
        self.low.clone()
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}
