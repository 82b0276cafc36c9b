use rand::Rng;

pub fn mean(data: &[f32]) -> f32 {
    data.iter().fold(0.0, |acc, x| acc + x) / (data.len() as f32)
}

/// Draws one value per dimension, uniformly from `[low, high]`.
///
/// Returns `None` when the bounds differ in length or a low bound
/// is above its high bound.
pub fn generate_random_vector<R: Rng>(rng: &mut R, lows: &[f32], highs: &[f32]) -> Option<Vec<f32>> {
    if lows.len() != highs.len() {
        return None;
    }

    let mut random_vector = Vec::with_capacity(lows.len());

    for (low, high) in lows.iter().zip(highs.iter()) {
        if low > high {
            return None;
        }
        random_vector.push(rng.gen_range(*low..=*high));
    }

    Some(random_vector)
}
