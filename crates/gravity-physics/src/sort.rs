//! Host counterpart of the device key sorter
//!
//! Same digit width, pass count and stability guarantee as the GPU radix sort,
//! so both produce identical permutations for identical keys.

use crate::constants::{RADIX_BITS, RADIX_BUCKETS, RADIX_PASSES};

fn digit(key: u32, shift: u32) -> usize {
    ((key >> shift) as usize) & (RADIX_BUCKETS - 1)
}

/// Stable ascending sort of `keys`, applying the same permutation to `values`.
///
/// # Panics
///
/// If the two slices differ in length.
pub fn sort_pairs(keys: &mut [u32], values: &mut [u32]) {
    assert_eq!(keys.len(), values.len(), "keys and values must pair up");

    let mut scratch_keys = vec![0u32; keys.len()];
    let mut scratch_values = vec![0u32; values.len()];

    for pass in 0..RADIX_PASSES {
        let shift = pass * RADIX_BITS;

        let mut offsets = [0usize; RADIX_BUCKETS];
        for &key in keys.iter() {
            offsets[digit(key, shift)] += 1;
        }
        let mut running = 0;
        for offset in offsets.iter_mut() {
            let count = *offset;
            *offset = running;
            running += count;
        }

        for (&key, &value) in keys.iter().zip(values.iter()) {
            let slot = &mut offsets[digit(key, shift)];
            scratch_keys[*slot] = key;
            scratch_values[*slot] = value;
            *slot += 1;
        }

        keys.copy_from_slice(&scratch_keys);
        values.copy_from_slice(&scratch_values);
    }
}

/// True when `perm` contains every index in `[0, perm.len())` exactly once
pub fn is_permutation(perm: &[u32]) -> bool {
    let mut seen = vec![false; perm.len()];
    for &index in perm {
        match seen.get_mut(index as usize) {
            Some(flag) if !*flag => *flag = true,
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_sorts_random_keys() {
        let mut rng = StdRng::seed_from_u64(7);
        let original: Vec<u32> = (0..1000).map(|_| rng.random()).collect();
        let mut keys = original.clone();
        let mut values: Vec<u32> = (0..1000).collect();

        sort_pairs(&mut keys, &mut values);

        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        assert!(is_permutation(&values));
        for (key, value) in keys.iter().zip(&values) {
            assert_eq!(*key, original[*value as usize]);
        }
    }

    #[test]
    fn test_sort_is_stable() {
        let mut keys = vec![5, 1, 5, 1, 5, 0];
        let mut values = vec![0, 1, 2, 3, 4, 5];
        sort_pairs(&mut keys, &mut values);
        assert_eq!(keys, vec![0, 1, 1, 5, 5, 5]);
        assert_eq!(values, vec![5, 1, 3, 0, 2, 4]);
    }

    #[test]
    fn test_permutation_check() {
        assert!(is_permutation(&[]));
        assert!(is_permutation(&[2, 0, 1]));
        assert!(!is_permutation(&[0, 0, 1]));
        assert!(!is_permutation(&[0, 3, 1]));
    }
}
