/*
Pre-generated pool of uniform random numbers.

Trial moves never talk to a generator directly: they read the pool at `offset`
and advance it. When a request does not fit in what is left of the pool, the pool
is regenerated from the seeded stream (`rounds` += 1, `offset` = 0). A refill
needs `&mut self`, so no borrowed device view can be alive while it happens.
 */

use log::{debug, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};

use crate::constants::DEFAULT_RANDOM_SIZE;
use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct RandomNumber {
    host_random: Vec<f64>,
    device_random: Option<Vec<f64>>,
    pub randomsize: usize,
    pub offset: usize,
    pub rounds: usize,
    seed: u64,
    rng: StdRng,
    uniform: Uniform<f64>,
}

impl RandomNumber {
    pub fn new(randomsize: usize, seed: u64) -> Result<Self> {
        if randomsize == 0 {
            return Err(Error::InvalidParameter(
                "random pool size must be positive".to_string(),
            ));
        }
        let uniform = Uniform::new(0.0, 1.0)
            .map_err(|e| Error::InvalidParameter(format!("uniform distribution: {e}")))?;
        Ok(RandomNumber {
            host_random: Vec::new(),
            device_random: None,
            randomsize,
            offset: 0,
            rounds: 0,
            seed,
            rng: StdRng::seed_from_u64(seed),
            uniform,
        })
    }

    pub fn with_seed(seed: u64) -> Result<Self> {
        Self::new(DEFAULT_RANDOM_SIZE, seed)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Reserve and fill the host pool.
    pub fn allocate_random(&mut self) -> Result<()> {
        let mut pool: Vec<f64> = Vec::new();
        pool.try_reserve_exact(self.randomsize)
            .map_err(|_| Error::Allocation {
                what: "random pool",
                requested: self.randomsize,
            })?;
        pool.extend((&self.uniform).sample_iter(&mut self.rng).take(self.randomsize));
        self.host_random = pool;
        self.offset = 0;
        debug!("allocated random pool of {} values (seed {})", self.randomsize, self.seed);
        Ok(())
    }

    /// Mirror the host pool on the device.
    pub fn device_random(&mut self) -> Result<()> {
        if self.host_random.len() != self.randomsize {
            self.allocate_random()?;
        }
        let mut mirror: Vec<f64> = Vec::new();
        mirror
            .try_reserve_exact(self.randomsize)
            .map_err(|_| Error::Allocation {
                what: "device random pool",
                requested: self.randomsize,
            })?;
        mirror.extend_from_slice(&self.host_random);
        self.device_random = Some(mirror);
        Ok(())
    }

    pub fn host_random(&self) -> &[f64] {
        &self.host_random
    }

    pub fn device_view(&self) -> Option<&[f64]> {
        self.device_random.as_deref()
    }

    fn refill(&mut self) {
        for v in self.host_random.iter_mut() {
            *v = self.uniform.sample(&mut self.rng);
        }
        if let Some(mirror) = self.device_random.as_mut() {
            mirror.copy_from_slice(&self.host_random);
        }
        self.offset = 0;
        self.rounds += 1;
        trace!("random pool refilled (round {})", self.rounds);
    }

    /// Take `n` consecutive values, refilling first when they do not fit.
    pub fn take(&mut self, n: usize) -> Result<&[f64]> {
        if n > self.randomsize {
            return Err(Error::InvalidParameter(format!(
                "requested {n} random values from a pool of {}",
                self.randomsize
            )));
        }
        if self.host_random.len() != self.randomsize {
            self.allocate_random()?;
        }
        if self.offset + n > self.randomsize {
            self.refill();
        }
        let start = self.offset;
        self.offset += n;
        Ok(&self.host_random[start..start + n])
    }

    pub fn uniform(&mut self) -> Result<f64> {
        Ok(self.take(1)?[0])
    }

    pub fn uniform3(&mut self) -> Result<[f64; 3]> {
        let s = self.take(3)?;
        Ok([s[0], s[1], s[2]])
    }

    /// Index in [0, n) from one pooled value.
    pub fn index(&mut self, n: usize) -> Result<usize> {
        let u = self.uniform()?;
        Ok(((u * n as f64) as usize).min(n.saturating_sub(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_in_unit_interval() {
        let mut r = RandomNumber::new(1000, 7).unwrap();
        r.allocate_random().unwrap();
        assert!(r.host_random().iter().all(|&v| (0.0..1.0).contains(&v)));
    }

    #[test]
    fn test_exhaustion_triggers_single_refill() {
        let size = 64;
        let mut r = RandomNumber::new(size, 11).unwrap();
        r.allocate_random().unwrap();
        for _ in 0..size {
            r.uniform().unwrap();
        }
        assert_eq!(r.offset, size);
        assert_eq!(r.rounds, 0);

        let v = r.uniform().unwrap();
        assert_eq!(r.rounds, 1);
        // the refill reset the cursor to 0 before this draw consumed slot 0
        assert_eq!(r.offset, 1);
        assert_eq!(v, r.host_random()[0]);
    }

    #[test]
    fn test_offset_never_exceeds_size() {
        let mut r = RandomNumber::new(10, 3).unwrap();
        for _ in 0..100 {
            r.take(3).unwrap();
            assert!(r.offset <= r.randomsize);
        }
        assert!(r.rounds > 0);
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = RandomNumber::new(16, 99).unwrap();
        let mut b = RandomNumber::new(16, 99).unwrap();
        let xa: Vec<f64> = (0..50).map(|_| a.uniform().unwrap()).collect();
        let xb: Vec<f64> = (0..50).map(|_| b.uniform().unwrap()).collect();
        assert_eq!(xa, xb);
    }

    #[test]
    fn test_device_mirror_follows_refill() {
        let mut r = RandomNumber::new(8, 5).unwrap();
        r.allocate_random().unwrap();
        r.device_random().unwrap();
        for _ in 0..9 {
            r.uniform().unwrap();
        }
        assert_eq!(r.device_view().unwrap(), r.host_random());
    }

    #[test]
    fn test_oversized_request_rejected() {
        let mut r = RandomNumber::new(4, 1).unwrap();
        assert!(r.take(5).is_err());
    }
}
