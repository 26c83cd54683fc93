//! Session configuration parsed from environment variables.

use rand::SeedableRng;
use rand::rngs::StdRng;

pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Bounded size of the outbound frame channel.
    pub outbox_capacity: usize,
    /// Fixed seed for random badge draws. `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { outbox_capacity: DEFAULT_OUTBOX_CAPACITY, rng_seed: None }
    }
}

impl SessionConfig {
    /// Build session config from environment variables.
    ///
    /// Optional:
    /// - `GROUPS_OUTBOX_CAPACITY`: default 256, zero falls back to the default
    /// - `GROUPS_RNG_SEED`: unset or unparsable seeds from the OS
    #[must_use]
    pub fn from_env() -> Self {
        let outbox_capacity = match env_parse("GROUPS_OUTBOX_CAPACITY", DEFAULT_OUTBOX_CAPACITY) {
            0 => DEFAULT_OUTBOX_CAPACITY,
            n => n,
        };
        let rng_seed = match std::env::var("GROUPS_RNG_SEED") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(seed) => Some(seed),
                Err(_) => None,
            },
            Err(_) => None,
        };

        Self { outbox_capacity, rng_seed }
    }

    /// Badge RNG for this session.
    #[must_use]
    pub fn rng(&self) -> StdRng {
        match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key).map_or(default, |v| v.trim().parse::<T>().unwrap_or(default))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
